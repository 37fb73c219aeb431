use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rand::Rng;

use stix::scalar::decode_scalar;
use stix::schema::{BodyLayout, MemorySchema, ParameterDefinition};
use stix::{PacketKind, ParameterType, Scanner, ScannerConfig};

const NUM_ITEMS: u8 = 200;

fn schema() -> MemorySchema {
    MemorySchema::stix().with_body(
        PacketKind::Telemetry,
        21,
        6,
        None,
        BodyLayout::builder()
            .spid(54110)
            .is_variable(true)
            .parameters(vec![
                ParameterDefinition::builder()
                    .name("N")
                    .width(8)
                    .group_size(2)
                    .build(),
                ParameterDefinition::builder().name("Value").width(16).build(),
                ParameterDefinition::builder().name("Flags").width(8).build(),
            ])
            .build(),
    )
}

// Variable telemetry packets filled with random repeat group data.
fn packets(count: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let data_len = 1 + usize::from(NUM_ITEMS) * 3;
    let length = u16::try_from(16 + data_len - 7).unwrap().to_be_bytes();
    let mut dat = Vec::new();
    for _ in 0..count {
        dat.extend_from_slice(&[0x0d, 0xb1, 0xc0, 0x01, length[0], length[1]]);
        dat.extend_from_slice(&[0x10, 21, 6, 0, 0, 0, 1, 0, 0, 0]);
        dat.push(NUM_ITEMS);
        for _ in 0..usize::from(NUM_ITEMS) * 3 {
            dat.push(rng.gen());
        }
    }
    dat
}

fn bench_scan(c: &mut Criterion) {
    let schema = schema();
    let dat = packets(100);

    let mut group = c.benchmark_group("scanner");
    group.throughput(Throughput::Bytes(dat.len() as u64));
    group.bench_function("scan_variable_tm", |b| {
        b.iter(|| {
            let mut scanner = Scanner::new(&schema, ScannerConfig::default());
            let _ = scanner.scan(&dat);
        });
    });
    group.finish();
}

fn bench_decode_scalar(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let mut buf = [0u8; 1024];
    rng.fill(&mut buf[..]);

    let mut group = c.benchmark_group("scalar");
    group.throughput(Throughput::Bytes(buf.len() as u64));
    group.bench_function("decode_unaligned", |b| {
        b.iter(|| {
            for offset in 0..buf.len() - 2 {
                let _ = decode_scalar(&buf, offset, 3, 12, ParameterType::Unsigned);
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_scan, bench_decode_scalar);
criterion_main!(benches);
