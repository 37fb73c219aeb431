#![doc = include_str!("../README.md")]

mod error;

pub mod bits;
pub mod calibration;
pub mod header;
pub mod packet;
pub mod scalar;
pub mod scanner;
pub mod schema;
pub mod tree;

pub use calibration::{Calibrator, EngValue};
pub use error::{Error, Result};
pub use header::{Header, PacketHeader, PacketKind};
pub use packet::{DecodeStatus, Packet, PacketSink, ParameterNode};
pub use scalar::{ParameterType, Raw};
pub use scanner::{decode_parallel, Scanner, ScannerConfig, Summary};
pub use schema::{MemorySchema, Schema};

mod prelude {
    pub use crate::error::{Error, Result};
}
