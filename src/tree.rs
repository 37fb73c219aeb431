//! Parameter tree construction and decoding.
//!
//! Body layouts arrive as a flat list of [ParameterDefinition]s where a non-zero
//! `group_size` marks the head of a repeat group covering that many of the following
//! definitions (nested groups included). [ParseTree::build] turns the list back into a
//! tree and [TreeWalker::walk] decodes a packet body against it, using the decoded value
//! of each group head as the number of times its group repeats.
use tracing::{debug, trace, warn};

use crate::calibration::{Calibrator, EngValue};
use crate::prelude::*;
use crate::scalar::{decode_scalar, num_bytes};
use crate::schema::{ParameterDefinition, Schema};
use crate::{PacketKind, ParameterNode, Raw};

/// Default upper bound on the number of parameters decoded from one packet.
pub const DEFAULT_MAX_NODES: usize = 1_000_000;

/// Expands compressed raw values into engineering values.
///
/// Injected into the walker; it is consulted for unsigned values that did not get an
/// engineering value from calibration.
pub trait Decompressor: Send + Sync {
    fn decompress(&self, spid: Option<u32>, parameter: &str, raw: u64) -> Option<f64>;
}

/// How the position of each parameter in the body is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorRule {
    /// Each definition carries its own byte and bit offset (fixed layouts).
    Absolute,
    /// Byte-aligned parameters advance a byte cursor; narrower ones are placed relative
    /// to the previous parameters' bits (variable telemetry).
    Accumulate,
    /// A single running bit cursor (variable telecommands).
    Sequential,
}

#[derive(Debug)]
struct Node {
    /// `None` for the root
    def: Option<usize>,
    children: Vec<usize>,
}

struct Frame {
    node: usize,
    remaining: i64,
}

/// Repeat structure of a body layout. Nodes are stored in an arena and refer to their
/// children by index.
#[derive(Debug)]
pub struct ParseTree<'a> {
    defs: &'a [ParameterDefinition],
    nodes: Vec<Node>,
    min_len: usize,
    rule: CursorRule,
}

impl<'a> ParseTree<'a> {
    /// Build the tree for `defs`. With [CursorRule::Absolute] group sizes are ignored
    /// and every definition is a top level parameter.
    #[must_use]
    pub fn build(defs: &'a [ParameterDefinition], rule: CursorRule) -> Self {
        let mut nodes = vec![Node {
            def: None,
            children: Vec::new(),
        }];
        let mut stack = vec![Frame {
            node: 0,
            remaining: 0,
        }];

        for (idx, def) in defs.iter().enumerate() {
            // Every open group is one definition closer to its end. Frames are checked
            // innermost first; a frame that runs out is closed with everything inside it.
            for i in (1..stack.len()).rev() {
                stack[i].remaining -= 1;
                if stack[i].remaining < 0 {
                    stack.truncate(i);
                }
            }
            let parent = stack.last().map_or(0, |f| f.node);
            let node = nodes.len();
            nodes.push(Node {
                def: Some(idx),
                children: Vec::new(),
            });
            nodes[parent].children.push(node);

            if rule != CursorRule::Absolute && def.group_size > 0 {
                stack.push(Frame {
                    node,
                    remaining: i64::try_from(def.group_size).unwrap_or(i64::MAX),
                });
            }
        }

        let min_len = match rule {
            CursorRule::Absolute => defs
                .iter()
                .map(|d| {
                    d.byte_offset
                        + num_bytes(u32::try_from(d.bit_offset).unwrap_or(0), d.width)
                })
                .max()
                .unwrap_or(0),
            CursorRule::Accumulate | CursorRule::Sequential => nodes[0]
                .children
                .iter()
                .filter_map(|&n| nodes[n].def)
                .map(|d| &defs[d])
                .filter(|d| d.width % 8 == 0)
                .map(|d| d.width as usize / 8)
                .sum(),
        };

        ParseTree {
            defs,
            nodes,
            min_len,
            rule,
        }
    }

    /// Minimum number of body bytes required by the parameters that are always present.
    #[must_use]
    pub fn min_len(&self) -> usize {
        self.min_len
    }

    #[must_use]
    pub fn rule(&self) -> CursorRule {
        self.rule
    }

    /// Decode `buf` with `walker`. See [TreeWalker::walk].
    ///
    /// # Errors
    /// See [TreeWalker::walk].
    pub fn walk<S: Schema + ?Sized>(
        &self,
        buf: &[u8],
        walker: &TreeWalker<'_, S>,
    ) -> Result<WalkResult> {
        walker.walk(self, buf)
    }

    fn definition(&self, node: usize) -> Option<&'a ParameterDefinition> {
        self.nodes[node].def.map(|d| &self.defs[d])
    }

    /// Names of the top level parameters, in order.
    pub fn top_level(&self) -> impl Iterator<Item = &str> + '_ {
        self.nodes[0]
            .children
            .iter()
            .filter_map(|&n| self.definition(n))
            .map(|d| d.name.as_str())
    }
}

/// Result of walking a body.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkResult {
    pub parameters: Vec<ParameterNode>,
    /// Body bytes consumed according to the cursor rule.
    pub consumed_bytes: usize,
    /// The body ended before every declared parameter was decoded.
    pub incomplete: bool,
}

#[derive(Debug, Default)]
struct Cursor {
    byte: usize,
    last_offset: usize,
    bit: i64,
    last_num_bits: i64,
    last_data_width: i64,
    bit_cursor: usize,
    end: usize,
    nodes: usize,
}

impl Cursor {
    fn past_end(&self, rule: CursorRule, len: usize) -> bool {
        match rule {
            CursorRule::Absolute => false,
            CursorRule::Accumulate => self.byte > len,
            CursorRule::Sequential => self.bit_cursor > len * 8,
        }
    }

    fn consumed(&self, rule: CursorRule) -> usize {
        match rule {
            CursorRule::Absolute => self.end,
            CursorRule::Accumulate => self.byte,
            CursorRule::Sequential => self.bit_cursor / 8,
        }
    }

    /// Byte and bit offset of the next parameter, advancing the cursor past it.
    fn advance(&mut self, rule: CursorRule, def: &ParameterDefinition) -> Result<(usize, u32)> {
        let width = i64::from(def.width);
        let (byte, bit) = match rule {
            CursorRule::Absolute => (def.byte_offset, i64::from(def.bit_offset)),
            CursorRule::Sequential => {
                let at = self.bit_cursor;
                self.bit_cursor += def.width as usize;
                (at / 8, (at % 8) as i64)
            }
            CursorRule::Accumulate => {
                if width % 8 != 0 {
                    let offset = i64::from(def.bit_offset);
                    if offset < 0 {
                        self.bit = self.last_data_width + offset;
                    } else {
                        self.bit += self.last_num_bits + offset;
                    }
                    self.last_num_bits = width;
                } else {
                    self.bit = 0;
                    self.last_offset = self.byte;
                    self.byte += def.width as usize / 8;
                    self.last_num_bits = 0;
                    self.last_data_width = width;
                }
                (self.last_offset, self.bit)
            }
        };
        let bit = u32::try_from(bit).map_err(|_| Error::Range {
            offset: 0,
            length: def.width,
            container: 0,
        })?;
        self.end = self.end.max(byte + num_bytes(bit, def.width));
        Ok((byte, bit))
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Decodes bodies against a [ParseTree].
pub struct TreeWalker<'a, S: ?Sized> {
    pub schema: &'a S,
    pub calibrator: &'a Calibrator,
    pub decompressor: Option<&'a dyn Decompressor>,
    pub kind: PacketKind,
    pub spid: Option<u32>,
    /// Compute engineering values.
    pub calibrate: bool,
    /// Parameters calibrated even when `calibrate` is off.
    pub calibrated: &'a [String],
    pub max_nodes: usize,
}

impl<S: Schema + ?Sized> TreeWalker<'_, S> {
    /// Decode `buf` according to `tree`.
    ///
    /// Running out of data part way through is not an error; the parameters decoded so
    /// far are returned with `incomplete` set.
    ///
    /// # Errors
    /// [Error::LengthMismatch] if `buf` is shorter than the mandatory parameters,
    /// [Error::TooManyParameters] if the packet would produce more than `max_nodes`
    /// parameters, and [Error::UnsupportedWidth] or [Error::Range] for parameters the
    /// layout describes incorrectly.
    pub fn walk(&self, tree: &ParseTree<'_>, buf: &[u8]) -> Result<WalkResult> {
        if buf.len() < tree.min_len() {
            return Err(Error::LengthMismatch {
                expected: tree.min_len(),
                actual: buf.len(),
            });
        }
        let mut cursor = Cursor::default();
        let mut parameters = Vec::new();
        let flow = self.walk_group(tree, 0, 1, buf, &mut cursor, &mut parameters)?;
        Ok(WalkResult {
            parameters,
            consumed_bytes: cursor.consumed(tree.rule()),
            incomplete: matches!(flow, Flow::Stop),
        })
    }

    fn walk_group(
        &self,
        tree: &ParseTree<'_>,
        node: usize,
        repeat: u64,
        buf: &[u8],
        cursor: &mut Cursor,
        out: &mut Vec<ParameterNode>,
    ) -> Result<Flow> {
        for _ in 0..repeat {
            for &child in &tree.nodes[node].children {
                if cursor.past_end(tree.rule(), buf.len()) {
                    return Ok(Flow::Stop);
                }
                let Some(def) = tree.definition(child) else {
                    continue;
                };
                let (byte, bit) = cursor.advance(tree.rule(), def)?;
                let raw = match decode_scalar(buf, byte, bit, def.width, def.parameter_type) {
                    Ok(raw) => raw,
                    Err(Error::TruncatedBuffer { actual, minimum }) => {
                        debug!(parameter = %def.name, byte, actual, minimum, "body ended early");
                        return Ok(Flow::Stop);
                    }
                    Err(err) => return Err(err),
                };

                cursor.nodes += 1;
                if cursor.nodes > self.max_nodes {
                    return Err(Error::TooManyParameters {
                        limit: self.max_nodes,
                    });
                }

                let eng = self.engineering(def, &raw);
                trace!(parameter = %def.name, byte, bit, ?raw, "decoded");
                let mut param = ParameterNode::new(&def.name, raw, eng);

                if !tree.nodes[child].children.is_empty() {
                    match param.raw.count() {
                        Some(count) => {
                            let flow =
                                self.walk_group(tree, child, count, buf, cursor, &mut param.children)?;
                            if let Flow::Stop = flow {
                                out.push(param);
                                return Ok(Flow::Stop);
                            }
                        }
                        None => {
                            warn!(parameter = %def.name, raw = ?param.raw, "group children not decoded");
                        }
                    }
                }
                out.push(param);
            }
        }
        Ok(Flow::Continue)
    }

    fn engineering(&self, def: &ParameterDefinition, raw: &Raw) -> EngValue {
        let eng = if self.calibrate || self.calibrated.iter().any(|n| *n == def.name) {
            self.calibrator.calibrate(
                self.schema,
                &def.name,
                def.calibration.as_deref(),
                def.parameter_type,
                raw,
                self.kind,
            )
        } else {
            EngValue::Empty
        };
        match (eng, self.decompressor, raw) {
            (EngValue::Empty, Some(d), Raw::Unsigned(v)) => d
                .decompress(self.spid, &def.name, *v)
                .map_or(EngValue::Empty, EngValue::Number),
            (eng, _, _) => eng,
        }
    }
}
