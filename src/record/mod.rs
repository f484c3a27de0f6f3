//! Record framing and vector splitting (§3, §4.4).

mod header;
mod splitter;
mod vector;

pub use header::{RecordHeader, RecordVersion};
pub use splitter::RecordSplitter;
pub use vector::{ChangeVector, OpCode, VectorHeader};
