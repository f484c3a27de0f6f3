//! Presents a redo log as a stream of fixed-size blocks (§4.2, §6.1).

mod file_source;
mod header;
mod stream;

pub use file_source::{FileBlockSource, FileBlockSourceFactory};
pub use header::{FileHeader, HEADER_LEN};
pub use stream::BlockStream;

use bytes::Bytes;

use crate::io::Endianness;

/// One fixed-size block read from a redo log, tagged with its 0-based block
/// number within the file.
#[derive(Debug, Clone)]
pub struct Block {
    pub number: u64,
    pub payload: Bytes,
}

impl Block {
    pub fn new(number: u64, payload: Bytes) -> Self {
        Self { number, payload }
    }
}

/// Control-flow outcomes a `BlockSource` can report instead of more data
/// (§6.4: these are not errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// More bytes may become available; caller should retry.
    More,
    /// The producer marked end-of-log; no further bytes will arrive.
    EndOfFile,
    /// A replacing writer rewound the file (the "online log" case); the
    /// caller must restart this file from its last checkpoint block.
    Overwritten,
}

/// Outcome of asking a `BlockStream` for its next block.
#[derive(Debug, Clone)]
pub enum NextBlock {
    Block(Block),
    EndOfFile,
    Overwritten,
}

/// A raw, positioned byte source underlying a `BlockStream`. Implementors
/// own the actual I/O (local file, network stream, test fixture); the
/// `BlockStream` never reads `len`/offset bookkeeping itself.
pub trait BlockSource: Send {
    /// Reads up to `buf.len()` bytes at the given absolute byte offset.
    /// Returns the number of bytes actually read; short reads are allowed
    /// and the caller will retry with the remainder.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Non-blocking status check, consulted whenever a read comes up short
    /// of what the caller asked for.
    fn poll_status(&mut self) -> SourceStatus;

    /// Acknowledges that every byte up to `offset` has been durably
    /// consumed by the parser, so the source may reclaim backing storage.
    fn confirm_consumed(&mut self, offset: u64);
}

/// Opens a `BlockSource` at a path, optionally resuming from a prior byte
/// offset (§6.2 `BlockSource::open`).
pub trait BlockSourceFactory {
    type Source: BlockSource;

    fn open(&self, path: &std::path::Path, resume_offset: u64) -> std::io::Result<Self::Source>;
}

pub(crate) fn detect_endianness(signature: u8) -> Option<Endianness> {
    match signature {
        0 => Some(Endianness::Little),
        1 => Some(Endianness::Big),
        _ => None,
    }
}
