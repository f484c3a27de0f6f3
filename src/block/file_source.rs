//! Reference [`BlockSource`] backed by a local file, using the crate's
//! `Io`/`FileExt` seam rather than `std::fs` directly so tests can swap in a
//! fake filesystem (§4.10).

use std::path::Path;

use crate::io::{FileExt, Io};

use super::{BlockSource, BlockSourceFactory, SourceStatus};

pub struct FileBlockSource<F> {
    file: F,
    last_len: u64,
    overwritten: bool,
}

impl<F: FileExt> FileBlockSource<F> {
    pub fn new(file: F) -> Self {
        Self { file, last_len: 0, overwritten: false }
    }
}

impl<F: FileExt> BlockSource for FileBlockSource<F> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let len = self.file.len()?;
        if len < self.last_len {
            // A replacing writer truncated or recreated the file underneath us.
            self.overwritten = true;
        }
        self.last_len = self.last_len.max(len);
        if offset >= len {
            return Ok(0);
        }
        let avail = (len - offset).min(buf.len() as u64) as usize;
        self.file.read_at(&mut buf[..avail], offset)
    }

    fn poll_status(&mut self) -> SourceStatus {
        if self.overwritten {
            SourceStatus::Overwritten
        } else {
            SourceStatus::More
        }
    }

    fn confirm_consumed(&mut self, _offset: u64) {
        // Local files keep their full history; nothing to reclaim. A
        // network-backed source would ack upstream here instead.
    }
}

/// Opens `FileBlockSource`s against a shared `Io` implementation.
pub struct FileBlockSourceFactory<I> {
    io: I,
}

impl<I: Io> FileBlockSourceFactory<I> {
    pub fn new(io: I) -> Self {
        Self { io }
    }
}

impl<I: Io> BlockSourceFactory for FileBlockSourceFactory<I> {
    type Source = FileBlockSource<I::File>;

    fn open(&self, path: &Path, _resume_offset: u64) -> std::io::Result<Self::Source> {
        let file = self.io.open(false, true, false, path)?;
        Ok(FileBlockSource::new(file))
    }
}
