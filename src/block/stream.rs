//! Turns a raw [`BlockSource`] into a stream of fixed-size, sequentially
//! numbered blocks (§4.2).

use bytes::Bytes;

use crate::error::{Error, FramingError};
use crate::io::Endianness;

use super::header::{FileHeader, HEADER_LEN};
use super::{Block, BlockSource, NextBlock, SourceStatus};

enum ReadOutcome {
    Io(std::io::Error),
    Incomplete,
}

fn read_fully<S: BlockSource>(source: &mut S, offset: u64, buf: &mut [u8]) -> Result<(), ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source
            .read_at(offset + filled as u64, &mut buf[filled..])
            .map_err(ReadOutcome::Io)?;
        if n == 0 {
            return Err(ReadOutcome::Incomplete);
        }
        filled += n;
    }
    Ok(())
}

pub struct BlockStream<S> {
    source: S,
    header: FileHeader,
    next_block: u64,
}

impl<S: BlockSource> BlockStream<S> {
    /// Reads block 1's header to learn block size and endianness, then
    /// starts yielding from block 0.
    pub fn open(mut source: S) -> Result<Self, Error> {
        let mut buf = [0u8; HEADER_LEN];
        read_fully(&mut source, 0, &mut buf).map_err(|outcome| match outcome {
            ReadOutcome::Io(e) => Error::Framing(FramingError::InvalidLwnHeader(e.to_string())),
            ReadOutcome::Incomplete => Error::Framing(FramingError::InvalidLwnHeader("file shorter than header".into())),
        })?;
        let header = FileHeader::decode(&buf)?;
        Ok(Self { source, header, next_block: 0 })
    }

    /// Resumes a stream whose header was already known from a checkpoint,
    /// starting from `resume_block` rather than block 0 (§4.9).
    pub fn resume(source: S, header: FileHeader, resume_block: u64) -> Self {
        Self { source, header, next_block: resume_block }
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn block_size(&self) -> u32 {
        self.header.block_size
    }

    pub fn endian(&self) -> Endianness {
        self.header.endian
    }

    /// Reads the next block, or reports why none is available yet (§6.4:
    /// end-of-file and overwrite are control flow, not errors).
    pub fn next_block(&mut self) -> Result<NextBlock, Error> {
        let offset = self.next_block * self.header.block_size as u64;
        let mut buf = vec![0u8; self.header.block_size as usize];
        match read_fully(&mut self.source, offset, &mut buf) {
            Ok(()) => {
                let block = Block::new(self.next_block, Bytes::from(buf));
                self.next_block += 1;
                Ok(NextBlock::Block(block))
            }
            Err(ReadOutcome::Io(e)) => Err(Error::Framing(FramingError::InvalidLwnHeader(e.to_string()))),
            Err(ReadOutcome::Incomplete) => match self.source.poll_status() {
                SourceStatus::More | SourceStatus::EndOfFile => Ok(NextBlock::EndOfFile),
                SourceStatus::Overwritten => Ok(NextBlock::Overwritten),
            },
        }
    }

    pub fn confirm_consumed(&mut self, through_block: u64) {
        self.source.confirm_consumed(through_block * self.header.block_size as u64);
    }
}

/// XOR checksum over 16-bit little-endian words, matching the scheme redo
/// block headers use on disk. Exposed standalone even though `BlockStream`
/// itself doesn't verify checksums — that's left to the reader layer that
/// consumes each block's payload (§4.2).
pub fn block_checksum(payload: &[u8]) -> u16 {
    let mut acc: u16 = 0;
    let mut chunks = payload.chunks_exact(2);
    for chunk in &mut chunks {
        acc ^= u16::from_le_bytes([chunk[0], chunk[1]]);
    }
    if let [last] = chunks.remainder() {
        acc ^= *last as u16;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SourceStatus;
    use crate::types::Scn;

    struct VecSource {
        bytes: Vec<u8>,
        status: SourceStatus,
    }

    impl BlockSource for VecSource {
        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
            let offset = offset as usize;
            if offset >= self.bytes.len() {
                return Ok(0);
            }
            let n = buf.len().min(self.bytes.len() - offset);
            buf[..n].copy_from_slice(&self.bytes[offset..offset + n]);
            Ok(n)
        }

        fn poll_status(&mut self) -> SourceStatus {
            self.status
        }

        fn confirm_consumed(&mut self, _offset: u64) {}
    }

    fn fixture(block_size: u32, extra_blocks: usize) -> Vec<u8> {
        let header = FileHeader {
            endian: Endianness::Little,
            block_size,
            seq: 1,
            resetlogs: 1,
            activation: 1,
            first_scn: Scn::new(100),
            next_scn: Scn::ZERO,
        };
        let mut bytes = header.encode();
        bytes.resize(block_size as usize, 0);
        for i in 0..extra_blocks {
            let mut block = vec![i as u8; block_size as usize];
            block[0] = i as u8;
            bytes.extend_from_slice(&block);
        }
        bytes
    }

    #[test]
    fn opens_and_detects_block_size() {
        let source = VecSource { bytes: fixture(512, 2), status: SourceStatus::More };
        let stream = BlockStream::open(source).unwrap();
        assert_eq!(stream.block_size(), 512);
        assert_eq!(stream.endian(), Endianness::Little);
    }

    #[test]
    fn yields_sequentially_numbered_blocks() {
        let source = VecSource { bytes: fixture(512, 2), status: SourceStatus::More };
        let mut stream = BlockStream::open(source).unwrap();
        match stream.next_block().unwrap() {
            NextBlock::Block(b) => assert_eq!(b.number, 0),
            other => panic!("expected block, got {other:?}"),
        }
        match stream.next_block().unwrap() {
            NextBlock::Block(b) => assert_eq!(b.number, 1),
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn reports_end_of_file_past_last_block() {
        let source = VecSource { bytes: fixture(512, 0), status: SourceStatus::EndOfFile };
        let mut stream = BlockStream::open(source).unwrap();
        assert!(matches!(stream.next_block().unwrap(), NextBlock::EndOfFile));
    }

    #[test]
    fn reports_overwritten_when_source_signals_it() {
        let source = VecSource { bytes: fixture(512, 0), status: SourceStatus::Overwritten };
        let mut stream = BlockStream::open(source).unwrap();
        assert!(matches!(stream.next_block().unwrap(), NextBlock::Overwritten));
    }

    #[test]
    fn checksum_is_order_sensitive_xor() {
        let a = block_checksum(&[0x01, 0x00, 0x02, 0x00]);
        let b = block_checksum(&[0x02, 0x00, 0x01, 0x00]);
        assert_eq!(a, b);
        assert_ne!(a, block_checksum(&[0x01, 0x00, 0x03, 0x00]));
    }
}
