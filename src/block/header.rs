//! The redo file header occupies the front of block 1 and is the only part
//! of the file read before block size and endianness are known (§4.2).

use crate::error::FramingError;
use crate::io::{BinaryReader, Endianness};
use crate::types::Scn;

use super::detect_endianness;

const MAGIC: &[u8; 4] = b"ORLG";
pub const HEADER_LEN: usize = 40;

/// Static facts about a redo log file, decoded once at `BlockStream::open`
/// time and consulted by the LWN assembler (first_scn/next_scn, §4.3) and
/// the checkpoint coordinator (resetlogs/activation, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub endian: Endianness,
    pub block_size: u32,
    pub seq: u32,
    pub resetlogs: u32,
    pub activation: u32,
    pub first_scn: Scn,
    /// `Scn::ZERO` means "not yet sealed" (current online log).
    pub next_scn: Scn,
}

impl FileHeader {
    /// Parses the header out of the first `HEADER_LEN` bytes of block 1.
    /// Endianness is not known yet, so the magic and signature byte are read
    /// byte-by-byte rather than through a `BinaryReader`.
    pub fn decode(buf: &[u8]) -> Result<Self, FramingError> {
        if buf.len() < HEADER_LEN || &buf[0..4] != MAGIC {
            return Err(FramingError::InvalidLwnHeader("missing file header magic".into()));
        }
        let endian = detect_endianness(buf[4])
            .ok_or_else(|| FramingError::InvalidLwnHeader(format!("unrecognised endianness signature 0x{:02x}", buf[4])))?;

        let r = BinaryReader::new(&buf[8..HEADER_LEN], endian);
        let block_size = r.read32(0).map_err(|e| FramingError::InvalidLwnHeader(e.to_string()))?;
        let seq = r.read32(4).map_err(|e| FramingError::InvalidLwnHeader(e.to_string()))?;
        let resetlogs = r.read32(8).map_err(|e| FramingError::InvalidLwnHeader(e.to_string()))?;
        let activation = r.read32(12).map_err(|e| FramingError::InvalidLwnHeader(e.to_string()))?;
        let first_scn = r.read_scn_r(16).map_err(|e| FramingError::InvalidLwnHeader(e.to_string()))?;
        let next_scn = r.read_scn_r(22).map_err(|e| FramingError::InvalidLwnHeader(e.to_string()))?;

        if !matches!(block_size, 512 | 1024 | 4096) {
            return Err(FramingError::InvalidLwnHeader(format!("implausible block size {block_size}")));
        }

        Ok(Self { endian, block_size, seq, resetlogs, activation, first_scn, next_scn })
    }

    /// Encodes the header for test fixtures and the synthetic writer in
    /// `test_support`. Production parsing never writes headers.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_LEN];
        out[0..4].copy_from_slice(MAGIC);
        out[4] = match self.endian {
            Endianness::Little => 0,
            Endianness::Big => 1,
        };
        let put32 = |out: &mut [u8], at: usize, v: u32| match self.endian {
            Endianness::Little => out[at..at + 4].copy_from_slice(&v.to_le_bytes()),
            Endianness::Big => out[at..at + 4].copy_from_slice(&v.to_be_bytes()),
        };
        put32(&mut out, 8, self.block_size);
        put32(&mut out, 12, self.seq);
        put32(&mut out, 16, self.resetlogs);
        put32(&mut out, 20, self.activation);
        let put48 = |out: &mut [u8], at: usize, v: u64| {
            let b = match self.endian {
                Endianness::Little => v.to_le_bytes(),
                Endianness::Big => v.to_be_bytes(),
            };
            match self.endian {
                Endianness::Little => out[at..at + 6].copy_from_slice(&b[0..6]),
                Endianness::Big => out[at..at + 6].copy_from_slice(&b[2..8]),
            }
        };
        put48(&mut out, 24, self.first_scn.get());
        put48(&mut out, 30, self.next_scn.get());
        out
    }
}
