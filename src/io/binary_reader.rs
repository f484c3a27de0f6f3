//! Pure endian-parameterized byte decoding (§4.1). No I/O — every method
//! reads from an in-memory slice and fails with [`DecodeError::TruncatedField`]
//! rather than panicking on a short buffer.

use crate::error::DecodeError;
use crate::types::{Scn, SubScn, Uba, Xid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// A cursor over a borrowed byte slice, reading scalars in a fixed
/// endianness chosen once at file-header parse time (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    endian: Endianness,
}

impl<'a> BinaryReader<'a> {
    pub fn new(buf: &'a [u8], endian: Endianness) -> Self {
        Self { buf, endian }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn need(&self, code: u32, offset: usize, width: usize) -> Result<&'a [u8], DecodeError> {
        self.buf
            .get(offset..offset + width)
            .ok_or(DecodeError::TruncatedField {
                code,
                need: offset + width,
                have: self.buf.len(),
            })
    }

    fn read_uint(&self, code: u32, offset: usize, width: usize) -> Result<u64, DecodeError> {
        let bytes = self.need(code, offset, width)?;
        let mut value: u64 = 0;
        match self.endian {
            Endianness::Little => {
                for (i, b) in bytes.iter().enumerate() {
                    value |= (*b as u64) << (8 * i);
                }
            }
            Endianness::Big => {
                for b in bytes {
                    value = (value << 8) | *b as u64;
                }
            }
        }
        Ok(value)
    }

    pub fn read16(&self, offset: usize) -> Result<u16, DecodeError> {
        self.read_uint(16, offset, 2).map(|v| v as u16)
    }

    pub fn read32(&self, offset: usize) -> Result<u32, DecodeError> {
        self.read_uint(32, offset, 4).map(|v| v as u32)
    }

    pub fn read48(&self, offset: usize) -> Result<u64, DecodeError> {
        self.read_uint(48, offset, 6)
    }

    pub fn read56(&self, offset: usize) -> Result<u64, DecodeError> {
        self.read_uint(56, offset, 7)
    }

    pub fn read64(&self, offset: usize) -> Result<u64, DecodeError> {
        self.read_uint(64, offset, 8)
    }

    /// 48-bit encoded SCN: low 32 bits then high 16 bits, each read with the
    /// reader's endianness, concatenated into one 64-bit `Scn`.
    pub fn read_scn(&self, offset: usize) -> Result<Scn, DecodeError> {
        let base = self.read32(offset)?;
        let wrap = self.read16(offset + 4)?;
        Ok(Scn::new(((wrap as u64) << 32) | base as u64))
    }

    /// Compressed 48-bit SCN form used by certain KTB/KDLI fields: a single
    /// 6-byte little/big-endian integer rather than the split 4+2 layout
    /// `read_scn` uses.
    pub fn read_scn_r(&self, offset: usize) -> Result<Scn, DecodeError> {
        self.read48(offset).map(Scn::new)
    }

    pub fn read_sub_scn(&self, offset: usize) -> Result<SubScn, DecodeError> {
        self.read16(offset).map(SubScn::from)
    }

    pub fn read_xid(&self, offset: usize) -> Result<Xid, DecodeError> {
        let usn = self.read16(offset)?;
        let slt = self.read16(offset + 2)?;
        let sqn = self.read32(offset + 4)?;
        Ok(Xid::new(usn, slt, sqn))
    }

    pub fn read_uba(&self, offset: usize) -> Result<Uba, DecodeError> {
        self.read56(offset).map(Uba::from_raw)
    }

    pub fn read_bytes(&self, code: u32, offset: usize, width: usize) -> Result<&'a [u8], DecodeError> {
        self.need(code, offset, width)
    }

    pub fn slice_from(&self, offset: usize) -> &'a [u8] {
        self.buf.get(offset..).unwrap_or(&[])
    }
}
