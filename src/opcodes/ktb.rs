//! KTB redo envelope (§4.5), the ITL header fronting every layer 10/11
//! payload.

use crate::error::DecodeError;
use crate::io::{BinaryReader, Endianness};
use crate::redo_record::KtbRedo;
use crate::types::{Uba, Xid};

const FLG_WIDE_START: u16 = 0x08;

/// Decodes the KTB envelope from the front of a field's bytes. Returns the
/// envelope and the number of bytes it consumed, so the caller can continue
/// parsing the rest of the field as the op-specific payload.
pub fn decode(buf: &[u8], endian: Endianness, flg: u16) -> Result<(KtbRedo, usize), DecodeError> {
    if buf.is_empty() {
        return Ok((KtbRedo::None, 0));
    }
    let start = if flg & FLG_WIDE_START != 0 { 8 } else { 4 };
    let op = buf[0];
    let r = BinaryReader::new(buf, endian);
    match op {
        b'F' => {
            let xid = r.read_xid(start)?;
            Ok((KtbRedo::Find { xid }, start + 8))
        }
        b'L' => {
            let xid = r.read_xid(start)?;
            let uba = r.read_uba(start + 8)?;
            let flags = *buf.get(start + 15).unwrap_or(&0);
            let scn = r.read_scn_r(start + 16)?;
            Ok((KtbRedo::Lock { xid, uba, flags, scn }, start + 22))
        }
        b'R' => {
            let count = *buf.get(start).unwrap_or(&0);
            Ok((KtbRedo::Reenter { count }, start + 1))
        }
        b'C' => {
            let uba = r.read_uba(start)?;
            Ok((KtbRedo::Cleanout { uba }, start + 7))
        }
        b'Z' | b'N' => Ok((KtbRedo::None, start)),
        _ => Ok((KtbRedo::None, start)),
    }
}
