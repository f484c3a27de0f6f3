//! Layer 11: table (KDO) vectors — the row-change workhorse (§4.5).

use crate::error::DecodeError;
use crate::io::{BinaryReader, Endianness};
use crate::record::ChangeVector;
use crate::redo_record::{KdoOp, RowFlags};
use crate::types::Dba;

use super::ktb;

/// `ktb_redo` prelude plus the `kdo_op_code`-selected payload common to
/// every KDO subtype (§4.5).
#[derive(Debug, Clone)]
pub struct TableRowChange {
    pub op: KdoOp,
    pub ktb: crate::redo_record::KtbRedo,
    pub fb: RowFlags,
    pub cc: u16,
    pub slot: u16,
    pub nulls_offset: usize,
    pub row_data_field_start: usize,
    pub hrid: Option<(Dba, u16)>,
    pub nrid: Option<(Dba, u16)>,
}

impl TableRowChange {
    /// `v.field(0)` is the `ktb_redo` envelope, `v.field(1)` the
    /// `kdo_op_code` prelude, `v.field(2..)` the row's own columns.
    pub fn decode(v: &ChangeVector, endian: Endianness, flg: u16) -> Result<Self, DecodeError> {
        let ktb_field = v.next_field_opt(0).unwrap_or(&[]);
        let (ktb, _) = ktb::decode(ktb_field, endian, flg)?;

        let prelude = v.next_field(1, 0x1101)?;
        let op_raw = *prelude.first().ok_or(DecodeError::TruncatedField { code: 0x1101, need: 1, have: 0 })?;
        let op = KdoOp::from_raw(op_raw).ok_or(DecodeError::UnrecognisedRowFlags(op_raw))?;

        let r = BinaryReader::new(prelude, endian);
        let fb_raw = *prelude.get(1).unwrap_or(&0);
        let fb = RowFlags::from_bits_truncate(fb_raw);
        let cc = r.read16(2)?;
        let slot = r.read16(4)?;

        let hrid = if !fb.contains(RowFlags::LAST) {
            v.next_field_opt(2).and_then(|f| decode_rid(f, endian))
        } else {
            None
        };
        let nrid = if fb.contains(RowFlags::KEYS_PRESENT) {
            v.next_field_opt(3).and_then(|f| decode_rid(f, endian))
        } else {
            None
        };

        Ok(Self {
            op,
            ktb,
            fb,
            cc,
            slot,
            nulls_offset: 0,
            row_data_field_start: if hrid.is_some() || nrid.is_some() { 4 } else { 2 },
            hrid,
            nrid,
        })
    }
}

fn decode_rid(buf: &[u8], endian: Endianness) -> Option<(Dba, u16)> {
    if buf.len() < 6 {
        return None;
    }
    let r = BinaryReader::new(buf, endian);
    let dba = Dba::from(r.read32(0).ok()?);
    let slot = r.read16(4).ok()?;
    Some((dba, slot))
}
