//! `RedoLogRecord`: the normalized, decoded form of one change, populated
//! incrementally by opcode handlers and then copied into a transaction's
//! arena (§3).
//!
//! The upstream source reinterprets this struct's raw bytes with `memcpy`,
//! relying on implementation-defined layout (flagged in SPEC_FULL.md §9 as a
//! dubious pattern to port faithfully). This crate instead defines every
//! field explicitly and lets `Clone`/`Copy` do the copying — there is no
//! byte-for-byte layout to preserve because nothing downstream reads this
//! struct as raw bytes.

use bytes::Bytes;

use crate::record::OpCode;
use crate::types::{Dba, LobId, Scn, TypeDataObj, TypeObj, Uba, Xid};

bitflags::bitflags! {
    /// Row flags (`fb`), §4.5: `{K,C,H,D,F,L,P,N}`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RowFlags: u8 {
        const CLUSTER_KEY   = 0b0000_0001;
        const CLUSTERED     = 0b0000_0010;
        const HEAD          = 0b0000_0100;
        const DELETED       = 0b0000_1000;
        const FIRST         = 0b0001_0000;
        const LAST          = 0b0010_0000;
        const KEYS_PRESENT  = 0b0100_0000;
        const NONE_KEY      = 0b1000_0000;
    }
}

/// KDO table-layer op codes, selected by `op & 0x1F` (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdoOp {
    Irp,
    Drp,
    Lkr,
    Urp,
    Orp,
    Cfa,
    Skl,
    Qmi,
    Qmd,
    Cki,
    Dsc,
    Lmn,
    Llb,
    Shk,
    Cmp,
    Dcu,
    Mrk,
}

impl KdoOp {
    pub fn from_raw(op: u8) -> Option<Self> {
        Some(match op & 0x1F {
            1 => KdoOp::Irp,
            2 => KdoOp::Drp,
            3 => KdoOp::Lkr,
            4 => KdoOp::Urp,
            5 => KdoOp::Orp,
            6 => KdoOp::Cfa,
            7 => KdoOp::Skl,
            8 => KdoOp::Qmi,
            9 => KdoOp::Qmd,
            10 => KdoOp::Cki,
            11 => KdoOp::Dsc,
            12 => KdoOp::Lmn,
            13 => KdoOp::Llb,
            14 => KdoOp::Shk,
            15 => KdoOp::Cmp,
            16 => KdoOp::Dcu,
            17 => KdoOp::Mrk,
            _ => return None,
        })
    }
}

/// The ITL (interested-transaction list) envelope every layer 10/11 vector
/// carries in front of its payload (§4.5 "KTB Redo envelope").
#[derive(Debug, Clone, Copy)]
pub enum KtbRedo {
    /// `F`: owning xid of a fresh ITL slot.
    Find { xid: Xid },
    /// `L`: one ITL entry.
    Lock { xid: Xid, uba: Uba, flags: u8, scn: Scn },
    /// `R`: enumerates existing ITL entries; count only, entries are parsed
    /// by the caller from the remaining field bytes.
    Reenter { count: u8 },
    /// `C`: commit cleanout, carries only the undo pointer.
    Cleanout { uba: Uba },
    /// No-op/zero envelope.
    None,
}

#[derive(Debug, Clone, Default)]
pub struct RedoLogRecord {
    pub opcode: Option<OpCode>,
    pub obj: Option<TypeObj>,
    pub data_obj: Option<TypeDataObj>,
    pub xid: Option<Xid>,
    pub bdba: Option<Dba>,
    pub slot: Option<u16>,
    pub fb: RowFlags,
    pub cc: u16,
    pub nulls_offset: Option<usize>,
    pub row_data_field_start: Option<usize>,
    pub hrid: Option<(Dba, u16)>,
    pub nrid: Option<(Dba, u16)>,
    pub lob_id: Option<LobId>,
    pub lob_page_no: Option<u32>,
    pub lob_data: Option<Bytes>,
    pub suplog_offsets: Vec<usize>,
    pub ktb: Option<KtbRedoSnapshot>,
}

impl Default for RowFlags {
    fn default() -> Self {
        RowFlags::empty()
    }
}

/// Owned snapshot of a decoded `KtbRedo`, kept separate from the enum above
/// so `RedoLogRecord` can stay `Clone` without re-deriving it for `KtbRedo`
/// (which intentionally borrows nothing and is cheap to copy already, but
/// keeping the two separate documents that the envelope is parsed once and
/// then recorded, not re-decoded per field access).
pub type KtbRedoSnapshot = KtbRedo;

impl RedoLogRecord {
    pub fn new() -> Self {
        Self::default()
    }
}
