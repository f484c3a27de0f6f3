//! Layer 5: transaction control vectors (§4.5).

use crate::error::DecodeError;
use crate::io::{BinaryReader, Endianness};
use crate::record::ChangeVector;
use crate::types::{TypeDataObj, TypeObj, Xid};

use super::ktb;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommitFlags: u16 {
        const ROLLBACK_OP0504 = 0x0002;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UndoFlags: u16 {
        const MULTIBLOCKUNDOHEAD = 0x0001;
        const MULTIBLOCKUNDOMID  = 0x0002;
        const MULTIBLOCKUNDOTAIL = 0x0004;
    }
}

/// `5.1` undo record header.
#[derive(Debug, Clone)]
pub struct UndoRecordHeader {
    pub obj: TypeObj,
    pub data_obj: TypeDataObj,
    pub flags: UndoFlags,
    pub ktb_field_index: usize,
}

impl UndoRecordHeader {
    pub fn decode(v: &ChangeVector, endian: Endianness) -> Result<Self, DecodeError> {
        let f0 = v.next_field(0, 0x501)?;
        let r = BinaryReader::new(f0, endian);
        let obj = TypeObj::from(r.read32(0)?);
        let data_obj = TypeDataObj::from(r.read32(4)?);
        let flags = UndoFlags::from_bits_truncate(r.read16(8)?);
        Ok(Self { obj, data_obj, flags, ktb_field_index: 1 })
    }

    pub fn is_multiblock_continuation(&self) -> bool {
        self.flags.intersects(UndoFlags::MULTIBLOCKUNDOMID | UndoFlags::MULTIBLOCKUNDOTAIL)
    }
}

/// `5.2` begin transaction (`ktudh`).
#[derive(Debug, Clone)]
pub struct BeginTransaction {
    pub xid: Xid,
    pub pdb_id: Option<u32>,
}

impl BeginTransaction {
    pub fn decode(v: &ChangeVector, endian: Endianness) -> Result<Self, DecodeError> {
        let f0 = v.next_field(0, 0x502)?;
        let r = BinaryReader::new(f0, endian);
        let xid = r.read_xid(0)?;
        let pdb_id = v.next_field_opt(1).and_then(|f| BinaryReader::new(f, endian).read32(0).ok());
        Ok(Self { xid, pdb_id })
    }
}

/// `5.4` commit or rollback (`ktucm` [+ `ktucf`]).
#[derive(Debug, Clone)]
pub struct CommitOrRollback {
    pub is_rollback: bool,
    pub flags: CommitFlags,
}

impl CommitOrRollback {
    pub fn decode(v: &ChangeVector, endian: Endianness) -> Result<Self, DecodeError> {
        let f0 = v.next_field(0, 0x504)?;
        let r = BinaryReader::new(f0, endian);
        let flags = CommitFlags::from_bits_truncate(r.read16(0)?);
        Ok(Self { is_rollback: flags.contains(CommitFlags::ROLLBACK_OP0504), flags })
    }
}

/// `5.6` partial rollback marker: no payload beyond identifying the vector
/// as a rollback-of-last-op signal (§4.6 rule 3).
#[derive(Debug, Clone, Copy)]
pub struct PartialRollback;

/// `5.11` transaction table extension (`ktub`).
#[derive(Debug, Clone)]
pub struct TxTableExtension {
    pub obj: TypeObj,
    pub data_obj: TypeDataObj,
}

impl TxTableExtension {
    pub fn decode(v: &ChangeVector, endian: Endianness) -> Result<Self, DecodeError> {
        let f0 = v.next_field(0, 0x511)?;
        let r = BinaryReader::new(f0, endian);
        Ok(Self { obj: TypeObj::from(r.read32(0)?), data_obj: TypeDataObj::from(r.read32(4)?) })
    }
}

/// `5.19`/`5.20` session attributes, stored on the transaction they arrive
/// on (§4.6 "attributes").
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    pub os_user_name: Option<String>,
    pub machine_name: Option<String>,
    pub client_info: Option<String>,
}

impl SessionInfo {
    pub fn decode(v: &ChangeVector) -> Self {
        let text = |i: usize| v.next_field_opt(i).map(|b| String::from_utf8_lossy(b).trim_end_matches('\0').to_string());
        Self { os_user_name: text(0), machine_name: text(1), client_info: text(2) }
    }
}

pub fn decode_ktb_from(v: &ChangeVector, field_index: usize, endian: Endianness, flg: u16) -> Result<crate::redo_record::KtbRedo, DecodeError> {
    let field = v.next_field_opt(field_index).unwrap_or(&[]);
    ktb::decode(field, endian, flg).map(|(envelope, _)| envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_flags_detect_multiblock_continuation() {
        let header = UndoRecordHeader {
            obj: TypeObj::from(1),
            data_obj: TypeDataObj::from(1),
            flags: UndoFlags::MULTIBLOCKUNDOTAIL,
            ktb_field_index: 1,
        };
        assert!(header.is_multiblock_continuation());
    }

    #[test]
    fn commit_flags_detect_rollback() {
        let flags = CommitFlags::from_bits_truncate(0x0002);
        assert!(flags.contains(CommitFlags::ROLLBACK_OP0504));
    }
}
