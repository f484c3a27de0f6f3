//! Single dispatch point from `(layer, sub)` to a decoded payload (§4.5).
//! Unregistered opcodes surface as `DecodeError::UnknownOpcode`, subject to
//! the same fatal/`IGNORE_DATA_ERRORS` policy as any other decode error.

use crate::error::DecodeError;
use crate::io::Endianness;
use crate::record::ChangeVector;

use super::layer10::IndexKeyVector;
use super::layer11::TableRowChange;
use super::layer19::DirectLobWrite;
use super::layer24::DdlMarker;
use super::layer26::KdliVector;
use super::layer5::{BeginTransaction, CommitOrRollback, SessionInfo, TxTableExtension, UndoRecordHeader};

/// One decoded opcode payload, tagged by which handler produced it.
#[derive(Debug, Clone)]
pub enum Decoded {
    UndoRecordHeader(UndoRecordHeader),
    BeginTransaction(BeginTransaction),
    CommitOrRollback(CommitOrRollback),
    PartialRollback,
    TxTableExtension(TxTableExtension),
    SessionInfo(SessionInfo),
    IndexKey(IndexKeyVector),
    TableRowChange(TableRowChange),
    DirectLobWrite(DirectLobWrite),
    DdlMarker(DdlMarker),
    Kdli(KdliVector),
}

pub struct OpDispatcher {
    endian: Endianness,
}

impl OpDispatcher {
    pub fn new(endian: Endianness) -> Self {
        Self { endian }
    }

    pub fn dispatch(&self, v: &ChangeVector) -> Result<Decoded, DecodeError> {
        let flg = v.header.flg_record.unwrap_or(0);
        match (v.header.opcode.layer, v.header.opcode.sub) {
            (5, 1) => UndoRecordHeader::decode(v, self.endian).map(Decoded::UndoRecordHeader),
            (5, 2) => BeginTransaction::decode(v, self.endian).map(Decoded::BeginTransaction),
            (5, 4) => CommitOrRollback::decode(v, self.endian).map(Decoded::CommitOrRollback),
            (5, 6) => Ok(Decoded::PartialRollback),
            (5, 11) => TxTableExtension::decode(v, self.endian).map(Decoded::TxTableExtension),
            (5, 19) | (5, 20) => Ok(Decoded::SessionInfo(SessionInfo::decode(v))),
            (10, 2) | (10, 8) | (10, 18) => IndexKeyVector::decode(v, self.endian).map(Decoded::IndexKey),
            (11, _) => TableRowChange::decode(v, self.endian, flg).map(Decoded::TableRowChange),
            (19, 1) => DirectLobWrite::decode(v, self.endian).map(Decoded::DirectLobWrite),
            (24, 1) => DdlMarker::decode(v, self.endian).map(Decoded::DdlMarker),
            (26, 2) | (26, 6) => KdliVector::decode(v, self.endian).map(Decoded::Kdli),
            (layer, sub) => Err(DecodeError::UnknownOpcode { layer, sub }),
        }
    }
}
