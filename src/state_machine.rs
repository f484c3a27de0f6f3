//! Vector pairing: turns one record's sequence of decoded vectors into the
//! instructions `TxBuffer` applies (§4.6).

use tracing::warn;

use crate::error::DecodeError;
use crate::io::Endianness;
use crate::opcodes::layer11::TableRowChange;
use crate::opcodes::layer19::DirectLobWrite;
use crate::opcodes::layer24::DdlMarker;
use crate::opcodes::layer26::KdliVector;
use crate::opcodes::layer5::{self, BeginTransaction, CommitOrRollback, SessionInfo, UndoRecordHeader};
use crate::opcodes::layer10::IndexKeyVector;
use crate::opcodes::{Decoded, OpDispatcher};
use crate::record::{ChangeVector, OpCode};
use crate::redo_record::KtbRedo;
use crate::types::{Dba, Xid};

/// One unit of work handed to `TxBuffer` after a record's vectors have been
/// paired up (§4.6).
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Rule 2/8: a `5.1` with no companion in this record (multi-block undo
    /// pieces, or two consecutive `5.1`s — the first flushes standalone).
    StandaloneUndo { xid: Option<Xid>, undo: UndoRecordHeader },
    /// Rule 1: `5.1` immediately followed by its data vector.
    Paired { xid: Option<Xid>, undo: UndoRecordHeader, dba: Dba, data: Box<Decoded> },
    /// Rule 3: `5.6`/`5.11` following an `11.x` rolls back the last op.
    RollbackLastOp { xid_hint: Option<(u16, u16)> },
    /// Rule 4.
    Begin { xid: Xid, begin: BeginTransaction },
    /// Rule 5.
    Commit { xid_hint: Option<(u16, u16)>, commit: CommitOrRollback },
    /// Rule 6: direct-path LOB write.
    DirectLob { write: DirectLobWrite },
    Kdli { vector: KdliVector },
    /// Rule 7: DDL, subject to schema-filter gating by the caller.
    Ddl { marker: DdlMarker },
    SessionInfo { info: SessionInfo },
    /// A `10.x` vector not consumed as a `5.1` companion — still inspected
    /// for a LOB-id mapping (§4.8).
    IndexKey { key: IndexKeyVector },
    /// An `11.x` vector not consumed as a `5.1` companion (pure redo-apply,
    /// no undo piece in this record).
    TableRowChange { dba: Dba, change: TableRowChange },
}

fn ktb_xid(ktb: &KtbRedo) -> Option<Xid> {
    match ktb {
        KtbRedo::Find { xid } | KtbRedo::Lock { xid, .. } => Some(*xid),
        _ => None,
    }
}

fn is_companion(opcode: OpCode) -> bool {
    matches!((opcode.layer, opcode.sub), (10, _) | (11, _) | (26, 2))
}

/// Processes every vector of one record in order, applying the two-slot
/// sliding-window pairing rules of §4.6.
///
/// A decoder error is fatal unless `ignore_data_errors` is set, in which
/// case it's logged and the offending vector is dropped while the rest of
/// the record (and the transaction it belongs to) keeps going (§7).
pub fn process_record(vectors: &[ChangeVector], endian: Endianness, ignore_data_errors: bool) -> Result<Vec<Instruction>, DecodeError> {
    let dispatcher = OpDispatcher::new(endian);
    let mut instructions = Vec::with_capacity(vectors.len());
    let mut i = 0;
    while i < vectors.len() {
        let v = &vectors[i];
        let opcode = v.header.opcode;
        let flg = v.header.flg_record.unwrap_or(0);

        if opcode.layer == 5 && opcode.sub == 1 {
            let undo = match UndoRecordHeader::decode(v, endian) {
                Ok(undo) => undo,
                Err(e) if ignore_data_errors => {
                    warn!(error = %e, opcode = %opcode, "skipping 5.1 vector with decode error");
                    i += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let xid = layer5::decode_ktb_from(v, undo.ktb_field_index, endian, flg).ok().as_ref().and_then(ktb_xid);

            let next_is_companion = vectors.get(i + 1).map(|n| is_companion(n.header.opcode)).unwrap_or(false);
            let next_is_undo = vectors.get(i + 1).map(|n| n.header.opcode.layer == 5 && n.header.opcode.sub == 1).unwrap_or(false);

            if next_is_companion {
                let dba = vectors[i + 1].header.dba;
                match dispatcher.dispatch(&vectors[i + 1]) {
                    Ok(data) => {
                        instructions.push(Instruction::Paired { xid, undo, dba, data: Box::new(data) });
                        i += 2;
                        continue;
                    }
                    Err(e) if ignore_data_errors => {
                        warn!(error = %e, opcode = %vectors[i + 1].header.opcode, "skipping undo companion vector with decode error");
                        // The undo piece itself decoded fine; flush it
                        // standalone rather than losing it along with its
                        // broken companion.
                        instructions.push(Instruction::StandaloneUndo { xid, undo });
                        i += 2;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            // Rule 2 (multi-block piece) and rule 8 (two consecutive 5.1s)
            // both flush this 5.1 standalone; `next_is_undo` only documents
            // which rule applied, the action is identical either way.
            let _ = next_is_undo;
            instructions.push(Instruction::StandaloneUndo { xid, undo });
            i += 1;
            continue;
        }

        match dispatcher.dispatch(v) {
            Ok(decoded) => match decoded {
                Decoded::BeginTransaction(begin) => instructions.push(Instruction::Begin { xid: begin.xid, begin }),
                Decoded::CommitOrRollback(commit) => instructions.push(Instruction::Commit { xid_hint: None, commit }),
                Decoded::PartialRollback => instructions.push(Instruction::RollbackLastOp { xid_hint: None }),
                Decoded::TxTableExtension(_ext) => {
                    instructions.push(Instruction::RollbackLastOp { xid_hint: None });
                }
                Decoded::SessionInfo(info) => instructions.push(Instruction::SessionInfo { info }),
                Decoded::DirectLobWrite(write) => instructions.push(Instruction::DirectLob { write }),
                Decoded::Kdli(vector) if opcode.sub == 6 => instructions.push(Instruction::Kdli { vector }),
                Decoded::Kdli(_) => {}
                Decoded::DdlMarker(marker) => instructions.push(Instruction::Ddl { marker }),
                Decoded::IndexKey(key) => instructions.push(Instruction::IndexKey { key }),
                Decoded::TableRowChange(change) => instructions.push(Instruction::TableRowChange { dba: v.header.dba, change }),
                Decoded::UndoRecordHeader(_) => unreachable!("5.1 handled above"),
            },
            Err(e) if ignore_data_errors => {
                warn!(error = %e, opcode = %opcode, "skipping vector with decode error");
            }
            Err(e) => return Err(e),
        }
        i += 1;
    }
    Ok(instructions)
}
