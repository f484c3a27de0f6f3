//! Synthetic redo log byte builders shared by integration-style tests
//! across modules (`Pipeline` end to end, multi-block `LwnAssembler` runs).
//! Per-module unit tests still build their own narrow fixtures inline where
//! that's all they need; this module exists for the tests that need a whole
//! decodable file, header through vectors, and would otherwise have to
//! duplicate that across every call site.

use crate::block::FileHeader;
use crate::io::Endianness;
use crate::types::{Scn, Xid};

const LWN_HEADER_LEN: usize = 68;
const LWN_MAGIC: &[u8; 4] = b"LWN1";

fn put16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn put32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn round_up_4(n: usize) -> usize {
    (n + 3) & !3
}

/// Block 1's header, padded out to `block_size` (§4.2).
pub(crate) fn file_header_bytes(block_size: u32, seq: u32, resetlogs: u32, activation: u32, first_scn: u64) -> Vec<u8> {
    let header = FileHeader {
        endian: Endianness::Little,
        block_size,
        seq,
        resetlogs,
        activation,
        first_scn: Scn::new(first_scn),
        next_scn: Scn::ZERO,
    };
    let mut bytes = header.encode();
    bytes.resize(block_size as usize, 0);
    bytes
}

/// One LWN group: the 68-byte header this crate invented to bound and
/// validate a group's payload (§4.3, see DESIGN.md), followed by `records`
/// concatenated in order.
pub(crate) fn lwn_group_bytes(scn: u64, lwn_num: u32, lwn_max: u32, records: &[Vec<u8>]) -> Vec<u8> {
    let lwn_len: usize = records.iter().map(|r| r.len()).sum();
    let mut header = vec![0u8; LWN_HEADER_LEN];
    header[0..4].copy_from_slice(LWN_MAGIC);
    header[4..10].copy_from_slice(&scn.to_le_bytes()[0..6]);
    put32(&mut header, 16, lwn_num);
    put32(&mut header, 20, lwn_max);
    put32(&mut header, 24, lwn_len as u32);
    header[28] = 0x04; // vld: full-header bit (§4.3)
    let mut out = header;
    for r in records {
        out.extend_from_slice(r);
    }
    out
}

/// One `Pre12_1`-shaped record: a 24-byte header (only `size` and `scn` are
/// filled in; this crate never validates the rest, record/header.rs) plus
/// `vectors` concatenated in order.
pub(crate) fn build_record(scn: u64, vectors: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = vec![0u8; 24];
    for v in vectors {
        buf.extend_from_slice(v);
    }
    let size = buf.len() as u32;
    put32(&mut buf, 0, size);
    buf[8..12].copy_from_slice(&scn.to_le_bytes()[0..4]);
    buf
}

/// One change vector with a `Pre12_1` (16-byte) envelope: `layer`/`sub` plus
/// a padded field table (§4.4).
pub(crate) fn build_vector(layer: u8, sub: u8, dba: u32, fields: &[&[u8]]) -> Vec<u8> {
    let envelope_size = 16;
    let field_count = fields.len();
    let field_cnt_raw = ((field_count + 1) * 2) as u16;
    let mut buf = vec![0u8; envelope_size];
    buf[0] = layer;
    buf[1] = sub;
    put32(&mut buf, 6, dba);
    put16(&mut buf, envelope_size, field_cnt_raw);
    for (i, f) in fields.iter().enumerate() {
        put16(&mut buf, envelope_size + 2 + i * 2, f.len() as u16);
    }
    let table_header_len = 2 + field_count * 2;
    let pad = round_up_4(table_header_len) - table_header_len;
    buf.extend(std::iter::repeat(0).take(pad));
    for f in fields {
        buf.extend_from_slice(f);
        let padded = round_up_4(f.len());
        buf.extend(std::iter::repeat(0).take(padded - f.len()));
    }
    buf
}

/// A `5.2` begin-transaction vector carrying `xid` in its sole field.
pub(crate) fn begin_vector(xid: Xid) -> Vec<u8> {
    let mut f0 = vec![0u8; 8];
    put16(&mut f0, 0, xid.usn);
    put16(&mut f0, 2, xid.slt);
    put32(&mut f0, 4, xid.sqn);
    build_vector(5, 2, 0, &[&f0])
}

/// A `5.4` commit-or-rollback vector. `flags` mirrors `CommitFlags` raw bits
/// (§4.5); pass `0x0002` for a rollback.
pub(crate) fn commit_vector(flags: u16) -> Vec<u8> {
    let mut f0 = vec![0u8; 2];
    put16(&mut f0, 0, flags);
    build_vector(5, 4, 0, &[&f0])
}

/// A `5.1` undo record header identifying the table `obj`/`data_obj` a
/// following `11.x` row vector in the same record belongs to.
pub(crate) fn undo_header_vector(obj: u32, data_obj: u32) -> Vec<u8> {
    let mut f0 = vec![0u8; 10];
    put32(&mut f0, 0, obj);
    put32(&mut f0, 4, data_obj);
    build_vector(5, 1, 0, &[&f0, &[]])
}

/// An `11.x` row-change vector: an empty `ktb_redo` field (no ITL lock/find)
/// plus a minimal `kdo_op_code` prelude (§4.5). `kdo_op` is the raw
/// `KdoOp` byte (1 = `IRP`, insert).
pub(crate) fn row_change_vector(dba: u32, kdo_op: u8, fb: u8, cc: u16, slot: u16) -> Vec<u8> {
    let ktb: [u8; 0] = [];
    let mut prelude = vec![kdo_op, fb, 0, 0, 0, 0];
    put16(&mut prelude, 2, cc);
    put16(&mut prelude, 4, slot);
    build_vector(11, 2, dba, &[&ktb, &prelude])
}

/// Splits a flat byte stream into `block_size`-aligned blocks, zero-padding
/// the final one, the layout every `BlockSource` serves.
pub(crate) fn into_blocks(bytes: &[u8], block_size: u32) -> Vec<Vec<u8>> {
    let block_size = block_size as usize;
    let mut blocks = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + block_size).min(bytes.len());
        let mut block = bytes[offset..end].to_vec();
        block.resize(block_size, 0);
        blocks.push(block);
        offset += block_size;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::layer5::{BeginTransaction, CommitOrRollback};
    use crate::opcodes::layer11::TableRowChange;
    use crate::record::{RecordSplitter, RecordVersion};
    use bytes::Bytes;

    #[test]
    fn begin_vector_round_trips_through_the_splitter() {
        let xid = Xid::new(1, 2, 3);
        let record = build_record(10, &[begin_vector(xid)]);
        let splitter = RecordSplitter::new(Endianness::Little, RecordVersion::Pre12_1);
        let vectors = splitter.split(Bytes::from(record)).unwrap();
        assert_eq!(vectors.len(), 1);
        let begin = BeginTransaction::decode(&vectors[0], Endianness::Little).unwrap();
        assert_eq!(begin.xid, xid);
    }

    #[test]
    fn undo_and_row_change_pair_decodes_in_one_record() {
        let record = build_record(10, &[undo_header_vector(7, 7), row_change_vector(42, 1, 0, 3, 0)]);
        let splitter = RecordSplitter::new(Endianness::Little, RecordVersion::Pre12_1);
        let vectors = splitter.split(Bytes::from(record)).unwrap();
        assert_eq!(vectors.len(), 2);
        let change = TableRowChange::decode(&vectors[1], Endianness::Little, 0).unwrap();
        assert_eq!(change.cc, 3);
    }

    #[test]
    fn commit_vector_decodes_rollback_flag() {
        let record = build_record(10, &[commit_vector(0x0002)]);
        let splitter = RecordSplitter::new(Endianness::Little, RecordVersion::Pre12_1);
        let vectors = splitter.split(Bytes::from(record)).unwrap();
        let commit = CommitOrRollback::decode(&vectors[0], Endianness::Little).unwrap();
        assert!(commit.is_rollback);
    }

    #[test]
    fn into_blocks_zero_pads_the_final_block() {
        let blocks = into_blocks(&[1, 2, 3, 4, 5], 4);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1], vec![5, 0, 0, 0]);
    }
}
