//! Synthetic redo log byte builders shared by the integration tests in this
//! directory. A thin, `pub`-everywhere mirror of `src/test_support.rs` —
//! that module is `#[cfg(test)]`-gated and invisible outside the crate, so
//! integration tests (their own separate binaries) need their own copy.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use oralog_core::block::{BlockStream, FileBlockSource, FileHeader};
use oralog_core::checkpoint::{CheckpointCoordinator, FsStateStore};
use oralog_core::config::Config;
use oralog_core::emitter::NullEmitter;
use oralog_core::io::{Endianness, FileExt, Io, StdIo};
use oralog_core::lwn::ChunkPool;
use oralog_core::pipeline::{Pipeline, RunOutcome};
use oralog_core::record::RecordVersion;
use oralog_core::schema::{SchemaSnapshot, SchemaView};
use oralog_core::types::{Scn, Xid};

pub const BLOCK_SIZE: u32 = 512;

/// A config builder already set to the `Pre12_1` record shape every builder
/// in this module writes (24-byte record header, 16-byte vector envelope).
/// Start here rather than `Config::builder()` directly.
pub fn base_config() -> oralog_core::config::ConfigBuilder {
    Config::builder().record_version(RecordVersion::Pre12_1)
}

pub fn put16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

pub fn put32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn round_up_4(n: usize) -> usize {
    (n + 3) & !3
}

/// Block 1's header, padded out to `BLOCK_SIZE`.
pub fn file_header_bytes(seq: u32, resetlogs: u32, first_scn: u64, next_scn: u64) -> Vec<u8> {
    let header = FileHeader {
        endian: Endianness::Little,
        block_size: BLOCK_SIZE,
        seq,
        resetlogs,
        activation: 1,
        first_scn: Scn::new(first_scn),
        next_scn: Scn::new(next_scn),
    };
    let mut bytes = header.encode();
    bytes.resize(BLOCK_SIZE as usize, 0);
    bytes
}

/// One LWN group header plus its records, concatenated.
pub fn lwn_group_bytes(scn: u64, lwn_num: u32, lwn_max: u32, records: &[Vec<u8>]) -> Vec<u8> {
    let lwn_len: usize = records.iter().map(|r| r.len()).sum();
    let mut header = vec![0u8; 68];
    header[0..4].copy_from_slice(b"LWN1");
    header[4..10].copy_from_slice(&scn.to_le_bytes()[0..6]);
    put32(&mut header, 16, lwn_num);
    put32(&mut header, 20, lwn_max);
    put32(&mut header, 24, lwn_len as u32);
    header[28] = 0x04; // vld: full-header bit
    let mut out = header;
    for r in records {
        out.extend_from_slice(r);
    }
    out
}

/// A single-part LWN group: `lwn_num == lwn_max == 1`.
pub fn lwn_group(scn: u64, records: &[Vec<u8>]) -> Vec<u8> {
    lwn_group_bytes(scn, 1, 1, records)
}

pub fn build_record(scn: u64, vectors: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = vec![0u8; 24];
    for v in vectors {
        buf.extend_from_slice(v);
    }
    let size = buf.len() as u32;
    put32(&mut buf, 0, size);
    buf[8..12].copy_from_slice(&scn.to_le_bytes()[0..4]);
    buf
}

pub fn build_vector(layer: u8, sub: u8, dba: u32, fields: &[&[u8]]) -> Vec<u8> {
    let envelope_size = 16;
    let field_count = fields.len();
    let mut buf = vec![0u8; envelope_size];
    buf[0] = layer;
    buf[1] = sub;
    put32(&mut buf, 6, dba);
    put16(&mut buf, envelope_size, ((field_count + 1) * 2) as u16);
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

pub fn begin_vector(xid: Xid) -> Vec<u8> {
    let mut f0 = vec![0u8; 8];
    put16(&mut f0, 0, xid.usn);
    put16(&mut f0, 2, xid.slt);
    put32(&mut f0, 4, xid.sqn);
    build_vector(5, 2, 0, &[&f0])
}

/// `flags` mirrors `CommitFlags` raw bits; `0x0002` is a rollback.
pub fn commit_vector(flags: u16) -> Vec<u8> {
    let mut f0 = vec![0u8; 2];
    put16(&mut f0, 0, flags);
    build_vector(5, 4, 0, &[&f0])
}

/// A `5.1` undo record header. `flags` mirrors `UndoFlags` raw bits
/// (`0x0001` head, `0x0002` mid, `0x0004` tail of a multi-block undo).
pub fn undo_header_vector(obj: u32, data_obj: u32, flags: u16) -> Vec<u8> {
    let mut f0 = vec![0u8; 10];
    put32(&mut f0, 0, obj);
    put32(&mut f0, 4, data_obj);
    put16(&mut f0, 8, flags);
    build_vector(5, 1, 0, &[&f0, &[]])
}

/// An `11.x` row-change vector. `kdo_op` is the raw `KdoOp` byte (1 insert,
/// 2 delete, 4 update). `fb` should include `FIRST|LAST` (`0x30`) for a
/// single-piece row with no head/tail row-id fields.
pub fn row_change_vector(dba: u32, kdo_op: u8, fb: u8, cc: u16, slot: u16) -> Vec<u8> {
    let ktb: [u8; 0] = [];
    let mut prelude = vec![kdo_op, fb, 0, 0, 0, 0];
    put16(&mut prelude, 2, cc);
    put16(&mut prelude, 4, slot);
    build_vector(11, 2, dba, &[&ktb, &prelude])
}

/// An unregistered opcode; `OpDispatcher::dispatch` surfaces this as
/// `DecodeError::UnknownOpcode`.
pub fn unknown_opcode_vector() -> Vec<u8> {
    build_vector(99, 9, 0, &[&[0u8; 4]])
}

/// Splits a flat byte stream into `BLOCK_SIZE`-aligned blocks, zero-padding
/// the final one.
pub fn into_blocks(bytes: &[u8]) -> Vec<u8> {
    let mut bytes = bytes.to_vec();
    let rem = bytes.len() % BLOCK_SIZE as usize;
    if rem != 0 {
        bytes.resize(bytes.len() + (BLOCK_SIZE as usize - rem), 0);
    }
    bytes
}

/// Writes `bytes` (already block-aligned) to `path` via the crate's own
/// `Io`/`FileExt` seam, the same path production code writes through.
pub fn write_log_file(path: &std::path::Path, bytes: &[u8]) {
    let io = StdIo::default();
    let file = io.open(true, false, true, path).unwrap();
    file.write_all_at(bytes, 0).unwrap();
}

pub fn open_block_source(path: &std::path::Path) -> FileBlockSource<<StdIo as Io>::File> {
    let io = StdIo::default();
    let file = io.open(false, true, false, path).unwrap();
    FileBlockSource::new(file)
}

pub fn fresh_checkpoint_coordinator(dir: &std::path::Path, interval: u32, resetlogs: u32) -> CheckpointCoordinator<FsStateStore<StdIo>> {
    let store = FsStateStore::new(StdIo::default(), dir).unwrap();
    CheckpointCoordinator::new(store, interval, resetlogs, 1)
}

/// Runs a whole pipeline over `log_path`, persisting/resuming checkpoints
/// through `checkpoint_dir`, and returns the emitter's recorded output
/// along with why the run stopped.
pub fn run_pipeline(log_path: &std::path::Path, checkpoint_dir: &std::path::Path, config: Config, resetlogs: u32, checkpoint_interval: u32) -> (NullEmitter, RunOutcome) {
    let source = open_block_source(log_path);
    let stream = BlockStream::open(source).unwrap();
    let pool = ChunkPool::new(config.lwn_chunk_size);
    let checkpoint = fresh_checkpoint_coordinator(checkpoint_dir, checkpoint_interval, resetlogs);
    let schema = SchemaView::new(SchemaSnapshot::new());
    let emitter = NullEmitter::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut pipeline = Pipeline::new(&config, &pool, stream, schema, checkpoint, emitter, shutdown).unwrap();
    let outcome = pipeline.run().unwrap();
    (pipeline.into_emitter(), outcome)
}
