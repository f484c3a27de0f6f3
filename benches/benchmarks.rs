use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use oralog_core::block::{BlockStream, FileBlockSource, FileHeader};
use oralog_core::checkpoint::{CheckpointCoordinator, FsStateStore};
use oralog_core::config::Config;
use oralog_core::emitter::NullEmitter;
use oralog_core::io::{Endianness, FileExt, Io, StdIo};
use oralog_core::lwn::ChunkPool;
use oralog_core::pipeline::Pipeline;
use oralog_core::record::RecordVersion;
use oralog_core::schema::{SchemaSnapshot, SchemaView};
use oralog_core::types::Scn;

const BLOCK_SIZE: u32 = 512;

fn put16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn put32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn round_up_4(n: usize) -> usize {
    (n + 3) & !3
}

fn build_vector(layer: u8, sub: u8, fields: &[&[u8]]) -> Vec<u8> {
    let envelope_size = 16;
    let field_count = fields.len();
    let mut buf = vec![0u8; envelope_size];
    buf[0] = layer;
    buf[1] = sub;
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

fn build_record(scn: u64, vectors: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = vec![0u8; 24];
    for v in vectors {
        buf.extend_from_slice(v);
    }
    let size = buf.len() as u32;
    put32(&mut buf, 0, size);
    buf[8..12].copy_from_slice(&scn.to_le_bytes()[0..4]);
    buf
}

fn begin_record(scn: u64, usn: u16, slt: u16, sqn: u32) -> Vec<u8> {
    let mut f0 = vec![0u8; 8];
    put16(&mut f0, 0, usn);
    put16(&mut f0, 2, slt);
    put32(&mut f0, 4, sqn);
    build_record(scn, &[build_vector(5, 2, &[&f0])])
}

fn row_record(scn: u64, dba: u32, slot: u16) -> Vec<u8> {
    let undo = {
        let mut f0 = vec![0u8; 10];
        put32(&mut f0, 0, 7);
        put32(&mut f0, 4, 7);
        build_vector(5, 1, &[&f0, &[]])
    };
    let row = {
        let ktb: [u8; 0] = [];
        let mut prelude = vec![1u8, 0x30, 0, 0, 0, 0];
        put16(&mut prelude, 2, 3);
        put16(&mut prelude, 4, slot);
        let mut v = build_vector(11, 2, &[&ktb, &prelude]);
        // patch in the row's dba (field table layout leaves the envelope's
        // dba at byte 6, same offset `test_support::build_vector` patches).
        put32(&mut v, 6, dba);
        v
    };
    build_record(scn, &[undo, row])
}

fn commit_record(scn: u64) -> Vec<u8> {
    let f0 = vec![0u8; 2];
    build_record(scn, &[build_vector(5, 4, &[&f0])])
}

/// A single-part LWN group (`lwn_num == lwn_max == 1`); every synthetic
/// transaction below gets its own complete group.
fn lwn_group_bytes(scn: u64, records: &[Vec<u8>]) -> Vec<u8> {
    let lwn_len: usize = records.iter().map(|r| r.len()).sum();
    let mut header = vec![0u8; 68];
    header[0..4].copy_from_slice(b"LWN1");
    header[4..10].copy_from_slice(&scn.to_le_bytes()[0..6]);
    put32(&mut header, 16, 1);
    put32(&mut header, 20, 1);
    put32(&mut header, 24, lwn_len as u32);
    header[28] = 0x04; // vld: full-header bit
    let mut out = header;
    for r in records {
        out.extend_from_slice(r);
    }
    out
}

/// Writes a synthetic log with `txn_count` single-row transactions, one LWN
/// group per transaction, and returns its path.
fn write_synthetic_log(io: &StdIo, path: &std::path::Path, txn_count: u32) {
    let header = FileHeader {
        endian: Endianness::Little,
        block_size: BLOCK_SIZE,
        seq: 1,
        resetlogs: 1,
        activation: 1,
        first_scn: Scn::new(1),
        next_scn: Scn::ZERO,
    };
    let mut bytes = header.encode();
    bytes.resize(BLOCK_SIZE as usize, 0);

    for i in 0..txn_count {
        let scn = 100 + i as u64;
        let records = vec![begin_record(scn, 1, (i % 64) as u16, i), row_record(scn, 1000 + i, 0), commit_record(scn)];
        let group = lwn_group_bytes(scn, &records);
        bytes.extend_from_slice(&group);
    }
    // Pad to a whole number of blocks so `BlockStream` never sees a short read.
    let rem = bytes.len() % BLOCK_SIZE as usize;
    if rem != 0 {
        bytes.resize(bytes.len() + (BLOCK_SIZE as usize - rem), 0);
    }

    let file = io.open(true, false, true, path).unwrap();
    file.write_all_at(&bytes, 0).unwrap();
}

fn run_pipeline_over(path: &std::path::Path) {
    let io = StdIo::default();
    let file = io.open(false, true, false, path).unwrap();
    let source = FileBlockSource::new(file);
    let stream = BlockStream::open(source).unwrap();

    let config = Config::builder().record_version(RecordVersion::Pre12_1).build().unwrap();
    let pool = ChunkPool::new(config.lwn_chunk_size);
    let state_dir = tempfile::tempdir().unwrap();
    let store = FsStateStore::new(StdIo::default(), state_dir.path()).unwrap();
    let checkpoint = CheckpointCoordinator::new(store, 0, 1, 1);
    let schema = SchemaView::new(SchemaSnapshot::new());
    let emitter = NullEmitter::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut pipeline = Pipeline::new(&config, &pool, stream, schema, checkpoint, emitter, shutdown).unwrap();
    pipeline.run().unwrap();
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let io = StdIo::default();

    let small = dir.path().join("small.log");
    write_synthetic_log(&io, &small, 200);
    c.bench_function("pipeline: 200 single-row transactions", |b| {
        b.iter(|| run_pipeline_over(&small));
    });

    let large = dir.path().join("large.log");
    write_synthetic_log(&io, &large, 5_000);
    c.bench_function("pipeline: 5000 single-row transactions", |b| {
        b.iter(|| run_pipeline_over(&large));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
