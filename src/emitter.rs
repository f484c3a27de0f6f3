//! `Emitter`: the sink collaborator a committed transaction is flushed to
//! (§6.2). The crate ships one reference implementation, [`NullEmitter`],
//! used by tests and as a template for a real sink (Kafka, a file, a
//! second database) a host would plug in instead.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{RowId, Scn, Seq};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    Update,
    Delete,
    Ddl,
    LobWrite,
}

/// A table reference an emitted row change or DDL statement is attributed
/// to (§6.2). Carries both ids because `obj` identifies the logical table
/// across partition exchanges while `data_obj` is what the redo stream
/// actually addresses.
#[derive(Debug, Clone)]
pub struct TableRef {
    pub owner: String,
    pub name: String,
}

/// Opaque handle to one in-flight emitted transaction. What it wraps is
/// entirely up to the `Emitter` implementation (a buffer, a prepared
/// statement, a Kafka transaction handle); the pipeline only ever passes
/// it back to the same emitter that produced it.
pub trait Batch: Send {}

/// The sink collaborator every committed transaction and DDL event is
/// flushed to (§6.2). Implementations own their own durability story;
/// `flush_and_await_durable` is the pipeline's only synchronization point
/// with it (§5: the parser thread blocks on this before advancing the
/// checkpoint).
pub trait Emitter: Send {
    type Batch: Batch;

    fn begin_transaction(&mut self, xid: crate::types::Xid, commit_scn: Scn, commit_timestamp: DateTime<Utc>, commit_seq: Seq) -> Result<Self::Batch>;

    fn append_row(
        &mut self,
        batch: &mut Self::Batch,
        op_kind: OpKind,
        before: Option<&[u8]>,
        after: Option<&[u8]>,
        row_id: RowId,
        table: &TableRef,
    ) -> Result<()>;

    fn append_lob_page(&mut self, batch: &mut Self::Batch, lob_id: crate::types::LobId, page_no: u32, bytes: &[u8]) -> Result<()>;

    fn append_ddl(&mut self, batch: &mut Self::Batch, text: &str) -> Result<()>;

    /// Closes out a transaction's batch. Not named in the collaborator
    /// pseudocode, which never shows how a `Batch` stops being appended to;
    /// added here as the natural Rust completion of `begin_transaction`
    /// (see DESIGN.md).
    fn finish_transaction(&mut self, batch: Self::Batch) -> Result<()>;

    fn flush_and_await_durable(&mut self) -> Result<()>;

    fn on_checkpoint(&mut self, lwn_scn: Scn, lwn_idx: u32, file_offset: u64) -> Result<()>;
}

/// A recording [`Emitter`] used by tests and as a minimal worked example.
/// Holds every appended event in memory; never actually "durable" beyond
/// the process.
#[derive(Debug, Default)]
pub struct NullEmitter {
    pub transactions: Vec<RecordedTransaction>,
    pub checkpoints: Vec<(Scn, u32, u64)>,
}

#[derive(Debug, Default)]
pub struct RecordedTransaction {
    pub xid: Option<crate::types::Xid>,
    pub commit_scn: Scn,
    pub rows: Vec<(OpKind, Option<Vec<u8>>, Option<Vec<u8>>, RowId)>,
    pub lob_pages: Vec<(crate::types::LobId, u32, Vec<u8>)>,
    pub ddl: Vec<String>,
}

#[derive(Debug, Default)]
pub struct NullBatch(RecordedTransaction);

impl Batch for NullBatch {}

impl NullEmitter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Emitter for NullEmitter {
    type Batch = NullBatch;

    fn begin_transaction(&mut self, xid: crate::types::Xid, commit_scn: Scn, _commit_timestamp: DateTime<Utc>, _commit_seq: Seq) -> Result<Self::Batch> {
        Ok(NullBatch(RecordedTransaction { xid: Some(xid), commit_scn, ..Default::default() }))
    }

    fn append_row(&mut self, batch: &mut Self::Batch, op_kind: OpKind, before: Option<&[u8]>, after: Option<&[u8]>, row_id: RowId, _table: &TableRef) -> Result<()> {
        batch.0.rows.push((op_kind, before.map(|b| b.to_vec()), after.map(|b| b.to_vec()), row_id));
        Ok(())
    }

    fn append_lob_page(&mut self, batch: &mut Self::Batch, lob_id: crate::types::LobId, page_no: u32, bytes: &[u8]) -> Result<()> {
        batch.0.lob_pages.push((lob_id, page_no, bytes.to_vec()));
        Ok(())
    }

    fn append_ddl(&mut self, batch: &mut Self::Batch, text: &str) -> Result<()> {
        batch.0.ddl.push(text.to_string());
        Ok(())
    }

    fn finish_transaction(&mut self, batch: Self::Batch) -> Result<()> {
        self.transactions.push(batch.0);
        Ok(())
    }

    fn flush_and_await_durable(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_checkpoint(&mut self, lwn_scn: Scn, lwn_idx: u32, file_offset: u64) -> Result<()> {
        self.checkpoints.push((lwn_scn, lwn_idx, file_offset));
        Ok(())
    }
}
