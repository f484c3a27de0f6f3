//! Wires every component into the control flow described in §2/§5:
//! `BlockStream` -> `LwnAssembler` -> `RecordSplitter` -> the vector-pairing
//! state machine -> `TxBuffer` -> `Emitter`, with `CheckpointCoordinator`
//! persisting resume state after each drained LWN group.
//!
//! `Pipeline` itself is the single-threaded "parser" role of §5: it owns
//! the `TxBuffer`, `LobIdToXid`, and orphan store outright, the way the
//! concurrency model requires. [`run_threaded`] is the multi-thread
//! wiring around it — a reader thread filling a bounded channel of blocks,
//! this pipeline consuming them, and an emitter thread draining committed
//! batches — built on `crossbeam`'s `channel` module rather than an async
//! runtime, matching §5's "fixed, small set of long-lived blocking threads".

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::block::{Block, BlockSource, BlockStream, NextBlock};
use crate::checkpoint::{CheckpointCoordinator, MinActive, StateStore};
use crate::config::Config;
use crate::emitter::{Emitter, OpKind, TableRef};
use crate::error::Result;
use crate::lob_ctx::{LobIdToXid, OrphanLobStore};
use crate::lwn::{ChunkPool, LwnAssembler};
use crate::record::RecordSplitter;
use crate::schema::SchemaView;
use crate::state_machine::{self, Instruction};
use crate::txbuffer::{CommitMeta, CommitOutcome, RowOpKind, TxBuffer, TxOp};
use crate::types::{RowId, Scn, Xid};

/// Blocks below this index are the file header; `LwnAssembler` must never
/// see them as LWN payload (§4.3).
const HEADER_BLOCKS: u64 = 1;

/// What stopped the pipeline from reading further (§6.4: both are control
/// flow, not errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    EndOfFile,
    /// A replacing writer rewound the file (online-log case). The caller
    /// must reopen the source and restart from the last persisted
    /// checkpoint block (§5 "ordering guarantees").
    Overwritten,
}

/// Drives one redo log file end to end. Owns every piece of state the
/// concurrency model (§5) says belongs to the single parser thread: the
/// `TxBuffer`, the LOB orphan/ownership maps, and the checkpoint counters.
pub struct Pipeline<S: BlockSource, St: StateStore, E: Emitter> {
    stream: BlockStream<S>,
    assembler: LwnAssembler,
    splitter: RecordSplitter,
    tx_buffer: TxBuffer,
    lob_id_to_xid: LobIdToXid,
    orphans: OrphanLobStore,
    schema: SchemaView,
    checkpoint: CheckpointCoordinator<St>,
    emitter: E,
    soft_shutdown: Arc<AtomicBool>,
    current_block: u64,
    /// The file's own sequence number (`FileHeader.seq`), carried into every
    /// checkpoint and into `MinActive` rather than a placeholder.
    file_seq: u32,
    /// Position at which each still-open transaction first appeared, for
    /// `min_active` (§4.9). Populated on `5.2`, cleared on commit/rollback.
    open_since: HashMap<(u16, u16), (u64, Xid)>,
    /// Downgrades data/semantic `DecodeError`s to log-and-continue (§7).
    ignore_data_errors: bool,
    /// The SCN of the checkpoint this run resumed from, if any (§4.9).
    /// Commits at or below it were already emitted by a prior run and are
    /// skipped here.
    resume_scn: Option<Scn>,
}

impl<S: BlockSource, St: StateStore, E: Emitter> Pipeline<S, St, E> {
    /// Builds the pipeline and resumes it from the last persisted checkpoint,
    /// if one exists. Fails only if that checkpoint's `resetlogs` doesn't
    /// match the file about to be read (§4.9), which is fatal: a mismatched
    /// checkpoint belongs to a different incarnation of the log.
    pub fn new(
        config: &Config,
        pool: &ChunkPool,
        stream: BlockStream<S>,
        schema: SchemaView,
        checkpoint: CheckpointCoordinator<St>,
        emitter: E,
        soft_shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let endian = stream.endian();
        let header = stream.header();
        let file_seq = header.seq;
        let resume = checkpoint.resume(config.max_checkpoint_size, header.resetlogs)?;
        let resume_scn = resume.map(|payload| Scn::new(payload.scn));
        Ok(Self {
            assembler: LwnAssembler::new(pool, endian, HEADER_BLOCKS, header.first_scn, header.next_scn),
            splitter: RecordSplitter::new(endian, config.record_version),
            tx_buffer: TxBuffer::new(config.clone()),
            lob_id_to_xid: LobIdToXid::new(),
            orphans: OrphanLobStore::new(config.lob_orphan_cap),
            schema,
            checkpoint,
            emitter,
            soft_shutdown,
            current_block: 0,
            file_seq,
            open_since: HashMap::new(),
            ignore_data_errors: config.ignore_data_errors,
            resume_scn,
            stream,
        })
    }

    /// Consumes the pipeline and returns its emitter, for a caller that
    /// needs to inspect or reuse it after `run` returns.
    pub fn into_emitter(self) -> E {
        self.emitter
    }

    /// Runs until end-of-file, an overwrite is detected, or `soft_shutdown`
    /// is set. Returns which of those stopped it.
    pub fn run(&mut self) -> Result<RunOutcome> {
        loop {
            if self.soft_shutdown.load(Ordering::Relaxed) {
                self.checkpoint_now(true)?;
                return Ok(RunOutcome::EndOfFile);
            }
            match self.stream.next_block()? {
                NextBlock::Block(block) => self.on_block(block)?,
                NextBlock::EndOfFile => {
                    self.emitter.flush_and_await_durable()?;
                    return Ok(RunOutcome::EndOfFile);
                }
                NextBlock::Overwritten => return Ok(RunOutcome::Overwritten),
            }
        }
    }

    fn on_block(&mut self, block: Block) -> Result<()> {
        self.current_block = block.number;
        let drained = self.assembler.feed_block(&block)?;
        for lwn in drained {
            for record_bytes in lwn.records {
                let vectors = self.splitter.split(record_bytes)?;
                let instructions = state_machine::process_record(&vectors, self.stream.endian(), self.ignore_data_errors)?;
                self.track_begins(&instructions);
                let meta = CommitMeta { commit_scn: lwn.scn, commit_sub_scn: lwn.sub_scn, commit_timestamp: lwn.timestamp };
                let outcomes = self.tx_buffer.apply_record(instructions, meta, &self.schema, &mut self.lob_id_to_xid, &mut self.orphans);
                for outcome in outcomes {
                    self.handle_outcome(outcome)?;
                }
            }
            let min_active = self.min_active();
            self.checkpoint.maybe_checkpoint(
                self.file_seq,
                self.current_block,
                lwn.scn,
                lwn.timestamp.timestamp(),
                lwn.lwn_num,
                min_active,
                false,
            )?;
            self.emitter.on_checkpoint(lwn.scn, lwn.lwn_num, self.current_block)?;
        }
        Ok(())
    }

    fn checkpoint_now(&mut self, force: bool) -> Result<()> {
        self.emitter.flush_and_await_durable()?;
        // Without a fresh LWN group to report on, persist the last known
        // position so a shutdown never loses more than what's already
        // been drained (§4.9 "controlled shutdown").
        let min_active = self.min_active();
        self.checkpoint.maybe_checkpoint(self.file_seq, self.current_block, crate::types::Scn::ZERO, 0, 0, min_active, force)?;
        Ok(())
    }

    fn track_begins(&mut self, instructions: &[Instruction]) {
        for instr in instructions {
            if let Instruction::Begin { xid, .. } = instr {
                self.open_since.entry(xid.truncated()).or_insert((self.current_block, *xid));
            }
        }
    }

    fn min_active(&self) -> Option<MinActive> {
        self.open_since
            .values()
            .min_by_key(|(block, xid)| (*block, *xid))
            .map(|(block, xid)| MinActive { sequence: self.file_seq, file_offset_block: *block, xid: *xid })
    }

    fn handle_outcome(&mut self, outcome: CommitOutcome) -> Result<()> {
        match outcome {
            CommitOutcome::Committed(tx, meta) => {
                self.open_since.remove(&tx.key);
                // Already emitted by whichever run persisted the checkpoint
                // we resumed from (§4.9 "resume determinism").
                if self.resume_scn.is_some_and(|resume_scn| meta.commit_scn <= resume_scn) {
                    return Ok(());
                }
                let xid = tx.xid.unwrap_or(Xid::ZERO);
                let mut batch = self.emitter.begin_transaction(xid, meta.commit_scn, meta.commit_timestamp, crate::types::Seq::from(0))?;
                for op in &tx.ops {
                    match op {
                        TxOp::Row { kind, obj, bdba, slot } => {
                            // A bare lock (LKR) touches no column data; nothing to emit.
                            let Some(op_kind) = (match kind {
                                RowOpKind::Insert => Some(OpKind::Insert),
                                RowOpKind::Update => Some(OpKind::Update),
                                RowOpKind::Delete => Some(OpKind::Delete),
                                RowOpKind::Lock => None,
                            }) else {
                                continue;
                            };
                            let data_obj = obj.map(|o| o.0).unwrap_or(0);
                            let row_id = RowId::new(data_obj, *bdba, *slot);
                            let table = obj
                                .and_then(|o| self.schema.lookup_table(o))
                                .map(|t| TableRef { owner: t.owner.clone(), name: t.name.clone() })
                                .unwrap_or_else(|| TableRef { owner: String::new(), name: String::new() });
                            self.emitter.append_row(&mut batch, op_kind, None, None, row_id, &table)?;
                        }
                        TxOp::Ddl { obj } => {
                            let text = self
                                .schema
                                .lookup_table(*obj)
                                .map(|t| format!("{}.{}", t.owner, t.name))
                                .unwrap_or_else(|| format!("obj#{}", obj.0));
                            self.emitter.append_ddl(&mut batch, &text)?;
                        }
                        TxOp::LobPage { lob_id, page_no, data } => {
                            self.emitter.append_lob_page(&mut batch, *lob_id, *page_no, data)?;
                        }
                    }
                }
                // Pages resolved through `LobIdToXid` land in `lob_ctx` directly
                // (§4.8), not as `TxOp::LobPage` entries, so they're flushed here.
                for lob_id in tx.lob_ctx.lob_ids() {
                    for (page_no, data) in tx.lob_ctx.pages(lob_id) {
                        self.emitter.append_lob_page(&mut batch, lob_id, page_no, data)?;
                    }
                }
                self.emitter.finish_transaction(batch)?;
            }
            CommitOutcome::RolledBack { key } => {
                self.open_since.remove(&key);
                debug!(usn = key.0, slt = key.1, "transaction rolled back, nothing emitted");
            }
            CommitOutcome::WasSkipped { key } => {
                self.open_since.remove(&key);
                warn!(usn = key.0, slt = key.1, "transaction was skipped for exceeding transaction_size_max");
            }
            CommitOutcome::NotFound { key } => {
                self.open_since.remove(&key);
            }
        }
        Ok(())
    }
}

/// Bounded handoff between a reader thread and the parser (§5). Carries
/// whole blocks; backpressure is the channel's own bound.
pub fn spawn_reader_thread<S: BlockSource + 'static>(
    mut stream: BlockStream<S>,
    capacity: usize,
) -> (Receiver<NextBlock>, thread::JoinHandle<()>) {
    let (tx, rx): (Sender<NextBlock>, Receiver<NextBlock>) = bounded(capacity);
    let handle = thread::spawn(move || loop {
        let next = match stream.next_block() {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "reader thread stopping on error");
                break;
            }
        };
        let stop = matches!(next, NextBlock::EndOfFile | NextBlock::Overwritten);
        if tx.send(next).is_err() {
            break;
        }
        if stop {
            break;
        }
    });
    (rx, handle)
}
