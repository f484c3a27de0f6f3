//! `TxBuffer`: applies paired/standalone instructions from the state
//! machine to in-flight transactions (§4.6, §4.7).
//!
//! Transactions are keyed by `(usn, slt)` rather than the full `Xid` —
//! undo vectors only ever address a transaction by that truncated pair,
//! and the `sqn` only becomes known once a `5.2` begin vector arrives for
//! the same slot. `Commit`/`RollbackLastOp` instructions never carry a
//! usn/slt hint in this codebase's vector-pairing output (state_machine.rs
//! always constructs them with `xid_hint: None`), so resolution falls back
//! to `last_touched`: the most recently addressed transaction, the same
//! role a cursor plays in a single-threaded parser with no concurrent
//! writers to race against.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use tracing::warn;

use crate::config::Config;
use crate::lob_ctx::{LobCtx, LobIdToXid, OrphanLobStore};
use crate::opcodes::layer5::SessionInfo;
use crate::opcodes::Decoded;
use crate::redo_record::KdoOp;
use crate::schema::{SchemaView, TableOptions};
use crate::state_machine::Instruction;
use crate::types::{Dba, LobId, Scn, SubScn, TypeObj, Xid};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOpKind {
    Insert,
    Update,
    Delete,
    Lock,
}

impl RowOpKind {
    fn from_kdo(op: KdoOp) -> Option<Self> {
        Some(match op {
            KdoOp::Irp => RowOpKind::Insert,
            KdoOp::Drp => RowOpKind::Delete,
            KdoOp::Urp | KdoOp::Cfa | KdoOp::Cki => RowOpKind::Update,
            KdoOp::Lkr => RowOpKind::Lock,
            _ => return None,
        })
    }
}

/// One buffered change inside a transaction, in commit-apply order (§4.7
/// "arena").
#[derive(Debug, Clone)]
pub enum TxOp {
    Row { kind: RowOpKind, obj: Option<TypeObj>, bdba: Dba, slot: u16 },
    Ddl { obj: TypeObj },
    LobPage { lob_id: LobId, page_no: u32, data: Bytes },
}

/// The size, in bytes, an op contributes toward `transaction_size_max`
/// (§4.7). LOB pages carry their own payload size; everything else is a
/// small fixed estimate, mirroring how the source accounts row changes by
/// struct size rather than by the row's actual encoded width.
impl TxOp {
    fn accounted_size(&self) -> u64 {
        match self {
            TxOp::Row { .. } => 64,
            TxOp::Ddl { .. } => 32,
            TxOp::LobPage { data, .. } => data.len() as u64 + 16,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub key: (u16, u16),
    pub xid: Option<Xid>,
    pub begin_seen: bool,
    pub ops: Vec<TxOp>,
    pub size_bytes: u64,
    pub session: SessionInfo,
    pub lob_ctx: LobCtx,
}

impl Transaction {
    fn new(key: (u16, u16)) -> Self {
        Self { key, ..Default::default() }
    }
}

/// What happened when a `5.4` commit/rollback vector was applied.
#[derive(Debug)]
pub enum CommitOutcome {
    /// The transaction committed; emit its buffered ops.
    Committed(Box<Transaction>, CommitMeta),
    /// A full rollback: nothing should be emitted for this xid.
    RolledBack { key: (u16, u16) },
    /// The commit referenced a transaction that had already moved to the
    /// skip list for exceeding `transaction_size_max` (§4.7).
    WasSkipped { key: (u16, u16) },
    /// The commit referenced a transaction this buffer never saw open
    /// (§7 "warn once"); surfaced so the caller can decide whether that's
    /// fatal under its error policy.
    NotFound { key: (u16, u16) },
}

pub struct TxBuffer {
    config: Config,
    transactions: HashMap<(u16, u16), Transaction>,
    skip_list: HashSet<(u16, u16)>,
    broken_warned: HashSet<(u16, u16)>,
    last_touched: Option<(u16, u16)>,
}

impl TxBuffer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transactions: HashMap::new(),
            skip_list: HashSet::new(),
            broken_warned: HashSet::new(),
            last_touched: None,
        }
    }

    pub fn open_count(&self) -> usize {
        self.transactions.len()
    }

    /// Every transaction key currently buffered, for `CheckpointCoordinator`
    /// to compute `min_active` over (§4.9).
    pub fn open_keys(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.transactions.keys().copied()
    }

    fn resolve(&self, xid_hint: Option<Xid>) -> Option<(u16, u16)> {
        xid_hint.map(Xid::truncated).or(self.last_touched)
    }

    fn get_or_create(&mut self, key: (u16, u16)) -> Option<&mut Transaction> {
        if self.skip_list.contains(&key) {
            return None;
        }
        Some(self.transactions.entry(key).or_insert_with(|| Transaction::new(key)))
    }

    pub fn begin(&mut self, xid: Xid) {
        let key = xid.truncated();
        if self.skip_list.contains(&key) {
            return;
        }
        let tx = self.transactions.entry(key).or_insert_with(|| Transaction::new(key));
        tx.xid = Some(xid);
        tx.begin_seen = true;
        self.last_touched = Some(key);
    }

    /// Appends one op to the transaction resolved from `xid_hint` (falling
    /// back to `last_touched`). Moves the transaction to the skip list, and
    /// drops its buffered ops, the moment its accounted size crosses
    /// `transaction_size_max` (§4.7).
    pub fn append(&mut self, xid_hint: Option<Xid>, op: TxOp) {
        let Some(key) = self.resolve(xid_hint) else {
            return;
        };
        let Some(tx) = self.get_or_create(key) else {
            return;
        };
        tx.size_bytes += op.accounted_size();
        tx.ops.push(op);
        self.last_touched = Some(key);
        if tx.size_bytes > self.config.transaction_size_max {
            self.transactions.remove(&key);
            self.skip_list.insert(key);
            warn!(usn = key.0, slt = key.1, "transaction exceeded transaction_size_max, skipping");
        }
    }

    /// Rule 3 (§4.6): `5.6`/`5.11` pops the last row op off the resolved
    /// transaction's tail. A DDL or LOB op at the tail, or an empty
    /// transaction, means there's nothing to roll back; that's logged, not
    /// treated as corruption.
    pub fn rollback_last(&mut self, xid_hint: Option<Xid>) {
        let Some(key) = self.resolve(xid_hint) else {
            return;
        };
        let Some(tx) = self.transactions.get_mut(&key) else {
            return;
        };
        match tx.ops.last() {
            Some(TxOp::Row { .. }) => {
                tx.ops.pop();
            }
            Some(_) => warn!(usn = key.0, slt = key.1, "rollback-last-op found a non-row tail, ignoring"),
            None => warn!(usn = key.0, slt = key.1, "rollback-last-op found an empty transaction, ignoring"),
        }
    }

    pub fn commit(
        &mut self,
        xid_hint: Option<Xid>,
        is_rollback: bool,
        meta: CommitMeta,
        lob_id_to_xid: &mut LobIdToXid,
    ) -> Option<CommitOutcome> {
        let key = self.resolve(xid_hint)?;
        if self.last_touched == Some(key) {
            self.last_touched = None;
        }
        if self.skip_list.remove(&key) {
            return Some(CommitOutcome::WasSkipped { key });
        }
        let Some(tx) = self.transactions.remove(&key) else {
            if self.broken_warned.insert(key) {
                warn!(usn = key.0, slt = key.1, "commit/rollback for unknown transaction");
            }
            return Some(CommitOutcome::NotFound { key });
        };
        if let Some(xid) = tx.xid {
            lob_id_to_xid.purge_xid(xid);
        }
        if is_rollback {
            Some(CommitOutcome::RolledBack { key })
        } else {
            Some(CommitOutcome::Committed(Box::new(tx), meta))
        }
    }

    /// Attaches `5.19`/`5.20` session attributes to the resolved
    /// transaction (§4.6 "attributes").
    pub fn apply_session_info(&mut self, info: SessionInfo) {
        let Some(key) = self.last_touched else { return };
        if let Some(tx) = self.transactions.get_mut(&key) {
            if info.os_user_name.is_some() {
                tx.session.os_user_name = info.os_user_name;
            }
            if info.machine_name.is_some() {
                tx.session.machine_name = info.machine_name;
            }
            if info.client_info.is_some() {
                tx.session.client_info = info.client_info;
            }
        }
    }

    /// Buffers a LOB page, resolving its owner via `lob_id_to_xid` and
    /// falling back to an orphan store when the owner isn't known yet
    /// (§4.8).
    pub fn buffer_lob_page(&mut self, lob_id: LobId, page_no: u32, data: Bytes, lob_id_to_xid: &LobIdToXid, orphans: &mut OrphanLobStore) {
        if let Some(xid) = lob_id_to_xid.lookup(lob_id) {
            if let Some(tx) = self.transactions.get_mut(&xid.truncated()) {
                tx.lob_ctx.insert(lob_id, page_no, data);
                return;
            }
        }
        orphans.push(lob_id, page_no, data);
    }

    /// Records a `10.x`-derived LOB-id/xid mapping and drains any orphan
    /// pages that were waiting on it (§4.8).
    pub fn observe_lob_mapping(&mut self, lob_id: LobId, lob_id_to_xid: &mut LobIdToXid, orphans: &mut OrphanLobStore) {
        let Some(key) = self.last_touched else { return };
        let Some(tx) = self.transactions.get_mut(&key) else { return };
        let Some(xid) = tx.xid else { return };
        self.attach_lob_owner(lob_id, xid, lob_id_to_xid, orphans);
    }

    /// Registers a LOB-id/xid mapping named directly by a SUPLOG/FPLOAD
    /// KDLI sub-record, and drains any orphan pages waiting on it (§4.8).
    /// Unlike `observe_lob_mapping`, the owning xid comes straight off the
    /// sub-record rather than `last_touched`, so this works even when no
    /// `10.x` index vector ever shows up for this LOB.
    fn attach_lob_owner(&mut self, lob_id: LobId, xid: Xid, lob_id_to_xid: &mut LobIdToXid, orphans: &mut OrphanLobStore) {
        lob_id_to_xid.insert(lob_id, xid);
        let Some(tx) = self.transactions.get_mut(&xid.truncated()) else { return };
        for (page_no, data) in orphans.take(lob_id) {
            tx.lob_ctx.insert(lob_id, page_no, data);
        }
    }

    /// Appends a DDL marker, gated by the schema filter (§4.6 rule 7): only
    /// objects the schema actually tracks are worth recording a DDL event
    /// for.
    pub fn apply_ddl(&mut self, obj: TypeObj, schema: &SchemaView) {
        let tracked = schema.lookup_table(obj).map(|t| !t.options.contains(TableOptions::SYSTEM)).unwrap_or(false);
        if !tracked {
            return;
        }
        let Some(key) = self.last_touched else { return };
        let Some(tx) = self.get_or_create(key) else { return };
        tx.ops.push(TxOp::Ddl { obj });
    }

    /// Drives one record's worth of instructions through the buffer,
    /// returning a commit outcome for every `5.4` it observes (usually
    /// zero or one per record).
    pub fn apply_record(
        &mut self,
        instructions: Vec<Instruction>,
        meta: CommitMeta,
        schema: &SchemaView,
        lob_id_to_xid: &mut LobIdToXid,
        orphans: &mut OrphanLobStore,
    ) -> Vec<CommitOutcome> {
        let mut outcomes = Vec::new();
        for instr in instructions {
            match instr {
                Instruction::Begin { xid, .. } => self.begin(xid),
                Instruction::StandaloneUndo { xid, .. } => {
                    if let Some(xid) = xid {
                        self.last_touched = Some(xid.truncated());
                    }
                }
                Instruction::Paired { xid, undo, dba, data } => {
                    self.apply_paired(xid, undo.obj, dba, *data, lob_id_to_xid, orphans);
                }
                Instruction::RollbackLastOp { xid_hint } => self.rollback_last(xid_hint),
                Instruction::Commit { xid_hint, commit } => {
                    if let Some(outcome) = self.commit(xid_hint, commit.is_rollback, meta, lob_id_to_xid) {
                        outcomes.push(outcome);
                    }
                }
                Instruction::DirectLob { write } => {
                    self.buffer_lob_page(write.lob_id, write.lob_page_no, write.page, lob_id_to_xid, orphans);
                }
                Instruction::Kdli { vector } => {
                    for sub in vector.sub_records {
                        if let (Some(lob_id), Some(xid)) = (sub.lob_id, sub.xid) {
                            self.attach_lob_owner(lob_id, xid, lob_id_to_xid, orphans);
                        }
                        if let (Some(lob_id), Some(page_no), Some(data)) = (sub.lob_id, sub.lob_page_no, sub.lob_data) {
                            self.buffer_lob_page(lob_id, page_no, data, lob_id_to_xid, orphans);
                        }
                    }
                }
                Instruction::Ddl { marker } => self.apply_ddl(marker.obj, schema),
                Instruction::SessionInfo { info } => self.apply_session_info(info),
                Instruction::IndexKey { key } => {
                    if let Some(mapping) = key.lob_mapping {
                        self.observe_lob_mapping(mapping.lob_id, lob_id_to_xid, orphans);
                    }
                }
                Instruction::TableRowChange { dba, change } => {
                    if let Some(kind) = RowOpKind::from_kdo(change.op) {
                        self.append(None, TxOp::Row { kind, obj: None, bdba: dba, slot: change.slot });
                    }
                }
            }
        }
        outcomes
    }

    fn apply_paired(
        &mut self,
        xid: Option<Xid>,
        obj: TypeObj,
        dba: Dba,
        data: Decoded,
        lob_id_to_xid: &mut LobIdToXid,
        orphans: &mut OrphanLobStore,
    ) {
        match data {
            Decoded::TableRowChange(change) => {
                if let Some(kind) = RowOpKind::from_kdo(change.op) {
                    self.append(xid, TxOp::Row { kind, obj: Some(obj), bdba: dba, slot: change.slot });
                }
            }
            Decoded::IndexKey(key) => {
                if let Some(mapping) = key.lob_mapping {
                    if let Some(x) = xid {
                        self.last_touched = Some(x.truncated());
                    }
                    self.observe_lob_mapping(mapping.lob_id, lob_id_to_xid, orphans);
                }
            }
            Decoded::Kdli(vector) => {
                for sub in vector.sub_records {
                    if let (Some(lob_id), Some(sub_xid)) = (sub.lob_id, sub.xid) {
                        self.attach_lob_owner(lob_id, sub_xid, lob_id_to_xid, orphans);
                    }
                    if let (Some(lob_id), Some(page_no), Some(bytes)) = (sub.lob_id, sub.lob_page_no, sub.lob_data) {
                        if let Some(x) = xid {
                            self.last_touched = Some(x.truncated());
                        }
                        self.buffer_lob_page(lob_id, page_no, bytes, lob_id_to_xid, orphans);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Convenience bundle the emitter stage reads off a committed transaction
/// (§6.2 `begin_transaction`).
#[derive(Debug, Clone, Copy)]
pub struct CommitMeta {
    pub commit_scn: Scn,
    pub commit_sub_scn: SubScn,
    pub commit_timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn xid(usn: u16, slt: u16, sqn: u32) -> Xid {
        Xid::new(usn, slt, sqn)
    }

    fn meta() -> CommitMeta {
        CommitMeta { commit_scn: Scn::new(1), commit_sub_scn: SubScn::ZERO, commit_timestamp: Utc.timestamp_opt(0, 0).unwrap() }
    }

    #[test]
    fn begin_then_append_then_commit_round_trips() {
        let mut buf = TxBuffer::new(Config::default());
        let mut lob_map = LobIdToXid::new();
        let x = xid(1, 1, 1);
        buf.begin(x);
        buf.append(Some(x), TxOp::Row { kind: RowOpKind::Insert, obj: Some(TypeObj::from(5)), bdba: Dba::from(1), slot: 0 });
        match buf.commit(Some(x), false, meta(), &mut lob_map) {
            Some(CommitOutcome::Committed(tx, _)) => assert_eq!(tx.ops.len(), 1),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(buf.open_count(), 0);
    }

    #[test]
    fn rollback_last_op_pops_the_tail_row() {
        let mut buf = TxBuffer::new(Config::default());
        let x = xid(2, 2, 2);
        buf.begin(x);
        buf.append(Some(x), TxOp::Row { kind: RowOpKind::Insert, obj: None, bdba: Dba::from(1), slot: 0 });
        buf.append(Some(x), TxOp::Row { kind: RowOpKind::Update, obj: None, bdba: Dba::from(1), slot: 0 });
        buf.rollback_last(Some(x));
        let tx = buf.transactions.get(&x.truncated()).unwrap();
        assert_eq!(tx.ops.len(), 1);
    }

    #[test]
    fn n_ops_and_n_rollbacks_nets_to_zero() {
        let mut buf = TxBuffer::new(Config::default());
        let x = xid(3, 3, 3);
        buf.begin(x);
        for _ in 0..5 {
            buf.append(Some(x), TxOp::Row { kind: RowOpKind::Update, obj: None, bdba: Dba::from(1), slot: 0 });
        }
        for _ in 0..5 {
            buf.rollback_last(Some(x));
        }
        let tx = buf.transactions.get(&x.truncated()).unwrap();
        assert!(tx.ops.is_empty());
    }

    proptest! {
        #[test]
        fn k_of_n_rollbacks_leaves_the_first_n_minus_k_ops_in_order(
            n in 1usize..20, k in 0usize..20,
        ) {
            let k = k.min(n);
            let mut buf = TxBuffer::new(Config::default());
            let x = xid(9, 9, 9);
            buf.begin(x);
            for slot in 0..n {
                buf.append(Some(x), TxOp::Row { kind: RowOpKind::Update, obj: None, bdba: Dba::from(1), slot: slot as u16 });
            }
            for _ in 0..k {
                buf.rollback_last(Some(x));
            }
            let tx = buf.transactions.get(&x.truncated()).unwrap();
            prop_assert_eq!(tx.ops.len(), n - k);
            for (i, op) in tx.ops.iter().enumerate() {
                match op {
                    TxOp::Row { slot, .. } => prop_assert_eq!(*slot, i as u16),
                    other => panic!("unexpected op: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn missing_xid_hint_falls_back_to_last_touched() {
        let mut buf = TxBuffer::new(Config::default());
        let x = xid(4, 4, 4);
        buf.begin(x);
        buf.append(Some(x), TxOp::Row { kind: RowOpKind::Insert, obj: None, bdba: Dba::from(1), slot: 0 });
        let mut lob_map = LobIdToXid::new();
        match buf.commit(None, false, meta(), &mut lob_map) {
            Some(CommitOutcome::Committed(tx, _)) => assert_eq!(tx.ops.len(), 1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn oversized_transaction_moves_to_skip_list() {
        let config = Config::builder().transaction_size_max(50).build().unwrap();
        let mut buf = TxBuffer::new(config);
        let x = xid(5, 5, 5);
        buf.begin(x);
        for _ in 0..3 {
            buf.append(Some(x), TxOp::Row { kind: RowOpKind::Insert, obj: None, bdba: Dba::from(1), slot: 0 });
        }
        assert_eq!(buf.open_count(), 0);
        assert!(buf.skip_list.contains(&x.truncated()));
        let mut lob_map = LobIdToXid::new();
        match buf.commit(Some(x), false, meta(), &mut lob_map) {
            Some(CommitOutcome::WasSkipped { .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn commit_for_unknown_transaction_warns_once() {
        let mut buf = TxBuffer::new(Config::default());
        let x = xid(6, 6, 6);
        let mut lob_map = LobIdToXid::new();
        assert!(matches!(buf.commit(Some(x), false, meta(), &mut lob_map), Some(CommitOutcome::NotFound { .. })));
        assert!(buf.broken_warned.contains(&x.truncated()));
    }

    #[test]
    fn suplog_xid_attaches_orphaned_lob_pages_to_their_transaction() {
        let mut buf = TxBuffer::new(Config::default());
        let mut lob_map = LobIdToXid::new();
        let mut orphans = OrphanLobStore::new(1024);
        let lob_id = LobId([7u8; 10]);
        let x = xid(7, 7, 7);
        buf.begin(x);

        // A LOB page arrives before any 10.x index vector names its owner.
        buf.buffer_lob_page(lob_id, 0, Bytes::from_static(b"page0"), &lob_map, &mut orphans);
        assert_eq!(orphans.len(), 1);

        // A KDLI SUPLOG sub-record carries the xid directly.
        buf.attach_lob_owner(lob_id, x, &mut lob_map, &mut orphans);
        assert!(orphans.is_empty());
        assert_eq!(lob_map.lookup(lob_id), Some(x));
        let tx = buf.transactions.get(&x.truncated()).unwrap();
        assert_eq!(tx.lob_ctx.pages(lob_id).count(), 1);
    }

    proptest! {
        #[test]
        fn lob_pages_land_in_page_order_regardless_of_when_the_owner_is_known(
            page_nos in proptest::collection::btree_set(0u32..200, 2..16),
            split in 0usize..16,
        ) {
            let page_nos: Vec<u32> = page_nos.into_iter().collect();
            let split = split.min(page_nos.len());
            let (before, after) = page_nos.split_at(split);

            let mut buf = TxBuffer::new(Config::default());
            let mut lob_map = LobIdToXid::new();
            let mut orphans = OrphanLobStore::new(1 << 20);
            let lob_id = LobId([3u8; 10]);
            let x = xid(8, 8, 8);
            buf.begin(x);

            for &no in before {
                buf.buffer_lob_page(lob_id, no, Bytes::from(vec![no as u8]), &lob_map, &mut orphans);
            }
            buf.attach_lob_owner(lob_id, x, &mut lob_map, &mut orphans);
            for &no in after {
                buf.buffer_lob_page(lob_id, no, Bytes::from(vec![no as u8]), &lob_map, &mut orphans);
            }

            let tx = buf.transactions.get(&x.truncated()).unwrap();
            let got: Vec<u32> = tx.lob_ctx.pages(lob_id).map(|(no, _)| no).collect();
            let mut expected = page_nos.clone();
            expected.sort_unstable();
            prop_assert_eq!(got, expected);
        }
    }
}
