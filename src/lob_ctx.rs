//! LOB page buffering and stitching (§4.8).
//!
//! Direct-path LOB writes (`19.1`) and KDLI data (`26.2`/`26.6`) arrive
//! addressed by `lob_id`, not by the owning transaction — the xid mapping
//! only becomes known once an index vector (`10.x`) reveals it. Pages that
//! arrive first sit in [`OrphanLobStore`] until [`LobIdToXid`] resolves
//! their owner.

use std::collections::{BTreeMap, HashMap, VecDeque};

use bytes::Bytes;
use tracing::warn;

use crate::types::{LobId, Xid};

/// One transaction's LOB pages, keyed by lob id then page number so a
/// completed LOB can be re-assembled in page order (§4.8 "M+P pages in
/// page-number order").
#[derive(Debug, Clone, Default)]
pub struct LobCtx {
    pages: HashMap<LobId, BTreeMap<u32, Bytes>>,
}

impl LobCtx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, lob_id: LobId, page_no: u32, data: Bytes) {
        self.pages.entry(lob_id).or_default().insert(page_no, data);
    }

    pub fn pages(&self, lob_id: LobId) -> impl Iterator<Item = (u32, &Bytes)> {
        self.pages.get(&lob_id).into_iter().flat_map(|m| m.iter().map(|(&no, b)| (no, b)))
    }

    /// Every LOB id this context holds at least one page for, so a caller
    /// that doesn't already know the ids (the pipeline, flushing a
    /// committed transaction) can still walk all of them.
    pub fn lob_ids(&self) -> impl Iterator<Item = LobId> + '_ {
        self.pages.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// A page that arrived before its owning transaction was known, held by
/// [`OrphanLobStore`] until a `10.x` vector reveals the mapping.
#[derive(Debug, Clone)]
struct OrphanPage {
    lob_id: LobId,
    page_no: u32,
    data: Bytes,
}

/// Bounded buffer for LOB pages with no known owning transaction yet
/// (§4.8). Bounded by `lob_orphan_cap` bytes; overflow warns and evicts the
/// oldest page rather than erroring — losing one orphan page is not fatal
/// to the stream the way a framing error is (§7).
pub struct OrphanLobStore {
    cap_bytes: usize,
    size_bytes: usize,
    order: VecDeque<OrphanPage>,
}

impl OrphanLobStore {
    pub fn new(cap_bytes: usize) -> Self {
        Self { cap_bytes, size_bytes: 0, order: VecDeque::new() }
    }

    pub fn push(&mut self, lob_id: LobId, page_no: u32, data: Bytes) {
        self.size_bytes += data.len();
        self.order.push_back(OrphanPage { lob_id, page_no, data });
        while self.size_bytes > self.cap_bytes {
            if let Some(evicted) = self.order.pop_front() {
                self.size_bytes -= evicted.data.len();
                warn!(lob_id = %evicted.lob_id, page_no = evicted.page_no, "evicting orphan lob page: orphan buffer over cap");
            } else {
                break;
            }
        }
    }

    /// Removes and returns every buffered page for `lob_id`, in arrival
    /// order, once its owning transaction has been resolved.
    pub fn take(&mut self, lob_id: LobId) -> Vec<(u32, Bytes)> {
        let mut taken = Vec::new();
        self.order.retain(|p| {
            if p.lob_id == lob_id {
                self.size_bytes -= p.data.len();
                taken.push((p.page_no, p.data.clone()));
                false
            } else {
                true
            }
        });
        taken
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Global `lob_id -> xid` table (§4.8), owned solely by the parser thread.
/// Populated as `10.x` index vectors reveal mappings, purged per-xid on
/// commit/rollback so it never grows past the set of open transactions'
/// LOB columns.
#[derive(Debug, Default)]
pub struct LobIdToXid {
    map: HashMap<LobId, Xid>,
}

impl LobIdToXid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, lob_id: LobId, xid: Xid) {
        self.map.insert(lob_id, xid);
    }

    pub fn lookup(&self, lob_id: LobId) -> Option<Xid> {
        self.map.get(&lob_id).copied()
    }

    pub fn purge_xid(&mut self, xid: Xid) {
        self.map.retain(|_, v| *v != xid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lob(byte: u8) -> LobId {
        LobId::from_bytes(&[byte; 10]).unwrap()
    }

    #[test]
    fn lob_ctx_returns_pages_in_page_number_order() {
        let mut ctx = LobCtx::new();
        ctx.insert(lob(1), 2, Bytes::from_static(b"b"));
        ctx.insert(lob(1), 1, Bytes::from_static(b"a"));
        let pages: Vec<_> = ctx.pages(lob(1)).map(|(no, _)| no).collect();
        assert_eq!(pages, vec![1, 2]);
    }

    #[test]
    fn orphan_store_evicts_oldest_past_cap() {
        let mut store = OrphanLobStore::new(4);
        store.push(lob(1), 0, Bytes::from_static(b"aa"));
        store.push(lob(2), 0, Bytes::from_static(b"bb"));
        store.push(lob(3), 0, Bytes::from_static(b"cc"));
        assert_eq!(store.len(), 2);
        assert!(store.take(lob(1)).is_empty());
    }

    #[test]
    fn orphan_store_take_drains_only_matching_lob() {
        let mut store = OrphanLobStore::new(1024);
        store.push(lob(1), 0, Bytes::from_static(b"a"));
        store.push(lob(2), 0, Bytes::from_static(b"b"));
        let taken = store.take(lob(1));
        assert_eq!(taken.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn lob_id_to_xid_purge_removes_only_that_xid() {
        let mut map = LobIdToXid::new();
        let xid1 = Xid::new(1, 1, 1);
        let xid2 = Xid::new(2, 2, 2);
        map.insert(lob(1), xid1);
        map.insert(lob(2), xid2);
        map.purge_xid(xid1);
        assert!(map.lookup(lob(1)).is_none());
        assert_eq!(map.lookup(lob(2)), Some(xid2));
    }
}
