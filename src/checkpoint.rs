//! Resume-point persistence: `CheckpointPayload`, the `StateStore`
//! collaborator, and the coordinator that drives periodic checkpoints
//! (§4.9, §6.2, §6.3).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{FramingError, Result, StateStoreError};
use crate::io::{FileExt, Io};
use crate::types::{Scn, Xid};

/// The JSON document a `StateStore` persists (§6.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    pub resetlogs: u32,
    pub activation: u32,
    pub sequence: u32,
    pub file_offset_block: u64,
    pub scn: u64,
    pub timestamp_epoch: i64,
    pub lwn_idx: u32,
    pub min_sequence: Option<u32>,
    pub min_file_offset_block: Option<u64>,
    pub min_xid: Option<String>,
}

/// A `StateStore` entry name: either the checkpoint or a schema snapshot
/// pinned to an SCN (§6.2 `Name ∈ {checkpoint, schema_<scn>}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Name {
    Checkpoint,
    Schema(Scn),
}

impl Name {
    fn file_name(&self) -> String {
        match self {
            Name::Checkpoint => "checkpoint".to_string(),
            Name::Schema(scn) => format!("schema_{}", scn.get()),
        }
    }
}

/// Persistence collaborator for checkpoint and schema-snapshot blobs
/// (§6.2). `write` must be an atomic replace; `read` must bound the bytes
/// it loads by `max_size`.
pub trait StateStore: Send {
    fn list(&self) -> Result<Vec<Name>, StateStoreError>;
    fn read(&self, name: &Name, max_size: usize) -> Result<Option<Vec<u8>>, StateStoreError>;
    fn write(&self, name: &Name, bytes: &[u8]) -> Result<(), StateStoreError>;
    fn drop_entry(&self, name: &Name) -> Result<(), StateStoreError>;
}

/// Reference `StateStore`: JSON blobs in a directory, atomic-replaced via
/// temp-file + rename, the same pattern `FsStateStore`'s sibling collaborators
/// in this codebase use for their own on-disk metadata files.
pub struct FsStateStore<I: Io> {
    io: I,
    dir: PathBuf,
}

impl<I: Io> FsStateStore<I> {
    pub fn new(io: I, dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        io.create_dir_all(&dir)?;
        Ok(Self { io, dir })
    }

    fn path(&self, name: &Name) -> PathBuf {
        self.dir.join(name.file_name())
    }

    fn tmp_path(&self, name: &Name) -> PathBuf {
        self.dir.join(format!("{}.tmp", name.file_name()))
    }
}

impl<I: Io> StateStore for FsStateStore<I> {
    fn list(&self) -> Result<Vec<Name>, StateStoreError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(StateStoreError::Io)? {
            let entry = entry.map_err(StateStoreError::Io)?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.ends_with(".tmp") {
                continue;
            }
            if file_name == "checkpoint" {
                names.push(Name::Checkpoint);
            } else if let Some(scn) = file_name.strip_prefix("schema_") {
                if let Ok(value) = scn.parse::<u64>() {
                    names.push(Name::Schema(Scn::new(value)));
                }
            }
        }
        Ok(names)
    }

    fn read(&self, name: &Name, max_size: usize) -> Result<Option<Vec<u8>>, StateStoreError> {
        let path = self.path(name);
        let file = match self.io.open(false, true, false, &path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateStoreError::Io(e)),
        };
        let len = file.len().map_err(StateStoreError::Io)?;
        if len as usize > max_size {
            return Err(StateStoreError::TooLarge { size: len as usize, max: max_size });
        }
        let mut buf = vec![0u8; len as usize];
        file.read_exact_at(&mut buf, 0).map_err(StateStoreError::Io)?;
        Ok(Some(buf))
    }

    fn write(&self, name: &Name, bytes: &[u8]) -> Result<(), StateStoreError> {
        let tmp = self.tmp_path(name);
        let file = self.io.open(true, false, true, &tmp).or_else(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                self.io.remove_file(&tmp).map_err(StateStoreError::Io)?;
                self.io.open(true, false, true, &tmp).map_err(StateStoreError::Io)
            } else {
                Err(StateStoreError::Io(e))
            }
        })?;
        file.write_all_at(bytes, 0).map_err(StateStoreError::Io)?;
        file.sync_all().map_err(StateStoreError::Io)?;
        self.io.rename(&tmp, &self.path(name)).map_err(StateStoreError::Io)?;
        Ok(())
    }

    fn drop_entry(&self, name: &Name) -> Result<(), StateStoreError> {
        match self.io.remove_file(&self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateStoreError::Io(e)),
        }
    }
}

impl CheckpointPayload {
    pub fn load(store: &dyn StateStore, max_size: usize) -> Result<Option<Self>, StateStoreError> {
        let Some(bytes) = store.read(&Name::Checkpoint, max_size)? else {
            return Ok(None);
        };
        let payload: Self = serde_json::from_slice(&bytes)?;
        Ok(Some(payload))
    }

    pub fn save(&self, store: &dyn StateStore) -> Result<(), StateStoreError> {
        let bytes = serde_json::to_vec(self).map_err(StateStoreError::Malformed)?;
        store.write(&Name::Checkpoint, &bytes)
    }
}

/// The oldest still-live transaction's anchor: the coordinator must never
/// checkpoint past this, since a crash-restart has to replay it in full
/// (§4.9 `min_active`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinActive {
    pub sequence: u32,
    pub file_offset_block: u64,
    pub xid: Xid,
}

/// Drives periodic checkpoint persistence after each drained LWN group
/// (§4.9). Batches `StateStore::write` calls by `checkpoint_interval_lwns`
/// while still recomputing `min_active` on every call, so a `soft_shutdown`
/// can always flush immediately without losing more than the in-flight LWN.
pub struct CheckpointCoordinator<S: StateStore> {
    store: S,
    interval: u32,
    since_last_write: u32,
    resetlogs: u32,
    activation: u32,
}

impl<S: StateStore> CheckpointCoordinator<S> {
    pub fn new(store: S, interval: u32, resetlogs: u32, activation: u32) -> Self {
        Self { store, interval, since_last_write: 0, resetlogs, activation }
    }

    /// Call after every drained LWN group. Persists immediately when
    /// `force` is set (a `soft_shutdown` in progress) or the interval has
    /// elapsed; otherwise just advances the counter.
    pub fn maybe_checkpoint(
        &mut self,
        sequence: u32,
        file_offset_block: u64,
        lwn_scn: Scn,
        lwn_timestamp_epoch: i64,
        lwn_idx: u32,
        min_active: Option<MinActive>,
        force: bool,
    ) -> Result<bool, StateStoreError> {
        self.since_last_write += 1;
        let due = force || self.interval == 0 || self.since_last_write >= self.interval;
        if !due {
            return Ok(false);
        }
        let payload = CheckpointPayload {
            resetlogs: self.resetlogs,
            activation: self.activation,
            sequence,
            file_offset_block,
            scn: lwn_scn.get(),
            timestamp_epoch: lwn_timestamp_epoch,
            lwn_idx,
            min_sequence: min_active.map(|m| m.sequence),
            min_file_offset_block: min_active.map(|m| m.file_offset_block),
            min_xid: min_active.map(|m| m.xid.to_string()),
        };
        payload.save(&self.store)?;
        self.since_last_write = 0;
        Ok(true)
    }

    /// Loads the persisted checkpoint at startup, validating `resetlogs`
    /// against the file about to be opened. A mismatch is fatal (§4.9).
    pub fn resume(&self, max_size: usize, file_resetlogs: u32) -> Result<Option<CheckpointPayload>> {
        let Some(payload) = CheckpointPayload::load(&self.store, max_size)? else {
            return Ok(None);
        };
        if payload.resetlogs != file_resetlogs {
            return Err(FramingError::ResetlogsMismatch {
                expected: payload.resetlogs,
                found: file_resetlogs,
            }
            .into());
        }
        Ok(Some(payload))
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
