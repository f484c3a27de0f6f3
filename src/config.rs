//! Ambient configuration (§3.1). Constructed once by the host and threaded
//! by reference into the components that need it, mirroring how the
//! codebase this crate is grounded on threads its `Io` implementation rather
//! than reaching for ambient globals.

use crate::error::{ConfigError, Result};
use crate::record::RecordVersion;

const DEFAULT_MEMORY_CHUNK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    /// Record envelope layout (§4.4); a property of the source database
    /// version, not something the stream itself declares.
    pub record_version: RecordVersion,
    /// LWN record arena chunk size (§4.3). Defaults to `memory_chunk_size`.
    pub lwn_chunk_size: usize,
    /// Per-transaction row-chunk size (§4.7). Defaults to `memory_chunk_size`.
    pub tx_chunk_size: usize,
    /// A transaction whose accumulated size exceeds this moves to the skip
    /// list (§4.7).
    pub transaction_size_max: u64,
    /// Bound on buffered orphan LOB pages, in bytes (§4.8).
    pub lob_orphan_cap: usize,
    /// Downgrades data/semantic decode errors to log-and-continue (§7).
    pub ignore_data_errors: bool,
    /// Surface transactions begun mid-log, without an observed `5.2` (§4.7).
    pub show_incomplete_transactions: bool,
    /// How many drained LWN groups between persisted checkpoints; 0 means
    /// every LWN (§4.9).
    pub checkpoint_interval_lwns: u32,
    /// Upper bound `StateStore::read` is allowed to return (§6.2).
    pub max_checkpoint_size: usize,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build().expect("default configuration is always valid")
    }
}

#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    record_version: RecordVersion,
    memory_chunk_size: usize,
    lwn_chunk_size: Option<usize>,
    tx_chunk_size: Option<usize>,
    transaction_size_max: u64,
    lob_orphan_cap: usize,
    ignore_data_errors: bool,
    show_incomplete_transactions: bool,
    checkpoint_interval_lwns: u32,
    max_checkpoint_size: usize,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            record_version: RecordVersion::V12_1Plus,
            memory_chunk_size: DEFAULT_MEMORY_CHUNK_SIZE,
            lwn_chunk_size: None,
            tx_chunk_size: None,
            transaction_size_max: 1024 * 1024 * 1024,
            lob_orphan_cap: 256 * 1024 * 1024,
            ignore_data_errors: false,
            show_incomplete_transactions: false,
            checkpoint_interval_lwns: 0,
            max_checkpoint_size: 16 * 1024 * 1024,
        }
    }
}

impl ConfigBuilder {
    pub fn record_version(mut self, value: RecordVersion) -> Self {
        self.record_version = value;
        self
    }

    pub fn memory_chunk_size(mut self, value: usize) -> Self {
        self.memory_chunk_size = value;
        self
    }

    pub fn lwn_chunk_size(mut self, value: usize) -> Self {
        self.lwn_chunk_size = Some(value);
        self
    }

    pub fn tx_chunk_size(mut self, value: usize) -> Self {
        self.tx_chunk_size = Some(value);
        self
    }

    pub fn transaction_size_max(mut self, value: u64) -> Self {
        self.transaction_size_max = value;
        self
    }

    pub fn lob_orphan_cap(mut self, value: usize) -> Self {
        self.lob_orphan_cap = value;
        self
    }

    pub fn ignore_data_errors(mut self, value: bool) -> Self {
        self.ignore_data_errors = value;
        self
    }

    pub fn show_incomplete_transactions(mut self, value: bool) -> Self {
        self.show_incomplete_transactions = value;
        self
    }

    pub fn checkpoint_interval_lwns(mut self, value: u32) -> Self {
        self.checkpoint_interval_lwns = value;
        self
    }

    pub fn max_checkpoint_size(mut self, value: usize) -> Self {
        self.max_checkpoint_size = value;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        if self.memory_chunk_size == 0 {
            return Err(ConfigError::MustBePositive { field: "memory_chunk_size" });
        }
        if self.transaction_size_max == 0 {
            return Err(ConfigError::MustBePositive { field: "transaction_size_max" });
        }
        if self.lob_orphan_cap == 0 {
            return Err(ConfigError::MustBePositive { field: "lob_orphan_cap" });
        }
        if self.max_checkpoint_size == 0 {
            return Err(ConfigError::MustBePositive { field: "max_checkpoint_size" });
        }
        Ok(Config {
            record_version: self.record_version,
            lwn_chunk_size: self.lwn_chunk_size.unwrap_or(self.memory_chunk_size),
            tx_chunk_size: self.tx_chunk_size.unwrap_or(self.memory_chunk_size),
            transaction_size_max: self.transaction_size_max,
            lob_orphan_cap: self.lob_orphan_cap,
            ignore_data_errors: self.ignore_data_errors,
            show_incomplete_transactions: self.show_incomplete_transactions,
            checkpoint_interval_lwns: self.checkpoint_interval_lwns,
            max_checkpoint_size: self.max_checkpoint_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.lwn_chunk_size, DEFAULT_MEMORY_CHUNK_SIZE);
        assert_eq!(cfg.tx_chunk_size, DEFAULT_MEMORY_CHUNK_SIZE);
    }

    #[test]
    fn rejects_zero_transaction_size_max() {
        let err = Config::builder().transaction_size_max(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::MustBePositive { field: "transaction_size_max" }));
    }

    #[test]
    fn chunk_sizes_can_be_overridden_independently() {
        let cfg = Config::builder()
            .memory_chunk_size(1024)
            .tx_chunk_size(2048)
            .build()
            .unwrap();
        assert_eq!(cfg.lwn_chunk_size, 1024);
        assert_eq!(cfg.tx_chunk_size, 2048);
    }
}
