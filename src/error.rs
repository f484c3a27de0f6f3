//! Crate-wide error taxonomy.
//!
//! Each layer gets its own `thiserror` enum (matching the shape of
//! `storage::error::Error` in the codebase this crate is grounded on); a
//! top-level [`Error`] unifies them at the public API boundary.

use crate::types::Xid;

/// Framing/structural errors: always fatal to the current log file (§7).
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("block size mismatch: file declares {declared}, reader expected {expected}")]
    BlockSizeMismatch { declared: u32, expected: u32 },
    #[error("lwn header failed validation: {0}")]
    InvalidLwnHeader(String),
    #[error("record header size {header_size} exceeds record size {record_size}")]
    HeaderLargerThanRecord { header_size: usize, record_size: usize },
    #[error("field table position {position} runs past record size {record_size}")]
    FieldTableOutOfBounds { position: usize, record_size: usize },
    #[error("record truncated at end of incomplete lwn group")]
    TruncatedLwnGroup,
    #[error("resetlogs mismatch: checkpoint expected {expected}, file declares {found}")]
    ResetlogsMismatch { expected: u32, found: u32 },
}

/// Data/semantic errors: fatal unless `IGNORE_DATA_ERRORS` is configured (§7).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("field {code} truncated: need {need} bytes, have {have}")]
    TruncatedField { code: u32, need: usize, have: usize },
    #[error("unknown opcode {layer}.{sub}")]
    UnknownOpcode { layer: u8, sub: u8 },
    #[error("column count {cc} exceeds field count {field_count}")]
    ColumnCountOverflow { cc: u16, field_count: u16 },
    #[error("unrecognised row flags combination 0x{0:02x}")]
    UnrecognisedRowFlags(u8),
    #[error("unknown kdli sub-record code {0}")]
    UnknownKdliCode(u8),
    #[error("schema lookup failed for object {0}")]
    SchemaMismatch(u32),
}

/// State-store / block-source collaborator errors (§6.2, §6.4).
#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint payload ({size} bytes) exceeds configured max ({max} bytes)")]
    TooLarge { size: usize, max: usize },
    #[error("malformed checkpoint payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("no such entry: {0}")]
    NotFound(String),
}

/// Configuration-time errors (ambient, §3.1): never surfaced mid-parse.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },
    #[error("{field} must be a multiple of {of}, got {value}")]
    NotAMultipleOf { field: &'static str, value: u64, of: u64 },
}

/// Control-flow signals from `BlockSource` that are not errors (§6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    EndOfFile,
    Overwritten,
}

/// Unified crate-level error surfaced to the host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    StateStore(#[from] StateStoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("rollback referenced unknown transaction {usn:#06x}.{slt:#06x}")]
    UnknownRollbackTarget { usn: u16, slt: u16 },
    #[error("transaction {xid} exceeded transaction_size_max and was skipped")]
    TransactionSkipped { xid: Xid },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
