//! Scalar domain types shared across the redo-parsing pipeline.
//!
//! Every type here is a thin, `Copy` newtype over a fixed-width integer. None
//! of them own allocations, so a `RedoLogRecord` (`crate::redo_record`) can
//! carry them by value without touching the `TxBuffer` arenas.

mod dba;
mod file_offset;
mod lob_id;
mod object;
mod row_id;
mod scn;
mod seq;
mod uba;
mod xid;

pub use dba::Dba;
pub use file_offset::FileOffset;
pub use lob_id::LobId;
pub use object::{TypeDataObj, TypeObj};
pub use row_id::RowId;
pub use scn::{Scn, SubScn};
pub use seq::Seq;
pub use uba::Uba;
pub use xid::Xid;
