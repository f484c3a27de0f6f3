//! `SchemaView` (§6.2 collaborator): object-id lookups the parser consults
//! while applying vectors — which objects are tables worth tracking, which
//! are LOB segments or LOB indexes, and whether a table carries a row
//! filter.
//!
//! The schema is swapped wholesale between LWN boundaries rather than
//! mutated in place (§5), so it's published through an `arc_swap::ArcSwap`
//! the way this codebase publishes other read-mostly snapshots — readers
//! never block on a writer.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::expr::Expr;
use crate::types::{TypeDataObj, TypeObj};

bitflags::bitflags! {
    /// `Table.options` (§6.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TableOptions: u32 {
        const SYSTEM      = 0b0000_0001;
        const SCHEMA      = 0b0000_0010;
        const DEBUG_TABLE = 0b0000_0100;
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub obj: TypeObj,
    pub owner: String,
    pub name: String,
    pub options: TableOptions,
    pub columns: Vec<Column>,
    /// Row filter condition (§9 expression evaluation); `None` replicates
    /// every row unconditionally.
    pub condition: Option<Expr>,
}

/// A LOB column's owning table, looked up both by the LOB segment's
/// `data_obj` and by its LOB index's `data_obj` — Oracle assigns each a
/// distinct object id even though they describe one logical column.
#[derive(Debug, Clone)]
pub struct Lob {
    pub table_obj: TypeObj,
    pub column_name: String,
}

/// A point-in-time view of the schema, published wholesale via `ArcSwap`.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    tables: HashMap<TypeObj, Arc<Table>>,
    lobs_by_segment: HashMap<TypeDataObj, Arc<Lob>>,
    lobs_by_index: HashMap<TypeDataObj, Arc<Lob>>,
}

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.insert(table.obj, Arc::new(table));
        self
    }

    pub fn with_lob_segment(mut self, data_obj: TypeDataObj, lob: Lob) -> Self {
        self.lobs_by_segment.insert(data_obj, Arc::new(lob));
        self
    }

    pub fn with_lob_index(mut self, data_obj: TypeDataObj, lob: Lob) -> Self {
        self.lobs_by_index.insert(data_obj, Arc::new(lob));
        self
    }

    pub fn lookup_table(&self, obj: TypeObj) -> Option<Arc<Table>> {
        self.tables.get(&obj).cloned()
    }

    pub fn lookup_lob(&self, data_obj: TypeDataObj) -> Option<Arc<Lob>> {
        self.lobs_by_segment.get(&data_obj).cloned()
    }

    pub fn lookup_lob_index(&self, data_obj: TypeDataObj) -> Option<Arc<Lob>> {
        self.lobs_by_index.get(&data_obj).cloned()
    }
}

/// The parser's handle onto the schema (§6.2 `SchemaView`). Lookups are
/// lock-free reads of the currently published snapshot; `swap` publishes a
/// new one wholesale, e.g. after a DDL-triggered schema reload.
#[derive(Default)]
pub struct SchemaView(ArcSwap<SchemaSnapshot>);

impl SchemaView {
    pub fn new(snapshot: SchemaSnapshot) -> Self {
        Self(ArcSwap::new(Arc::new(snapshot)))
    }

    pub fn load(&self) -> Arc<SchemaSnapshot> {
        self.0.load_full()
    }

    pub fn swap(&self, snapshot: SchemaSnapshot) {
        self.0.store(Arc::new(snapshot));
    }

    pub fn lookup_table(&self, obj: TypeObj) -> Option<Arc<Table>> {
        self.load().lookup_table(obj)
    }

    pub fn lookup_lob(&self, data_obj: TypeDataObj) -> Option<Arc<Lob>> {
        self.load().lookup_lob(data_obj)
    }

    pub fn lookup_lob_index(&self, data_obj: TypeDataObj) -> Option<Arc<Lob>> {
        self.load().lookup_lob_index(data_obj)
    }
}
