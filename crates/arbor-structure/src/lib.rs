//! Structure layer for Arbor.
//!
//! Owns the physical model: one field table per (path signature, type),
//! the `_spec` catalog with per-object refcounts, and the `_listsizes`
//! cache of maximum list indices. Every operation takes an object ID plus
//! one path or field and emits SQL through an [`Engine`]; none of them
//! opens or closes a transaction.
//!
//! # Reserved tables
//!
//! | Table        | Columns                          |
//! |--------------|----------------------------------|
//! | `_spec`      | `id, field, type, refcount`      |
//! | `_listsizes` | `id, list, max_index`            |
//!
//! Field tables are named `field:<type>:<signature>` and carry `id`, one
//! `c<k>` column per list position, and a `value` column for every type
//! except null.

pub mod catalog;
pub mod error;
pub mod lists;
pub mod query;
pub mod tables;

pub use catalog::CatalogEntry;
pub use error::{StructureError, StructureResult};
pub use lists::ListSize;
pub use tables::FieldTable;

use arbor_engine::Engine;

pub(crate) const SPEC_TABLE: &str = "_spec";
pub(crate) const LIST_SIZE_TABLE: &str = "_listsizes";

/// Structure-level operations over one engine.
pub struct Structure<'e, E: Engine + ?Sized> {
    engine: &'e E,
}

impl<'e, E: Engine + ?Sized> Structure<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &'e E {
        self.engine
    }

    /// Create the reserved tables if they are missing.
    pub fn initialize(&self) -> StructureResult<()> {
        self.engine.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {SPEC_TABLE} (\
                 id INTEGER NOT NULL, field TEXT NOT NULL, type TEXT NOT NULL, \
                 refcount INTEGER NOT NULL, PRIMARY KEY (id, field, type))"
            ),
            &[],
        )?;
        self.engine.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {LIST_SIZE_TABLE} (\
                 id INTEGER NOT NULL, list TEXT NOT NULL, max_index INTEGER NOT NULL, \
                 PRIMARY KEY (id, list))"
            ),
            &[],
        )?;
        Ok(())
    }
}
