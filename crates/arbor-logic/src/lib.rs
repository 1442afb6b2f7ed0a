//! Document logic for Arbor.
//!
//! Turns document-level requests into structure operations while keeping
//! the storage invariants:
//!
//! 1. Siblings are all list elements or all mapping keys, never mixed.
//! 2. Catalog refcounts equal the rows present in each field table.
//! 3. List indices are contiguous from zero; the list-size cache holds the
//!    maximum index of every non-empty list.
//! 4. Emptied containers persist as pointer rows.
//!
//! Every method runs inside a transaction bracket opened by the caller.

pub mod error;
pub mod read;
pub mod repair;
pub mod verify;
pub mod write;

pub use error::{LogicError, LogicResult};
pub use repair::RepairSummary;
pub use verify::{VerifyReport, Violation, ViolationKind};

use arbor_engine::Engine;
use arbor_structure::Structure;
use arbor_types::ObjectId;

/// Document operations over one engine.
pub struct Logic<'e, E: Engine + ?Sized> {
    structure: Structure<'e, E>,
}

impl<'e, E: Engine + ?Sized> Logic<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self {
            structure: Structure::new(engine),
        }
    }

    pub fn structure(&self) -> &Structure<'e, E> {
        &self.structure
    }

    pub fn object_exists(&self, id: ObjectId) -> LogicResult<bool> {
        Ok(self.structure.object_exists(id)?)
    }

    fn require_object(&self, id: ObjectId) -> LogicResult<()> {
        if self.structure.object_exists(id)? {
            Ok(())
        } else {
            Err(LogicError::ObjectNotFound(id))
        }
    }
}
