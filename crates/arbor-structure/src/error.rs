use arbor_engine::EngineError;
use arbor_types::{FormatError, ObjectId, Path, TypeTag};

/// Errors from structure-level operations.
#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// More rows were removed than the catalog had counted.
    #[error("refcount underflow for object {id} at {path} ({tag}): have {have}, removing {remove}")]
    RefcountUnderflow {
        id: ObjectId,
        path: Path,
        tag: TypeTag,
        have: u64,
        remove: u64,
    },

    /// Writing would give a node both list elements and mapping keys.
    #[error("object {id}: {path} already holds {existing}, cannot add {wanted}")]
    Conflict {
        id: ObjectId,
        path: Path,
        existing: &'static str,
        wanted: &'static str,
    },

    /// Stored data does not decode into the physical model.
    #[error("corrupt storage: {0}")]
    Corrupt(String),
}

/// Result alias for structure operations.
pub type StructureResult<T> = Result<T, StructureError>;
