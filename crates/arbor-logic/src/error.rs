use arbor_engine::EngineError;
use arbor_structure::StructureError;
use arbor_types::{FormatError, ObjectId, Path};

/// Errors from document-level operations.
#[derive(Debug, thiserror::Error)]
pub enum LogicError {
    #[error("object {0} does not exist")]
    ObjectNotFound(ObjectId),

    #[error("object {id}: nothing stored at {path}")]
    PathNotFound { id: ObjectId, path: Path },

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Result alias for logic operations.
pub type LogicResult<T> = Result<T, LogicError>;
