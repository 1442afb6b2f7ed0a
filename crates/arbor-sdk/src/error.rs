use thiserror::Error;

use arbor_engine::EngineError;
use arbor_logic::LogicError;
use arbor_structure::StructureError;
use arbor_types::FormatError;

/// Error classes callers can branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed path, value or condition.
    Format,
    /// Missing object or path.
    Logic,
    /// Storage-level conflict or inconsistency.
    Structure,
    /// The backend failed.
    Engine,
    /// Connection or transaction misuse.
    Facade,
}

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("format error: {0}")]
    Format(FormatError),

    #[error("logic error: {0}")]
    Logic(LogicError),

    #[error("structure error: {0}")]
    Structure(StructureError),

    #[error("engine error: {0}")]
    Engine(EngineError),

    #[error("a transaction is already active")]
    TransactionActive,

    #[error("no transaction is active")]
    NoTransaction,

    #[error("unknown engine: {0}")]
    UnknownEngine(String),

    #[error("expected {expected} response, got {found}")]
    UnexpectedResponse {
        expected: &'static str,
        found: &'static str,
    },

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SdkError::Format(_) => ErrorKind::Format,
            SdkError::Logic(_) => ErrorKind::Logic,
            SdkError::Structure(_) => ErrorKind::Structure,
            SdkError::Engine(_) => ErrorKind::Engine,
            SdkError::TransactionActive
            | SdkError::NoTransaction
            | SdkError::UnknownEngine(_)
            | SdkError::UnexpectedResponse { .. }
            | SdkError::Config(_)
            | SdkError::Io(_) => ErrorKind::Facade,
        }
    }
}

// Wrapped errors are unwrapped to the layer that raised them, so `kind()`
// reports a format problem found deep in the logic layer as `Format`.

impl From<FormatError> for SdkError {
    fn from(err: FormatError) -> Self {
        SdkError::Format(err)
    }
}

impl From<EngineError> for SdkError {
    fn from(err: EngineError) -> Self {
        SdkError::Engine(err)
    }
}

impl From<StructureError> for SdkError {
    fn from(err: StructureError) -> Self {
        match err {
            StructureError::Format(e) => SdkError::Format(e),
            StructureError::Engine(e) => SdkError::Engine(e),
            other => SdkError::Structure(other),
        }
    }
}

impl From<LogicError> for SdkError {
    fn from(err: LogicError) -> Self {
        match err {
            LogicError::Format(e) => SdkError::Format(e),
            LogicError::Engine(e) => SdkError::Engine(e),
            LogicError::Structure(e) => e.into(),
            other => SdkError::Logic(other),
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
