use std::path::PathBuf;

/// Errors raised by an engine backend.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Error reported by SQLite.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error while preparing the database file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `must-exist` open mode and the file is missing.
    #[error("database file does not exist: {}", .0.display())]
    MissingDatabase(PathBuf),

    /// A stored value could not be decoded into the expected type.
    #[error("cannot decode {found} as {expected}")]
    Decode {
        expected: &'static str,
        found: &'static str,
    },

    /// `begin` while a transaction is open.
    #[error("a transaction is already active")]
    TransactionActive,

    /// `commit` or `rollback` without an open transaction.
    #[error("no active transaction")]
    NoTransaction,
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
