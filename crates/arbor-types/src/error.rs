use thiserror::Error;

/// Malformed input rejected before any engine work happens.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("mapping keys must be non-empty strings")]
    EmptyKey,

    #[error("list index must be non-negative, got {0}")]
    NegativeIndex(i64),

    #[error("invalid path element: {0}")]
    InvalidElement(String),

    #[error("path {0} contains a wildcard where a concrete path is required")]
    MaskNotAllowed(String),

    #[error("path {0} does not address a list element")]
    NotAListElement(String),

    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    #[error("invalid signature {0:?}")]
    InvalidSignature(String),

    #[error("unknown type tag {0:?}")]
    UnknownTypeTag(String),
}

/// Result alias for format validation.
pub type FormatResult<T> = Result<T, FormatError>;
