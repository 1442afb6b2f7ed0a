//! High-level SDK for Arbor.
//!
//! A [`Connection`] owns one engine and turns calls into typed
//! [`Request`]s, executed immediately or queued until commit depending on
//! the transaction mode. This is the main entry point for applications
//! embedding Arbor.

pub mod access_log;
pub mod config;
pub mod connection;
pub mod error;
pub mod request;
pub mod response;

pub use access_log::AccessLog;
pub use config::{ConnectionConfig, SQLITE};
pub use connection::Connection;
pub use error::{ErrorKind, SdkError, SdkResult};
pub use request::Request;
pub use response::Response;

// Re-export key types
pub use arbor_engine::OpenMode;
pub use arbor_logic::{RepairSummary, VerifyReport, Violation, ViolationKind};
pub use arbor_types::{
    path, Comparator, Condition, Connective, Field, FormatError, ObjectId, Path, PathElem, Scalar,
    Term, TypeTag, Value, ANY,
};
