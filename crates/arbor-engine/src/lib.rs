//! Relational engine abstraction for Arbor.
//!
//! The structure layer never talks to a database directly. It emits SQL
//! through the [`Engine`] trait, which covers statement execution, the
//! transaction bracket, table management, object ID allocation and the
//! few dialect details (identifier quoting, column types, regex operator)
//! that differ between backends.
//!
//! # Backends
//!
//! - [`SqliteEngine`] -- SQLite through `rusqlite`, file-backed or in memory
//!
//! # Rules
//!
//! 1. Every value crosses the boundary as a [`SqlValue`].
//! 2. Table names are always passed through [`Engine::quote_identifier`].
//! 3. The `_id_counter` table belongs to the engine; higher layers only see
//!    [`Engine::next_id`].

pub mod error;
pub mod sqlite;
pub mod traits;
pub mod value;

pub use error::{EngineError, EngineResult};
pub use sqlite::SqliteEngine;
pub use traits::{Engine, OpenMode};
pub use value::SqlValue;
