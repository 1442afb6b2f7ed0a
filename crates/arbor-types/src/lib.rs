//! Foundation types for Arbor.
//!
//! Arbor stores arbitrarily nested documents by decomposing them into leaf
//! fields, one relational table per distinct leaf path. This crate holds the
//! vocabulary every other Arbor crate speaks.
//!
//! # Key Types
//!
//! - [`ObjectId`] — monotonically assigned identifier of a stored document
//! - [`Value`] — a document tree (scalars, lists, string-keyed maps)
//! - [`Scalar`] / [`TypeTag`] — leaf values and their storage type tags
//! - [`Path`] / [`PathElem`] — addresses inside a document, possibly masked
//! - [`Field`] — a concrete (path, scalar) leaf
//! - [`Condition`] — search predicate tree with inversion normalization

pub mod condition;
pub mod error;
pub mod field;
pub mod object;
pub mod path;
pub mod tree;
pub mod value;

pub use condition::{Comparator, Condition, Connective, Term};
pub use error::{FormatError, FormatResult};
pub use field::Field;
pub use object::ObjectId;
pub use path::{column_name, Ancestors, Path, PathElem, ANY};
pub use tree::{build, flatten, subtree};
pub use value::{Scalar, TypeTag, Value};
