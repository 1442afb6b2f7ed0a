use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a stored object.
///
/// IDs are handed out by the engine's monotonic counter and are never
/// reused. Object IDs stored as scalars inside documents are opaque: they do
/// not create in-database links.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(i64);

impl ObjectId {
    /// Wrap a raw engine ID.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw integer stored in the `id` column of every table.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ObjectId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl From<ObjectId> for i64 {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}
