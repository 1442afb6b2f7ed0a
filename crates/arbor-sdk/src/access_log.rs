use std::num::NonZeroUsize;

use lru::LruCache;

use arbor_types::ObjectId;

/// Recently touched objects with per-object hit counts.
///
/// Bounded; the least recently touched object is evicted first.
pub struct AccessLog {
    entries: LruCache<ObjectId, u64>,
}

impl AccessLog {
    /// A log holding up to `capacity` objects (at least one).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
        }
    }

    pub fn touch(&mut self, id: ObjectId) {
        match self.entries.get_mut(&id) {
            Some(hits) => *hits += 1,
            None => {
                self.entries.put(id, 1);
            }
        }
    }

    pub fn forget(&mut self, id: ObjectId) {
        self.entries.pop(&id);
    }

    /// Most recent first.
    pub fn recent(&self) -> Vec<(ObjectId, u64)> {
        self.entries.iter().map(|(id, hits)| (*id, *hits)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for AccessLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLog")
            .field("len", &self.entries.len())
            .field("cap", &self.entries.cap())
            .finish()
    }
}
