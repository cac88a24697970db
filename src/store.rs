use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::encoding::Data;

/// Largest accepted single entry, in bytes (exclusive)
pub const MAX_ENTRY_BYTES: usize = 25 * 1024 * 1024;

/// Largest accepted sum of all entries, in bytes (exclusive)
pub const MAX_TOTAL_BYTES: usize = 50 * 1024 * 1024;

/// Which quota a rejected write ran into
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaError {
    #[error("value size {size} bytes reaches the per-entry limit of {limit} bytes")]
    Entry { size: usize, limit: usize },

    #[error("store size would become {total} bytes, reaching the limit of {limit} bytes")]
    Total { total: usize, limit: usize },
}

struct Entry {
    value: Data,
    size: usize,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Running sum of every entry's `size`
    total: usize,
}

/// In-memory key-value store with byte-size quotas.
///
/// A single lock guards both the map and the running total, so the aggregate
/// quota check and the commit happen in one critical section. Reads take the
/// shared side of the same lock and never see a half-applied write.
pub struct SharedStore {
    inner: RwLock<Inner>,
    max_entry: usize,
    max_total: usize,
}

impl SharedStore {
    /// Create a new empty store with the default quotas
    pub fn new() -> Self {
        Self::with_limits(MAX_ENTRY_BYTES, MAX_TOTAL_BYTES)
    }

    /// Create a new empty store with custom quotas
    pub fn with_limits(max_entry: usize, max_total: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_entry,
            max_total,
        }
    }

    // A panicking writer can only poison the lock after the map and total
    // were updated together, so the data behind a poisoned lock is still
    // consistent.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Get an independent copy of the value stored under `key`
    pub fn get(&self, key: &str) -> Option<Data> {
        self.read().entries.get(key).map(|e| e.value.clone())
    }

    /// Insert or replace `key`. Returns `false` if a quota would be violated,
    /// in which case the store is left untouched.
    pub fn update(&self, key: impl Into<String>, value: Data) -> bool {
        let key = key.into();
        match self.try_update(key.clone(), value) {
            Ok(()) => true,
            Err(e) => {
                warn!("Rejected update of '{}': {}", key, e);
                false
            }
        }
    }

    /// Like [`update`](Self::update) but reports which quota was hit
    pub fn try_update(&self, key: String, value: Data) -> Result<(), QuotaError> {
        // Sizing walks the whole value; keep it out of the critical section
        let size = value.deep_size();
        if size >= self.max_entry {
            return Err(QuotaError::Entry {
                size,
                limit: self.max_entry,
            });
        }

        let mut inner = self.write();
        let replaced = inner.entries.get(&key).map_or(0, |e| e.size);
        let total = inner.total - replaced + size;
        if total >= self.max_total {
            return Err(QuotaError::Total {
                total,
                limit: self.max_total,
            });
        }

        debug!("Stored '{}' ({} bytes, total {} bytes)", key, size, total);
        inner.entries.insert(key, Entry { value, size });
        inner.total = total;
        Ok(())
    }

    /// Remove `key`, returning whether it existed
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.write();
        match inner.entries.remove(key) {
            Some(entry) => {
                inner.total -= entry.size;
                true
            }
            None => false,
        }
    }

    /// Remove `key` only if it currently holds `expected`.
    ///
    /// Lets a reader acknowledge a value it consumed without clobbering a
    /// newer value written in between.
    pub fn compare_and_delete(&self, key: &str, expected: &Data) -> bool {
        let mut inner = self.write();
        let matches = inner
            .entries
            .get(key)
            .is_some_and(|e| &e.value == expected);
        if !matches {
            return false;
        }
        if let Some(entry) = inner.entries.remove(key) {
            inner.total -= entry.size;
        }
        true
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of all entry sizes, in bytes
    pub fn total_size(&self) -> usize {
        self.read().total
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}
