//! Volatile, concurrency-safe record store.
//!
//! [`RecordStore`] maps identity keys to stored [`User`] records. It is backed
//! by a sharded [`DashMap`], so writers touching unrelated keys only contend
//! when their keys hash to the same shard, and readers never wait on a single
//! store-wide lock.
//!
//! The store is an explicit handle: it is constructed once at startup and a
//! clone is handed to every service that needs it. Clones share the same
//! underlying map.
//!
//! ## Consistency
//!
//! [`RecordStore::get_all`] walks the shards one at a time. Writes that land
//! while the walk is in progress may or may not be observed, but every
//! returned record was stored under its key at some point during the call and
//! no key is returned twice.

use dashmap::DashMap;
use greeter_tonic_core::{Error, Result, proto::User};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    records: Arc<DashMap<String, User>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record` under `key`, replacing any previous value.
    pub fn put(&self, key: impl Into<String>, record: User) {
        self.records.insert(key.into(), record);
    }

    /// Returns a clone of every record currently stored, in no particular
    /// order.
    pub fn get_all(&self) -> Vec<User> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Looks up the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no record is stored under `key`.
    pub fn get(&self, key: &str) -> Result<User> {
        self.records
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found(key))
    }

    /// Removes the record stored under `key`. Removing an absent key is a
    /// no-op.
    pub fn delete(&self, key: &str) {
        self.records.remove(key);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
