//! In-memory collection: the single source of truth for records.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::model::{Record, Task};

/// Ordered, volatile collection of records addressable by id.
///
/// Cloning yields another handle to the same records, so the composition root
/// can hand one collection to the query and the mutation side. Insertion order
/// is preserved and there are no secondary indices. Nothing is persisted.
pub struct Collection<R> {
    name: &'static str,
    records: Arc<Mutex<Vec<R>>>,
}

/// Collection of [`Task`] records.
pub type TaskStore = Collection<Task>;

impl<R> Clone for Collection<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            records: Arc::clone(&self.records),
        }
    }
}

impl<R> fmt::Debug for Collection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("len", &self.lock().len())
            .finish()
    }
}

impl<R: Record> Collection<R> {
    /// Creates an empty collection. `name` only shows up in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Appends every record whose id is not present yet, keeping input order.
    ///
    /// Duplicates (against the collection and within `records`) are dropped
    /// silently. Calling this twice with the same input is the same as once.
    pub fn insert(&self, records: Vec<R>) {
        let mut guard = self.lock();
        let mut accepted = Vec::new();
        for record in records {
            if guard.iter().any(|r| r.id() == record.id()) {
                continue;
            }
            accepted.push(record.id().to_string());
            guard.push(record);
        }

        if accepted.is_empty() {
            debug!(collection = self.name, "no new records to insert (all already exist)");
        } else {
            info!(collection = self.name, ids = ?accepted, "inserted records");
        }
    }

    /// Snapshot of every record in order. Mutating the result does not touch the
    /// collection.
    pub fn find_many(&self) -> Vec<R> {
        debug!(collection = self.name, "querying all records");
        self.lock().clone()
    }

    /// Snapshot of the records matching `predicate`, in order.
    pub fn find_where<P>(&self, predicate: P) -> Vec<R>
    where
        P: Fn(&R) -> bool,
    {
        self.lock().iter().filter(|&r| predicate(r)).cloned().collect()
    }

    /// Appends `record` without checking for an existing id.
    ///
    /// Unlike [`insert`](Self::insert) this never drops anything, so two
    /// records may end up sharing an id.
    pub fn add(&self, record: R) {
        info!(collection = self.name, id = record.id(), "added record");
        self.lock().push(record);
    }

    /// Merges `patch` into the first record with `id` and returns the result.
    ///
    /// Returns `None` when no record matches; the collection is left unchanged.
    pub fn update(&self, id: &str, patch: &R::Patch) -> Option<R> {
        let mut guard = self.lock();
        let record = guard.iter_mut().find(|r| r.id() == id)?;
        record.merge(patch);
        info!(collection = self.name, id, "updated record");
        Some(record.clone())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when the collection holds no records.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<R> Collection<R> {
    // Every critical section is a plain Vec operation, so a poisoned lock still
    // guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Vec<R>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new("tasks")
    }
}
