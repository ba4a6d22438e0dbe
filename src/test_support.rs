// Shared fixtures for unit tests: instrumented stores and audit logs

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::audit::{AuditEntry, AuditLog};
use crate::db::{EntityStore, MemoryStore};
use crate::error::{AuditError, StorageError};
use crate::schema::{Collection, Table};

/// Memory store that counts reads and can be told to fail writes
pub struct ProbeStore {
    inner: MemoryStore,
    reads: AtomicUsize,
    writes_left: Mutex<HashMap<Collection, usize>>,
}

impl ProbeStore {
    pub fn new() -> Self {
        ProbeStore {
            inner: MemoryStore::new(),
            reads: AtomicUsize::new(0),
            writes_left: Mutex::new(HashMap::new()),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Allow `n` more successful writes to `collection`, then report it locked
    pub fn fail_writes_after(&self, collection: Collection, n: usize) {
        self.writes_left.lock().unwrap().insert(collection, n);
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl EntityStore for ProbeStore {
    fn read(&self, collection: Collection) -> Result<Table, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(collection)
    }

    fn write(&self, collection: Collection, table: &Table) -> Result<(), StorageError> {
        let mut left = self.writes_left.lock().unwrap();
        if let Some(n) = left.get_mut(&collection) {
            if *n == 0 {
                return Err(StorageError::Locked { collection });
            }
            *n -= 1;
        }
        drop(left);
        self.inner.write(collection, table)
    }
}

/// Audit log whose every append fails
pub struct BrokenAuditLog;

impl AuditLog for BrokenAuditLog {
    fn append(&self, kind: Collection, _entry: &AuditEntry) -> Result<(), AuditError> {
        Err(AuditError::Locked { kind })
    }

    fn history(&self, _kind: Collection, _target_id: &str) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(Vec::new())
    }
}
