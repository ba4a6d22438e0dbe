// ⏱️ View Cache - time-bounded memo over the Join Engine
//
// The whole merged view is cached once under FULL_VIEW_KEY; a per-account
// read is a filter over that snapshot. Entries expire by age (lease), not by
// access. The entry map lock is held while recomputing, so concurrent misses
// wait for one computation instead of each reading every collection.
// With the single global key the capacity bound never triggers.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult, StorageError};
use crate::join::{CustomerRow, JoinEngine, MergedView};

/// Cache-wide key holding the full merged view
pub const FULL_VIEW_KEY: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a computed view stays fresh; zero disables caching
    pub lease_duration: Duration,
    /// Maximum entries kept; 0 means unbounded
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            lease_duration: Duration::from_secs(60),
            capacity: 0,
        }
    }
}

/// What a write made stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Account(String),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CacheEntry {
    view: Arc<MergedView>,
    computed_at: Instant,
}

pub struct ViewCache {
    engine: JoinEngine,
    config: CacheConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ViewCache {
    pub fn new(engine: JoinEngine, config: CacheConfig) -> Self {
        ViewCache {
            engine,
            config,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.lease_duration > Duration::ZERO
    }

    /// Customer view rows for one account.
    ///
    /// An account always has at least one joined row, so an empty result can
    /// only mean the account does not exist.
    pub fn get_view_for(&self, account_id: &str) -> LedgerResult<Vec<CustomerRow>> {
        let view = self.full_view()?;
        let rows = view.rows_for(account_id);
        if rows.is_empty() {
            debug!(account_id, "no view rows for account");
            return Err(LedgerError::not_found("Account not found."));
        }
        Ok(rows)
    }

    /// The full merged view, from cache when fresh
    pub fn full_view(&self) -> Result<Arc<MergedView>, StorageError> {
        if !self.enabled() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::new(self.engine.compute_view()?));
        }

        let mut entries = self.lock_entries();
        if let Some(entry) = entries.get(FULL_VIEW_KEY) {
            if entry.computed_at.elapsed() < self.config.lease_duration {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&entry.view));
            }
            debug!("cached view expired");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let view = Arc::new(self.engine.compute_view()?);
        self.store_entry(&mut entries, FULL_VIEW_KEY, Arc::clone(&view), Instant::now());
        Ok(view)
    }

    /// Drop every entry that may contain data the write touched
    pub fn invalidate(&self, scope: Invalidation) {
        let mut entries = self.lock_entries();
        let before = entries.len();
        match &scope {
            Invalidation::All => entries.clear(),
            Invalidation::Account(account_id) => {
                entries.retain(|key, _| key != FULL_VIEW_KEY && key != account_id)
            }
        }
        debug!(?scope, dropped = before - entries.len(), "view cache invalidated");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.lock_entries().len(),
        }
    }

    fn store_entry(
        &self,
        entries: &mut HashMap<String, CacheEntry>,
        key: &str,
        view: Arc<MergedView>,
        now: Instant,
    ) {
        let lease = self.config.lease_duration;
        entries.retain(|_, entry| now.saturating_duration_since(entry.computed_at) < lease);
        entries.insert(key.to_string(), CacheEntry { view, computed_at: now });

        if self.config.capacity == 0 {
            return;
        }

        // Least-recently-computed goes first
        while entries.len() > self.config.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.computed_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                    info!(key = %k, "view cache entry evicted");
                }
                None => break,
            }
        }
    }

    /// A panic mid-update leaves the map suspect; it is only derived data,
    /// so start over empty.
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("view cache lock poisoned, discarding cached views");
                let mut guard = poisoned.into_inner();
                guard.clear();
                self.entries.clear_poison();
                guard
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
