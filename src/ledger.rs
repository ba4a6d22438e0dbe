// 🏦 Ledger - the service-facing surface
//
// Bundles the store, the cached customer view, the mutation coordinator and
// the audit log behind get/create/update/delete per entity kind.
// Every operation returns either a payload or a LedgerError; the transport
// decides how to render them.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::audit::{AuditEntry, AuditLog, CsvAuditLog, SqliteAuditLog};
use crate::cache::{CacheConfig, CacheStats, ViewCache};
use crate::config::{LedgerConfig, StoreKind};
use crate::coordinator::{MutationCoordinator, MutationOutcome};
use crate::csv_store::CsvStore;
use crate::db::{read_records, EntityStore, SqliteStore};
use crate::entities::{
    Account, AccountUpdate, Claim, ClaimUpdate, NewAccount, NewClaim, NewPolicy, Policy,
    PolicyUpdate,
};
use crate::error::{LedgerError, LedgerResult};
use crate::join::{CustomerRow, JoinEngine};
use crate::schema::{Collection, Record};

pub struct Ledger {
    store: Arc<dyn EntityStore>,
    audit: Arc<dyn AuditLog>,
    cache: Arc<ViewCache>,
    coordinator: MutationCoordinator,
}

impl Ledger {
    pub fn new(store: Arc<dyn EntityStore>, audit: Arc<dyn AuditLog>, cache_config: CacheConfig) -> Self {
        let cache = Arc::new(ViewCache::new(JoinEngine::new(Arc::clone(&store)), cache_config));
        let coordinator =
            MutationCoordinator::new(Arc::clone(&store), Arc::clone(&audit), Arc::clone(&cache));
        Ledger {
            store,
            audit,
            cache,
            coordinator,
        }
    }

    /// Open the configured backing store and audit log
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        let data_ctx = || format!("Failed to open data store {}", config.data_path.display());
        let audit_ctx = || format!("Failed to open audit log {}", config.audit_path.display());

        let store: Arc<dyn EntityStore>;
        let audit: Arc<dyn AuditLog>;
        match config.store_kind {
            StoreKind::Sqlite => {
                store = Arc::new(
                    SqliteStore::open(&config.data_path, config.busy_timeout()).with_context(data_ctx)?,
                );
                audit = Arc::new(
                    SqliteAuditLog::open(&config.audit_path, config.busy_timeout())
                        .with_context(audit_ctx)?,
                );
            }
            StoreKind::Csv => {
                store = Arc::new(CsvStore::init(&config.data_path).with_context(data_ctx)?);
                audit = Arc::new(CsvAuditLog::open(&config.audit_path).with_context(audit_ctx)?);
            }
        }

        info!(
            store = ?config.store_kind,
            data = %config.data_path.display(),
            audit = %config.audit_path.display(),
            lease_ms = config.cache_lease_ms,
            "ledger opened"
        );
        Ok(Self::new(store, audit, config.cache()))
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Merged customer view for one account (cached)
    pub fn get_customer_info(&self, account_id: &str) -> LedgerResult<Vec<CustomerRow>> {
        self.cache.get_view_for(account_id)
    }

    pub fn get_account(&self, account_id: &str) -> LedgerResult<Account> {
        self.find(account_id)
    }

    pub fn get_claim(&self, claim_id: &str) -> LedgerResult<Claim> {
        self.find(claim_id)
    }

    pub fn get_policy(&self, han: &str) -> LedgerResult<Policy> {
        self.find(han)
    }

    fn find<R: Record>(&self, id: &str) -> LedgerResult<R> {
        let records: Vec<R> = read_records(self.store.as_ref())?;
        records
            .into_iter()
            .find(|r| r.key() == id)
            .ok_or_else(|| LedgerError::not_found(R::COLLECTION.not_found_message()))
    }

    /// Audit entries for one record, oldest first
    pub fn audit_history(&self, kind: Collection, id: &str) -> LedgerResult<Vec<AuditEntry>> {
        Ok(self.audit.history(kind, id)?)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    pub fn create_account(&self, fields: NewAccount) -> LedgerResult<MutationOutcome> {
        self.coordinator.create_account(fields)
    }

    pub fn update_account(&self, id: &str, update: &AccountUpdate) -> LedgerResult<MutationOutcome> {
        self.coordinator.update_account(id, update)
    }

    pub fn delete_account(&self, id: &str) -> LedgerResult<MutationOutcome> {
        self.coordinator.delete_account(id)
    }

    pub fn create_claim(&self, fields: NewClaim) -> LedgerResult<MutationOutcome> {
        self.coordinator.create_claim(fields)
    }

    pub fn update_claim(&self, id: &str, update: &ClaimUpdate) -> LedgerResult<MutationOutcome> {
        self.coordinator.update_claim(id, update)
    }

    pub fn delete_claim(&self, id: &str) -> LedgerResult<MutationOutcome> {
        self.coordinator.delete_claim(id)
    }

    pub fn create_policy(&self, fields: NewPolicy) -> LedgerResult<MutationOutcome> {
        self.coordinator.create_policy(fields)
    }

    pub fn update_policy(&self, han: &str, update: &PolicyUpdate) -> LedgerResult<MutationOutcome> {
        self.coordinator.update_policy(han, update)
    }

    pub fn delete_policy(&self, han: &str) -> LedgerResult<MutationOutcome> {
        self.coordinator.delete_policy(han)
    }
}
