// ✍️ Mutation Coordinator - every write to the Entity Store goes through here
//
// Per write:
// 1. validate the payload (no storage side effect on failure)
// 2. take the collection lock, read the whole collection, change it
// 3. write the whole collection back
// 4. invalidate the view cache
// 5. append audit entries (updates only)
//
// Updates persist field by field. If a persist fails the remaining fields are
// skipped and the error returned; fields already persisted in that call stay.
// Audit appends run after the data write and never undo it: a failed append
// is logged and reported in MutationOutcome::audit_failures.
// Deletes are not audited.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

use crate::audit::AuditLog;
use crate::cache::{Invalidation, ViewCache};
use crate::db::{read_records, write_records, EntityStore};
use crate::entities::{
    assign, next_case_number, Account, AccountUpdate, Claim, ClaimUpdate, NewAccount, NewClaim,
    NewPolicy, Patch, Policy, PolicyUpdate,
};
use crate::error::{LedgerError, LedgerResult, StorageError};
use crate::schema::{changed_cells, Collection, Record};

/// What a successful write did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    /// Identifier of the created / updated / deleted record
    pub id: String,
    /// Columns that actually changed (updates only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<String>,
    /// Audit appends that failed after the data was written
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub audit_failures: Vec<String>,
}

impl MutationOutcome {
    fn for_id(id: &str) -> Self {
        MutationOutcome {
            id: id.to_string(),
            changed: Vec::new(),
            audit_failures: Vec::new(),
        }
    }
}

/// One lock per collection: writes to Claims never wait on Accounts
#[derive(Default)]
struct CollectionLocks {
    accounts: Mutex<()>,
    claims: Mutex<()>,
    policies: Mutex<()>,
}

impl CollectionLocks {
    fn lock(&self, collection: Collection) -> MutexGuard<'_, ()> {
        let mutex = match collection {
            Collection::Accounts => &self.accounts,
            Collection::Claims => &self.claims,
            Collection::Policies => &self.policies,
        };
        // guards no data, so a poisoned lock is still a valid lock
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct MutationCoordinator {
    store: Arc<dyn EntityStore>,
    audit: Arc<dyn AuditLog>,
    cache: Arc<ViewCache>,
    locks: CollectionLocks,
}

impl MutationCoordinator {
    pub fn new(store: Arc<dyn EntityStore>, audit: Arc<dyn AuditLog>, cache: Arc<ViewCache>) -> Self {
        MutationCoordinator {
            store,
            audit,
            cache,
            locks: CollectionLocks::default(),
        }
    }

    // ========================================================================
    // CREATE
    // ========================================================================

    pub fn create_account(&self, fields: NewAccount) -> LedgerResult<MutationOutcome> {
        fields.validate()?;

        let _guard = self.locks.lock(Collection::Accounts);
        let mut accounts: Vec<Account> = read_records(self.store.as_ref())?;
        let account = Account::new(fields);
        let id = account.account_id.clone();
        accounts.push(account);

        self.persist(&accounts, Invalidation::Account(id.clone()))?;
        info!(account_id = %id, "account created");
        Ok(MutationOutcome::for_id(&id))
    }

    pub fn create_claim(&self, fields: NewClaim) -> LedgerResult<MutationOutcome> {
        let status = fields.validate()?;
        self.require_account(&fields.account_id)?;
        self.require_policy(&fields.han)?;

        let _guard = self.locks.lock(Collection::Claims);
        let mut claims: Vec<Claim> = read_records(self.store.as_ref())?;
        let claim = Claim::new(&fields, status, next_case_number(&claims)?);
        let id = claim.id.clone();
        let case_number = claim.case_number.clone();
        claims.push(claim);

        self.persist(&claims, Invalidation::Account(fields.account_id.clone()))?;
        info!(claim_id = %id, case_number = %case_number, "claim created");
        Ok(MutationOutcome::for_id(&id))
    }

    pub fn create_policy(&self, fields: NewPolicy) -> LedgerResult<MutationOutcome> {
        fields.validate()?;

        let _guard = self.locks.lock(Collection::Policies);
        let mut policies: Vec<Policy> = read_records(self.store.as_ref())?;
        if policies.iter().any(|p| p.han == fields.han) {
            return Err(LedgerError::validation("Policy already exists."));
        }
        if policies.iter().any(|p| p.policy_name == fields.policy_name) {
            return Err(LedgerError::validation("Policy name already exists."));
        }
        let policy = Policy::new(fields.han, fields.policy_name);
        let id = policy.han.clone();
        policies.push(policy);

        self.persist(&policies, Invalidation::All)?;
        info!(han = %id, "policy created");
        Ok(MutationOutcome::for_id(&id))
    }

    // ========================================================================
    // UPDATE
    // ========================================================================

    pub fn update_account(&self, account_id: &str, update: &AccountUpdate) -> LedgerResult<MutationOutcome> {
        self.apply_update(account_id, update, Invalidation::Account(account_id.to_string()), |_, _| Ok(()))
    }

    pub fn update_claim(&self, claim_id: &str, update: &ClaimUpdate) -> LedgerResult<MutationOutcome> {
        // Claims may move between accounts, so every cached view is suspect
        self.apply_update(claim_id, update, Invalidation::All, |_, _| {
            if let Some(account_id) = &update.account_id {
                self.require_account(account_id)?;
            }
            if let Some(han) = &update.han {
                self.require_policy(han)?;
            }
            Ok(())
        })
    }

    pub fn update_policy(&self, han: &str, update: &PolicyUpdate) -> LedgerResult<MutationOutcome> {
        self.apply_update(han, update, Invalidation::All, |policies: &[Policy], idx| {
            if let Some(name) = &update.policy_name {
                let taken = policies
                    .iter()
                    .enumerate()
                    .any(|(i, p)| i != idx && &p.policy_name == name);
                if taken {
                    return Err(LedgerError::validation("Policy name already exists."));
                }
            }
            Ok(())
        })
    }

    /// Shared update path. `check` runs under the collection lock, after the
    /// target is found and before anything is written.
    fn apply_update<P, F>(
        &self,
        id: &str,
        patch: &P,
        scope: Invalidation,
        check: F,
    ) -> LedgerResult<MutationOutcome>
    where
        P: Patch,
        F: FnOnce(&[P::Target], usize) -> LedgerResult<()>,
    {
        let collection = P::Target::COLLECTION;
        if patch.is_empty() {
            return Err(LedgerError::NothingToModify);
        }
        patch.validate()?;

        let _guard = self.locks.lock(collection);
        let mut records: Vec<P::Target> = read_records(self.store.as_ref())?;
        let idx = records
            .iter()
            .position(|r| r.key() == id)
            .ok_or_else(|| LedgerError::not_found(collection.not_found_message()))?;
        check(&records, idx)?;

        let mut outcome = MutationOutcome::for_id(id);
        for (column, cell) in patch.assignments() {
            let updated = assign(&records[idx], column, cell).map_err(LedgerError::Validation)?;
            let changes = changed_cells(&records[idx], &updated);
            if changes.is_empty() {
                continue;
            }

            records[idx] = updated;
            if let Err(err) = self.persist(&records, scope.clone()) {
                error!(
                    collection = %collection,
                    id,
                    column,
                    applied = ?outcome.changed,
                    error = %err,
                    "persist failed mid-update, earlier fields stay committed"
                );
                return Err(err.into());
            }

            for (changed_column, old, new) in changes {
                if let Err(err) = self.audit.record(collection, id, changed_column, &old, &new) {
                    error!(collection = %collection, id, column = changed_column, error = %err, "audit append failed");
                    outcome.audit_failures.push(format!("{}: {}", changed_column, err));
                }
                outcome.changed.push(changed_column.to_string());
            }
        }

        info!(collection = %collection, id, changed = ?outcome.changed, "update applied");
        Ok(outcome)
    }

    // ========================================================================
    // DELETE
    // ========================================================================

    pub fn delete_account(&self, account_id: &str) -> LedgerResult<MutationOutcome> {
        self.delete::<Account>(account_id, Invalidation::Account(account_id.to_string()))
    }

    pub fn delete_claim(&self, claim_id: &str) -> LedgerResult<MutationOutcome> {
        self.delete::<Claim>(claim_id, Invalidation::All)
    }

    /// Claims referencing the policy are left alone; the view shows them as
    /// "Not Available".
    pub fn delete_policy(&self, han: &str) -> LedgerResult<MutationOutcome> {
        self.delete::<Policy>(han, Invalidation::All)
    }

    fn delete<R: Record>(&self, id: &str, scope: Invalidation) -> LedgerResult<MutationOutcome> {
        let collection = R::COLLECTION;
        let _guard = self.locks.lock(collection);
        let mut records: Vec<R> = read_records(self.store.as_ref())?;
        let idx = records
            .iter()
            .position(|r| r.key() == id)
            .ok_or_else(|| LedgerError::not_found(collection.not_found_message()))?;
        records.remove(idx);

        self.persist(&records, scope)?;
        // TODO: deletions leave no audit trail; add a row-removed entry once the log format has a slot for it
        warn!(collection = %collection, id, "record deleted (not audited)");
        Ok(MutationOutcome::for_id(id))
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    /// Replace the collection, then drop cached views that may include it
    fn persist<R: Record>(&self, records: &[R], scope: Invalidation) -> Result<(), StorageError> {
        write_records(self.store.as_ref(), records)?;
        self.cache.invalidate(scope);
        Ok(())
    }

    fn require_account(&self, account_id: &str) -> LedgerResult<()> {
        let accounts: Vec<Account> = read_records(self.store.as_ref())?;
        if !accounts.iter().any(|a| a.account_id == account_id) {
            return Err(LedgerError::validation("Account is not registered."));
        }
        Ok(())
    }

    fn require_policy(&self, han: &str) -> LedgerResult<()> {
        let policies: Vec<Policy> = read_records(self.store.as_ref())?;
        if !policies.iter().any(|p| p.han == han) {
            return Err(LedgerError::validation("Policy is not registered."));
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
