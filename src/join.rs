// 🔗 Join Engine - the denormalized customer view
//
// Accounts LEFT JOIN Claims ON AccountId, then LEFT JOIN Policies ON HAN.
// Every account yields at least one row. A claim whose HAN has no policy
// shows the "Not Available" sentinel; the sentinel is never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{read_records, EntityStore};
use crate::entities::{Account, Claim, ClaimStatus, Policy};
use crate::error::StorageError;

/// Policy name shown when a row has no matching policy
pub const POLICY_NOT_AVAILABLE: &str = "Not Available";

/// Column headers of the merged view, in row order
pub const VIEW_COLUMNS: [&str; 13] = [
    "AccountId",
    "Name",
    "Age",
    "City",
    "State",
    "Pincode",
    "Id",
    "CreatedDate",
    "CaseNumber",
    "HAN",
    "BillAmount",
    "Status",
    "Policy Name",
];

// ============================================================================
// VIEW ROWS
// ============================================================================

/// One row of the customer view. Claim columns are None for an account
/// with no claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRow {
    #[serde(rename = "AccountId")]
    pub account_id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Age")]
    pub age: u32,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Pincode")]
    pub pincode: String,

    #[serde(rename = "Id")]
    pub claim_id: Option<String>,
    #[serde(rename = "CreatedDate")]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(rename = "CaseNumber")]
    pub case_number: Option<String>,
    #[serde(rename = "HAN")]
    pub han: Option<String>,
    #[serde(rename = "BillAmount")]
    pub bill_amount: Option<f64>,
    #[serde(rename = "Status")]
    pub status: Option<ClaimStatus>,

    #[serde(rename = "Policy Name")]
    pub policy_name: String,
}

impl CustomerRow {
    fn new(account: &Account, claim: Option<&Claim>, policy_name: &str) -> Self {
        CustomerRow {
            account_id: account.account_id.clone(),
            name: account.name.clone(),
            age: account.age,
            city: account.city.clone(),
            state: account.state.clone(),
            pincode: account.pincode.clone(),
            claim_id: claim.map(|c| c.id.clone()),
            created_date: claim.map(|c| c.created_date),
            case_number: claim.map(|c| c.case_number.clone()),
            han: claim.map(|c| c.han.clone()),
            bill_amount: claim.map(|c| c.bill_amount),
            status: claim.map(|c| c.status),
            policy_name: policy_name.to_string(),
        }
    }

    /// Cells in `VIEW_COLUMNS` order; empty claim columns render as ""
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.account_id.clone(),
            self.name.clone(),
            self.age.to_string(),
            self.city.clone(),
            self.state.clone(),
            self.pincode.clone(),
            self.claim_id.clone().unwrap_or_default(),
            self.created_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
            self.case_number.clone().unwrap_or_default(),
            self.han.clone().unwrap_or_default(),
            self.bill_amount.map(|a| a.to_string()).unwrap_or_default(),
            self.status.map(|s| s.as_str().to_string()).unwrap_or_default(),
            self.policy_name.clone(),
        ]
    }
}

/// Full merged view over one storage snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MergedView {
    pub rows: Vec<CustomerRow>,
}

impl MergedView {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows for one account, matched by exact string equality
    pub fn rows_for(&self, account_id: &str) -> Vec<CustomerRow> {
        self.rows
            .iter()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect()
    }

    /// SHA-256 over every cell, hex encoded. Equal views give equal fingerprints.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for row in &self.rows {
            for cell in row.cells() {
                hasher.update(cell.as_bytes());
                hasher.update([0x1f]);
            }
            hasher.update([0x1e]);
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// JOIN
// ============================================================================

/// Left-join the three collections. Row order follows account order, then
/// claim order within each account. With duplicate HANs the first policy wins.
pub fn join(accounts: &[Account], claims: &[Claim], policies: &[Policy]) -> MergedView {
    let mut claims_by_account: HashMap<&str, Vec<&Claim>> = HashMap::new();
    for claim in claims {
        claims_by_account
            .entry(claim.account_id.as_str())
            .or_default()
            .push(claim);
    }

    let mut policy_names: HashMap<&str, &str> = HashMap::new();
    for policy in policies {
        policy_names
            .entry(policy.han.as_str())
            .or_insert(policy.policy_name.as_str());
    }

    let mut rows = Vec::with_capacity(accounts.len().max(claims.len()));
    for account in accounts {
        match claims_by_account.get(account.account_id.as_str()) {
            Some(matched) => {
                for claim in matched {
                    let policy_name = policy_names
                        .get(claim.han.as_str())
                        .copied()
                        .unwrap_or(POLICY_NOT_AVAILABLE);
                    rows.push(CustomerRow::new(account, Some(*claim), policy_name));
                }
            }
            None => rows.push(CustomerRow::new(account, None, POLICY_NOT_AVAILABLE)),
        }
    }

    let unmatched = rows.iter().filter(|r| r.policy_name == POLICY_NOT_AVAILABLE).count();
    debug!(rows = rows.len(), unmatched_policies = unmatched, "view joined");

    MergedView { rows }
}

/// Computes the merged view from the current contents of a store
pub struct JoinEngine {
    store: Arc<dyn EntityStore>,
}

impl JoinEngine {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        JoinEngine { store }
    }

    /// Read all three collections fresh and join them. Any unreadable
    /// collection fails the whole computation.
    pub fn compute_view(&self) -> Result<MergedView, StorageError> {
        let accounts: Vec<Account> = read_records(self.store.as_ref())?;
        let claims: Vec<Claim> = read_records(self.store.as_ref())?;
        let policies: Vec<Policy> = read_records(self.store.as_ref())?;

        let view = join(&accounts, &claims, &policies);
        info!(
            accounts = accounts.len(),
            claims = claims.len(),
            policies = policies.len(),
            rows = view.len(),
            "merged view computed"
        );
        Ok(view)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{write_records, MemoryStore};
    use crate::entities::{NewAccount, NewClaim};
    use crate::schema::Collection;

    fn account(id: &str) -> Account {
        let mut account = Account::new(NewAccount {
            name: format!("Customer {}", id),
            age: 30,
            city: "Kochi".to_string(),
            state: "Kerala".to_string(),
            pincode: "682001".to_string(),
        });
        account.account_id = id.to_string();
        account
    }

    fn claim(account_id: &str, han: &str, case: &str) -> Claim {
        let fields = NewClaim {
            account_id: account_id.to_string(),
            han: han.to_string(),
            bill_amount: 250.0,
            status: "Not Paid".to_string(),
        };
        Claim::new(&fields, ClaimStatus::NotPaid, case.to_string())
    }

    #[test]
    fn test_account_without_claims_gets_one_sentinel_row() {
        let view = join(&[account("A1")], &[], &[]);

        assert_eq!(view.len(), 1);
        let row = &view.rows[0];
        assert_eq!(row.account_id, "A1");
        assert!(row.claim_id.is_none());
        assert!(row.case_number.is_none());
        assert!(row.bill_amount.is_none());
        assert!(row.status.is_none());
        assert_eq!(row.policy_name, POLICY_NOT_AVAILABLE);
    }

    #[test]
    fn test_left_join_keeps_account_then_claim_order() {
        let accounts = vec![account("A2"), account("A1")];
        let claims = vec![
            claim("A1", "HAN-1", "00000001"),
            claim("A2", "HAN-2", "00000002"),
            claim("A1", "HAN-3", "00000003"),
        ];
        let policies = vec![Policy::new("HAN-1", "Gold"), Policy::new("HAN-2", "Silver")];

        let view = join(&accounts, &claims, &policies);
        let summary: Vec<(String, String, String)> = view
            .rows
            .iter()
            .map(|r| (r.account_id.clone(), r.case_number.clone().unwrap(), r.policy_name.clone()))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("A2".to_string(), "00000002".to_string(), "Silver".to_string()),
                ("A1".to_string(), "00000001".to_string(), "Gold".to_string()),
                ("A1".to_string(), "00000003".to_string(), POLICY_NOT_AVAILABLE.to_string()),
            ]
        );
    }

    #[test]
    fn test_claims_for_unknown_accounts_are_dropped() {
        let view = join(&[account("A1")], &[claim("GHOST", "HAN-1", "00000001")], &[]);
        assert_eq!(view.len(), 1);
        assert!(view.rows[0].claim_id.is_none());
    }

    #[test]
    fn test_duplicate_han_first_policy_wins() {
        let policies = vec![Policy::new("HAN-1", "First"), Policy::new("HAN-1", "Second")];
        let view = join(&[account("A1")], &[claim("A1", "HAN-1", "00000001")], &policies);
        assert_eq!(view.rows[0].policy_name, "First");
    }

    #[test]
    fn test_compute_view_is_deterministic() {
        let store = Arc::new(MemoryStore::new());
        write_records(store.as_ref(), &[account("A1"), account("A2")]).unwrap();
        write_records(
            store.as_ref(),
            &[claim("A1", "HAN-1", "00000001"), claim("A1", "HAN-2", "00000002")],
        )
        .unwrap();
        write_records(store.as_ref(), &[Policy::new("HAN-1", "Gold")]).unwrap();

        let engine = JoinEngine::new(store);
        let first = engine.compute_view().unwrap();
        let second = engine.compute_view().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 64);
    }

    #[test]
    fn test_compute_view_fails_when_a_collection_is_missing() {
        let store = Arc::new(MemoryStore::new());
        write_records(store.as_ref(), &[account("A1")]).unwrap();
        store.remove(Collection::Policies).unwrap();

        let engine = JoinEngine::new(store);
        assert!(matches!(
            engine.compute_view(),
            Err(StorageError::Missing { collection: Collection::Policies })
        ));
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let before = join(&[account("A1")], &[], &[]);
        let mut renamed = account("A1");
        renamed.city = "Thrissur".to_string();
        let after = join(&[renamed], &[], &[]);

        assert_ne!(before.fingerprint(), after.fingerprint());
    }
}
