// 📐 Shape Layer - Collections, tables and the record contract
// The backing store only knows named tables of string cells; typed entities
// convert to and from rows through the Record trait.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StorageError;

// ============================================================================
// COLLECTIONS
// ============================================================================

/// One of the three entity collections (also the audit log scope)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Accounts,
    Claims,
    Policies,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Accounts, Collection::Claims, Collection::Policies];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Accounts => "Accounts",
            Collection::Claims => "Claims",
            Collection::Policies => "Policies",
        }
    }

    /// SQL table name
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Accounts => "accounts",
            Collection::Claims => "claims",
            Collection::Policies => "policies",
        }
    }

    /// Persisted column headers, in canonical order
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Collection::Accounts => &["AccountId", "Name", "Age", "City", "State", "Pincode"],
            Collection::Claims => &[
                "Id",
                "CreatedDate",
                "CaseNumber",
                "AccountId",
                "HAN",
                "BillAmount",
                "Status",
            ],
            Collection::Policies => &["HAN", "Policy Name"],
        }
    }

    /// Identifier column; also the second header of this collection's audit log
    pub fn key_column(&self) -> &'static str {
        match self {
            Collection::Accounts => "AccountId",
            Collection::Claims => "Id",
            Collection::Policies => "HAN",
        }
    }

    /// Audit log headers: Timestamp, <key>, Column, OldValue, NewValue
    pub fn audit_columns(&self) -> [&'static str; 5] {
        ["Timestamp", self.key_column(), "Column", "OldValue", "NewValue"]
    }

    /// Message for a lookup by identifier that matched nothing
    pub fn not_found_message(&self) -> &'static str {
        match self {
            Collection::Accounts => "Account not found.",
            Collection::Claims => "Claim not found.",
            Collection::Policies => "Policy not found.",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accounts" | "account" => Ok(Collection::Accounts),
            "claims" | "claim" => Ok(Collection::Claims),
            "policies" | "policy" => Ok(Collection::Policies),
            _ => Err(format!(
                "Unknown collection {}. Please provide one from: Accounts, Claims, Policies",
                s
            )),
        }
    }
}

// ============================================================================
// TABLE
// ============================================================================

/// Ordered sequence of equal-schema rows, as exchanged with the backing store
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Empty table carrying the collection's canonical headers
    pub fn empty(collection: Collection) -> Self {
        Table {
            columns: collection.columns().iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_records<R: Record>(records: &[R]) -> Self {
        let mut table = Table::empty(R::COLLECTION);
        table.rows = records.iter().map(Record::to_row).collect();
        table
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Decode rows into typed records.
    ///
    /// Columns are matched by header name, so a store that reorders columns
    /// still decodes. Extra columns are ignored; missing ones are an error.
    pub fn into_records<R: Record>(self) -> Result<Vec<R>, StorageError> {
        let collection = R::COLLECTION;
        let mut positions = Vec::with_capacity(collection.columns().len());
        for column in collection.columns() {
            let idx = self
                .columns
                .iter()
                .position(|c| c.trim() == *column)
                .ok_or_else(|| StorageError::Schema {
                    collection,
                    detail: format!("missing column {}", column),
                })?;
            positions.push(idx);
        }

        self.rows
            .iter()
            .enumerate()
            .map(|(n, row)| {
                let ordered: Vec<String> = positions
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or_default())
                    .collect();
                R::from_row(&ordered).map_err(|detail| StorageError::Schema {
                    collection,
                    detail: format!("row {}: {}", n + 1, detail),
                })
            })
            .collect()
    }
}

// ============================================================================
// RECORD CONTRACT
// ============================================================================

/// A typed entity stored as one row of a collection
pub trait Record: Sized + Clone {
    const COLLECTION: Collection;

    /// Value of the identifier column
    fn key(&self) -> &str;

    /// Cells in `COLLECTION.columns()` order
    fn to_row(&self) -> Vec<String>;

    /// Parse cells given in `COLLECTION.columns()` order
    fn from_row(row: &[String]) -> Result<Self, String>;
}

/// Columns whose cell differs between two versions of the same record,
/// as (column, old, new)
pub fn changed_cells<R: Record>(before: &R, after: &R) -> Vec<(&'static str, String, String)> {
    R::COLLECTION
        .columns()
        .iter()
        .zip(before.to_row().into_iter().zip(after.to_row()))
        .filter(|(_, (old, new))| old != new)
        .map(|(column, (old, new))| (*column, old, new))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Policy;

    #[test]
    fn test_collection_parsing() {
        assert_eq!("claims".parse::<Collection>().unwrap(), Collection::Claims);
        assert_eq!("Accounts".parse::<Collection>().unwrap(), Collection::Accounts);
        assert!("sheets".parse::<Collection>().is_err());
    }

    #[test]
    fn test_audit_headers_per_collection() {
        assert_eq!(Collection::Accounts.audit_columns()[1], "AccountId");
        assert_eq!(Collection::Claims.audit_columns()[1], "Id");
        assert_eq!(Collection::Policies.audit_columns()[1], "HAN");
    }

    #[test]
    fn test_not_found_messages_are_singular() {
        assert_eq!(Collection::Accounts.not_found_message(), "Account not found.");
        assert_eq!(Collection::Claims.not_found_message(), "Claim not found.");
        assert_eq!(Collection::Policies.not_found_message(), "Policy not found.");
    }

    #[test]
    fn test_into_records_tolerates_column_order() {
        let table = Table {
            columns: vec!["Policy Name".to_string(), "HAN".to_string()],
            rows: vec![vec!["Gold Cover".to_string(), "HAN-1".to_string()]],
        };

        let policies: Vec<Policy> = table.into_records().unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].han, "HAN-1");
        assert_eq!(policies[0].policy_name, "Gold Cover");
    }

    #[test]
    fn test_into_records_missing_column() {
        let table = Table {
            columns: vec!["HAN".to_string()],
            rows: vec![],
        };

        let err = table.into_records::<Policy>().unwrap_err();
        assert!(matches!(err, StorageError::Schema { collection: Collection::Policies, .. }));
    }

    #[test]
    fn test_changed_cells_only_reports_differences() {
        let before = Policy::new("HAN-1", "Gold Cover");
        let mut after = before.clone();
        after.policy_name = "Platinum Cover".to_string();

        let changes = changed_cells(&before, &after);
        assert_eq!(
            changes,
            vec![("Policy Name", "Gold Cover".to_string(), "Platinum Cover".to_string())]
        );
    }
}
