// Entity Models - Accounts, Claims, Policies
//
// Each entity has:
// - A stable identifier column (AccountId / Id / HAN)
// - A create payload (New*) validated before anything is written
// - An update payload (*Update) where every column is optional:
//   None means "leave unchanged", so empty strings and zeros are real values

pub mod account;
pub mod claim;
pub mod policy;

pub use account::{Account, AccountUpdate, NewAccount};
pub use claim::{next_case_number, Claim, ClaimStatus, ClaimUpdate, NewClaim};
pub use policy::{NewPolicy, Policy, PolicyUpdate};

use crate::error::LedgerResult;
use crate::schema::Record;

/// Partial update of one record, expressed as column assignments
pub trait Patch {
    type Target: Record;

    /// Value constraints on the supplied fields only
    fn validate(&self) -> LedgerResult<()>;

    /// Supplied fields as (column, new cell value), in column order
    fn assignments(&self) -> Vec<(&'static str, String)>;

    fn is_empty(&self) -> bool {
        self.assignments().is_empty()
    }
}

/// Apply one column assignment to a record through its row form
pub fn assign<R: Record>(record: &R, column: &str, cell: String) -> Result<R, String> {
    let mut row = record.to_row();
    let idx = R::COLLECTION
        .columns()
        .iter()
        .position(|c| *c == column)
        .ok_or_else(|| format!("unknown column {}", column))?;
    row[idx] = cell;
    R::from_row(&row)
}

pub(crate) fn require_text(value: &str, field: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(crate::error::LedgerError::validation(format!(
            "{} cannot be empty.",
            field
        )));
    }
    Ok(())
}

pub(crate) fn cell<'a>(row: &'a [String], idx: usize, column: &str) -> Result<&'a str, String> {
    row.get(idx)
        .map(|s| s.as_str())
        .ok_or_else(|| format!("missing cell for {}", column))
}
