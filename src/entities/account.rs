// 👤 Account Entity - the customer a claim is filed for
//
// AccountId is system-generated (UUID v4) and never changes.
// Name, Age, City, State and Pincode are editable values.

use serde::{Deserialize, Serialize};

use super::{cell, require_text, Patch};
use crate::error::{LedgerError, LedgerResult};
use crate::schema::{Collection, Record};

// ============================================================================
// ACCOUNT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "AccountId")]
    pub account_id: String,

    #[serde(rename = "Name")]
    pub name: String,

    /// Positive whole years
    #[serde(rename = "Age")]
    pub age: u32,

    #[serde(rename = "City")]
    pub city: String,

    #[serde(rename = "State")]
    pub state: String,

    /// Postal code, kept as text so leading zeros survive
    #[serde(rename = "Pincode")]
    pub pincode: String,
}

impl Account {
    /// Create a new account with a fresh identifier
    pub fn new(fields: NewAccount) -> Self {
        Account {
            account_id: uuid::Uuid::new_v4().to_string(),
            name: fields.name,
            age: fields.age,
            city: fields.city,
            state: fields.state,
            pincode: fields.pincode,
        }
    }
}

impl Record for Account {
    const COLLECTION: Collection = Collection::Accounts;

    fn key(&self) -> &str {
        &self.account_id
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.account_id.clone(),
            self.name.clone(),
            self.age.to_string(),
            self.city.clone(),
            self.state.clone(),
            self.pincode.clone(),
        ]
    }

    fn from_row(row: &[String]) -> Result<Self, String> {
        let age_cell = cell(row, 2, "Age")?;
        let age = age_cell
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("Age is not a whole number: {:?}", age_cell))?;

        Ok(Account {
            account_id: cell(row, 0, "AccountId")?.to_string(),
            name: cell(row, 1, "Name")?.to_string(),
            age,
            city: cell(row, 3, "City")?.to_string(),
            state: cell(row, 4, "State")?.to_string(),
            pincode: cell(row, 5, "Pincode")?.to_string(),
        })
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// Create payload
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewAccount {
    pub name: String,
    pub age: u32,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

impl NewAccount {
    pub fn validate(&self) -> LedgerResult<()> {
        require_text(&self.name, "Name")?;
        validate_age(self.age)?;
        require_text(&self.city, "City")?;
        require_text(&self.state, "State")?;
        require_text(&self.pincode, "Pincode")
    }
}

/// Update payload; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccountUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub pincode: Option<String>,
}

impl Patch for AccountUpdate {
    type Target = Account;

    fn validate(&self) -> LedgerResult<()> {
        if let Some(name) = &self.name {
            require_text(name, "Name")?;
        }
        if let Some(age) = self.age {
            validate_age(age)?;
        }
        if let Some(city) = &self.city {
            require_text(city, "City")?;
        }
        if let Some(state) = &self.state {
            require_text(state, "State")?;
        }
        if let Some(pincode) = &self.pincode {
            require_text(pincode, "Pincode")?;
        }
        Ok(())
    }

    fn assignments(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(name) = &self.name {
            out.push(("Name", name.clone()));
        }
        if let Some(age) = self.age {
            out.push(("Age", age.to_string()));
        }
        if let Some(city) = &self.city {
            out.push(("City", city.clone()));
        }
        if let Some(state) = &self.state {
            out.push(("State", state.clone()));
        }
        if let Some(pincode) = &self.pincode {
            out.push(("Pincode", pincode.clone()));
        }
        out
    }
}

fn validate_age(age: u32) -> LedgerResult<()> {
    if age == 0 {
        return Err(LedgerError::validation("Age must be a positive integer."));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewAccount {
        NewAccount {
            name: "Asha Rao".to_string(),
            age: 34,
            city: "Pune".to_string(),
            state: "Maharashtra".to_string(),
            pincode: "411001".to_string(),
        }
    }

    #[test]
    fn test_account_creation() {
        let account = Account::new(sample());
        assert!(!account.account_id.is_empty());
        assert_eq!(account.name, "Asha Rao");
        assert_eq!(account.age, 34);
    }

    #[test]
    fn test_account_row_shape() {
        let account = Account::new(sample());
        let row = account.to_row();
        assert_eq!(row.len(), Collection::Accounts.columns().len());
        assert_eq!(Account::from_row(&row).unwrap(), account);
    }

    #[test]
    fn test_account_rejects_bad_age_cell() {
        let row: Vec<String> = ["A1", "Asha", "old", "Pune", "MH", "411001"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(Account::from_row(&row).is_err());
    }

    #[test]
    fn test_new_account_validation() {
        assert!(sample().validate().is_ok());

        let mut zero_age = sample();
        zero_age.age = 0;
        let err = zero_age.validate().unwrap_err();
        assert_eq!(err.to_string(), "Age must be a positive integer.");

        let mut blank_city = sample();
        blank_city.city = "  ".to_string();
        assert_eq!(blank_city.validate().unwrap_err().to_string(), "City cannot be empty.");
    }

    #[test]
    fn test_update_assignments_only_supplied_fields() {
        let update = AccountUpdate {
            city: Some("Mumbai".to_string()),
            ..Default::default()
        };
        assert_eq!(update.assignments(), vec![("City", "Mumbai".to_string())]);
        assert!(!update.is_empty());
        assert!(AccountUpdate::default().is_empty());
    }
}
