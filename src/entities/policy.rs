// 📄 Policy Entity - HAN (policy key) and its display name
//
// Both HAN and Policy Name are unique and non-empty. Only the name is
// editable; HAN is the identity claims point at.

use serde::{Deserialize, Serialize};

use super::{cell, require_text, Patch};
use crate::error::LedgerResult;
use crate::schema::{Collection, Record};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(rename = "HAN")]
    pub han: String,

    #[serde(rename = "Policy Name")]
    pub policy_name: String,
}

impl Policy {
    pub fn new(han: impl Into<String>, policy_name: impl Into<String>) -> Self {
        Policy {
            han: han.into(),
            policy_name: policy_name.into(),
        }
    }
}

impl Record for Policy {
    const COLLECTION: Collection = Collection::Policies;

    fn key(&self) -> &str {
        &self.han
    }

    fn to_row(&self) -> Vec<String> {
        vec![self.han.clone(), self.policy_name.clone()]
    }

    fn from_row(row: &[String]) -> Result<Self, String> {
        Ok(Policy {
            han: cell(row, 0, "HAN")?.to_string(),
            policy_name: cell(row, 1, "Policy Name")?.to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewPolicy {
    pub han: String,
    pub policy_name: String,
}

impl NewPolicy {
    pub fn validate(&self) -> LedgerResult<()> {
        require_text(&self.han, "HAN")?;
        require_text(&self.policy_name, "Policy Name")
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PolicyUpdate {
    #[serde(default)]
    pub policy_name: Option<String>,
}

impl Patch for PolicyUpdate {
    type Target = Policy;

    fn validate(&self) -> LedgerResult<()> {
        match &self.policy_name {
            Some(name) => require_text(name, "Policy Name"),
            None => Ok(()),
        }
    }

    fn assignments(&self) -> Vec<(&'static str, String)> {
        self.policy_name
            .iter()
            .map(|name| ("Policy Name", name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_policy_requires_both_fields() {
        let ok = NewPolicy {
            han: "HAN-1".to_string(),
            policy_name: "Gold".to_string(),
        };
        assert!(ok.validate().is_ok());

        let blank = NewPolicy {
            han: "".to_string(),
            policy_name: "Gold".to_string(),
        };
        assert_eq!(blank.validate().unwrap_err().to_string(), "HAN cannot be empty.");
    }

    #[test]
    fn test_policy_update_assignments() {
        let update = PolicyUpdate {
            policy_name: Some("Platinum".to_string()),
        };
        assert_eq!(update.assignments(), vec![("Policy Name", "Platinum".to_string())]);
        assert!(PolicyUpdate::default().is_empty());
    }
}
