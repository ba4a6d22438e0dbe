// 🧾 Claim Entity - a bill filed against an account under a policy
//
// Id and CreatedDate are assigned on creation, CaseNumber is derived from the
// collection (next 8-digit sequence). AccountId and HAN are references that
// must resolve when written; they are not re-checked on delete of the target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{cell, require_text, Patch};
use crate::error::{LedgerError, LedgerResult};
use crate::schema::{Collection, Record};

// ============================================================================
// CLAIM STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimStatus {
    #[serde(rename = "Paid")]
    Paid,

    #[serde(rename = "Not Paid")]
    NotPaid,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Paid => "Paid",
            ClaimStatus::NotPaid => "Not Paid",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Paid" => Ok(ClaimStatus::Paid),
            "Not Paid" => Ok(ClaimStatus::NotPaid),
            _ => Err(LedgerError::validation("Status must be one of: Paid, Not Paid.")),
        }
    }
}

// ============================================================================
// CLAIM ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "CreatedDate")]
    pub created_date: DateTime<Utc>,

    /// Human-readable case number, e.g. "00001042"
    #[serde(rename = "CaseNumber")]
    pub case_number: String,

    #[serde(rename = "AccountId")]
    pub account_id: String,

    /// Policy key
    #[serde(rename = "HAN")]
    pub han: String,

    #[serde(rename = "BillAmount")]
    pub bill_amount: f64,

    #[serde(rename = "Status")]
    pub status: ClaimStatus,
}

impl Claim {
    /// Build a claim from a validated payload
    pub fn new(fields: &NewClaim, status: ClaimStatus, case_number: String) -> Self {
        Claim {
            id: uuid::Uuid::new_v4().to_string(),
            created_date: Utc::now(),
            case_number,
            account_id: fields.account_id.clone(),
            han: fields.han.clone(),
            bill_amount: fields.bill_amount,
            status,
        }
    }
}

impl Record for Claim {
    const COLLECTION: Collection = Collection::Claims;

    fn key(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.created_date.to_rfc3339(),
            self.case_number.clone(),
            self.account_id.clone(),
            self.han.clone(),
            self.bill_amount.to_string(),
            self.status.as_str().to_string(),
        ]
    }

    fn from_row(row: &[String]) -> Result<Self, String> {
        let created_cell = cell(row, 1, "CreatedDate")?;
        let created_date = DateTime::parse_from_rfc3339(created_cell.trim())
            .map_err(|e| format!("CreatedDate {:?}: {}", created_cell, e))?
            .with_timezone(&Utc);

        let amount_cell = cell(row, 5, "BillAmount")?;
        let bill_amount = amount_cell
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("BillAmount is not a number: {:?}", amount_cell))?;

        let status = cell(row, 6, "Status")?
            .parse::<ClaimStatus>()
            .map_err(|e| e.to_string())?;

        Ok(Claim {
            id: cell(row, 0, "Id")?.to_string(),
            created_date,
            case_number: cell(row, 2, "CaseNumber")?.to_string(),
            account_id: cell(row, 3, "AccountId")?.to_string(),
            han: cell(row, 4, "HAN")?.to_string(),
            bill_amount,
            status,
        })
    }
}

/// Next case number: one past the highest numeric case number, 8 digits wide
pub fn next_case_number(claims: &[Claim]) -> LedgerResult<String> {
    let highest = claims
        .iter()
        .filter_map(|c| c.case_number.trim().parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    let next = highest
        .checked_add(1)
        .ok_or_else(|| LedgerError::validation("Case numbers are exhausted."))?;
    Ok(format!("{:08}", next))
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// Create payload. Status arrives as text so a bad value is a validation
/// error rather than a decode failure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewClaim {
    pub account_id: String,
    pub han: String,
    pub bill_amount: f64,
    pub status: String,
}

impl NewClaim {
    /// Value constraints; returns the parsed status
    pub fn validate(&self) -> LedgerResult<ClaimStatus> {
        require_text(&self.account_id, "AccountId")?;
        require_text(&self.han, "HAN")?;
        validate_amount(self.bill_amount)?;
        self.status.parse()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClaimUpdate {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub han: Option<String>,
    #[serde(default)]
    pub bill_amount: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Patch for ClaimUpdate {
    type Target = Claim;

    fn validate(&self) -> LedgerResult<()> {
        if let Some(account_id) = &self.account_id {
            require_text(account_id, "AccountId")?;
        }
        if let Some(han) = &self.han {
            require_text(han, "HAN")?;
        }
        if let Some(amount) = self.bill_amount {
            validate_amount(amount)?;
        }
        if let Some(status) = &self.status {
            status.parse::<ClaimStatus>()?;
        }
        Ok(())
    }

    fn assignments(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(account_id) = &self.account_id {
            out.push(("AccountId", account_id.clone()));
        }
        if let Some(han) = &self.han {
            out.push(("HAN", han.clone()));
        }
        if let Some(amount) = self.bill_amount {
            out.push(("BillAmount", amount.to_string()));
        }
        if let Some(status) = &self.status {
            out.push(("Status", status.trim().to_string()));
        }
        out
    }
}

fn validate_amount(amount: f64) -> LedgerResult<()> {
    if !amount.is_finite() {
        return Err(LedgerError::validation("Bill amount must be a number."));
    }
    if amount < 0.0 {
        return Err(LedgerError::validation("Bill amount cannot be negative."));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
