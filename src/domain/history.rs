//! History entries
//!
//! Append-only audit records, one per balance change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{AccountId, Amount, Balance};

pub type HistoryId = i64;

/// Description used when a transfer request carries none
pub const DEFAULT_TRANSFER_DESCRIPTION: &str = "Transfer between users";

/// Description used when a deposit request carries none
pub const DEFAULT_DEPOSIT_DESCRIPTION: &str = "Deposit";

/// Kind of balance change recorded by an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryType {
    #[serde(rename = "TRANSFER-SENT")]
    TransferSent,
    #[serde(rename = "TRANSFER-RECEIVED")]
    TransferReceived,
    #[serde(rename = "DEPOSIT")]
    Deposit,
    #[serde(rename = "WITHDRAWAL")]
    Withdrawal,
}

impl HistoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryType::TransferSent => "TRANSFER-SENT",
            HistoryType::TransferReceived => "TRANSFER-RECEIVED",
            HistoryType::Deposit => "DEPOSIT",
            HistoryType::Withdrawal => "WITHDRAWAL",
        }
    }

    /// Whether the owning account's balance goes up for this kind
    pub fn is_inflow(&self) -> bool {
        matches!(self, HistoryType::TransferReceived | HistoryType::Deposit)
    }
}

impl fmt::Display for HistoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANSFER-SENT" => Ok(HistoryType::TransferSent),
            "TRANSFER-RECEIVED" => Ok(HistoryType::TransferReceived),
            "DEPOSIT" => Ok(HistoryType::Deposit),
            "WITHDRAWAL" => Ok(HistoryType::Withdrawal),
            other => Err(format!("unknown history type: {}", other)),
        }
    }
}

/// A persisted history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,

    /// Account whose balance changed
    pub account_id: AccountId,

    /// Counterparty; equals `account_id` for deposits
    #[serde(rename = "target_id_account")]
    pub target_account_id: AccountId,

    pub transfer_value: Amount,

    pub old_value: Balance,

    pub new_value: Balance,

    #[serde(rename = "type")]
    pub entry_type: HistoryType,

    pub description: String,

    /// When the movement happened
    pub timestamp: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// `new_value - old_value` must equal `±transfer_value` depending on direction
    pub fn is_reconciled(&self) -> bool {
        let delta = self.new_value.cents() - self.old_value.cents();
        let expected = if self.entry_type.is_inflow() {
            self.transfer_value.cents()
        } else {
            -self.transfer_value.cents()
        };
        delta == expected
    }
}

/// Fields for a new history entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub account_id: AccountId,
    pub target_account_id: AccountId,
    pub transfer_value: Amount,
    pub old_value: Balance,
    pub new_value: Balance,
    pub entry_type: HistoryType,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}
