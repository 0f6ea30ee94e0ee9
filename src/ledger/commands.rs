//! Command definitions
//!
//! Inputs to the ledger engine and the results it hands back. Amounts arrive
//! as raw decimals; the engine validates them in its own order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Account, AccountId, Amount, Balance, ClientId};

/// Command to open an account for a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountCommand {
    pub client_id: ClientId,
    pub initial_balance: Decimal,
    pub history_id: i64,
    pub agency: String,
    pub account_number: String,
}

/// Command to move money between two clients' accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub sender_client_id: ClientId,
    pub receiver_client_id: ClientId,
    pub amount: Decimal,
    pub description: Option<String>,
}

impl TransferCommand {
    pub fn new(sender_client_id: ClientId, receiver_client_id: ClientId, amount: Decimal) -> Self {
        Self {
            sender_client_id,
            receiver_client_id,
            amount,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Command to credit an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCommand {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub description: Option<String>,
}

impl DepositCommand {
    pub fn new(account_id: AccountId, amount: Decimal) -> Self {
        Self {
            account_id,
            amount,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Use `description` unless it is missing or blank
pub(crate) fn description_or(description: Option<&str>, default: &str) -> String {
    match description {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => default.to_string(),
    }
}

/// Result of a deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResult {
    pub account_id: AccountId,
    pub amount: Amount,
    pub description: String,
    pub old_balance: Balance,
    pub new_balance: Balance,
    pub timestamp: DateTime<Utc>,
}

/// Balance of an account with its full record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub account_id: AccountId,
    pub balance: Balance,
    pub currency: String,
    pub last_update: DateTime<Utc>,
    pub account: Account,
}

impl BalanceView {
    pub fn new(account: Account, currency: impl Into<String>) -> Self {
        Self {
            account_id: account.id,
            balance: account.balance,
            currency: currency.into(),
            last_update: account.updated_at,
            account,
        }
    }
}
