//! Account model
//!
//! An account is a client's balance record. The balance only changes through
//! the ledger engine; every other field is descriptive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Amount, AmountError, Balance};

pub type AccountId = i64;
pub type ClientId = i64;

/// A client's account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Owning client
    pub client_id: ClientId,

    /// Current balance, serialized as `value` on the wire
    #[serde(rename = "value")]
    pub balance: Balance,

    /// Opaque history reference supplied at creation
    pub history_id: i64,

    pub agency: String,

    pub account_number: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Balance after withdrawing `amount`, or an error if it would go negative
    pub fn debited(&self, amount: &Amount) -> Result<Balance, AmountError> {
        self.balance.debit(amount)
    }

    /// Balance after receiving `amount`
    pub fn credited(&self, amount: &Amount) -> Result<Balance, AmountError> {
        self.balance.credit(amount)
    }
}

/// Fields for a new account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub client_id: ClientId,
    pub balance: Balance,
    pub history_id: i64,
    pub agency: String,
    pub account_number: String,
}

/// Partial update of the descriptive account fields.
/// Balances are not part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountChanges {
    pub client_id: Option<ClientId>,
    pub history_id: Option<i64>,
    pub agency: Option<String>,
    pub account_number: Option<String>,
}

impl AccountChanges {
    pub fn is_empty(&self) -> bool {
        self.client_id.is_none()
            && self.history_id.is_none()
            && self.agency.is_none()
            && self.account_number.is_none()
    }

    /// Apply the changes to an account in place
    pub fn apply_to(&self, account: &mut Account) {
        if let Some(client_id) = self.client_id {
            account.client_id = client_id;
        }
        if let Some(history_id) = self.history_id {
            account.history_id = history_id;
        }
        if let Some(ref agency) = self.agency {
            account.agency = agency.clone();
        }
        if let Some(ref account_number) = self.account_number {
            account.account_number = account_number.clone();
        }
    }
}
