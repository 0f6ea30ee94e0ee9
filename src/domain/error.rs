//! Domain Error Types
//!
//! Ledger rule violations. These don't depend on infrastructure.

use thiserror::Error;

use super::{AccountId, Amount, AmountError, Balance, ClientId, HistoryId};

/// Ledger rule violations, all detected before any mutation is applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Client already owns an account
    #[error("Account already exists for client {client_id}")]
    DuplicateAccount { client_id: ClientId },

    /// No account for the given id
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// No account owned by the given client
    #[error("Account not found for client {0}")]
    ClientAccountNotFound(ClientId),

    /// No history entry for the given id
    #[error("History entry not found: {0}")]
    HistoryNotFound(HistoryId),

    /// Zero, negative, sub-cent or oversized amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Sender and receiver are the same client
    #[error("Sender and receiver must be different clients")]
    InvalidTransfer,

    /// Sender cannot cover the requested amount
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Amount, available: Balance },
}

impl DomainError {
    pub fn insufficient_balance(required: Amount, available: Balance) -> Self {
        Self::InsufficientBalance {
            required,
            available,
        }
    }

    /// Check if this error means the referenced resource is missing
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_) | Self::ClientAccountNotFound(_) | Self::HistoryNotFound(_)
        )
    }

    /// Short machine-readable reason, used in error bodies and failure events
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::DuplicateAccount { .. } => "duplicate_account",
            Self::AccountNotFound(_) | Self::ClientAccountNotFound(_) => "account_not_found",
            Self::HistoryNotFound(_) => "history_not_found",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidTransfer => "invalid_transfer",
            Self::InsufficientBalance { .. } => "insufficient_balance",
        }
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}
