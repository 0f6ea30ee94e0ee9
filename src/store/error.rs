//! Store Errors

use crate::domain::{AccountId, ClientId};

/// Errors that can occur in the account and history stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A posting leg found a different balance than it expected
    #[error("Stale balance for account {account_id}: concurrent modification detected")]
    StaleBalance { account_id: AccountId },

    /// A posting referenced an account that does not exist
    #[error("Account {0} disappeared during posting")]
    MissingAccount(AccountId),

    /// Another account already belongs to the client
    #[error("Client {0} already owns an account")]
    DuplicateClient(ClientId),

    /// A stored row violates a domain invariant
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Check if retrying the whole read-validate-post cycle may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::StaleBalance { .. })
    }
}
