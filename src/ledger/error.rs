//! Ledger Errors

use crate::domain::{AmountError, DomainError};
use crate::store::StoreError;

/// Errors returned by ledger operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A ledger rule rejected the operation; nothing was written
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<AmountError> for LedgerError {
    fn from(err: AmountError) -> Self {
        LedgerError::Domain(err.into())
    }
}

impl LedgerError {
    /// The rule violation, if this is one
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            LedgerError::Domain(err) => Some(err),
            LedgerError::Store(_) => None,
        }
    }
}
