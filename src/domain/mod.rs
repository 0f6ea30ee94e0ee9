//! Domain module
//!
//! Core ledger types and business rules.

pub mod account;
pub mod amount;
pub mod context;
pub mod error;
pub mod events;
pub mod history;

pub use account::{Account, AccountChanges, AccountId, ClientId, NewAccount};
pub use amount::{Amount, AmountError, Balance};
pub use context::OperationContext;
pub use error::DomainError;
pub use events::{BalanceUpdatedData, EventEnvelope, LedgerEvent, TransferEventData, TransferStatus};
pub use history::{
    HistoryEntry, HistoryId, HistoryType, NewHistoryEntry, DEFAULT_DEPOSIT_DESCRIPTION,
    DEFAULT_TRANSFER_DESCRIPTION,
};
