//! Ledger module
//!
//! The ledger engine: account lifecycle, deposits, transfers and balance
//! queries, with every balance change committed as one atomic posting.

mod commands;
mod engine;
mod error;
mod locks;

pub use commands::{
    BalanceView, CreateAccountCommand, DepositCommand, DepositResult, TransferCommand,
};
pub use engine::{LedgerEngine, LedgerOptions};
pub use error::LedgerError;
pub use locks::{AccountLocks, LockGuard};
