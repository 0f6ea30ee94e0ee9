//! transfer_service library
//!
//! Account ledger: accounts, deposits, transfers between clients and an
//! append-only balance history, served over HTTP.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod store;

pub use config::{Config, ConfigError, LogFormat};
pub use domain::{Account, Amount, AmountError, Balance, DomainError, HistoryEntry, OperationContext};
pub use error::{AppError, AppResult};
pub use ledger::{LedgerEngine, LedgerError, LedgerOptions};
