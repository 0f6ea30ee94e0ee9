//! Domain Events
//!
//! Notifications published to other services after ledger operations.
//! Publication is best-effort; these are never the source of truth.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AccountId, Balance, ClientId, HistoryId};

/// Name of the emitting service, carried in every envelope
pub const SERVICE_NAME: &str = "transfer-service";

pub const TRANSFER_CREATED: &str = "transfer.created";
pub const TRANSFER_COMPLETED: &str = "transfer.completed";
pub const TRANSFER_FAILED: &str = "transfer.failed";
pub const ACCOUNT_BALANCE_UPDATED: &str = "account.balance.updated";

/// Lifecycle status carried by transfer events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Created,
    Completed,
    Failed,
}

/// Payload of `transfer.*` events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEventData {
    /// History entry id of the movement; absent for rejected transfers
    pub transfer_id: Option<HistoryId>,
    pub sender_client_id: ClientId,
    pub receiver_client_id: ClientId,
    pub amount: Decimal,
    pub description: String,
    pub status: TransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of `account.balance.updated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceUpdatedData {
    pub account_id: AccountId,
    pub client_id: ClientId,
    pub old_balance: Balance,
    pub new_balance: Balance,
    pub change_amount: Decimal,
    pub operation_type: String,
}

/// Events emitted by the ledger engine
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    TransferCreated(TransferEventData),
    TransferCompleted(TransferEventData),
    TransferFailed(TransferEventData),
    AccountBalanceUpdated(BalanceUpdatedData),
}

impl LedgerEvent {
    /// Routing key the event is published under
    pub fn topic(&self) -> &'static str {
        match self {
            LedgerEvent::TransferCreated(_) => TRANSFER_CREATED,
            LedgerEvent::TransferCompleted(_) => TRANSFER_COMPLETED,
            LedgerEvent::TransferFailed(_) => TRANSFER_FAILED,
            LedgerEvent::AccountBalanceUpdated(_) => ACCOUNT_BALANCE_UPDATED,
        }
    }

    /// Wrap the event for the wire
    pub fn envelope(&self, timestamp: DateTime<Utc>) -> Result<EventEnvelope, serde_json::Error> {
        let data = match self {
            LedgerEvent::TransferCreated(data)
            | LedgerEvent::TransferCompleted(data)
            | LedgerEvent::TransferFailed(data) => serde_json::to_value(data)?,
            LedgerEvent::AccountBalanceUpdated(data) => serde_json::to_value(data)?,
        };

        Ok(EventEnvelope {
            event: self.topic().to_string(),
            data,
            timestamp,
            service: SERVICE_NAME.to_string(),
        })
    }
}

/// Message body as published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub service: String,
}
