//! Common test utilities
#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use transfer_service::domain::{
    Account, AccountChanges, AccountId, ClientId, EventEnvelope, NewAccount,
};
use transfer_service::events::{EventDispatcher, EventPublisher, PublishError, RetryPolicy};
use transfer_service::ledger::{CreateAccountCommand, LedgerEngine, LedgerOptions};
use transfer_service::store::{AccountStore, MemoryStore, StoreError};

/// Publisher that keeps every envelope it is handed
#[derive(Default)]
pub struct RecordingPublisher {
    envelopes: Mutex<Vec<EventEnvelope>>,
    reject: bool,
}

impl RecordingPublisher {
    /// A publisher whose sink rejects everything
    pub fn rejecting() -> Self {
        Self {
            envelopes: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn envelopes(&self) -> Vec<EventEnvelope> {
        self.envelopes.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.envelopes().into_iter().map(|e| e.event).collect()
    }

    /// Wait until at least `count` envelopes arrived
    pub async fn wait_for(&self, count: usize) -> Vec<EventEnvelope> {
        for _ in 0..400 {
            let envelopes = self.envelopes();
            if envelopes.len() >= count {
                return envelopes;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {} events, got {:?}",
            count,
            self.topics()
        );
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, _topic: &str, envelope: &EventEnvelope) -> Result<(), PublishError> {
        self.envelopes.lock().unwrap().push(envelope.clone());
        if self.reject {
            return Err(PublishError::Rejected { status: 503 });
        }
        Ok(())
    }
}

/// Account store whose client lookups can be pinned to an outdated answer,
/// the way another instance would see them just before a concurrent write
pub struct LaggingAccountStore {
    inner: Arc<MemoryStore>,
    stale: Mutex<HashMap<ClientId, Option<Account>>>,
}

impl LaggingAccountStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            stale: Mutex::new(HashMap::new()),
        }
    }

    /// Answer lookups for `client_id` with `answer` from now on
    pub fn pin(&self, client_id: ClientId, answer: Option<Account>) {
        self.stale.lock().unwrap().insert(client_id, answer);
    }
}

#[async_trait]
impl AccountStore for LaggingAccountStore {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_client_id(&self, client_id: ClientId) -> Result<Option<Account>, StoreError> {
        let pinned = self.stale.lock().unwrap().get(&client_id).cloned();
        match pinned {
            Some(answer) => Ok(answer),
            None => self.inner.find_by_client_id(client_id).await,
        }
    }

    async fn find_all(&self) -> Result<Vec<Account>, StoreError> {
        AccountStore::find_all(self.inner.as_ref()).await
    }

    async fn create(&self, account: &NewAccount) -> Result<Account, StoreError> {
        self.inner.create(account).await
    }

    async fn update(
        &self,
        id: AccountId,
        changes: &AccountChanges,
    ) -> Result<Option<Account>, StoreError> {
        self.inner.update(id, changes).await
    }

    async fn delete(&self, id: AccountId) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }
}

/// Ledger engine on the in-memory store
pub struct TestLedger {
    pub engine: LedgerEngine,
    pub store: Arc<MemoryStore>,
    pub lookups: Arc<LaggingAccountStore>,
    pub publisher: Arc<RecordingPublisher>,
}

impl TestLedger {
    pub fn new() -> Self {
        Self::build(LedgerOptions::default(), RecordingPublisher::default())
    }

    pub fn with_options(options: LedgerOptions) -> Self {
        Self::build(options, RecordingPublisher::default())
    }

    pub fn with_rejecting_sink() -> Self {
        Self::build(LedgerOptions::default(), RecordingPublisher::rejecting())
    }

    fn build(options: LedgerOptions, publisher: RecordingPublisher) -> Self {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(publisher);
        let dispatcher = EventDispatcher::new(
            publisher.clone(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );

        let lookups = Arc::new(LaggingAccountStore::new(store.clone()));

        Self {
            engine: LedgerEngine::new(
                lookups.clone(),
                store.clone(),
                store.clone(),
                dispatcher,
                options,
            ),
            store,
            lookups,
            publisher,
        }
    }

    /// Open an account for `client_id` holding `balance`
    pub async fn open_account(&self, client_id: ClientId, balance: &str) -> Account {
        self.engine
            .create_account(CreateAccountCommand {
                client_id,
                initial_balance: money(balance),
                history_id: 1,
                agency: "0001".to_string(),
                account_number: format!("{:05}-0", client_id),
            })
            .await
            .expect("Failed to open account")
    }
}

pub fn money(value: &str) -> Decimal {
    Decimal::from_str(value).expect("invalid money literal")
}
