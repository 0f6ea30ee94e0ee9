//! In-memory store
//!
//! Keeps accounts and history behind a single async lock. A posting is applied
//! under one write guard, which makes it atomic.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::domain::{
    Account, AccountChanges, AccountId, ClientId, HistoryEntry, HistoryId, NewAccount,
};

use super::{AccountStore, HistoryStore, Posting, PostingReceipt, PostingStore, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    history: BTreeMap<HistoryId, HistoryEntry>,
    last_account_id: AccountId,
    last_history_id: HistoryId,
}

impl MemoryState {
    /// Whether an account other than `except` belongs to `client_id`
    fn client_taken(&self, client_id: ClientId, except: Option<AccountId>) -> bool {
        self.accounts
            .values()
            .any(|a| a.client_id == client_id && Some(a.id) != except)
    }
}

/// Store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first, matching the SQL ordering
fn newest_first(mut entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
    entries
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn find_by_client_id(&self, client_id: ClientId) -> Result<Option<Account>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .find(|account| account.client_id == client_id)
            .cloned())
    }

    async fn find_all(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.state.read().await.accounts.values().cloned().collect())
    }

    async fn create(&self, account: &NewAccount) -> Result<Account, StoreError> {
        let mut state = self.state.write().await;
        if state.client_taken(account.client_id, None) {
            return Err(StoreError::DuplicateClient(account.client_id));
        }
        state.last_account_id += 1;

        let now = Utc::now();
        let created = Account {
            id: state.last_account_id,
            client_id: account.client_id,
            balance: account.balance,
            history_id: account.history_id,
            agency: account.agency.clone(),
            account_number: account.account_number.clone(),
            created_at: now,
            updated_at: now,
        };
        state.accounts.insert(created.id, created.clone());

        Ok(created)
    }

    async fn update(
        &self,
        id: AccountId,
        changes: &AccountChanges,
    ) -> Result<Option<Account>, StoreError> {
        let mut state = self.state.write().await;
        if let Some(client_id) = changes.client_id {
            if state.accounts.contains_key(&id) && state.client_taken(client_id, Some(id)) {
                return Err(StoreError::DuplicateClient(client_id));
            }
        }
        let Some(account) = state.accounts.get_mut(&id) else {
            return Ok(None);
        };

        changes.apply_to(account);
        account.updated_at = Utc::now();
        Ok(Some(account.clone()))
    }

    async fn delete(&self, id: AccountId) -> Result<bool, StoreError> {
        Ok(self.state.write().await.accounts.remove(&id).is_some())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn find_all(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(newest_first(state.history.values().cloned().collect()))
    }

    async fn find_by_id(&self, id: HistoryId) -> Result<Option<HistoryEntry>, StoreError> {
        Ok(self.state.read().await.history.get(&id).cloned())
    }

    async fn find_by_account_id(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .history
                .values()
                .filter(|entry| entry.account_id == account_id)
                .cloned()
                .collect(),
        ))
    }

    async fn find_by_target_account_id(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .history
                .values()
                .filter(|entry| entry.target_account_id == account_id)
                .cloned()
                .collect(),
        ))
    }

    async fn update_description(
        &self,
        id: HistoryId,
        description: &str,
    ) -> Result<Option<HistoryEntry>, StoreError> {
        let mut state = self.state.write().await;
        let Some(entry) = state.history.get_mut(&id) else {
            return Ok(None);
        };

        entry.description = description.to_string();
        entry.updated_at = Utc::now();
        Ok(Some(entry.clone()))
    }
}

#[async_trait]
impl PostingStore for MemoryStore {
    async fn apply_posting(&self, posting: &Posting) -> Result<PostingReceipt, StoreError> {
        let mut state = self.state.write().await;

        // Verify every leg before touching anything
        for leg in posting.legs_in_lock_order() {
            let account = state
                .accounts
                .get(&leg.account_id)
                .ok_or(StoreError::MissingAccount(leg.account_id))?;
            if account.balance != leg.expected {
                return Err(StoreError::StaleBalance {
                    account_id: leg.account_id,
                });
            }
        }

        let now = Utc::now();
        let mut accounts = Vec::with_capacity(posting.legs.len());
        for leg in &posting.legs {
            let account = state
                .accounts
                .get_mut(&leg.account_id)
                .ok_or(StoreError::MissingAccount(leg.account_id))?;
            account.balance = leg.new;
            account.updated_at = now;
            accounts.push(account.clone());
        }

        let mut entries = Vec::with_capacity(posting.entries.len());
        for new_entry in &posting.entries {
            state.last_history_id += 1;
            let entry = HistoryEntry {
                id: state.last_history_id,
                account_id: new_entry.account_id,
                target_account_id: new_entry.target_account_id,
                transfer_value: new_entry.transfer_value,
                old_value: new_entry.old_value,
                new_value: new_entry.new_value,
                entry_type: new_entry.entry_type,
                description: new_entry.description.clone(),
                timestamp: new_entry.timestamp,
                created_at: now,
                updated_at: now,
            };
            state.history.insert(entry.id, entry.clone());
            entries.push(entry);
        }

        Ok(PostingReceipt { accounts, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, Balance, HistoryType, NewHistoryEntry};

    fn new_account(client_id: ClientId, cents: i64) -> NewAccount {
        NewAccount {
            client_id,
            balance: Balance::from_cents(cents).unwrap(),
            history_id: 1,
            agency: "0001".to_string(),
            account_number: format!("{}-0", client_id),
        }
    }

    fn deposit_entry(account_id: AccountId, old: i64, new: i64) -> NewHistoryEntry {
        NewHistoryEntry {
            account_id,
            target_account_id: account_id,
            transfer_value: Amount::from_cents(new - old).unwrap(),
            old_value: Balance::from_cents(old).unwrap(),
            new_value: Balance::from_cents(new).unwrap(),
            entry_type: HistoryType::Deposit,
            description: "Deposit".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryStore::new();
        let first = AccountStore::create(&store, &new_account(10, 0)).await.unwrap();
        let second = AccountStore::create(&store, &new_account(20, 0)).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(
            store.find_by_client_id(20).await.unwrap().map(|a| a.id),
            Some(2)
        );
        assert!(store.find_by_client_id(30).await.unwrap().is_none());
        assert_eq!(AccountStore::find_all(&store).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        let account = AccountStore::create(&store, &new_account(10, 0)).await.unwrap();

        let changes = AccountChanges {
            agency: Some("0099".to_string()),
            ..Default::default()
        };
        let updated = store.update(account.id, &changes).await.unwrap().unwrap();
        assert_eq!(updated.agency, "0099");
        assert!(store.update(99, &changes).await.unwrap().is_none());

        assert!(store.delete(account.id).await.unwrap());
        assert!(!store.delete(account.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_client_id_is_unique() {
        let store = MemoryStore::new();
        let first = AccountStore::create(&store, &new_account(10, 0)).await.unwrap();
        AccountStore::create(&store, &new_account(20, 0)).await.unwrap();

        let duplicate = AccountStore::create(&store, &new_account(10, 0)).await;
        assert!(matches!(duplicate, Err(StoreError::DuplicateClient(10))));

        let moved = AccountChanges {
            client_id: Some(20),
            ..Default::default()
        };
        let result = store.update(first.id, &moved).await;
        assert!(matches!(result, Err(StoreError::DuplicateClient(20))));

        // Keeping its own client id is not a conflict
        let same = AccountChanges {
            client_id: Some(10),
            ..Default::default()
        };
        assert!(store.update(first.id, &same).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_posting_applies_legs_and_entries() {
        let store = MemoryStore::new();
        let account = AccountStore::create(&store, &new_account(10, 1_000)).await.unwrap();

        let posting = Posting::new()
            .leg(
                account.id,
                Balance::from_cents(1_000).unwrap(),
                Balance::from_cents(1_500).unwrap(),
            )
            .entry(deposit_entry(account.id, 1_000, 1_500));

        let receipt = store.apply_posting(&posting).await.unwrap();
        assert_eq!(receipt.accounts[0].balance.cents(), 1_500);
        assert_eq!(receipt.entries[0].id, 1);
        assert_eq!(store.find_by_account_id(account.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_posting_changes_nothing() {
        let store = MemoryStore::new();
        let a = AccountStore::create(&store, &new_account(10, 1_000)).await.unwrap();
        let b = AccountStore::create(&store, &new_account(20, 1_000)).await.unwrap();

        // Second leg expects a balance the account does not have
        let posting = Posting::new()
            .leg(
                a.id,
                Balance::from_cents(1_000).unwrap(),
                Balance::from_cents(500).unwrap(),
            )
            .leg(
                b.id,
                Balance::from_cents(7_777).unwrap(),
                Balance::from_cents(1_500).unwrap(),
            )
            .entry(deposit_entry(a.id, 1_000, 1_500));

        let result = store.apply_posting(&posting).await;
        assert!(matches!(result, Err(StoreError::StaleBalance { account_id }) if account_id == b.id));

        let a_after = AccountStore::find_by_id(&store, a.id).await.unwrap().unwrap();
        assert_eq!(a_after.balance.cents(), 1_000);
        assert!(HistoryStore::find_all(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_description() {
        let store = MemoryStore::new();
        let account = AccountStore::create(&store, &new_account(10, 0)).await.unwrap();
        let posting = Posting::new()
            .leg(account.id, Balance::zero(), Balance::from_cents(100).unwrap())
            .entry(deposit_entry(account.id, 0, 100));
        let receipt = store.apply_posting(&posting).await.unwrap();

        let entry = store
            .update_description(receipt.entries[0].id, "Corrected")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.description, "Corrected");
        assert_eq!(entry.transfer_value.cents(), 100);
        assert!(store.update_description(99, "x").await.unwrap().is_none());
    }
}
