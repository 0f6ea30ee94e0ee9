//! Store module
//!
//! Persistence interfaces consumed by the ledger engine, with a PostgreSQL
//! implementation and an in-memory one.

mod error;
mod memory;
mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{
    Account, AccountChanges, AccountId, Balance, ClientId, HistoryEntry, HistoryId, NewAccount,
    NewHistoryEntry,
};

pub type DynAccountStore = Arc<dyn AccountStore>;
pub type DynHistoryStore = Arc<dyn HistoryStore>;
pub type DynPostingStore = Arc<dyn PostingStore>;

/// Account lookups and administrative writes.
/// Balances are never written here; see [`PostingStore`].
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn find_by_client_id(&self, client_id: ClientId) -> Result<Option<Account>, StoreError>;

    async fn find_all(&self) -> Result<Vec<Account>, StoreError>;

    async fn create(&self, account: &NewAccount) -> Result<Account, StoreError>;

    async fn update(
        &self,
        id: AccountId,
        changes: &AccountChanges,
    ) -> Result<Option<Account>, StoreError>;

    async fn delete(&self, id: AccountId) -> Result<bool, StoreError>;
}

/// History queries and administrative corrections.
/// Entries are only ever inserted as part of a [`Posting`].
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<HistoryEntry>, StoreError>;

    async fn find_by_id(&self, id: HistoryId) -> Result<Option<HistoryEntry>, StoreError>;

    async fn find_by_account_id(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<HistoryEntry>, StoreError>;

    async fn find_by_target_account_id(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<HistoryEntry>, StoreError>;

    async fn update_description(
        &self,
        id: HistoryId,
        description: &str,
    ) -> Result<Option<HistoryEntry>, StoreError>;
}

/// Atomic balance mutation.
#[async_trait]
pub trait PostingStore: Send + Sync {
    /// Apply every leg and insert every entry, or none of them.
    ///
    /// Each leg is a compare-and-set: if an account's stored balance is not
    /// the leg's `expected` value the whole posting fails with
    /// [`StoreError::StaleBalance`].
    async fn apply_posting(&self, posting: &Posting) -> Result<PostingReceipt, StoreError>;
}

/// One account's balance change within a posting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingLeg {
    pub account_id: AccountId,
    pub expected: Balance,
    pub new: Balance,
}

/// A set of balance changes and the history entries explaining them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Posting {
    pub legs: Vec<PostingLeg>,
    pub entries: Vec<NewHistoryEntry>,
}

impl Posting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leg(mut self, account_id: AccountId, expected: Balance, new: Balance) -> Self {
        self.legs.push(PostingLeg {
            account_id,
            expected,
            new,
        });
        self
    }

    pub fn entry(mut self, entry: NewHistoryEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Legs in ascending account id order, the order rows are locked in
    pub fn legs_in_lock_order(&self) -> Vec<&PostingLeg> {
        let mut legs: Vec<&PostingLeg> = self.legs.iter().collect();
        legs.sort_by_key(|leg| leg.account_id);
        legs
    }
}

/// Result of a committed posting
#[derive(Debug, Clone)]
pub struct PostingReceipt {
    /// Updated accounts, in the posting's leg order
    pub accounts: Vec<Account>,
    /// Inserted entries, in the posting's entry order
    pub entries: Vec<HistoryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legs_in_lock_order() {
        let posting = Posting::new()
            .leg(9, Balance::zero(), Balance::zero())
            .leg(3, Balance::zero(), Balance::zero());

        let order: Vec<AccountId> = posting
            .legs_in_lock_order()
            .iter()
            .map(|leg| leg.account_id)
            .collect();
        assert_eq!(order, vec![3, 9]);
        // Original order is untouched
        assert_eq!(posting.legs[0].account_id, 9);
    }
}
