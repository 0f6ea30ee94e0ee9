//! Ledger Engine
//!
//! Every balance change runs the same cycle: lock the accounts involved,
//! re-read them, validate, then commit one [`Posting`] holding the new
//! balances and the history entries explaining them. Events are dispatched
//! only after the posting commits.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    Account, AccountChanges, AccountId, Amount, Balance, BalanceUpdatedData, ClientId,
    DomainError, HistoryEntry, HistoryId, HistoryType, LedgerEvent, NewAccount, NewHistoryEntry,
    TransferEventData, TransferStatus, DEFAULT_DEPOSIT_DESCRIPTION, DEFAULT_TRANSFER_DESCRIPTION,
};
use crate::events::EventDispatcher;
use crate::store::{
    AccountStore, DynAccountStore, DynHistoryStore, DynPostingStore, HistoryStore, Posting,
    PostingReceipt, PostingStore, StoreError,
};

use super::commands::description_or;
use super::{
    AccountLocks, BalanceView, CreateAccountCommand, DepositCommand, DepositResult, LedgerError,
    TransferCommand,
};

/// Attempts at committing a posting when a concurrent writer got there first
const MAX_POSTING_ATTEMPTS: u32 = 3;

const OPERATION_TRANSFER: &str = "TRANSFER";
const OPERATION_DEPOSIT: &str = "DEPOSIT";

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerOptions {
    /// Currency code reported by balance queries
    pub currency: String,
    /// Also record a TRANSFER-RECEIVED entry for the receiver of a transfer
    pub symmetric_history: bool,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            currency: "BRL".to_string(),
            symmetric_history: false,
        }
    }
}

/// A committed transfer, with the balances on both sides of it
struct CommittedTransfer {
    sender: Account,
    receiver: Account,
    sender_new: Balance,
    receiver_new: Balance,
    receipt: PostingReceipt,
}

/// A committed deposit
struct CommittedDeposit {
    account: Account,
    new_balance: Balance,
    receipt: PostingReceipt,
}

/// Ledger engine
#[derive(Clone)]
pub struct LedgerEngine {
    accounts: DynAccountStore,
    history: DynHistoryStore,
    postings: DynPostingStore,
    events: EventDispatcher,
    account_locks: Arc<AccountLocks>,
    client_locks: Arc<AccountLocks>,
    options: LedgerOptions,
}

impl LedgerEngine {
    pub fn new(
        accounts: DynAccountStore,
        history: DynHistoryStore,
        postings: DynPostingStore,
        events: EventDispatcher,
        options: LedgerOptions,
    ) -> Self {
        Self {
            accounts,
            history,
            postings,
            events,
            account_locks: Arc::new(AccountLocks::new()),
            client_locks: Arc::new(AccountLocks::new()),
            options,
        }
    }

    /// Build an engine over one store implementing every store trait
    pub fn with_store<S>(store: Arc<S>, events: EventDispatcher, options: LedgerOptions) -> Self
    where
        S: AccountStore + HistoryStore + PostingStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store, events, options)
    }

    pub fn options(&self) -> &LedgerOptions {
        &self.options
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Open an account. A client owns at most one.
    pub async fn create_account(
        &self,
        command: CreateAccountCommand,
    ) -> Result<Account, LedgerError> {
        let balance = Balance::new(command.initial_balance)?;
        let client_id = command.client_id;

        let _guard = self.client_locks.lock(&[client_id]).await;

        if self.accounts.find_by_client_id(client_id).await?.is_some() {
            tracing::warn!(client_id, "Account already exists for client");
            return Err(DomainError::DuplicateAccount { client_id }.into());
        }

        let account = self
            .accounts
            .create(&NewAccount {
                client_id,
                balance,
                history_id: command.history_id,
                agency: command.agency,
                account_number: command.account_number,
            })
            .await
            .map_err(client_conflict)?;

        tracing::info!(
            account_id = account.id,
            client_id,
            balance = %account.balance,
            "Account created"
        );
        Ok(account)
    }

    pub async fn find_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.accounts
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound(id).into())
    }

    pub async fn find_account_by_client(&self, client_id: ClientId) -> Result<Account, LedgerError> {
        self.accounts
            .find_by_client_id(client_id)
            .await?
            .ok_or_else(|| DomainError::ClientAccountNotFound(client_id).into())
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.accounts.find_all().await?)
    }

    /// Change descriptive fields of an account. Balances are untouched.
    pub async fn update_account(
        &self,
        id: AccountId,
        changes: AccountChanges,
    ) -> Result<Account, LedgerError> {
        if changes.is_empty() {
            return self.find_account(id).await;
        }

        let _guard = match changes.client_id {
            Some(client_id) => Some(self.client_locks.lock(&[client_id]).await),
            None => None,
        };

        if let Some(client_id) = changes.client_id {
            if let Some(owner) = self.accounts.find_by_client_id(client_id).await? {
                if owner.id != id {
                    tracing::warn!(account_id = id, client_id, "Client already owns another account");
                    return Err(DomainError::DuplicateAccount { client_id }.into());
                }
            }
        }

        let account = self
            .accounts
            .update(id, &changes)
            .await
            .map_err(client_conflict)?
            .ok_or(DomainError::AccountNotFound(id))?;

        tracing::info!(account_id = id, "Account updated");
        Ok(account)
    }

    pub async fn delete_account(&self, id: AccountId) -> Result<(), LedgerError> {
        let _guard = self.account_locks.lock(&[id]).await;

        if !self.accounts.delete(id).await? {
            return Err(DomainError::AccountNotFound(id).into());
        }

        tracing::info!(account_id = id, "Account deleted");
        Ok(())
    }

    pub async fn get_balance(&self, id: AccountId) -> Result<BalanceView, LedgerError> {
        let account = self.find_account(id).await?;
        Ok(BalanceView::new(account, self.options.currency.clone()))
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Credit an account
    pub async fn deposit(&self, command: DepositCommand) -> Result<DepositResult, LedgerError> {
        let result = self.execute_deposit(&command).await;
        if let Err(ref e) = result {
            log_failure("deposit", e);
        }
        result
    }

    async fn execute_deposit(&self, command: &DepositCommand) -> Result<DepositResult, LedgerError> {
        let amount = Amount::new(command.amount)?;
        let description = description_or(command.description.as_deref(), DEFAULT_DEPOSIT_DESCRIPTION);

        let committed = {
            let _guard = self.account_locks.lock(&[command.account_id]).await;
            retry_on_stale("deposit", || {
                self.post_deposit(command.account_id, amount, &description)
            })
            .await?
        };

        let CommittedDeposit {
            account,
            new_balance,
            receipt,
        } = committed;
        let entry = receipt.entries.into_iter().next();
        let timestamp = entry.as_ref().map(|e| e.timestamp).unwrap_or_else(Utc::now);

        tracing::info!(
            account_id = account.id,
            amount = %amount,
            old_balance = %account.balance,
            new_balance = %new_balance,
            "Deposit completed"
        );

        self.events.dispatch(vec![
            LedgerEvent::TransferCreated(TransferEventData {
                transfer_id: entry.as_ref().map(|e| e.id),
                sender_client_id: account.client_id,
                receiver_client_id: account.client_id,
                amount: amount.value(),
                description: description.clone(),
                status: TransferStatus::Completed,
                reason: None,
            }),
            balance_updated(&account, new_balance, OPERATION_DEPOSIT),
        ]);

        Ok(DepositResult {
            account_id: account.id,
            amount,
            description,
            old_balance: account.balance,
            new_balance,
            timestamp,
        })
    }

    async fn post_deposit(
        &self,
        account_id: AccountId,
        amount: Amount,
        description: &str,
    ) -> Result<CommittedDeposit, LedgerError> {
        let account = self.find_account(account_id).await?;
        let new_balance = account.credited(&amount)?;

        let posting = Posting::new()
            .leg(account.id, account.balance, new_balance)
            .entry(NewHistoryEntry {
                account_id: account.id,
                target_account_id: account.id,
                transfer_value: amount,
                old_value: account.balance,
                new_value: new_balance,
                entry_type: HistoryType::Deposit,
                description: description.to_string(),
                timestamp: Utc::now(),
            });

        let receipt = self.postings.apply_posting(&posting).await?;

        Ok(CommittedDeposit {
            account,
            new_balance,
            receipt,
        })
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Move money between two clients' accounts and return the sender's
    /// account as persisted afterwards.
    ///
    /// Rejections are checked in a fixed order: same client, amount, sender
    /// lookup, receiver lookup, sender balance. A rejected transfer writes
    /// nothing and emits `transfer.failed`.
    pub async fn transfer(&self, command: TransferCommand) -> Result<Account, LedgerError> {
        let result = self.execute_transfer(&command).await;

        if let Err(ref e) = result {
            log_failure("transfer", e);
            if let Some(rule) = e.as_domain() {
                self.events.dispatch(vec![LedgerEvent::TransferFailed(TransferEventData {
                    transfer_id: None,
                    sender_client_id: command.sender_client_id,
                    receiver_client_id: command.receiver_client_id,
                    amount: command.amount,
                    description: description_or(
                        command.description.as_deref(),
                        DEFAULT_TRANSFER_DESCRIPTION,
                    ),
                    status: TransferStatus::Failed,
                    reason: Some(rule.reason_code().to_string()),
                })]);
            }
        }

        result
    }

    async fn execute_transfer(&self, command: &TransferCommand) -> Result<Account, LedgerError> {
        if command.sender_client_id == command.receiver_client_id {
            return Err(DomainError::InvalidTransfer.into());
        }

        let amount = Amount::new(command.amount)?;
        let description =
            description_or(command.description.as_deref(), DEFAULT_TRANSFER_DESCRIPTION);

        let sender = self.find_account_by_client(command.sender_client_id).await?;
        let receiver = self.find_account_by_client(command.receiver_client_id).await?;

        let (committed, sender_after) = {
            let _guard = self.account_locks.lock(&[sender.id, receiver.id]).await;

            let committed = retry_on_stale("transfer", || {
                self.post_transfer(command, sender.id, receiver.id, amount, &description)
            })
            .await?;

            let sender_after = self.find_account(sender.id).await?;
            (committed, sender_after)
        };

        let CommittedTransfer {
            sender,
            receiver,
            sender_new,
            receiver_new,
            receipt,
        } = committed;
        let transfer_id = receipt.entries.first().map(|e| e.id);

        tracing::info!(
            transfer_id = ?transfer_id,
            sender_account_id = sender.id,
            receiver_account_id = receiver.id,
            amount = %amount,
            "Transfer completed"
        );

        let transfer_event = |status| TransferEventData {
            transfer_id,
            sender_client_id: sender.client_id,
            receiver_client_id: receiver.client_id,
            amount: amount.value(),
            description: description.clone(),
            status,
            reason: None,
        };

        self.events.dispatch(vec![
            LedgerEvent::TransferCreated(transfer_event(TransferStatus::Created)),
            LedgerEvent::TransferCompleted(transfer_event(TransferStatus::Completed)),
            balance_updated(&sender, sender_new, OPERATION_TRANSFER),
            balance_updated(&receiver, receiver_new, OPERATION_TRANSFER),
        ]);

        Ok(sender_after)
    }

    /// Re-read an account resolved earlier by client id. It may have been
    /// deleted or handed to another client since.
    async fn owned_account(
        &self,
        id: AccountId,
        client_id: ClientId,
    ) -> Result<Account, LedgerError> {
        match self.accounts.find_by_id(id).await? {
            Some(account) if account.client_id == client_id => Ok(account),
            _ => Err(DomainError::ClientAccountNotFound(client_id).into()),
        }
    }

    /// One read-validate-post cycle; callers hold both account locks
    async fn post_transfer(
        &self,
        command: &TransferCommand,
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: Amount,
        description: &str,
    ) -> Result<CommittedTransfer, LedgerError> {
        let sender = self.owned_account(sender_id, command.sender_client_id).await?;
        let receiver = self.owned_account(receiver_id, command.receiver_client_id).await?;

        if !sender.balance.is_sufficient_for(&amount) {
            return Err(DomainError::insufficient_balance(amount, sender.balance).into());
        }

        let sender_new = sender.debited(&amount)?;
        let receiver_new = receiver.credited(&amount)?;
        let timestamp = Utc::now();

        let mut posting = Posting::new()
            .leg(sender.id, sender.balance, sender_new)
            .leg(receiver.id, receiver.balance, receiver_new)
            .entry(NewHistoryEntry {
                account_id: sender.id,
                target_account_id: receiver.id,
                transfer_value: amount,
                old_value: sender.balance,
                new_value: sender_new,
                entry_type: HistoryType::TransferSent,
                description: description.to_string(),
                timestamp,
            });

        if self.options.symmetric_history {
            posting = posting.entry(NewHistoryEntry {
                account_id: receiver.id,
                target_account_id: sender.id,
                transfer_value: amount,
                old_value: receiver.balance,
                new_value: receiver_new,
                entry_type: HistoryType::TransferReceived,
                description: description.to_string(),
                timestamp,
            });
        }

        let receipt = self.postings.apply_posting(&posting).await?;

        Ok(CommittedTransfer {
            sender,
            receiver,
            sender_new,
            receiver_new,
            receipt,
        })
    }

    // =========================================================================
    // History
    // =========================================================================

    pub async fn list_history(&self) -> Result<Vec<HistoryEntry>, LedgerError> {
        Ok(self.history.find_all().await?)
    }

    pub async fn find_history(&self, id: HistoryId) -> Result<HistoryEntry, LedgerError> {
        self.history
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::HistoryNotFound(id).into())
    }

    /// Entries whose owning account is `account_id`, newest first
    pub async fn history_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<HistoryEntry>, LedgerError> {
        Ok(self.history.find_by_account_id(account_id).await?)
    }

    /// Entries whose counterparty is `account_id`, newest first
    pub async fn history_by_target(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<HistoryEntry>, LedgerError> {
        Ok(self.history.find_by_target_account_id(account_id).await?)
    }

    /// Correct an entry's description. Amounts and balances are immutable.
    pub async fn update_history_description(
        &self,
        id: HistoryId,
        description: &str,
    ) -> Result<HistoryEntry, LedgerError> {
        let entry = self
            .history
            .update_description(id, description)
            .await?
            .ok_or(DomainError::HistoryNotFound(id))?;

        tracing::info!(history_id = id, "History description updated");
        Ok(entry)
    }
}

fn balance_updated(account: &Account, new_balance: Balance, operation: &str) -> LedgerEvent {
    LedgerEvent::AccountBalanceUpdated(BalanceUpdatedData {
        account_id: account.id,
        client_id: account.client_id,
        old_balance: account.balance,
        new_balance,
        change_amount: new_balance.change_since(&account.balance),
        operation_type: operation.to_string(),
    })
}

/// The store's unique client constraint caught a duplicate the lookup missed
fn client_conflict(err: StoreError) -> LedgerError {
    match err {
        StoreError::DuplicateClient(client_id) => DomainError::DuplicateAccount { client_id }.into(),
        other => other.into(),
    }
}

fn log_failure(operation: &str, error: &LedgerError) {
    match error {
        LedgerError::Domain(rule) => {
            tracing::warn!(operation, reason = rule.reason_code(), "{}", rule)
        }
        LedgerError::Store(e) => tracing::error!(operation, error = %e, "Ledger operation failed"),
    }
}

/// Run `attempt` until it commits, retrying stale-balance conflicts with a
/// growing pause.
async fn retry_on_stale<T, F, Fut>(operation: &str, mut attempt: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut tries = 1;

    loop {
        match attempt().await {
            Err(LedgerError::Store(e)) if e.is_retryable() && tries < MAX_POSTING_ATTEMPTS => {
                tracing::warn!(
                    operation,
                    error = %e,
                    "Concurrency conflict, retrying (attempt {}/{})",
                    tries,
                    MAX_POSTING_ATTEMPTS
                );
                tokio::time::sleep(Duration::from_millis(50 * tries as u64)).await;
                tries += 1;
            }
            result => return result,
        }
    }
}
