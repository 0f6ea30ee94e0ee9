//! PostgreSQL store
//!
//! Tables `accounts` and `history_transfer`, see `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;

use crate::domain::{
    Account, AccountChanges, AccountId, Amount, Balance, ClientId, HistoryEntry, HistoryId,
    HistoryType, NewAccount, NewHistoryEntry,
};

use super::{
    AccountStore, HistoryStore, Posting, PostingLeg, PostingReceipt, PostingStore, StoreError,
};

const ACCOUNT_COLUMNS: &str =
    "id, client_id, value, history_id, agency, account_number, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, account_id, transfer_value, target_id_account, description, \
     new_value, old_value, type, timestamp, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: i64,
    client_id: i64,
    value: Decimal,
    history_id: i64,
    agency: String,
    account_number: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let balance = Balance::new(row.value)
            .map_err(|e| StoreError::Corrupt(format!("account {}: {}", row.id, e)))?;

        Ok(Account {
            id: row.id,
            client_id: row.client_id,
            balance,
            history_id: row.history_id,
            agency: row.agency,
            account_number: row.account_number,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    account_id: i64,
    transfer_value: Decimal,
    target_id_account: i64,
    description: String,
    new_value: Decimal,
    old_value: Decimal,
    #[sqlx(rename = "type")]
    entry_type: String,
    timestamp: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let corrupt = |e: String| StoreError::Corrupt(format!("history {}: {}", row.id, e));

        Ok(HistoryEntry {
            id: row.id,
            account_id: row.account_id,
            target_account_id: row.target_id_account,
            transfer_value: Amount::new(row.transfer_value).map_err(|e| corrupt(e.to_string()))?,
            old_value: Balance::new(row.old_value).map_err(|e| corrupt(e.to_string()))?,
            new_value: Balance::new(row.new_value).map_err(|e| corrupt(e.to_string()))?,
            entry_type: row.entry_type.parse::<HistoryType>().map_err(corrupt)?,
            description: row.description,
            timestamp: row.timestamp,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_entries(rows: Vec<HistoryRow>) -> Result<Vec<HistoryEntry>, StoreError> {
    rows.into_iter().map(HistoryEntry::try_from).collect()
}

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Compare-and-set one leg inside the posting transaction
    async fn apply_leg(
        tx: &mut Transaction<'_, Postgres>,
        leg: &PostingLeg,
    ) -> Result<Account, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            r#"
            UPDATE accounts
            SET value = $3, updated_at = NOW()
            WHERE id = $1 AND value = $2
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(leg.account_id)
        .bind(leg.expected.value())
        .bind(leg.new.value())
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = row {
            return Account::try_from(row);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)")
            .bind(leg.account_id)
            .fetch_one(&mut **tx)
            .await?;

        if exists {
            Err(StoreError::StaleBalance {
                account_id: leg.account_id,
            })
        } else {
            Err(StoreError::MissingAccount(leg.account_id))
        }
    }

    async fn insert_entry(
        tx: &mut Transaction<'_, Postgres>,
        entry: &NewHistoryEntry,
    ) -> Result<HistoryEntry, StoreError> {
        let row: HistoryRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO history_transfer (
                account_id, transfer_value, target_id_account, description,
                new_value, old_value, type, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {HISTORY_COLUMNS}
            "#
        ))
        .bind(entry.account_id)
        .bind(entry.transfer_value.value())
        .bind(entry.target_account_id)
        .bind(&entry.description)
        .bind(entry.new_value.value())
        .bind(entry.old_value.value())
        .bind(entry.entry_type.as_str())
        .bind(entry.timestamp)
        .fetch_one(&mut **tx)
        .await?;

        HistoryEntry::try_from(row)
    }

    async fn history_where(
        &self,
        column: &str,
        account_id: AccountId,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history_transfer WHERE {column} = $1 \
             ORDER BY timestamp DESC, id DESC"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        into_entries(rows)
    }
}

/// `accounts.client_id` is unique; a violation means another account took the client
fn client_conflict(err: sqlx::Error, client_id: Option<ClientId>) -> StoreError {
    match (&err, client_id) {
        (sqlx::Error::Database(db), Some(client_id)) if db.is_unique_violation() => {
            StoreError::DuplicateClient(client_id)
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Account::try_from).transpose()
    }

    async fn find_by_client_id(&self, client_id: ClientId) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE client_id = $1"
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Account>, StoreError> {
        let rows: Vec<AccountRow> =
            sqlx::query_as(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn create(&self, account: &NewAccount) -> Result<Account, StoreError> {
        let row: AccountRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO accounts (client_id, value, history_id, agency, account_number)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(account.client_id)
        .bind(account.balance.value())
        .bind(account.history_id)
        .bind(&account.agency)
        .bind(&account.account_number)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| client_conflict(e, Some(account.client_id)))?;

        Account::try_from(row)
    }

    async fn update(
        &self,
        id: AccountId,
        changes: &AccountChanges,
    ) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            r#"
            UPDATE accounts
            SET client_id = COALESCE($2, client_id),
                history_id = COALESCE($3, history_id),
                agency = COALESCE($4, agency),
                account_number = COALESCE($5, account_number),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.client_id)
        .bind(changes.history_id)
        .bind(changes.agency.as_deref())
        .bind(changes.account_number.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| client_conflict(e, changes.client_id))?;

        row.map(Account::try_from).transpose()
    }

    async fn delete(&self, id: AccountId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn find_all(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history_transfer ORDER BY timestamp DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        into_entries(rows)
    }

    async fn find_by_id(&self, id: HistoryId) -> Result<Option<HistoryEntry>, StoreError> {
        let row: Option<HistoryRow> = sqlx::query_as(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history_transfer WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(HistoryEntry::try_from).transpose()
    }

    async fn find_by_account_id(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        self.history_where("account_id", account_id).await
    }

    async fn find_by_target_account_id(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        self.history_where("target_id_account", account_id).await
    }

    async fn update_description(
        &self,
        id: HistoryId,
        description: &str,
    ) -> Result<Option<HistoryEntry>, StoreError> {
        let row: Option<HistoryRow> = sqlx::query_as(&format!(
            r#"
            UPDATE history_transfer
            SET description = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {HISTORY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(description)
        .fetch_optional(&self.pool)
        .await?;

        row.map(HistoryEntry::try_from).transpose()
    }
}

#[async_trait]
impl PostingStore for PgStore {
    async fn apply_posting(&self, posting: &Posting) -> Result<PostingReceipt, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Rows are locked in ascending id order; an early return drops the
        // transaction, which rolls it back.
        let mut updated: HashMap<AccountId, Account> = HashMap::with_capacity(posting.legs.len());
        for leg in posting.legs_in_lock_order() {
            let account = Self::apply_leg(&mut tx, leg).await?;
            updated.insert(account.id, account);
        }

        let mut entries = Vec::with_capacity(posting.entries.len());
        for entry in &posting.entries {
            entries.push(Self::insert_entry(&mut tx, entry).await?);
        }

        tx.commit().await?;

        let accounts = posting
            .legs
            .iter()
            .map(|leg| {
                updated
                    .remove(&leg.account_id)
                    .ok_or(StoreError::MissingAccount(leg.account_id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PostingReceipt { accounts, entries })
    }
}
