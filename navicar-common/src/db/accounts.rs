//! Account store
//!
//! Durable collection of server logins with the "at most one active, at most
//! one default" invariant. The invariant is enforced twice: flag changes run
//! in a transaction (clear all, set one), and partial unique indexes reject
//! any write that would leave two flagged rows.
//!
//! Every successful mutation republishes the full list on a `watch` channel
//! so observers always see the latest snapshot.

use crate::db::models::{Account, NewAccount};
use crate::{Error, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing::{debug, info};

const SELECT_ACCOUNT: &str = r#"
    SELECT id, server_url, username, password, auth_token,
           subsonic_salt, subsonic_token, is_active, is_default, created_at
    FROM accounts
"#;

/// Which exclusive flag a transaction targets
#[derive(Debug, Clone, Copy)]
enum Flag {
    Active,
    Default,
}

impl Flag {
    fn column(self) -> &'static str {
        match self {
            Flag::Active => "is_active",
            Flag::Default => "is_default",
        }
    }
}

/// SQLite-backed account store
#[derive(Clone)]
pub struct AccountStore {
    db: SqlitePool,
    list_tx: watch::Sender<Vec<Account>>,
}

impl AccountStore {
    /// Open the store over an initialized database and load the initial list
    pub async fn new(db: SqlitePool) -> Result<Self> {
        let initial = fetch_all(&db).await?;
        let (list_tx, _) = watch::channel(initial);
        Ok(Self { db, list_tx })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Insert an account and return its generated id
    ///
    /// When `is_active`/`is_default` are requested the other rows lose the
    /// flag in the same transaction.
    pub async fn add(&self, account: NewAccount) -> Result<i64> {
        if account.server_url.trim().is_empty() || account.username.trim().is_empty() {
            return Err(Error::InvalidInput(
                "server_url and username are required".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        if account.is_active {
            sqlx::query("UPDATE accounts SET is_active = 0 WHERE is_active = 1")
                .execute(&mut *tx)
                .await?;
        }
        if account.is_default {
            sqlx::query("UPDATE accounts SET is_default = 0 WHERE is_default = 1")
                .execute(&mut *tx)
                .await?;
        }

        let id = sqlx::query(
            r#"
            INSERT INTO accounts (
                server_url, username, password, auth_token,
                subsonic_salt, subsonic_token, is_active, is_default, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.server_url)
        .bind(&account.username)
        .bind(&account.password)
        .bind(&account.auth_token)
        .bind(&account.streaming_salt)
        .bind(&account.streaming_token)
        .bind(account.is_active)
        .bind(account.is_default)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        info!("Added account {} ({}@{})", id, account.username, account.server_url);
        self.publish().await?;
        Ok(id)
    }

    /// Overwrite the credential fields of an existing account
    ///
    /// The active/default flags are not touched here; use `set_active` and
    /// `set_default`.
    pub async fn update(&self, account: &Account) -> Result<()> {
        let changed = sqlx::query(
            r#"
            UPDATE accounts
            SET server_url = ?, username = ?, password = ?, auth_token = ?,
                subsonic_salt = ?, subsonic_token = ?
            WHERE id = ?
            "#,
        )
        .bind(&account.server_url)
        .bind(&account.username)
        .bind(&account.password)
        .bind(&account.auth_token)
        .bind(&account.streaming_salt)
        .bind(&account.streaming_token)
        .bind(account.id)
        .execute(&self.db)
        .await?
        .rows_affected();

        if changed == 0 {
            return Err(Error::NotFound(format!("account {}", account.id)));
        }

        debug!("Updated account {}", account.id);
        self.publish().await
    }

    /// All accounts ordered by id
    pub async fn list(&self) -> Result<Vec<Account>> {
        fetch_all(&self.db).await
    }

    /// Live view of the account list
    ///
    /// The receiver always holds the latest list; it changes after every
    /// successful mutation.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Account>> {
        self.list_tx.subscribe()
    }

    pub async fn get(&self, id: i64) -> Result<Option<Account>> {
        let sql = format!("{} WHERE id = ?", SELECT_ACCOUNT);
        Ok(sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    /// Find an account by server and username
    pub async fn find(&self, server_url: &str, username: &str) -> Result<Option<Account>> {
        let sql = format!("{} WHERE server_url = ? AND username = ? ORDER BY id LIMIT 1", SELECT_ACCOUNT);
        Ok(sqlx::query_as::<_, Account>(&sql)
            .bind(server_url)
            .bind(username)
            .fetch_optional(&self.db)
            .await?)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let changed = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?
            .rows_affected();

        if changed == 0 {
            return Err(Error::NotFound(format!("account {}", id)));
        }

        info!("Deleted account {}", id);
        self.publish().await
    }

    /// Make `id` the only active account
    ///
    /// An unknown id rolls back and leaves the previous active account intact.
    pub async fn set_active(&self, id: i64) -> Result<()> {
        self.set_exclusive(Flag::Active, id).await?;
        info!("Account {} is now active", id);
        Ok(())
    }

    /// Make `id` the only default account
    pub async fn set_default(&self, id: i64) -> Result<()> {
        self.set_exclusive(Flag::Default, id).await?;
        info!("Account {} is now default", id);
        Ok(())
    }

    /// Deactivate every account
    pub async fn clear_active(&self) -> Result<()> {
        sqlx::query("UPDATE accounts SET is_active = 0 WHERE is_active = 1")
            .execute(&self.db)
            .await?;
        self.publish().await
    }

    pub async fn get_active(&self) -> Result<Option<Account>> {
        let sql = format!("{} WHERE is_active = 1 LIMIT 1", SELECT_ACCOUNT);
        Ok(sqlx::query_as::<_, Account>(&sql)
            .fetch_optional(&self.db)
            .await?)
    }

    pub async fn get_default(&self) -> Result<Option<Account>> {
        let sql = format!("{} WHERE is_default = 1 LIMIT 1", SELECT_ACCOUNT);
        Ok(sqlx::query_as::<_, Account>(&sql)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn set_exclusive(&self, flag: Flag, id: i64) -> Result<()> {
        let column = flag.column();
        let mut tx = self.db.begin().await?;

        sqlx::query(&format!("UPDATE accounts SET {col} = 0 WHERE {col} = 1", col = column))
            .execute(&mut *tx)
            .await?;

        let changed = sqlx::query(&format!("UPDATE accounts SET {} = 1 WHERE id = ?", column))
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if changed != 1 {
            tx.rollback().await?;
            return Err(Error::NotFound(format!("account {}", id)));
        }

        tx.commit().await?;
        self.publish().await
    }

    async fn publish(&self) -> Result<()> {
        let list = fetch_all(&self.db).await?;
        self.list_tx.send_replace(list);
        Ok(())
    }
}

async fn fetch_all(db: &SqlitePool) -> Result<Vec<Account>> {
    let sql = format!("{} ORDER BY id", SELECT_ACCOUNT);
    Ok(sqlx::query_as::<_, Account>(&sql).fetch_all(db).await?)
}
