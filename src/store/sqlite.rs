//! SQLite-backed document store.
//!
//! One row per document, one table per collection, JSON bodies. This keeps
//! the store honest to its contract: single-key get/put, no cross-document
//! transactions.

use super::{Store, StoreError};
use async_trait::async_trait;
use chatter_proto::{Conversation, FriendLists, Group, UserProfile};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (email TEXT PRIMARY KEY, doc TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS groups (group_id TEXT PRIMARY KEY, doc TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS conversations (conversation_id TEXT PRIMARY KEY, doc TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS friends (email TEXT PRIMARY KEY, doc TEXT NOT NULL)",
];

/// Document store over a SQLite connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connection acquire timeout - prevents connection storms from blocking
    /// indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open (and create if needed) the store at `path`, applying the schema.
    ///
    /// `":memory:"` opens a uniquely named shared-cache in-memory database;
    /// the unique name keeps parallel tests from colliding.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let uri = format!(
                "file:chatterd-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );
            let options = SqliteConnectOptions::new()
                .filename(&uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        tracing::warn!(path = %parent.display(), error = %e, "failed to create store directory");
                    }
                }
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!(%path, "document store opened");
        Ok(Self { pool })
    }

    async fn get_doc<T: DeserializeOwned>(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let query = format!("SELECT doc FROM {table} WHERE {key_column} = ?");
        let row = sqlx::query(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let doc: String = row.get("doc");
                Ok(Some(serde_json::from_str(&doc)?))
            }
            None => Ok(None),
        }
    }

    async fn put_doc<T: Serialize>(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let doc = serde_json::to_string(value)?;
        let query = format!(
            "INSERT INTO {table} ({key_column}, doc) VALUES (?, ?) \
             ON CONFLICT({key_column}) DO UPDATE SET doc = excluded.doc"
        );
        sqlx::query(&query)
            .bind(key)
            .bind(doc)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_user(&self, email: &str) -> Result<Option<UserProfile>, StoreError> {
        self.get_doc("users", "email", email).await
    }

    async fn put_user(&self, user: &UserProfile) -> Result<(), StoreError> {
        self.put_doc("users", "email", &user.email, user).await
    }

    async fn get_group(&self, group_id: &str) -> Result<Option<Group>, StoreError> {
        self.get_doc("groups", "group_id", group_id).await
    }

    async fn put_group(&self, group: &Group) -> Result<(), StoreError> {
        self.put_doc("groups", "group_id", &group.group_id, group)
            .await
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM groups WHERE group_id = ?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn groups_of_member(&self, email: &str) -> Result<Vec<Group>, StoreError> {
        let rows = sqlx::query("SELECT doc FROM groups")
            .fetch_all(&self.pool)
            .await?;
        let mut groups = Vec::new();
        for row in rows {
            let doc: String = row.get("doc");
            let group: Group = serde_json::from_str(&doc)?;
            if group.is_member(email) {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    async fn get_conversation(&self, key: &str) -> Result<Option<Conversation>, StoreError> {
        self.get_doc("conversations", "conversation_id", key).await
    }

    async fn put_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        self.put_doc(
            "conversations",
            "conversation_id",
            &conversation.conversation_id,
            conversation,
        )
        .await
    }

    async fn get_friend_lists(&self, email: &str) -> Result<Option<FriendLists>, StoreError> {
        self.get_doc("friends", "email", email).await
    }

    async fn put_friend_lists(
        &self,
        email: &str,
        lists: &FriendLists,
    ) -> Result<(), StoreError> {
        self.put_doc("friends", "email", email, lists).await
    }
}
