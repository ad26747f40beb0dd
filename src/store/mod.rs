//! Persistent document store.
//!
//! The engine only ever does single-key reads and writes against named
//! collections, expressed by the [`Store`] trait. The in-tree implementation
//! is SQLite-backed ([`SqliteStore`]); a networked document store can be
//! substituted without changing any caller.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chatter_proto::{Conversation, FriendLists, Group, UserProfile};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl StoreError {
    /// Transient errors are worth retrying; corrupt documents are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

/// Single-key document operations against the backing store.
///
/// Every method is one key read or one key write; no multi-key transaction
/// primitive exists (the friend-edge manager compensates, see
/// `engine::friends`).
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, email: &str) -> Result<Option<UserProfile>, StoreError>;
    async fn put_user(&self, user: &UserProfile) -> Result<(), StoreError>;

    async fn get_group(&self, group_id: &str) -> Result<Option<Group>, StoreError>;
    async fn put_group(&self, group: &Group) -> Result<(), StoreError>;
    async fn delete_group(&self, group_id: &str) -> Result<(), StoreError>;
    /// Scan groups and keep those listing `email` as a member.
    async fn groups_of_member(&self, email: &str) -> Result<Vec<Group>, StoreError>;

    async fn get_conversation(&self, key: &str) -> Result<Option<Conversation>, StoreError>;
    async fn put_conversation(&self, conversation: &Conversation) -> Result<(), StoreError>;

    async fn get_friend_lists(&self, email: &str) -> Result<Option<FriendLists>, StoreError>;
    async fn put_friend_lists(&self, email: &str, lists: &FriendLists)
        -> Result<(), StoreError>;
}

/// Bounded retry attempts for transient store failures.
const RETRY_ATTEMPTS: u32 = 3;

/// Run a store operation, retrying transient failures with a short backoff
/// before surfacing the error.
pub async fn with_retry<T, F, Fut>(what: &'static str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt + 1 < RETRY_ATTEMPTS => {
                attempt += 1;
                warn!(%error, attempt, what, "transient store failure, retrying");
                tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
            }
            Err(error) => return Err(error),
        }
    }
}
