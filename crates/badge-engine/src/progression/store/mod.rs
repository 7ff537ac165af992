//! Persistence boundary. The reconciler only sees [`BadgeStore`]; the in-memory store
//! stands in for the remote backend and the file store for the local fallback.

mod feed;
mod local;
mod memory;

use std::future::Future;

use serde::{Deserialize, Serialize};

use super::domain::{BadgeId, BadgeWrite, UserBadgeRecord, UserId};

pub use feed::{ChangeCallback, ChangeFeed, Subscription};
pub use local::LocalFileStore;
pub use memory::MemoryBadgeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Change notification for one record. Delete events carry the last stored state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: UserBadgeRecord,
}

/// CRUD contract shared by every backend. Upserts are keyed by `(user_id, badge_id)`
/// and never duplicate rows; deletes of missing records succeed.
pub trait BadgeStore: Send + Sync {
    fn read_user_badges(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<UserBadgeRecord>, StoreError>> + Send;

    fn upsert_user_badge(
        &self,
        write: BadgeWrite,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete_user_badge(
        &self,
        user_id: &UserId,
        badge_id: &BadgeId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deliver changes to `user_id`'s records until the subscription is dropped.
    fn on_change(&self, user_id: &UserId, callback: ChangeCallback) -> Subscription;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
    #[error("store io failure: {0}")]
    Io(#[from] std::io::Error),
}
