use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;
use tokio::sync::Notify;

use crate::progression::catalog::BadgeCatalog;
use crate::progression::domain::{BadgeDefinition, BadgeId, BadgeWrite, UserBadgeRecord, UserId};
use crate::progression::rank::RankTable;
use crate::progression::reconciler::{AggregateReconciler, ReconcilerOptions};
use crate::progression::rules::parse_rule;
use crate::progression::store::{
    BadgeStore, ChangeCallback, MemoryBadgeStore, StoreError, Subscription,
};

pub(super) const ALICE: &str = "alice";

pub(super) fn user() -> UserId {
    UserId::new(ALICE)
}

pub(super) fn id(value: &str) -> BadgeId {
    BadgeId::new(value)
}

pub(super) fn options(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub(super) fn sample_catalog() -> Arc<BadgeCatalog> {
    Arc::new(BadgeCatalog::sample().expect("sample catalog parses"))
}

pub(super) fn badge(badge_id: &str, config: &str) -> BadgeDefinition {
    BadgeDefinition {
        id: id(badge_id),
        name: badge_id.to_string(),
        expert_name: None,
        emoji: String::new(),
        question: String::new(),
        theme: String::new(),
        low_skill: false,
        rule: parse_rule(config),
    }
}

pub(super) fn catalog_of(badges: Vec<BadgeDefinition>) -> BadgeCatalog {
    BadgeCatalog::new(badges, RankTable::default())
}

/// `count` plain boolean badges named `b1..bN`, one point each.
pub(super) fn plain_badges(count: usize) -> Vec<BadgeDefinition> {
    (1..=count)
        .map(|index| badge(&format!("b{index}"), r#"{"type":"boolean"}"#))
        .collect()
}

pub(super) fn unlocked(badge_id: &str, level: Option<&str>) -> UserBadgeRecord {
    UserBadgeRecord {
        user_id: user(),
        badge_id: id(badge_id),
        success: true,
        level: level.map(str::to_string),
        user_answer: Some("oui".to_string()),
        was_ever_unlocked: true,
        blocked_by_suspicion: false,
    }
}

pub(super) fn write_for(record: &UserBadgeRecord) -> BadgeWrite {
    BadgeWrite {
        user_id: record.user_id.clone(),
        badge_id: record.badge_id.clone(),
        success: record.success,
        level: record.level.clone(),
        user_answer: record.user_answer.clone(),
        was_ever_unlocked: record.was_ever_unlocked,
    }
}

pub(super) async fn open_session<S: BadgeStore>(
    catalog: Arc<BadgeCatalog>,
    store: Arc<S>,
) -> AggregateReconciler<S> {
    AggregateReconciler::open(user(), catalog, store, ReconcilerOptions::default())
        .await
        .expect("session opens")
}

/// Memory store whose writes can be switched to fail or to wait until released.
#[derive(Default, Clone)]
pub(super) struct FlakyStore {
    pub(super) inner: MemoryBadgeStore,
    fail_writes: Arc<AtomicBool>,
    hang_writes: Arc<AtomicBool>,
    held_writes: Arc<AtomicUsize>,
    release: Arc<Notify>,
}

impl FlakyStore {
    pub(super) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Held writes resume once this is switched back off.
    pub(super) fn hang_writes(&self, hang: bool) {
        self.hang_writes.store(hang, Ordering::SeqCst);
        if !hang {
            self.release.notify_waiters();
        }
    }

    /// Writes that reached the store while it was hanging.
    pub(super) fn held_writes(&self) -> usize {
        self.held_writes.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<(), StoreError> {
        let mut counted = false;
        loop {
            let released = self.release.notified();
            if !self.hang_writes.load(Ordering::SeqCst) {
                break;
            }
            if !counted {
                self.held_writes.fetch_add(1, Ordering::SeqCst);
                counted = true;
            }
            released.await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("remote offline".to_string()));
        }
        Ok(())
    }
}

impl BadgeStore for FlakyStore {
    async fn read_user_badges(&self, user_id: &UserId) -> Result<Vec<UserBadgeRecord>, StoreError> {
        self.inner.read_user_badges(user_id).await
    }

    async fn upsert_user_badge(&self, write: BadgeWrite) -> Result<(), StoreError> {
        self.gate().await?;
        self.inner.upsert_user_badge(write).await
    }

    async fn delete_user_badge(
        &self,
        user_id: &UserId,
        badge_id: &BadgeId,
    ) -> Result<(), StoreError> {
        self.gate().await?;
        self.inner.delete_user_badge(user_id, badge_id).await
    }

    fn on_change(&self, user_id: &UserId, callback: ChangeCallback) -> Subscription {
        self.inner.on_change(user_id, callback)
    }
}

/// Store whose reads always fail.
pub(super) struct UnavailableStore;

impl BadgeStore for UnavailableStore {
    async fn read_user_badges(
        &self,
        _user_id: &UserId,
    ) -> Result<Vec<UserBadgeRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    async fn upsert_user_badge(&self, _write: BadgeWrite) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    async fn delete_user_badge(
        &self,
        _user_id: &UserId,
        _badge_id: &BadgeId,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn on_change(&self, _user_id: &UserId, _callback: ChangeCallback) -> Subscription {
        Subscription::detached()
    }
}

pub(super) async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&body).expect("body is json")
}
