use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{
    BadgeStore, ChangeCallback, ChangeEvent, ChangeFeed, ChangeKind, StoreError, Subscription,
};
use crate::progression::domain::{BadgeId, BadgeWrite, UserBadgeRecord, UserId};

type RecordKey = (UserId, BadgeId);

/// Authoritative in-process store. Every mutation is published on the change feed,
/// including the reconciler's own writes.
#[derive(Debug, Default, Clone)]
pub struct MemoryBadgeStore {
    records: Arc<Mutex<HashMap<RecordKey, UserBadgeRecord>>>,
    feed: ChangeFeed,
}

impl MemoryBadgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load records without notifying subscribers.
    pub fn seed(&self, records: impl IntoIterator<Item = UserBadgeRecord>) {
        let mut guard = self.records.lock().expect("badge store mutex poisoned");
        for record in records {
            guard.insert((record.user_id.clone(), record.badge_id.clone()), record);
        }
    }

    /// The user's records ordered by badge id.
    pub fn snapshot(&self, user_id: &UserId) -> Vec<UserBadgeRecord> {
        let guard = self.records.lock().expect("badge store mutex poisoned");
        let mut records: Vec<UserBadgeRecord> = guard
            .values()
            .filter(|record| &record.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|left, right| left.badge_id.cmp(&right.badge_id));
        records
    }

    /// Moderation hook: set or clear the suspicion flag on an existing record.
    /// Returns `false` when the record does not exist.
    pub fn flag_suspicion(&self, user_id: &UserId, badge_id: &BadgeId, flagged: bool) -> bool {
        let event = {
            let mut guard = self.records.lock().expect("badge store mutex poisoned");
            let Some(record) = guard.get_mut(&(user_id.clone(), badge_id.clone())) else {
                return false;
            };
            record.blocked_by_suspicion = flagged;
            ChangeEvent {
                kind: ChangeKind::Update,
                record: record.clone(),
            }
        };

        self.feed.publish(event);
        true
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

impl BadgeStore for MemoryBadgeStore {
    async fn read_user_badges(&self, user_id: &UserId) -> Result<Vec<UserBadgeRecord>, StoreError> {
        Ok(self.snapshot(user_id))
    }

    async fn upsert_user_badge(&self, write: BadgeWrite) -> Result<(), StoreError> {
        let event = {
            let mut guard = self.records.lock().expect("badge store mutex poisoned");
            let key = (write.user_id.clone(), write.badge_id.clone());
            let existing = guard.get(&key);
            let kind = if existing.is_some() {
                ChangeKind::Update
            } else {
                ChangeKind::Insert
            };
            let blocked = existing.is_some_and(|record| record.blocked_by_suspicion);
            let record = write.into_record(blocked);
            guard.insert(key, record.clone());
            ChangeEvent { kind, record }
        };

        debug!(
            user_id = %event.record.user_id,
            badge_id = %event.record.badge_id,
            kind = ?event.kind,
            "badge record upserted"
        );
        self.feed.publish(event);
        Ok(())
    }

    async fn delete_user_badge(
        &self,
        user_id: &UserId,
        badge_id: &BadgeId,
    ) -> Result<(), StoreError> {
        let removed = self
            .records
            .lock()
            .expect("badge store mutex poisoned")
            .remove(&(user_id.clone(), badge_id.clone()));

        if let Some(record) = removed {
            debug!(user_id = %user_id, badge_id = %badge_id, "badge record deleted");
            self.feed.publish(ChangeEvent {
                kind: ChangeKind::Delete,
                record,
            });
        }
        Ok(())
    }

    fn on_change(&self, user_id: &UserId, callback: ChangeCallback) -> Subscription {
        self.feed.subscribe(user_id, callback)
    }
}
