use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{
    BadgeStore, ChangeCallback, ChangeEvent, ChangeFeed, ChangeKind, StoreError, Subscription,
};
use crate::progression::domain::{BadgeId, BadgeWrite, UserBadgeRecord, UserId};

const FILE_VERSION: u32 = 1;

/// Local-storage fallback: every record lives in one JSON document, rewritten
/// atomically (temp file then rename) on each mutation.
#[derive(Debug)]
pub struct LocalFileStore {
    path: PathBuf,
    io: Mutex<()>,
    feed: ChangeFeed,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
    version: u32,
    saved_at: DateTime<Utc>,
    records: Vec<UserBadgeRecord>,
}

impl LocalFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
            feed: ChangeFeed::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    async fn load(&self) -> Result<Vec<UserBadgeRecord>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let file: StoreFile = serde_json::from_slice(&bytes).map_err(|err| {
            warn!(path = %self.path.display(), error = %err, "badge store file unreadable");
            StoreError::Corrupt(format!("{}: {err}", self.path.display()))
        })?;
        if file.version != FILE_VERSION {
            return Err(StoreError::Corrupt(format!(
                "{}: unsupported version {}",
                self.path.display(),
                file.version
            )));
        }
        Ok(file.records)
    }

    async fn save(&self, mut records: Vec<UserBadgeRecord>) -> Result<(), StoreError> {
        records.sort_by(|left, right| {
            (&left.user_id, &left.badge_id).cmp(&(&right.user_id, &right.badge_id))
        });
        let file = StoreFile {
            version: FILE_VERSION,
            saved_at: Utc::now(),
            records,
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;

        if let Some(parent) = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

impl BadgeStore for LocalFileStore {
    async fn read_user_badges(&self, user_id: &UserId) -> Result<Vec<UserBadgeRecord>, StoreError> {
        let _guard = self.io.lock().await;
        let mut records: Vec<UserBadgeRecord> = self
            .load()
            .await?
            .into_iter()
            .filter(|record| &record.user_id == user_id)
            .collect();
        records.sort_by(|left, right| left.badge_id.cmp(&right.badge_id));
        Ok(records)
    }

    async fn upsert_user_badge(&self, write: BadgeWrite) -> Result<(), StoreError> {
        let event = {
            let _guard = self.io.lock().await;
            let mut records = self.load().await?;
            let position = records.iter().position(|record| {
                record.user_id == write.user_id && record.badge_id == write.badge_id
            });

            let (kind, record) = match position {
                Some(position) => {
                    let blocked = records[position].blocked_by_suspicion;
                    let record = write.into_record(blocked);
                    records[position] = record.clone();
                    (ChangeKind::Update, record)
                }
                None => {
                    let record = write.into_record(false);
                    records.push(record.clone());
                    (ChangeKind::Insert, record)
                }
            };

            self.save(records).await?;
            ChangeEvent { kind, record }
        };

        debug!(
            user_id = %event.record.user_id,
            badge_id = %event.record.badge_id,
            path = %self.path.display(),
            "badge record written to local store"
        );
        self.feed.publish(event);
        Ok(())
    }

    async fn delete_user_badge(
        &self,
        user_id: &UserId,
        badge_id: &BadgeId,
    ) -> Result<(), StoreError> {
        let removed = {
            let _guard = self.io.lock().await;
            let mut records = self.load().await?;
            let position = records
                .iter()
                .position(|record| &record.user_id == user_id && &record.badge_id == badge_id);
            match position {
                Some(position) => {
                    let record = records.remove(position);
                    self.save(records).await?;
                    Some(record)
                }
                None => None,
            }
        };

        if let Some(record) = removed {
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
