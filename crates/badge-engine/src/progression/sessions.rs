use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::catalog::BadgeCatalog;
use super::domain::UserId;
use super::reconciler::{AggregateReconciler, ReconcileError, ReconcilerOptions};
use super::store::BadgeStore;

pub type SharedSession<S> = Arc<Mutex<AggregateReconciler<S>>>;

struct SessionEntry<S> {
    session: SharedSession<S>,
    last_used: Instant,
}

/// One reconciler per user, opened on first use and evicted once idle. The
/// per-session mutex is what serializes concurrent requests for the same user.
pub struct SessionRegistry<S> {
    catalog: Arc<BadgeCatalog>,
    store: Arc<S>,
    options: ReconcilerOptions,
    sessions: Mutex<HashMap<UserId, SessionEntry<S>>>,
}

impl<S> SessionRegistry<S>
where
    S: BadgeStore + 'static,
{
    pub fn new(catalog: Arc<BadgeCatalog>, store: Arc<S>, options: ReconcilerOptions) -> Self {
        Self {
            catalog,
            store,
            options,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<BadgeCatalog> {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The map lock is never held while a session opens, so one slow store read
    /// does not stall other users.
    pub async fn session(&self, user_id: &UserId) -> Result<SharedSession<S>, ReconcileError> {
        if let Some(entry) = self.sessions.lock().await.get_mut(user_id) {
            entry.last_used = Instant::now();
            return Ok(Arc::clone(&entry.session));
        }

        let reconciler = AggregateReconciler::open(
            user_id.clone(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.store),
            self.options,
        )
        .await?;

        let mut sessions = self.sessions.lock().await;
        // A concurrent request may have opened the same user meanwhile; keep that one.
        let entry = sessions
            .entry(user_id.clone())
            .or_insert_with(|| SessionEntry {
                session: Arc::new(Mutex::new(reconciler)),
                last_used: Instant::now(),
            });
        entry.last_used = Instant::now();
        let session = Arc::clone(&entry.session);
        debug!(user_id = %user_id, open_sessions = sessions.len(), "session opened");
        Ok(session)
    }

    /// Drop a session; its store subscription ends with it.
    pub async fn close(&self, user_id: &UserId) -> bool {
        self.sessions.lock().await.remove(user_id).is_some()
    }

    /// Drop sessions unused for at least `max_idle`. Sessions still referenced by an
    /// in-flight request are kept. Returns how many were evicted.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| {
            Arc::strong_count(&entry.session) > 1 || entry.last_used.elapsed() < max_idle
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, open_sessions = sessions.len(), "idle sessions evicted");
        }
        evicted
    }

    pub async fn open_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
