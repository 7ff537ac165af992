//! Per-session orchestrator that owns the derived aggregate.
//!
//! Every public operation takes `&mut self`, so calls on one session never overlap.
//! Change notifications arrive through the store's callback into an inbox and are
//! merged strictly in arrival order whenever the session is idle. Writes go to the
//! store first; local records only change once the store has accepted them.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::aggregate::{self, AggregateState};
use super::catalog::BadgeCatalog;
use super::domain::{BadgeDefinition, BadgeId, BadgeWrite, UserBadgeRecord, UserId};
use super::evaluation::{AnswerEvaluator, EvaluationResult};
use super::ghost::{GhostResolver, GhostTransition};
use super::levels;
use super::scoring;
use super::store::{BadgeStore, ChangeEvent, ChangeKind, StoreError, Subscription};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcilerOptions {
    /// Lower bound override for ghost resolution passes.
    pub max_ghost_passes: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    Applying,
}

/// Transient notification for the presentation layer; nothing in the engine reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineEvent {
    pub badge_id: BadgeId,
    #[serde(flatten)]
    pub kind: EngineEventKind,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEventKind {
    BadgeUnlocked { level: Option<String> },
    BadgeBlocked { message: String },
    BadgeReblocked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub badge_id: BadgeId,
    pub evaluation: EvaluationResult,
    pub points: i32,
    pub aggregate: AggregateState,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("unknown badge '{0}'")]
    UnknownBadge(BadgeId),
    #[error("{message}")]
    Validation { badge_id: BadgeId, message: String },
    #[error("could not save your progress, please retry")]
    Write(#[source] StoreError),
    #[error("could not load badge records")]
    Read(#[source] StoreError),
}

pub struct AggregateReconciler<S> {
    user_id: UserId,
    catalog: Arc<BadgeCatalog>,
    store: Arc<S>,
    evaluator: AnswerEvaluator,
    resolver: GhostResolver,
    records: BTreeMap<BadgeId, UserBadgeRecord>,
    aggregate: AggregateState,
    phase: SessionPhase,
    inbox: mpsc::UnboundedReceiver<ChangeEvent>,
    queue: VecDeque<ChangeEvent>,
    events: Vec<EngineEvent>,
    _subscription: Subscription,
}

impl<S: BadgeStore> AggregateReconciler<S> {
    /// Subscribe, load the user's records, then run the first ghost/aggregate pass.
    pub async fn open(
        user_id: UserId,
        catalog: Arc<BadgeCatalog>,
        store: Arc<S>,
        options: ReconcilerOptions,
    ) -> Result<Self, ReconcileError> {
        let (sender, inbox) = mpsc::unbounded_channel::<ChangeEvent>();
        // Subscribing before the read means no change can fall between the two.
        let subscription = store.on_change(
            &user_id,
            Arc::new(move |event: ChangeEvent| {
                let _ = sender.send(event);
            }),
        );
        let records = store
            .read_user_badges(&user_id)
            .await
            .map_err(ReconcileError::Read)?;

        let mut reconciler = Self {
            aggregate: AggregateState::empty(&catalog),
            user_id,
            catalog,
            store,
            evaluator: AnswerEvaluator::new(),
            resolver: GhostResolver::with_max_passes(options.max_ghost_passes),
            records: BTreeMap::new(),
            phase: SessionPhase::Idle,
            inbox,
            queue: VecDeque::new(),
            events: Vec::new(),
            _subscription: subscription,
        };
        reconciler.replace_records(records);

        reconciler.phase = SessionPhase::Applying;
        reconciler.settle().await;
        reconciler.phase = SessionPhase::Idle;
        // Echoes of the first pass's own ghost writes.
        reconciler.drain().await;

        info!(
            user_id = %reconciler.user_id,
            unlocked = reconciler.aggregate.unlocked_count,
            skill_total = reconciler.aggregate.skill_total,
            "progression session opened"
        );
        Ok(reconciler)
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn catalog(&self) -> &BadgeCatalog {
        &self.catalog
    }

    pub fn aggregate(&self) -> &AggregateState {
        &self.aggregate
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn record(&self, badge_id: &BadgeId) -> Option<&UserBadgeRecord> {
        self.records.get(badge_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &UserBadgeRecord> {
        self.records.values()
    }

    /// Drain the transient UI events accumulated so far.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Evaluate an answer, persist the outcome, then re-resolve ghosts and the aggregate.
    /// Invalid answers persist nothing. A failed write leaves local state untouched.
    #[instrument(skip_all, fields(user_id = %self.user_id, badge_id = %badge_id))]
    pub async fn apply_answer(
        &mut self,
        badge_id: &BadgeId,
        raw_answer: &str,
        selected_options: &[String],
    ) -> Result<AnswerOutcome, ReconcileError> {
        let catalog = Arc::clone(&self.catalog);
        let badge = catalog
            .get(badge_id)
            .ok_or_else(|| ReconcileError::UnknownBadge(badge_id.clone()))?;
        if badge.is_ghost() {
            return Err(ReconcileError::Validation {
                badge_id: badge_id.clone(),
                message: "This badge unlocks on its own once its prerequisites are met.".into(),
            });
        }

        let evaluation = self
            .evaluator
            .evaluate(&badge.rule, raw_answer, selected_options);
        if evaluation.is_invalid() {
            debug!(message = %evaluation.message, "answer rejected as malformed");
            return Err(ReconcileError::Validation {
                badge_id: badge_id.clone(),
                message: evaluation.message,
            });
        }

        self.begin().await?;
        let result = self
            .record_answer(badge, evaluation, raw_answer, selected_options)
            .await;
        self.phase = SessionPhase::Idle;
        self.drain().await;

        result.map(|(evaluation, points)| AnswerOutcome {
            badge_id: badge_id.clone(),
            evaluation,
            points,
            aggregate: self.aggregate.clone(),
        })
    }

    async fn record_answer(
        &mut self,
        badge: &BadgeDefinition,
        evaluation: EvaluationResult,
        raw_answer: &str,
        selected_options: &[String],
    ) -> Result<(EvaluationResult, i32), ReconcileError> {
        let previous = self.records.get(&badge.id);
        let blocked = previous.is_some_and(|record| record.blocked_by_suspicion);
        let was_ever_unlocked = previous.is_some_and(|record| record.was_ever_unlocked);
        let user_answer = if selected_options.is_empty() {
            raw_answer.trim().to_string()
        } else {
            selected_options.join(", ")
        };

        let write = if evaluation.ok() {
            BadgeWrite {
                user_id: self.user_id.clone(),
                badge_id: badge.id.clone(),
                success: true,
                level: evaluation.level.clone(),
                user_answer: Some(user_answer),
                was_ever_unlocked: true,
            }
        } else {
            BadgeWrite {
                user_id: self.user_id.clone(),
                badge_id: badge.id.clone(),
                success: false,
                level: Some(levels::LEVEL_ZERO.to_string()),
                user_answer: Some(user_answer),
                was_ever_unlocked,
            }
        };

        self.store
            .upsert_user_badge(write.clone())
            .await
            .map_err(|err| {
                error!(error = %err, "badge write failed; local state left unchanged");
                ReconcileError::Write(err)
            })?;
        self.records
            .insert(badge.id.clone(), write.into_record(blocked));

        let points = if evaluation.ok() {
            let points = scoring::points(badge, evaluation.level.as_deref());
            info!(level = ?evaluation.level, points, "badge unlocked");
            self.push_event(
                &badge.id,
                EngineEventKind::BadgeUnlocked {
                    level: evaluation.display_level.clone(),
                },
            );
            points
        } else {
            info!("badge blocked");
            self.push_event(
                &badge.id,
                EngineEventKind::BadgeBlocked {
                    message: evaluation.message.clone(),
                },
            );
            0
        };

        self.settle().await;
        Ok((evaluation, points))
    }

    /// Queue a change notification and merge everything pending, oldest first.
    #[instrument(skip_all, fields(user_id = %self.user_id, badge_id = %event.record.badge_id))]
    pub async fn apply_remote_change(
        &mut self,
        event: ChangeEvent,
    ) -> Result<&AggregateState, ReconcileError> {
        self.collect_inbox();
        self.queue.push_back(event);
        self.pump().await?;
        Ok(&self.aggregate)
    }

    /// Merge changes delivered by the store subscription. Returns how many were applied.
    pub async fn pump(&mut self) -> Result<usize, ReconcileError> {
        self.recover().await?;
        Ok(self.drain().await)
    }

    /// Admin retraction: delete the record outright, then settle as usual.
    #[instrument(skip_all, fields(user_id = %self.user_id, badge_id = %badge_id))]
    pub async fn retract_badge(
        &mut self,
        badge_id: &BadgeId,
    ) -> Result<&AggregateState, ReconcileError> {
        if self.catalog.get(badge_id).is_none() {
            return Err(ReconcileError::UnknownBadge(badge_id.clone()));
        }

        self.begin().await?;
        let deleted = self
            .store
            .delete_user_badge(&self.user_id, badge_id)
            .await
            .map_err(|err| {
                error!(error = %err, "badge deletion failed; local state left unchanged");
                ReconcileError::Write(err)
            });
        if deleted.is_ok() {
            let removed = self.records.remove(badge_id);
            if removed.is_some_and(|record| record.success) {
                self.push_event(badge_id, EngineEventKind::BadgeReblocked);
            }
            self.settle().await;
        }
        self.phase = SessionPhase::Idle;
        self.drain().await;

        deleted.map(|()| &self.aggregate)
    }

    /// Recompute the aggregate from the current records. Pure: calling it again with
    /// no intervening change yields an identical state.
    pub fn recompute_aggregate(&mut self) -> &AggregateState {
        let records = self.record_list();
        self.aggregate = AggregateState::recompute(&self.catalog, &records, &self.resolver);
        &self.aggregate
    }

    async fn begin(&mut self) -> Result<(), ReconcileError> {
        self.recover().await?;
        self.drain().await;
        self.phase = SessionPhase::Applying;
        Ok(())
    }

    /// A phase still at `Applying` means an earlier operation was dropped mid-write;
    /// the store is the only trustworthy state left.
    async fn recover(&mut self) -> Result<(), ReconcileError> {
        if self.phase != SessionPhase::Applying {
            return Ok(());
        }

        warn!(user_id = %self.user_id, "previous operation was abandoned; resynchronizing");
        let records = self
            .store
            .read_user_badges(&self.user_id)
            .await
            .map_err(ReconcileError::Read)?;
        self.replace_records(records);
        // Anything queued predates the read.
        self.collect_inbox();
        self.queue.clear();
        self.settle().await;
        self.phase = SessionPhase::Idle;
        Ok(())
    }

    /// Merge queued changes FIFO, settling after each batch that changed a record.
    /// Echoes of our own writes merge as no-ops, which ends the loop.
    async fn drain(&mut self) -> usize {
        let mut applied = 0;
        loop {
            self.collect_inbox();
            if self.queue.is_empty() {
                return applied;
            }

            self.phase = SessionPhase::Applying;
            let mut changed = false;
            while let Some(event) = self.queue.pop_front() {
                applied += 1;
                changed |= self.merge(event);
            }
            if changed {
                self.settle().await;
            }
            self.phase = SessionPhase::Idle;
        }
    }

    fn collect_inbox(&mut self) {
        while let Ok(event) = self.inbox.try_recv() {
            self.queue.push_back(event);
        }
    }

    /// Last writer wins by arrival order.
    fn merge(&mut self, event: ChangeEvent) -> bool {
        let record = event.record;
        if record.user_id != self.user_id {
            debug!(user_id = %record.user_id, "ignoring change for another user");
            return false;
        }

        match event.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                if self.records.get(&record.badge_id) == Some(&record) {
                    return false;
                }
                self.records.insert(record.badge_id.clone(), record);
                true
            }
            ChangeKind::Delete => self.records.remove(&record.badge_id).is_some(),
        }
    }

    /// Write ghost grants and relocks, then recompute the aggregate. Ghost write
    /// failures are logged and retried on the next pass; the aggregate does not
    /// depend on them.
    async fn settle(&mut self) {
        let catalog = Arc::clone(&self.catalog);
        let records = self.record_list();
        let resolution = self.resolver.resolve(&catalog, &records);

        for transition in self.resolver.transitions(&catalog, &records, &resolution) {
            let (badge_id, success) = match &transition {
                GhostTransition::Grant(badge_id) => (badge_id, true),
                GhostTransition::Revoke(badge_id) => (badge_id, false),
            };
            let previous = self.records.get(badge_id);
            let blocked = previous.is_some_and(|record| record.blocked_by_suspicion);
            let write = BadgeWrite {
                user_id: self.user_id.clone(),
                badge_id: badge_id.clone(),
                success,
                level: None,
                user_answer: previous.and_then(|record| record.user_answer.clone()),
                was_ever_unlocked: success
                    || previous.is_some_and(|record| record.was_ever_unlocked),
            };

            if let Err(err) = self.store.upsert_user_badge(write.clone()).await {
                error!(badge_id = %badge_id, error = %err, "ghost badge write failed");
                continue;
            }
            self.records
                .insert(badge_id.clone(), write.into_record(blocked));

            let kind = if success {
                info!(badge_id = %badge_id, "ghost badge unlocked");
                EngineEventKind::BadgeUnlocked { level: None }
            } else {
                info!(badge_id = %badge_id, "ghost badge relocked");
                EngineEventKind::BadgeReblocked
            };
            self.push_event(badge_id, kind);
        }

        self.aggregate = aggregate::compute(&catalog, &self.record_list(), &resolution);
    }

    fn replace_records(&mut self, records: Vec<UserBadgeRecord>) {
        self.records = records
            .into_iter()
            .filter(|record| record.user_id == self.user_id)
            .map(|record| (record.badge_id.clone(), record))
            .collect();
    }

    fn record_list(&self) -> Vec<UserBadgeRecord> {
        self.records.values().cloned().collect()
    }

    fn push_event(&mut self, badge_id: &BadgeId, kind: EngineEventKind) {
        self.events.push(EngineEvent {
            badge_id: badge_id.clone(),
            kind,
            occurred_at: Utc::now(),
        });
    }
}
