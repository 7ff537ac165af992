//! Badge progression: rule parsing, answer evaluation, skill scoring, ghost badge
//! resolution, and the per-session reconciler that owns the derived aggregate.
//!
//! Everything below `reconciler` is a pure function of the catalog and the user's badge
//! records. Only the reconciler talks to a [`BadgeStore`], and it serializes every
//! mutation of the aggregate it owns.

pub mod aggregate;
pub mod catalog;
pub mod domain;
pub mod evaluation;
pub mod ghost;
pub mod levels;
pub mod rank;
pub mod reconciler;
pub mod router;
pub mod rules;
pub mod scoring;
pub mod sessions;
pub mod store;

#[cfg(test)]
mod tests;

pub use aggregate::{AggregateState, SkillContribution};
pub use catalog::{BadgeCatalog, CatalogError};
pub use domain::{BadgeDefinition, BadgeId, BadgeWrite, UserBadgeRecord, UserId};
pub use evaluation::{AnswerEvaluator, EvaluationResult, Verdict};
pub use ghost::{GhostResolver, Resolution};
pub use rank::{RankName, RankProgress, RankTable, RankThreshold};
pub use reconciler::{
    AggregateReconciler, AnswerOutcome, EngineEvent, EngineEventKind, ReconcileError,
    ReconcilerOptions, SessionPhase,
};
pub use router::progression_router;
pub use rules::{
    parse_rule, parse_rule_value, BadgeRule, BooleanRule, CountThreshold, FreeTextRule,
    GhostPrerequisite, GhostRule, MultiSelectMode, MultiSelectRule, PrerequisiteMode, RangeLevel,
    RangeRule, SelectOption, SingleSelectRule,
};
pub use sessions::SessionRegistry;
pub use store::{
    BadgeStore, ChangeCallback, ChangeEvent, ChangeFeed, ChangeKind, LocalFileStore,
    MemoryBadgeStore, StoreError, Subscription,
};
