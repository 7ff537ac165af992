//! Badge progression and scoring engine.
//!
//! The [`progression`] module holds the rule parser, the answer evaluator, skill point
//! scoring, ghost badge resolution, and the per-session reconciler that keeps the derived
//! aggregate (unlocked set, skill total, rank) consistent with the persisted records.

pub mod config;
pub mod error;
pub mod progression;
pub mod telemetry;
