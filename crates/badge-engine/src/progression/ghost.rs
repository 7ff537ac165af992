//! Fixed-point resolution of ghost badges.
//!
//! Ghost prerequisites read the aggregate (unlocked set, skill total, rank), and the
//! aggregate includes the ghosts already granted, so eligibility is iterated from the
//! non-ghost baseline until a pass adds nothing. Membership only grows within one
//! resolution, which keeps every configuration (cycles included) bounded.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use super::catalog::BadgeCatalog;
use super::domain::{BadgeDefinition, BadgeId, UserBadgeRecord};
use super::rank::{RankName, RankTable};
use super::rules::{BadgeRule, GhostPrerequisite, PrerequisiteMode};
use super::scoring;

/// Ghost membership derived from a record set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub unlocked: BTreeSet<BadgeId>,
    pub passes: usize,
    /// The pass bound was hit while ghosts were still qualifying.
    pub guard_tripped: bool,
    /// Ghosts left out because the bound was hit.
    pub unresolved: BTreeSet<BadgeId>,
}

/// Record change required to make stored ghost records match a [`Resolution`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GhostTransition {
    Grant(BadgeId),
    Revoke(BadgeId),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GhostResolver {
    max_passes: Option<usize>,
}

/// Aggregate view the prerequisites are checked against during one pass.
struct Candidate<'a> {
    unlocked: BTreeSet<&'a BadgeId>,
    skill_total: i32,
    rank: RankName,
}

impl GhostResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower the pass bound; it never exceeds the catalog size and is at least one.
    pub fn with_max_passes(max_passes: Option<usize>) -> Self {
        Self { max_passes }
    }

    fn bound(&self, catalog: &BadgeCatalog) -> usize {
        let size = catalog.len();
        self.max_passes.unwrap_or(size).min(size).max(1)
    }

    pub fn resolve(&self, catalog: &BadgeCatalog, records: &[UserBadgeRecord]) -> Resolution {
        let by_badge: HashMap<&BadgeId, &UserBadgeRecord> = records
            .iter()
            .map(|record| (&record.badge_id, record))
            .collect();
        let ranks = catalog.ranks();

        let mut unlocked = BTreeSet::new();
        let mut skill_total: i32 = 0;
        for badge in catalog.visible() {
            let record = by_badge
                .get(&badge.id)
                .filter(|record| record.counts_as_unlocked());
            if let Some(record) = record {
                unlocked.insert(&badge.id);
                skill_total = skill_total
                    .saturating_add(scoring::points(badge, record.level.as_deref()));
            }
        }

        let mut pending: Vec<(&BadgeDefinition, &GhostPrerequisite)> = catalog
            .ghosts()
            .filter(|ghost| {
                !by_badge
                    .get(&ghost.id)
                    .is_some_and(|record| record.blocked_by_suspicion)
            })
            .filter_map(|ghost| match &ghost.rule {
                BadgeRule::Ghost(rule) => Some((ghost, &rule.prerequisite)),
                _ => None,
            })
            .collect();

        let mut candidate = Candidate {
            unlocked,
            rank: ranks.rank_for(skill_total),
            skill_total,
        };
        let bound = self.bound(catalog);
        let mut resolution = Resolution::default();

        loop {
            let (qualifying, waiting): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|(_, prerequisite)| satisfied(prerequisite, &candidate, ranks));
            pending = waiting;

            if qualifying.is_empty() {
                break;
            }
            if resolution.passes == bound {
                resolution.guard_tripped = true;
                resolution.unresolved = qualifying
                    .iter()
                    .map(|(ghost, _)| ghost.id.clone())
                    .collect();
                warn!(
                    passes = resolution.passes,
                    unresolved = ?resolution.unresolved,
                    "ghost resolution hit its pass bound; leaving remaining ghosts locked"
                );
                break;
            }

            resolution.passes += 1;
            for (ghost, _) in qualifying {
                candidate.unlocked.insert(&ghost.id);
                candidate.skill_total = candidate
                    .skill_total
                    .saturating_add(scoring::points(ghost, None));
                resolution.unlocked.insert(ghost.id.clone());
            }
            candidate.rank = ranks.rank_for(candidate.skill_total);
        }

        debug!(
            passes = resolution.passes,
            ghosts = resolution.unlocked.len(),
            skill_total = candidate.skill_total,
            "ghost resolution settled"
        );
        resolution
    }

    /// Grants for resolved ghosts without a successful record, revocations for stored
    /// successes that no longer resolve. Moderated records are left alone.
    pub fn transitions(
        &self,
        catalog: &BadgeCatalog,
        records: &[UserBadgeRecord],
        resolution: &Resolution,
    ) -> Vec<GhostTransition> {
        let by_badge: HashMap<&BadgeId, &UserBadgeRecord> = records
            .iter()
            .map(|record| (&record.badge_id, record))
            .collect();

        catalog
            .ghosts()
            .filter_map(|ghost| {
                let record = by_badge.get(&ghost.id);
                let resolved = resolution.unlocked.contains(&ghost.id);
                let stored = record.is_some_and(|record| record.success);
                let blocked = record.is_some_and(|record| record.blocked_by_suspicion);

                if resolved && !stored {
                    Some(GhostTransition::Grant(ghost.id.clone()))
                } else if !resolved && stored && !blocked {
                    Some(GhostTransition::Revoke(ghost.id.clone()))
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Each condition kind is one check; `All` needs every set check, `Any` needs one.
/// A prerequisite with no set condition never passes.
fn satisfied(
    prerequisite: &GhostPrerequisite,
    candidate: &Candidate<'_>,
    ranks: &RankTable,
) -> bool {
    let mut checks = Vec::with_capacity(4);

    if prerequisite.has_required_badges() {
        checks.push(
            prerequisite
                .required_badge_ids
                .iter()
                .all(|id| candidate.unlocked.contains(id)),
        );
    }
    if let Some(count) = prerequisite.min_count() {
        checks.push(candidate.unlocked.len() >= count as usize);
    }
    if let Some(points) = prerequisite.min_points() {
        checks.push(candidate.skill_total >= points);
    }
    if let Some(rank) = prerequisite.min_rank() {
        checks.push(ranks.meets(&candidate.rank, rank));
    }

    if checks.is_empty() {
        return false;
    }
    match prerequisite.mode {
        PrerequisiteMode::All => checks.iter().all(|passed| *passed),
        PrerequisiteMode::Any => checks.iter().any(|passed| *passed),
    }
}
