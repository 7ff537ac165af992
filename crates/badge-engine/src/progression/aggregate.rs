use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use super::catalog::BadgeCatalog;
use super::domain::{BadgeId, UserBadgeRecord};
use super::ghost::{GhostResolver, Resolution};
use super::rank::{RankName, RankProgress};
use super::scoring;

/// Points one unlocked badge adds to the total, kept for transparent audits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillContribution {
    pub badge_id: BadgeId,
    pub level: Option<String>,
    pub points: i32,
}

/// Derived progression snapshot. Always a function of the catalog and the record
/// set; collections are ordered so two computations serialize identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateState {
    pub unlocked_badge_ids: BTreeSet<BadgeId>,
    pub ghost_unlocked_ids: BTreeSet<BadgeId>,
    pub contributions: Vec<SkillContribution>,
    pub skill_total: i32,
    pub rank: RankName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_rank: Option<RankProgress>,
    pub unlocked_count: usize,
    /// Visible badges plus the ghosts currently unlocked.
    pub total_badge_count: usize,
}

impl AggregateState {
    /// Resolve ghosts, then derive the aggregate.
    pub fn recompute(
        catalog: &BadgeCatalog,
        records: &[UserBadgeRecord],
        resolver: &GhostResolver,
    ) -> Self {
        let resolution = resolver.resolve(catalog, records);
        compute(catalog, records, &resolution)
    }

    pub fn empty(catalog: &BadgeCatalog) -> Self {
        compute(catalog, &[], &Resolution::default())
    }

    pub fn is_unlocked(&self, badge_id: &BadgeId) -> bool {
        self.unlocked_badge_ids.contains(badge_id)
    }
}

/// Ghost membership comes from `resolution`, not from the stored ghost records, so
/// the aggregate is correct even before ghost grants have been written back.
pub fn compute(
    catalog: &BadgeCatalog,
    records: &[UserBadgeRecord],
    resolution: &Resolution,
) -> AggregateState {
    let by_badge: HashMap<&BadgeId, &UserBadgeRecord> = records
        .iter()
        .map(|record| (&record.badge_id, record))
        .collect();

    let mut unlocked_badge_ids = BTreeSet::new();
    let mut ghost_unlocked_ids = BTreeSet::new();
    let mut contributions = Vec::new();
    let mut skill_total: i32 = 0;
    let mut visible_count = 0;

    for badge in catalog.badges() {
        let level = if badge.is_ghost() {
            if !resolution.unlocked.contains(&badge.id) {
                continue;
            }
            ghost_unlocked_ids.insert(badge.id.clone());
            None
        } else {
            visible_count += 1;
            match by_badge.get(&badge.id) {
                Some(record) if record.counts_as_unlocked() => record.level.clone(),
                _ => continue,
            }
        };

        let points = scoring::points(badge, level.as_deref());
        skill_total = skill_total.saturating_add(points);
        unlocked_badge_ids.insert(badge.id.clone());
        contributions.push(SkillContribution {
            badge_id: badge.id.clone(),
            level,
            points,
        });
    }

    contributions.sort_by(|left, right| left.badge_id.cmp(&right.badge_id));
    let ranks = catalog.ranks();

    AggregateState {
        unlocked_count: unlocked_badge_ids.len(),
        total_badge_count: visible_count + ghost_unlocked_ids.len(),
        rank: ranks.rank_for(skill_total),
        next_rank: ranks.progress(skill_total),
        unlocked_badge_ids,
        ghost_unlocked_ids,
        contributions,
        skill_total,
    }
}
