use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Named tier derived from the skill total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankName(pub String);

impl RankName {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RankName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankThreshold {
    pub min_skill_points: i32,
    pub name: RankName,
}

/// Distance to the next rank, for progress bars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankProgress {
    pub next: RankName,
    pub missing_points: i32,
}

/// Ascending skill thresholds. The rank for a total is the highest threshold not
/// exceeding it; totals below the first threshold still take the lowest rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankTable {
    thresholds: Vec<RankThreshold>,
}

impl RankTable {
    pub fn new(mut thresholds: Vec<RankThreshold>) -> Self {
        thresholds.retain(|threshold| !threshold.name.0.trim().is_empty());
        if thresholds.is_empty() {
            return Self::default();
        }
        thresholds.sort_by_key(|threshold| threshold.min_skill_points);
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &[RankThreshold] {
        &self.thresholds
    }

    pub fn lowest(&self) -> &RankName {
        &self.thresholds[0].name
    }

    pub fn rank_for(&self, skill_total: i32) -> RankName {
        self.thresholds
            .iter()
            .rev()
            .find(|threshold| threshold.min_skill_points <= skill_total)
            .map(|threshold| threshold.name.clone())
            .unwrap_or_else(|| self.lowest().clone())
    }

    /// Position of a rank in the table's total order.
    pub fn position(&self, name: &RankName) -> Option<usize> {
        let wanted = name.0.trim().to_lowercase();
        self.thresholds
            .iter()
            .position(|threshold| threshold.name.0.trim().to_lowercase() == wanted)
    }

    /// Table order; names missing from the table sort below every known rank.
    pub fn compare(&self, left: &RankName, right: &RankName) -> Ordering {
        match (self.position(left), self.position(right)) {
            (Some(left), Some(right)) => left.cmp(&right),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        }
    }

    /// `current >= required` in table order. Names missing from the table never satisfy.
    pub fn meets(&self, current: &RankName, required: &RankName) -> bool {
        match (self.position(current), self.position(required)) {
            (Some(current), Some(required)) => current >= required,
            _ => false,
        }
    }

    pub fn progress(&self, skill_total: i32) -> Option<RankProgress> {
        self.thresholds
            .iter()
            .find(|threshold| threshold.min_skill_points > skill_total)
            .map(|threshold| RankProgress {
                next: threshold.name.clone(),
                missing_points: threshold.min_skill_points.saturating_sub(skill_total),
            })
    }
}

impl Default for RankTable {
    fn default() -> Self {
        let thresholds = [
            (0, "Novice"),
            (10, "Apprenti"),
            (25, "Initié"),
            (50, "Confirmé"),
            (100, "Expert"),
            (200, "Maître"),
            (400, "Légende"),
        ]
        .into_iter()
        .map(|(min_skill_points, name)| RankThreshold {
            min_skill_points,
            name: RankName::new(name),
        })
        .collect();

        Self { thresholds }
    }
}
