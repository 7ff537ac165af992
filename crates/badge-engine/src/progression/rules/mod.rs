//! Typed badge rules. [`parse_rule`] is the only place untyped configuration is read;
//! everything downstream matches exhaustively on [`BadgeRule`].

mod parser;

use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::BadgeId;
use super::levels;
use super::rank::RankName;

pub use parser::{parse_rule, parse_rule_value, ConfigParseError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BadgeRule {
    Boolean(BooleanRule),
    SingleSelect(SingleSelectRule),
    MultiSelect(MultiSelectRule),
    Range(RangeRule),
    FreeText(FreeTextRule),
    Ghost(GhostRule),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanRule {
    pub true_labels: Vec<String>,
    pub false_labels: Vec<String>,
    pub expected: bool,
    pub skill_points: Option<i32>,
    pub display_text_true: Option<String>,
    pub display_text_false: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleSelectRule {
    pub options: Vec<SelectOption>,
    pub option_skill_label: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MultiSelectMode {
    ByOption,
    ByCount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountThreshold {
    pub min: u32,
    pub label: String,
    pub points: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSelectRule {
    pub options: Vec<SelectOption>,
    pub option_skill_label: BTreeMap<String, String>,
    pub count_thresholds: Vec<CountThreshold>,
    pub mode: MultiSelectMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeLevel {
    pub min: f64,
    pub max: f64,
    pub label: String,
    pub points: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeRule {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub expected: Option<f64>,
    /// Sorted by `min` ascending.
    pub levels: Vec<RangeLevel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeTextRule {
    pub expected_answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PrerequisiteMode {
    #[default]
    All,
    Any,
}

/// Conditions over the aggregate that gate a ghost badge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GhostPrerequisite {
    pub mode: PrerequisiteMode,
    pub required_badge_ids: Vec<BadgeId>,
    pub min_unlocked_count: Option<u32>,
    pub min_skill_points: Option<i32>,
    pub min_rank: Option<RankName>,
}

impl GhostPrerequisite {
    pub fn has_required_badges(&self) -> bool {
        !self.required_badge_ids.is_empty()
    }

    pub fn min_count(&self) -> Option<u32> {
        self.min_unlocked_count.filter(|count| *count > 0)
    }

    pub fn min_points(&self) -> Option<i32> {
        self.min_skill_points.filter(|points| *points != 0)
    }

    pub fn min_rank(&self) -> Option<&RankName> {
        self.min_rank
            .as_ref()
            .filter(|rank| !rank.as_str().trim().is_empty())
    }

    /// No condition set: such a prerequisite never unlocks anything.
    pub fn is_empty(&self) -> bool {
        !self.has_required_badges()
            && self.min_count().is_none()
            && self.min_points().is_none()
            && self.min_rank().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GhostRule {
    pub prerequisite: GhostPrerequisite,
    pub skill_points: Option<i32>,
    pub ghost_display_text: Option<String>,
    /// The visible variant the ghost was authored as.
    pub inner: Box<BadgeRule>,
}

/// One rung of a rule's level ordering, lowest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelStep {
    pub label: String,
    pub points: Option<i32>,
}

impl BadgeRule {
    pub fn is_ghost(&self) -> bool {
        matches!(self, BadgeRule::Ghost(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BadgeRule::Boolean(_) => "boolean",
            BadgeRule::SingleSelect(_) => "singleSelect",
            BadgeRule::MultiSelect(_) => "multiSelect",
            BadgeRule::Range(_) => "range",
            BadgeRule::FreeText(_) => "freeText",
            BadgeRule::Ghost(_) => "ghost",
        }
    }

    /// Ordered level list used for position scoring and the "max" display label.
    /// Expert labels are moved to the top so they outrank every numeric level.
    pub fn level_ladder(&self) -> Vec<LevelStep> {
        let steps = match self {
            BadgeRule::Boolean(_) | BadgeRule::FreeText(_) | BadgeRule::Ghost(_) => Vec::new(),
            BadgeRule::SingleSelect(rule) => {
                option_ladder(&rule.options, &rule.option_skill_label)
            }
            BadgeRule::MultiSelect(rule) => match rule.mode {
                MultiSelectMode::ByOption => {
                    option_ladder(&rule.options, &rule.option_skill_label)
                }
                MultiSelectMode::ByCount => {
                    let mut thresholds = rule.count_thresholds.clone();
                    thresholds.sort_by_key(|threshold| threshold.min);
                    thresholds
                        .into_iter()
                        .map(|threshold| LevelStep {
                            label: threshold.label,
                            points: threshold.points,
                        })
                        .collect()
                }
            },
            BadgeRule::Range(rule) => rule
                .levels
                .iter()
                .map(|level| LevelStep {
                    label: level.label.clone(),
                    points: level.points,
                })
                .collect(),
        };

        expert_last(steps)
    }
}

impl MultiSelectRule {
    /// Option labels in ranking order, used by the by-option mode.
    pub fn option_ranking(&self) -> Vec<LevelStep> {
        expert_last(option_ladder(&self.options, &self.option_skill_label))
    }
}

/// Skill label mapped to an option, keyed by value or, failing that, by its label.
pub(crate) fn mapped_label<'a>(
    labels: &'a BTreeMap<String, String>,
    option: &SelectOption,
) -> Option<&'a String> {
    labels
        .get(&option.value)
        .or_else(|| labels.get(&option.label))
}

fn expert_last(steps: Vec<LevelStep>) -> Vec<LevelStep> {
    let (mut ladder, experts): (Vec<_>, Vec<_>) = steps
        .into_iter()
        .partition(|step| !levels::is_expert(&step.label));
    ladder.extend(experts);
    ladder
}

fn option_ladder(options: &[SelectOption], labels: &BTreeMap<String, String>) -> Vec<LevelStep> {
    let mut steps: Vec<LevelStep> = Vec::new();
    for option in options {
        let Some(label) = mapped_label(labels, option) else {
            continue;
        };
        let seen = steps
            .iter()
            .any(|step| levels::same_label(&step.label, label));
        if seen || levels::is_sentinel(label) {
            continue;
        }
        steps.push(LevelStep {
            label: label.clone(),
            points: None,
        });
    }
    steps
}
