//! Skill points contributed by an unlocked badge at a given level.

use super::domain::BadgeDefinition;
use super::levels;
use super::rules::{BadgeRule, LevelStep};

/// Signed contribution of `badge` at `level`. Low-skill badges always cost points:
/// the magnitude is doubled and the sign forced negative, after every other rule.
pub fn points(badge: &BadgeDefinition, level: Option<&str>) -> i32 {
    let base = base_points(&badge.rule, level);
    if badge.low_skill {
        low_skill_penalty(base)
    } else {
        base
    }
}

fn low_skill_penalty(base: i32) -> i32 {
    base.saturating_abs().saturating_mul(2).saturating_neg()
}

fn base_points(rule: &BadgeRule, level: Option<&str>) -> i32 {
    if let Some(level) = level {
        if levels::is_level_zero(level) {
            return 0;
        }
        if levels::is_expert(level) {
            return levels::EXPERT_BONUS;
        }
    }

    match rule {
        BadgeRule::Boolean(rule) => rule.skill_points.unwrap_or(1),
        BadgeRule::Ghost(rule) => rule.skill_points.unwrap_or(1),
        BadgeRule::FreeText(_) => 1,
        BadgeRule::SingleSelect(_) | BadgeRule::MultiSelect(_) | BadgeRule::Range(_) => {
            ladder_points(&rule.level_ladder(), level)
        }
    }
}

fn ladder_points(ladder: &[LevelStep], level: Option<&str>) -> i32 {
    let Some(level) = level else {
        return 1;
    };

    let step = if levels::is_max(level) {
        ladder.iter().enumerate().last()
    } else {
        ladder
            .iter()
            .enumerate()
            .find(|(_, step)| levels::same_label(&step.label, level))
    };

    match step {
        Some((_, step)) if levels::is_expert(&step.label) => levels::EXPERT_BONUS,
        Some((position, step)) => step.points.unwrap_or(position as i32 + 1),
        None => 1,
    }
}
