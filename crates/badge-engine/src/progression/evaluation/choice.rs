use std::collections::BTreeMap;

use super::EvaluationResult;
use crate::progression::levels;
use crate::progression::rules::{
    mapped_label, MultiSelectMode, MultiSelectRule, SelectOption, SingleSelectRule,
};

const VETOED: &str = "This choice does not unlock the badge.";
const NO_SKILL: &str = "No skill selected; the badge stays locked.";

/// A submitted selection matched against the declared options.
struct Pick<'a> {
    raw: &'a str,
    label: Option<&'a str>,
    known: bool,
}

pub(super) fn single_select(
    rule: &SingleSelectRule,
    raw_answer: &str,
    selected_options: &[String],
) -> EvaluationResult {
    let raw: Vec<&str> = if selected_options.is_empty() {
        Some(raw_answer.trim()).filter(|answer| !answer.is_empty()).into_iter().collect()
    } else {
        trimmed(selected_options)
    };
    if raw.is_empty() {
        return EvaluationResult::invalid("Please select an option.");
    }

    let picks = resolve(&rule.options, &rule.option_skill_label, &raw);
    if vetoed(&picks) {
        return EvaluationResult::denied(VETOED);
    }
    if picks.len() > 1 {
        return EvaluationResult::invalid("Please select a single option.");
    }

    let pick = &picks[0];
    if !pick.known {
        return EvaluationResult::invalid(format!("'{}' is not one of the options.", pick.raw));
    }
    match pick.label {
        Some(label) if levels::is_no_skill(label) => EvaluationResult::denied(NO_SKILL),
        Some(label) => unlocked_at(label),
        None => EvaluationResult::unlocked(None, "Badge unlocked!"),
    }
}

pub(super) fn multi_select(
    rule: &MultiSelectRule,
    raw_answer: &str,
    selected_options: &[String],
) -> EvaluationResult {
    let raw: Vec<&str> = if selected_options.is_empty() {
        raw_answer
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect()
    } else {
        trimmed(selected_options)
    };
    let raw = dedupe(raw);
    if raw.is_empty() {
        return EvaluationResult::invalid("Please select at least one option.");
    }

    let picks = resolve(&rule.options, &rule.option_skill_label, &raw);
    if vetoed(&picks) {
        return EvaluationResult::denied(VETOED);
    }
    if let Some(unknown) = picks.iter().find(|pick| !pick.known) {
        return EvaluationResult::invalid(format!("'{}' is not one of the options.", unknown.raw));
    }

    match rule.mode {
        MultiSelectMode::ByCount => by_count(rule, &picks),
        MultiSelectMode::ByOption => by_option(rule, &picks),
    }
}

fn by_count(rule: &MultiSelectRule, picks: &[Pick<'_>]) -> EvaluationResult {
    let count = picks
        .iter()
        .filter(|pick| !pick.label.is_some_and(levels::is_no_skill))
        .count() as u32;

    if rule.count_thresholds.is_empty() {
        return if count > 0 {
            EvaluationResult::unlocked(None, "Badge unlocked!")
        } else {
            EvaluationResult::denied(NO_SKILL)
        };
    }

    let mut thresholds: Vec<_> = rule.count_thresholds.iter().collect();
    thresholds.sort_by(|left, right| right.min.cmp(&left.min));

    match thresholds.iter().find(|threshold| count >= threshold.min) {
        Some(threshold) if levels::is_sentinel(&threshold.label) => {
            EvaluationResult::denied(VETOED)
        }
        Some(threshold) => unlocked_at(&threshold.label),
        None => {
            let minimum = thresholds
                .last()
                .map(|threshold| threshold.min)
                .unwrap_or_default();
            EvaluationResult::denied(format!(
                "Select at least {minimum} options to unlock this badge."
            ))
        }
    }
}

fn by_option(rule: &MultiSelectRule, picks: &[Pick<'_>]) -> EvaluationResult {
    let labels: Vec<&str> = picks.iter().filter_map(|pick| pick.label).collect();
    if labels.is_empty() {
        return EvaluationResult::unlocked(None, "Badge unlocked!");
    }
    if labels.len() == picks.len() && labels.iter().all(|label| levels::is_no_skill(label)) {
        return EvaluationResult::denied(NO_SKILL);
    }

    let ranking = rule.option_ranking();
    let rank_of = |label: &str| -> Option<usize> {
        ranking
            .iter()
            .position(|step| levels::same_label(&step.label, label))
    };

    let best = labels
        .into_iter()
        .filter(|label| !levels::is_sentinel(label))
        .max_by_key(|label| rank_of(*label));

    match best {
        Some(label) => unlocked_at(label),
        None => EvaluationResult::unlocked(None, "Badge unlocked!"),
    }
}

fn unlocked_at(label: &str) -> EvaluationResult {
    EvaluationResult::unlocked(Some(label.to_string()), format!("Badge unlocked at level {label}!"))
}

fn vetoed(picks: &[Pick<'_>]) -> bool {
    picks
        .iter()
        .any(|pick| pick.label.is_some_and(levels::is_block_sentinel))
}

fn resolve<'a>(
    options: &'a [SelectOption],
    labels: &'a BTreeMap<String, String>,
    raw: &[&'a str],
) -> Vec<Pick<'a>> {
    raw.iter()
        .map(|&raw| {
            let option = options.iter().find(|option| {
                levels::same_label(&option.value, raw) || levels::same_label(&option.label, raw)
            });
            match option {
                Some(option) => Pick {
                    raw,
                    label: mapped_label(labels, option).map(String::as_str),
                    known: true,
                },
                // Without declared options the label map keys are the only vocabulary.
                None => {
                    let label = labels
                        .iter()
                        .find(|(value, _)| levels::same_label(value, raw))
                        .map(|(_, label)| label.as_str());
                    Pick {
                        raw,
                        label,
                        known: options.is_empty(),
                    }
                }
            }
        })
        .collect()
}

fn trimmed(selected_options: &[String]) -> Vec<&str> {
    selected_options
        .iter()
        .map(|option| option.trim())
        .filter(|option| !option.is_empty())
        .collect()
}

fn dedupe(raw: Vec<&str>) -> Vec<&str> {
    let mut unique: Vec<&str> = Vec::with_capacity(raw.len());
    for item in raw {
        if !unique.iter().any(|seen| levels::same_label(seen, item)) {
            unique.push(item);
        }
    }
    unique
}
