use super::EvaluationResult;
use crate::progression::levels;
use crate::progression::rules::{BooleanRule, FreeTextRule, RangeRule};

const DEFAULT_SUCCESS: &str = "Badge unlocked!";
const DEFAULT_DENIED: &str = "This answer does not unlock the badge.";

pub(super) fn boolean(rule: &BooleanRule, raw_answer: &str) -> EvaluationResult {
    let answer = raw_answer.trim();
    let matches = |labels: &[String]| labels.iter().any(|label| levels::same_label(label, answer));

    let value = if answer.is_empty() {
        None
    } else if matches(&rule.true_labels) {
        Some(true)
    } else if matches(&rule.false_labels) {
        Some(false)
    } else {
        None
    };

    let Some(value) = value else {
        return EvaluationResult::invalid("Please answer yes or no.");
    };

    if value != rule.expected {
        return EvaluationResult::denied(DEFAULT_DENIED);
    }

    let display = if value {
        rule.display_text_true.as_deref()
    } else {
        rule.display_text_false.as_deref()
    };
    EvaluationResult::unlocked(None, display.unwrap_or(DEFAULT_SUCCESS))
}

pub(super) fn free_text(rule: &FreeTextRule, raw_answer: &str) -> EvaluationResult {
    let answer = raw_answer.trim();
    if answer.is_empty() {
        return EvaluationResult::invalid("An answer is required.");
    }

    let expected = rule.expected_answer.trim();
    if !expected.is_empty() && levels::same_label(expected, answer) {
        EvaluationResult::unlocked(None, DEFAULT_SUCCESS)
    } else {
        EvaluationResult::denied(DEFAULT_DENIED)
    }
}

pub(super) fn range(rule: &RangeRule, raw_answer: &str) -> EvaluationResult {
    let Some(value) = parse_number(raw_answer) else {
        return EvaluationResult::invalid("Please enter a number.");
    };

    if !rule.levels.is_empty() {
        return match rule
            .levels
            .iter()
            .find(|level| level.min <= value && value <= level.max)
        {
            Some(level) if levels::is_sentinel(&level.label) => {
                EvaluationResult::denied(DEFAULT_DENIED)
            }
            Some(level) => EvaluationResult::unlocked(
                Some(level.label.clone()),
                format!("Badge unlocked at level {}!", level.label),
            ),
            None => EvaluationResult::denied(format!("{value} does not match any level.")),
        };
    }

    let within = rule.min.map_or(true, |min| value >= min)
        && rule.max.map_or(true, |max| value <= max);
    let exact = rule.expected.map_or(true, |expected| value == expected);
    if within && exact {
        EvaluationResult::unlocked(None, DEFAULT_SUCCESS)
    } else {
        EvaluationResult::denied(DEFAULT_DENIED)
    }
}

fn parse_number(raw_answer: &str) -> Option<f64> {
    raw_answer
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
