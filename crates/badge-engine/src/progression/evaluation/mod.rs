mod choice;
mod scalar;

use serde::Serialize;

use super::levels;
use super::rules::BadgeRule;

/// Outcome class of one evaluation. `Denied` is a normal result; `Invalid` means
/// the submitted answer was malformed and nothing should be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Unlocked,
    Denied,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub verdict: Verdict,
    /// Configured label of the achieved level, as persisted.
    pub level: Option<String>,
    /// Label to show: "max" for the top of the rule's ordering unless it is expert.
    pub display_level: Option<String>,
    pub message: String,
}

impl EvaluationResult {
    pub fn ok(&self) -> bool {
        self.verdict == Verdict::Unlocked
    }

    pub fn is_invalid(&self) -> bool {
        self.verdict == Verdict::Invalid
    }

    pub(crate) fn unlocked(level: Option<String>, message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Unlocked,
            display_level: level.clone(),
            level,
            message: message.into(),
        }
    }

    pub(crate) fn denied(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Denied,
            level: None,
            display_level: None,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Invalid,
            level: None,
            display_level: None,
            message: message.into(),
        }
    }
}

/// Stateless evaluator that checks a submitted answer against a parsed rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerEvaluator;

impl AnswerEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        rule: &BadgeRule,
        raw_answer: &str,
        selected_options: &[String],
    ) -> EvaluationResult {
        let result = match rule {
            BadgeRule::Boolean(rule) => scalar::boolean(rule, raw_answer),
            BadgeRule::FreeText(rule) => scalar::free_text(rule, raw_answer),
            BadgeRule::Range(rule) => scalar::range(rule, raw_answer),
            BadgeRule::SingleSelect(rule) => {
                choice::single_select(rule, raw_answer, selected_options)
            }
            BadgeRule::MultiSelect(rule) => {
                choice::multi_select(rule, raw_answer, selected_options)
            }
            BadgeRule::Ghost(_) => EvaluationResult::invalid(
                "This badge cannot be answered; it unlocks once its prerequisites are met.",
            ),
        };

        with_display_level(rule, result)
    }
}

fn with_display_level(rule: &BadgeRule, mut result: EvaluationResult) -> EvaluationResult {
    let Some(level) = result.level.as_deref() else {
        return result;
    };
    if levels::is_expert(level) {
        return result;
    }

    let ladder = rule.level_ladder();
    let is_top = ladder
        .last()
        .is_some_and(|top| levels::same_label(&top.label, level));
    if is_top {
        result.display_level = Some(levels::MAX_LABEL.to_string());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::rules::parse_rule;

    fn evaluate(config: &str, answer: &str, options: &[&str]) -> EvaluationResult {
        let options: Vec<String> = options.iter().map(|option| option.to_string()).collect();
        AnswerEvaluator::new().evaluate(&parse_rule(config), answer, &options)
    }

    #[test]
    fn top_level_displays_as_max_but_keeps_its_label() {
        let config = r#"{"type":"range","levels":[
            {"min":0,"max":9,"label":"niv1","points":1},
            {"min":10,"max":99,"label":"niv2","points":5}]}"#;
        let result = evaluate(config, "15", &[]);
        assert_eq!(result.level.as_deref(), Some("niv2"));
        assert_eq!(result.display_level.as_deref(), Some("max"));

        let lower = evaluate(config, "3", &[]);
        assert_eq!(lower.display_level.as_deref(), Some("niv1"));
    }

    #[test]
    fn expert_level_keeps_its_display_name() {
        let config = r#"{"type":"select","options":["a","b"],
            "optionSkillLabel":{"a":"niveau 1","b":"expert"}}"#;
        let result = evaluate(config, "b", &[]);
        assert_eq!(result.display_level.as_deref(), Some("expert"));
    }

    #[test]
    fn ghost_rules_reject_direct_answers() {
        let config =
            r#"{"type":"boolean","isGhost":true,"ghostPrerequisites":{"minUnlockedCount":2}}"#;
        assert_eq!(evaluate(config, "oui", &[]).verdict, Verdict::Invalid);
    }
}
