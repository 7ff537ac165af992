use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    BadgeRule, BooleanRule, CountThreshold, FreeTextRule, GhostPrerequisite, GhostRule,
    MultiSelectMode, MultiSelectRule, PrerequisiteMode, RangeLevel, RangeRule, SelectOption,
    SingleSelectRule,
};
use crate::progression::domain::BadgeId;
use crate::progression::rank::RankName;

const DEFAULT_TRUE_LABELS: [&str; 5] = ["oui", "yes", "true", "vrai", "1"];
const DEFAULT_FALSE_LABELS: [&str; 5] = ["non", "no", "false", "faux", "0"];

/// Reasons a config could not be read as a typed rule. Always recovered by the
/// free-text fallback; never surfaced to users.
#[derive(Debug, thiserror::Error)]
pub enum ConfigParseError {
    #[error("config is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("config is not a JSON object")]
    NotAnObject,
    #[error("config has no 'type' discriminator")]
    MissingType,
    #[error("unknown rule type '{0}'")]
    UnknownType(String),
    #[error("invalid {kind} rule: {source}")]
    InvalidBody {
        kind: &'static str,
        source: serde_json::Error,
    },
}

/// Parse a raw answer config. Anything that is not a typed JSON rule becomes a
/// case-insensitive exact-match rule on the trimmed, lowercased input.
pub fn parse_rule(raw: &str) -> BadgeRule {
    let parsed = serde_json::from_str::<Value>(raw.trim())
        .map_err(ConfigParseError::from)
        .and_then(|value| rule_from_value(&value));

    match parsed {
        Ok(rule) => rule,
        Err(err) => {
            debug!(error = %err, "answer config is not a typed rule; using free-text fallback");
            free_text_fallback(raw)
        }
    }
}

/// Same as [`parse_rule`] for configs already decoded as JSON (catalog rows may
/// carry either a string column or an inline object).
pub fn parse_rule_value(value: &Value) -> BadgeRule {
    match value {
        Value::String(raw) => parse_rule(raw),
        Value::Null => free_text_fallback(""),
        other => match rule_from_value(other) {
            Ok(rule) => rule,
            Err(err) => {
                debug!(error = %err, "answer config is not a typed rule; using free-text fallback");
                free_text_fallback(&other.to_string())
            }
        },
    }
}

fn free_text_fallback(raw: &str) -> BadgeRule {
    BadgeRule::FreeText(FreeTextRule {
        expected_answer: raw.trim().to_lowercase(),
    })
}

fn rule_from_value(value: &Value) -> Result<BadgeRule, ConfigParseError> {
    let object = value.as_object().ok_or(ConfigParseError::NotAnObject)?;
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .map(squash)
        .filter(|kind| !kind.is_empty())
        .ok_or(ConfigParseError::MissingType)?;

    let rule = match kind.as_str() {
        "boolean" | "bool" | "yesno" => {
            BadgeRule::Boolean(body::<RawBoolean>(value, "boolean")?.into_rule())
        }
        "select" | "singleselect" | "single" | "radio" => {
            BadgeRule::SingleSelect(body::<RawSelect>(value, "singleSelect")?.into_single())
        }
        "multiselect" | "multi" | "checkbox" | "checkboxes" => {
            BadgeRule::MultiSelect(body::<RawSelect>(value, "multiSelect")?.into_multi())
        }
        "range" | "number" | "numeric" | "slider" => {
            BadgeRule::Range(body::<RawRange>(value, "range")?.into_rule())
        }
        "text" | "freetext" | "exact" => {
            BadgeRule::FreeText(body::<RawFreeText>(value, "freeText")?.into_rule())
        }
        _ => return Err(ConfigParseError::UnknownType(kind)),
    };

    Ok(wrap_ghost(object, rule))
}

fn body<T: DeserializeOwned>(value: &Value, kind: &'static str) -> Result<T, ConfigParseError> {
    T::deserialize(value).map_err(|source| ConfigParseError::InvalidBody { kind, source })
}

fn squash(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// `isGhost` must be the JSON literal `true`, and it only hides and gates a badge when
/// at least one prerequisite is set; otherwise the visible rule is used as-is.
fn wrap_ghost(object: &Map<String, Value>, inner: BadgeRule) -> BadgeRule {
    if object.get("isGhost") != Some(&Value::Bool(true)) {
        return inner;
    }

    let nested = ["ghostPrerequisites", "ghostPrerequisite", "prerequisites"]
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(Value::as_object);
    let prerequisite = match nested {
        Some(nested) => prerequisite_from(nested, &["mode"]),
        None => prerequisite_from(object, &["ghostMode", "prerequisiteMode"]),
    };

    if prerequisite.is_empty() {
        debug!("ghost flag without prerequisite; keeping the visible rule");
        return inner;
    }

    BadgeRule::Ghost(GhostRule {
        prerequisite,
        skill_points: object
            .get("skillPoints")
            .and_then(lenient::number)
            .map(|points| points.round() as i32),
        ghost_display_text: object
            .get("ghostDisplayText")
            .and_then(lenient::text),
        inner: Box::new(inner),
    })
}

fn prerequisite_from(map: &Map<String, Value>, mode_keys: &[&str]) -> GhostPrerequisite {
    let first = |keys: &[&str]| keys.iter().find_map(|key| map.get(*key));

    let mode = first(mode_keys)
        .and_then(Value::as_str)
        .map(|mode| match squash(mode).as_str() {
            "any" | "or" | "one" => PrerequisiteMode::Any,
            _ => PrerequisiteMode::All,
        })
        .unwrap_or_default();

    let required_badge_ids = first(&["requiredBadgeIds", "requiredBadges", "required_badge_ids"])
        .map(lenient::strings)
        .unwrap_or_default()
        .into_iter()
        .map(BadgeId)
        .collect();

    let min_unlocked_count = first(&["minUnlockedCount", "minBadges", "minBadgeCount"])
        .and_then(lenient::number)
        .filter(|count| *count > 0.0)
        .map(|count| count.round() as u32);

    let min_skill_points = first(&["minSkillPoints", "minPoints", "minSkill"])
        .and_then(lenient::number)
        .map(|points| points.round() as i32);

    let min_rank = first(&["minRank", "rank"])
        .and_then(lenient::text)
        .map(RankName::new);

    GhostPrerequisite {
        mode,
        required_badge_ids,
        min_unlocked_count,
        min_skill_points,
        min_rank,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBoolean {
    #[serde(default, deserialize_with = "lenient::de_strings")]
    true_labels: Vec<String>,
    #[serde(default, deserialize_with = "lenient::de_strings")]
    false_labels: Vec<String>,
    #[serde(default, deserialize_with = "lenient::de_bool")]
    expected: Option<bool>,
    #[serde(default, deserialize_with = "lenient::de_number")]
    skill_points: Option<f64>,
    #[serde(default, deserialize_with = "lenient::de_text")]
    display_text_true: Option<String>,
    #[serde(default, deserialize_with = "lenient::de_text")]
    display_text_false: Option<String>,
}

impl RawBoolean {
    fn into_rule(self) -> BooleanRule {
        let labels_or = |labels: Vec<String>, defaults: [&str; 5]| {
            if labels.is_empty() {
                defaults.iter().map(|label| label.to_string()).collect()
            } else {
                labels
            }
        };

        BooleanRule {
            true_labels: labels_or(self.true_labels, DEFAULT_TRUE_LABELS),
            false_labels: labels_or(self.false_labels, DEFAULT_FALSE_LABELS),
            expected: self.expected.unwrap_or(true),
            skill_points: self.skill_points.map(|points| points.round() as i32),
            display_text_true: self.display_text_true,
            display_text_false: self.display_text_false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSelect {
    #[serde(default, deserialize_with = "de_options")]
    options: Vec<SelectOption>,
    #[serde(default, alias = "optionSkillLabels", deserialize_with = "de_label_map")]
    option_skill_label: BTreeMap<String, String>,
    #[serde(default, alias = "thresholds", deserialize_with = "de_thresholds")]
    count_thresholds: Vec<CountThreshold>,
    #[serde(default, deserialize_with = "lenient::de_text")]
    mode: Option<String>,
}

impl RawSelect {
    fn options(&self) -> Vec<SelectOption> {
        if !self.options.is_empty() {
            return self.options.clone();
        }
        self.option_skill_label
            .keys()
            .map(|value| SelectOption {
                value: value.clone(),
                label: value.clone(),
            })
            .collect()
    }

    fn into_single(self) -> SingleSelectRule {
        SingleSelectRule {
            options: self.options(),
            option_skill_label: self.option_skill_label,
        }
    }

    fn into_multi(self) -> MultiSelectRule {
        let mode = match self.mode.as_deref().map(squash).as_deref() {
            Some("bycount" | "count") => MultiSelectMode::ByCount,
            Some("byoption" | "option") => MultiSelectMode::ByOption,
            _ if !self.count_thresholds.is_empty() => MultiSelectMode::ByCount,
            _ => MultiSelectMode::ByOption,
        };

        MultiSelectRule {
            options: self.options(),
            option_skill_label: self.option_skill_label,
            count_thresholds: self.count_thresholds,
            mode,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRange {
    #[serde(default, deserialize_with = "lenient::de_number")]
    min: Option<f64>,
    #[serde(default, deserialize_with = "lenient::de_number")]
    max: Option<f64>,
    #[serde(default, deserialize_with = "lenient::de_number")]
    expected: Option<f64>,
    #[serde(default, deserialize_with = "de_range_levels")]
    levels: Vec<RangeLevel>,
}

impl RawRange {
    fn into_rule(self) -> RangeRule {
        let mut levels = self.levels;
        levels.sort_by(|left, right| left.min.total_cmp(&right.min));
        RangeRule {
            min: self.min,
            max: self.max,
            expected: self.expected,
            levels,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFreeText {
    #[serde(default, alias = "expected", deserialize_with = "lenient::de_text")]
    expected_answer: Option<String>,
}

impl RawFreeText {
    fn into_rule(self) -> FreeTextRule {
        FreeTextRule {
            expected_answer: self.expected_answer.unwrap_or_default(),
        }
    }
}

fn de_options<'de, D>(deserializer: D) -> Result<Vec<SelectOption>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };

    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::Object(fields) => {
                let value = fields.get("value").and_then(lenient::text);
                let label = fields.get("label").and_then(lenient::text);
                match (value, label) {
                    (Some(value), Some(label)) => Some(SelectOption { value, label }),
                    (Some(only), None) | (None, Some(only)) => Some(SelectOption {
                        value: only.clone(),
                        label: only,
                    }),
                    (None, None) => None,
                }
            }
            other => lenient::text(other).map(|value| SelectOption {
                value: value.clone(),
                label: value,
            }),
        })
        .collect())
}

fn de_label_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Object(fields) = value else {
        return Ok(BTreeMap::new());
    };

    Ok(fields
        .iter()
        .filter_map(|(key, label)| lenient::text(label).map(|label| (key.clone(), label)))
        .collect())
}

fn de_thresholds<'de, D>(deserializer: D) -> Result<Vec<CountThreshold>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };

    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|fields| {
            let label = fields.get("label").and_then(lenient::text)?;
            let min = fields
                .get("min")
                .and_then(lenient::number)
                .filter(|min| *min >= 0.0)
                .map(|min| min.round() as u32)
                .unwrap_or(0);
            let points = fields
                .get("points")
                .and_then(lenient::number)
                .map(|points| points.round() as i32);
            Some(CountThreshold { min, label, points })
        })
        .collect())
}

fn de_range_levels<'de, D>(deserializer: D) -> Result<Vec<RangeLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };

    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|fields| {
            let label = fields.get("label").and_then(lenient::text)?;
            Some(RangeLevel {
                min: fields
                    .get("min")
                    .and_then(lenient::number)
                    .unwrap_or(f64::NEG_INFINITY),
                max: fields
                    .get("max")
                    .and_then(lenient::number)
                    .unwrap_or(f64::INFINITY),
                label,
                points: fields
                    .get("points")
                    .and_then(lenient::number)
                    .map(|points| points.round() as i32),
            })
        })
        .collect())
}

/// Admin-authored configs mix numbers, numeric strings, and stray nulls.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(super) fn number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(number) => number.as_f64(),
            Value::String(raw) => raw.trim().replace(',', ".").parse::<f64>().ok(),
            _ => None,
        }
        .filter(|number| number.is_finite())
    }

    pub(super) fn text(value: &Value) -> Option<String> {
        match value {
            Value::String(raw) if !raw.trim().is_empty() => Some(raw.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    pub(super) fn strings(value: &Value) -> Vec<String> {
        match value {
            Value::Array(items) => items.iter().filter_map(text).collect(),
            Value::String(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub(super) fn boolean(value: &Value) -> Option<bool> {
        match value {
            Value::Bool(flag) => Some(*flag),
            Value::Number(number) => number.as_f64().map(|number| number != 0.0),
            Value::String(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "oui" | "yes" | "vrai" | "1" => Some(true),
                "false" | "non" | "no" | "faux" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub(super) fn de_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(number(&Value::deserialize(deserializer)?))
    }

    pub(super) fn de_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(text(&Value::deserialize(deserializer)?))
    }

    pub(super) fn de_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(strings(&Value::deserialize(deserializer)?))
    }

    pub(super) fn de_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(boolean(&Value::deserialize(deserializer)?))
    }
}
