use std::fmt;

use serde::{Deserialize, Serialize};

use super::levels;
use super::rules::BadgeRule;

/// Identifier wrapper for catalog badges.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BadgeId(pub String);

impl BadgeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BadgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BadgeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier wrapper for the user owning a session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Immutable catalog entry. Never mutated by the engine once loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeDefinition {
    pub id: BadgeId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expert_name: Option<String>,
    pub emoji: String,
    pub question: String,
    pub theme: String,
    pub low_skill: bool,
    pub rule: BadgeRule,
}

impl BadgeDefinition {
    pub fn is_ghost(&self) -> bool {
        self.rule.is_ghost()
    }

    /// Name shown for the achieved level: the expert name wins when the level is expert.
    pub fn display_name(&self, level: Option<&str>) -> &str {
        match (&self.expert_name, level) {
            (Some(expert_name), Some(level)) if levels::is_expert(level) => expert_name,
            _ => &self.name,
        }
    }
}

/// Persisted per (user, badge) state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBadgeRecord {
    pub user_id: UserId,
    pub badge_id: BadgeId,
    pub success: bool,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub user_answer: Option<String>,
    #[serde(default)]
    pub was_ever_unlocked: bool,
    /// Moderation flag owned by an external collaborator; the engine only reads it.
    #[serde(default)]
    pub blocked_by_suspicion: bool,
}

impl UserBadgeRecord {
    /// Whether the record contributes to the unlocked set and the skill total.
    pub fn counts_as_unlocked(&self) -> bool {
        self.success && !self.blocked_by_suspicion
    }
}

/// Upsert payload. The moderation flag is deliberately absent: stores keep whatever
/// value they already hold for the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeWrite {
    pub user_id: UserId,
    pub badge_id: BadgeId,
    pub success: bool,
    pub level: Option<String>,
    pub user_answer: Option<String>,
    pub was_ever_unlocked: bool,
}

impl BadgeWrite {
    pub fn into_record(self, blocked_by_suspicion: bool) -> UserBadgeRecord {
        UserBadgeRecord {
            user_id: self.user_id,
            badge_id: self.badge_id,
            success: self.success,
            level: self.level,
            user_answer: self.user_answer,
            was_ever_unlocked: self.was_ever_unlocked,
            blocked_by_suspicion,
        }
    }
}
