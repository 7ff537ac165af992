//! Level label conventions shared by the evaluator and the scorer.
//!
//! Labels come straight from admin-authored configs, so every check here is
//! case-insensitive and tolerant of spacing variants.

/// Option label that vetoes an unlock whatever else was selected.
pub const BLOCK_SENTINEL: &str = "bloquer";
/// Option label meaning "no skill"; a selection made only of these does not unlock.
pub const NO_SKILL_SENTINEL: &str = "aucun";
/// Level written on failure records.
pub const LEVEL_ZERO: &str = "level 0";
/// Display label for the top level of a rule's ordering.
pub const MAX_LABEL: &str = "max";
/// Points granted for any expert level.
pub const EXPERT_BONUS: i32 = 10;

fn squash(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '_' | '-' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn is_level_zero(label: &str) -> bool {
    matches!(
        squash(label).as_str(),
        "level0" | "niveau0" | "niv0" | "lvl0" | "lv0" | "0"
    )
}

pub fn is_expert(label: &str) -> bool {
    label.to_lowercase().contains("expert")
}

pub fn is_max(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case(MAX_LABEL)
}

pub fn is_block_sentinel(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case(BLOCK_SENTINEL)
}

pub fn is_no_skill(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case(NO_SKILL_SENTINEL) || is_level_zero(label)
}

/// Labels that never name an achievable level.
pub fn is_sentinel(label: &str) -> bool {
    is_block_sentinel(label) || is_no_skill(label)
}

pub fn same_label(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_zero_accepts_spelling_variants() {
        for label in ["level 0", "Level 0", "LEVEL_0", "niveau 0", "Niv-0", "lvl0"] {
            assert!(is_level_zero(label), "{label} should be level zero");
        }
        assert!(!is_level_zero("level 10"));
        assert!(!is_level_zero("niveau 1"));
    }

    #[test]
    fn expert_detection_is_case_insensitive() {
        assert!(is_expert("Expert"));
        assert!(is_expert("niveau expert"));
        assert!(!is_expert("niveau 3"));
    }

    #[test]
    fn sentinels_are_trimmed_and_case_folded() {
        assert!(is_block_sentinel(" Bloquer "));
        assert!(is_no_skill("AUCUN"));
        assert!(is_sentinel("level 0"));
        assert!(!is_sentinel("niveau 2"));
    }
}
