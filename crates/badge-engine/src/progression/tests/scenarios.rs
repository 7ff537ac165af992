use super::common::*;
use crate::progression::evaluation::{AnswerEvaluator, Verdict};
use crate::progression::ghost::GhostResolver;
use crate::progression::rules::parse_rule;
use crate::progression::scoring;

fn evaluate(config: &str, answer: &str, selected: &[&str]) -> crate::progression::EvaluationResult {
    AnswerEvaluator::new().evaluate(&parse_rule(config), answer, &options(selected))
}

#[test]
fn boolean_answer_matches_true_label_case_insensitively() {
    let result = evaluate(r#"{"type":"boolean","expected":true,"trueLabels":["oui"]}"#, "Oui", &[]);
    assert!(result.ok());
    assert_eq!(result.level, None);
}

#[test]
fn by_count_falls_to_the_next_lower_threshold() {
    let result = evaluate(
        r#"{"type":"multiSelect","mode":"byCount","options":["a","b","c"],
            "countThresholds":[{"min":3,"label":"niv3"},{"min":1,"label":"niv1"}]}"#,
        "",
        &["a", "b"],
    );
    assert!(result.ok());
    assert_eq!(result.level.as_deref(), Some("niv1"));
}

#[test]
fn range_level_carries_its_configured_points() {
    let config = r#"{"type":"range","levels":[
        {"min":0,"max":9,"label":"niv1","points":1},
        {"min":10,"max":99,"label":"niv2","points":5}]}"#;
    let result = evaluate(config, "15", &[]);
    assert!(result.ok());
    assert_eq!(result.level.as_deref(), Some("niv2"));

    let definition = badge("lecture", config);
    assert_eq!(scoring::points(&definition, result.level.as_deref()), 5);
}

#[test]
fn fifth_unlock_reveals_the_min_badges_ghost() {
    let mut badges = plain_badges(5);
    badges.push(badge(
        "g-five",
        r#"{"type":"boolean","isGhost":true,"ghostPrerequisites":{"minBadges":5}}"#,
    ));
    let catalog = catalog_of(badges);
    let resolver = GhostResolver::new();

    let mut records: Vec<_> = (1..=4).map(|index| unlocked(&format!("b{index}"), None)).collect();
    assert!(!resolver.resolve(&catalog, &records).unlocked.contains(&id("g-five")));

    records.push(unlocked("b5", None));
    assert!(resolver.resolve(&catalog, &records).unlocked.contains(&id("g-five")));
}

#[test]
fn block_sentinel_wins_over_any_other_selection() {
    let single = r#"{"type":"select","options":["a","b","c"],
        "optionSkillLabel":{"a":"niveau 1","b":"expert","c":"bloquer"}}"#;
    let multi = r#"{"type":"multiSelect","options":["a","b","c","d"],
        "optionSkillLabel":{"a":"niveau 1","b":"expert","c":"bloquer","d":"aucun"}}"#;
    let counted = r#"{"type":"multiSelect","mode":"byCount","options":["a","b","c"],
        "optionSkillLabel":{"c":"bloquer"},"countThresholds":[{"min":1,"label":"niv1"}]}"#;

    let selections: [&[&str]; 5] = [
        &["c"],
        &["a", "c"],
        &["b", "c"],
        &["c", "b", "a"],
        &["a", "b", "c", "d"],
    ];
    for selected in selections {
        for config in [single, multi, counted] {
            let result = evaluate(config, "", selected);
            assert!(!result.ok(), "{selected:?} must be vetoed");
            assert_eq!(result.verdict, Verdict::Denied);
        }
    }
}

#[test]
fn every_sample_badge_scores_zero_at_level_zero() {
    let catalog = sample_catalog();
    for definition in catalog.badges() {
        for level in ["level 0", "Level 0", "LEVEL 0", "niveau 0"] {
            assert_eq!(scoring::points(definition, Some(level)), 0, "{}", definition.id);
        }
    }
}

#[test]
fn low_skill_sample_badges_cost_twice_their_plain_value() {
    let catalog = sample_catalog();
    for definition in catalog.badges() {
        let mut penalized = definition.clone();
        penalized.low_skill = true;
        let mut plain = definition.clone();
        plain.low_skill = false;

        let levels = [
            None,
            Some("niveau 1"),
            Some("niveau 2"),
            Some("niveau 3"),
            Some("expert"),
            Some("max"),
        ];
        for level in levels {
            assert_eq!(
                scoring::points(&penalized, level),
                -2 * scoring::points(&plain, level).abs(),
                "{} at {level:?}",
                definition.id
            );
        }
    }
}

#[test]
fn huge_low_skill_penalties_saturate_without_panicking() {
    let mut heavy = vec![
        badge("vice-a", r#"{"type":"boolean","skillPoints":2000000000}"#),
        badge("vice-b", r#"{"type":"boolean","skillPoints":2000000000}"#),
    ];
    for badge in &mut heavy {
        badge.low_skill = true;
    }
    let catalog = catalog_of(heavy);
    let records = vec![unlocked("vice-a", None), unlocked("vice-b", None)];

    let aggregate = crate::progression::AggregateState::recompute(
        &catalog,
        &records,
        &GhostResolver::new(),
    );

    assert_eq!(aggregate.skill_total, i32::MIN);
    assert_eq!(aggregate.rank.as_str(), "Novice");
    let next = aggregate.next_rank.expect("every rank is still ahead");
    assert_eq!(next.missing_points, i32::MAX);
}
