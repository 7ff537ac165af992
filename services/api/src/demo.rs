use crate::infra::load_catalog;
use badge_engine::error::AppError;
use badge_engine::progression::scoring;
use badge_engine::progression::{
    AggregateReconciler, AggregateState, AnswerEvaluator, BadgeCatalog, BadgeId, BadgeStore,
    BadgeWrite, EngineEvent, EngineEventKind, MemoryBadgeStore, ReconcileError,
    ReconcilerOptions, UserId, Verdict,
};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Badge identifier from the catalog
    #[arg(long)]
    pub(crate) badge: String,
    /// Raw answer text (yes/no, number, free text, or a single option)
    #[arg(long, default_value = "")]
    pub(crate) answer: String,
    /// Selected option value; repeat for multi-select badges
    #[arg(long = "option")]
    pub(crate) options: Vec<String>,
    /// Catalog file (.json or .csv). Defaults to the built-in sample.
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Catalog file (.json or .csv). Defaults to the built-in sample.
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
    /// User id for the scripted session
    #[arg(long, default_value = "demo-user")]
    pub(crate) user: String,
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let EvaluateArgs {
        badge,
        answer,
        options,
        catalog,
    } = args;

    let catalog = load_catalog(catalog.as_deref())?;
    let badge_id = BadgeId::new(badge);
    let badge = catalog
        .get(&badge_id)
        .ok_or_else(|| AppError::from(ReconcileError::UnknownBadge(badge_id.clone())))?;

    let evaluation = AnswerEvaluator::new().evaluate(&badge.rule, &answer, &options);
    let points = if evaluation.ok() {
        scoring::points(badge, evaluation.level.as_deref())
    } else {
        0
    };

    println!("{} ({})", badge.display_name(evaluation.level.as_deref()), badge.id);
    println!("- verdict: {}", verdict_label(evaluation.verdict));
    if let Some(level) = &evaluation.level {
        let shown = evaluation.display_level.as_deref().unwrap_or(level);
        println!("- level: {shown} (stored as '{level}')");
    }
    println!("- points: {points}");
    if !evaluation.message.is_empty() {
        println!("- message: {}", evaluation.message);
    }
    Ok(())
}

/// Scripted answers for the sample catalog; steps naming badges missing from a custom
/// catalog are skipped.
const SCRIPT: &[(&str, &str, &[&str])] = &[
    ("lever-tot", "oui", &[]),
    ("cuisine", "chef", &[]),
    ("langues", "", &["français", "anglais", "espagnol"]),
    ("lecture", "12", &[]),
    ("fumeur", "oui", &[]),
    ("sport", "", &["rien", "club"]),
    ("lecture", "0", &[]),
];

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { catalog, user } = args;

    let catalog = Arc::new(load_catalog(catalog.as_deref())?);
    let store = Arc::new(MemoryBadgeStore::new());
    let user_id = UserId::new(user);
    let mut session = AggregateReconciler::open(
        user_id.clone(),
        Arc::clone(&catalog),
        Arc::clone(&store),
        ReconcilerOptions::default(),
    )
    .await?;

    println!(
        "Badge progression demo for '{}' ({} badges, {} hidden)",
        user_id,
        catalog.len(),
        catalog.ghosts().count()
    );

    for (badge, answer, selected) in SCRIPT {
        let badge_id = BadgeId::new(*badge);
        if catalog.get(&badge_id).is_none() {
            println!("\n> {badge}: not in this catalog, skipped");
            continue;
        }

        let selected: Vec<String> = selected.iter().map(|option| option.to_string()).collect();
        let shown = if selected.is_empty() {
            (*answer).to_string()
        } else {
            selected.join(", ")
        };
        println!("\n> {badge}: {shown}");

        match session.apply_answer(&badge_id, answer, &selected).await {
            Ok(outcome) => println!(
                "  {} | {} point(s) | {}",
                verdict_label(outcome.evaluation.verdict),
                outcome.points,
                outcome.evaluation.message
            ),
            Err(err) => println!("  rejected: {err}"),
        }
        render_events(&catalog, &session.take_events());
        render_aggregate(session.aggregate());
    }

    // A moderator flags one unlock and another device writes a record; both reach the
    // session through the store's change feed.
    println!("\n> remote changes");
    store.flag_suspicion(&user_id, &BadgeId::new("cuisine"), true);
    store
        .upsert_user_badge(BadgeWrite {
            user_id: user_id.clone(),
            badge_id: BadgeId::new("capitale"),
            success: true,
            level: None,
            user_answer: Some("Canberra".to_string()),
            was_ever_unlocked: true,
        })
        .await
        .map_err(ReconcileError::Write)?;
    let applied = session.pump().await?;
    println!("  merged {applied} change(s)");
    render_events(&catalog, &session.take_events());
    render_aggregate(session.aggregate());

    Ok(())
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Unlocked => "unlocked",
        Verdict::Denied => "not unlocked",
        Verdict::Invalid => "invalid answer",
    }
}

fn render_events(catalog: &BadgeCatalog, events: &[EngineEvent]) {
    for event in events {
        let name = catalog
            .get(&event.badge_id)
            .map(|badge| badge.name.as_str())
            .unwrap_or(event.badge_id.as_str());
        match &event.kind {
            EngineEventKind::BadgeUnlocked { level: Some(level) } => {
                println!("  * unlocked {name} ({level})")
            }
            EngineEventKind::BadgeUnlocked { level: None } => println!("  * unlocked {name}"),
            EngineEventKind::BadgeBlocked { message } => println!("  * blocked {name}: {message}"),
            EngineEventKind::BadgeReblocked => println!("  * relocked {name}"),
        }
    }
}

fn render_aggregate(aggregate: &AggregateState) {
    println!(
        "  total {} | rank {} | {} unlocked ({} hidden)",
        aggregate.skill_total,
        aggregate.rank,
        aggregate.unlocked_count,
        aggregate.ghost_unlocked_ids.len()
    );
    if let Some(next) = &aggregate.next_rank {
        println!("  {} point(s) to {}", next.missing_points, next.next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_accepts_sample_badges() {
        let args = EvaluateArgs {
            badge: "lecture".to_string(),
            answer: "12".to_string(),
            options: Vec::new(),
            catalog: None,
        };
        assert!(run_evaluate(args).is_ok());
    }

    #[test]
    fn evaluate_rejects_unknown_badges() {
        let args = EvaluateArgs {
            badge: "licorne".to_string(),
            answer: "oui".to_string(),
            options: Vec::new(),
            catalog: None,
        };
        assert!(matches!(
            run_evaluate(args),
            Err(AppError::Progression(ReconcileError::UnknownBadge(_)))
        ));
    }

    #[tokio::test]
    async fn demo_runs_against_the_sample_catalog() {
        let args = DemoArgs {
            catalog: None,
            user: "demo-user".to_string(),
        };
        assert!(run_demo(args).await.is_ok());
    }
}
