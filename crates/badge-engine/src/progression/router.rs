use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{BadgeDefinition, BadgeId, UserId};
use super::rules::BadgeRule;
use super::sessions::SessionRegistry;
use super::store::{BadgeStore, ChangeEvent};
use crate::error::AppError;

/// Router exposing the progression engine over HTTP, one session per user.
pub fn progression_router<S>(registry: Arc<SessionRegistry<S>>) -> Router
where
    S: BadgeStore + 'static,
{
    Router::new()
        .route("/api/v1/badges", get(catalog_handler::<S>))
        .route(
            "/api/v1/users/:user_id/aggregate",
            get(aggregate_handler::<S>),
        )
        .route("/api/v1/users/:user_id/answers", post(answer_handler::<S>))
        .route("/api/v1/users/:user_id/changes", post(change_handler::<S>))
        .route(
            "/api/v1/users/:user_id/badges/:badge_id",
            delete(retract_handler::<S>),
        )
        .route("/api/v1/users/:user_id/events", get(events_handler::<S>))
        .route(
            "/api/v1/users/:user_id/session",
            delete(close_handler::<S>),
        )
        .with_state(registry)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub badge_id: BadgeId,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub selected_options: Vec<String>,
}

/// Public catalog entry. Rule internals (expected answers, level maps) stay server-side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BadgeSummary<'a> {
    id: &'a BadgeId,
    name: &'a str,
    emoji: &'a str,
    question: &'a str,
    theme: &'a str,
    low_skill: bool,
    answer_type: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    options: Vec<&'a str>,
}

impl<'a> From<&'a BadgeDefinition> for BadgeSummary<'a> {
    fn from(badge: &'a BadgeDefinition) -> Self {
        let options: Vec<&str> = match &badge.rule {
            BadgeRule::SingleSelect(rule) => &rule.options[..],
            BadgeRule::MultiSelect(rule) => &rule.options[..],
            _ => &[],
        }
        .iter()
        .map(|option| option.label.as_str())
        .collect();
        Self {
            id: &badge.id,
            name: &badge.name,
            emoji: &badge.emoji,
            question: &badge.question,
            theme: &badge.theme,
            low_skill: badge.low_skill,
            answer_type: badge.rule.kind(),
            options,
        }
    }
}

pub(crate) async fn catalog_handler<S>(
    State(registry): State<Arc<SessionRegistry<S>>>,
) -> Response
where
    S: BadgeStore + 'static,
{
    let badges: Vec<BadgeSummary<'_>> = registry
        .catalog()
        .visible()
        .map(BadgeSummary::from)
        .collect();
    (StatusCode::OK, Json(badges)).into_response()
}

pub(crate) async fn aggregate_handler<S>(
    State(registry): State<Arc<SessionRegistry<S>>>,
    Path(user_id): Path<String>,
) -> Response
where
    S: BadgeStore + 'static,
{
    let session = match registry.session(&UserId::new(user_id)).await {
        Ok(session) => session,
        Err(err) => return AppError::from(err).into_response(),
    };
    let mut reconciler = session.lock().await;
    match reconciler.pump().await {
        Ok(_) => (StatusCode::OK, Json(reconciler.aggregate())).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn answer_handler<S>(
    State(registry): State<Arc<SessionRegistry<S>>>,
    Path(user_id): Path<String>,
    Json(request): Json<AnswerRequest>,
) -> Response
where
    S: BadgeStore + 'static,
{
    let session = match registry.session(&UserId::new(user_id)).await {
        Ok(session) => session,
        Err(err) => return AppError::from(err).into_response(),
    };
    let mut reconciler = session.lock().await;
    match reconciler
        .apply_answer(&request.badge_id, &request.answer, &request.selected_options)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn change_handler<S>(
    State(registry): State<Arc<SessionRegistry<S>>>,
    Path(user_id): Path<String>,
    Json(event): Json<ChangeEvent>,
) -> Response
where
    S: BadgeStore + 'static,
{
    let user_id = UserId::new(user_id);
    if event.record.user_id != user_id {
        let payload = json!({
            "error": "change record belongs to another user",
            "userId": user_id,
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
    }

    let session = match registry.session(&user_id).await {
        Ok(session) => session,
        Err(err) => return AppError::from(err).into_response(),
    };
    let mut reconciler = session.lock().await;
    match reconciler.apply_remote_change(event).await {
        Ok(aggregate) => (StatusCode::OK, Json(aggregate)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn retract_handler<S>(
    State(registry): State<Arc<SessionRegistry<S>>>,
    Path((user_id, badge_id)): Path<(String, String)>,
) -> Response
where
    S: BadgeStore + 'static,
{
    let session = match registry.session(&UserId::new(user_id)).await {
        Ok(session) => session,
        Err(err) => return AppError::from(err).into_response(),
    };
    let mut reconciler = session.lock().await;
    match reconciler.retract_badge(&BadgeId::new(badge_id)).await {
        Ok(aggregate) => (StatusCode::OK, Json(aggregate)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn events_handler<S>(
    State(registry): State<Arc<SessionRegistry<S>>>,
    Path(user_id): Path<String>,
) -> Response
where
    S: BadgeStore + 'static,
{
    let session = match registry.session(&UserId::new(user_id)).await {
        Ok(session) => session,
        Err(err) => return AppError::from(err).into_response(),
    };
    let events = session.lock().await.take_events();
    (StatusCode::OK, Json(events)).into_response()
}

/// Close a user's session; the next request reopens it from the store.
pub(crate) async fn close_handler<S>(
    State(registry): State<Arc<SessionRegistry<S>>>,
    Path(user_id): Path<String>,
) -> Response
where
    S: BadgeStore + 'static,
{
    if registry.close(&UserId::new(user_id)).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}
