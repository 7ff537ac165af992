use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use crate::progression::reconciler::ReconcilerOptions;
use crate::progression::router::{progression_router, retract_handler};
use crate::progression::sessions::SessionRegistry;
use crate::progression::store::{BadgeStore, MemoryBadgeStore};

fn registry<S>(store: S) -> Arc<SessionRegistry<S>>
where
    S: BadgeStore + 'static,
{
    Arc::new(SessionRegistry::new(
        sample_catalog(),
        Arc::new(store),
        ReconcilerOptions::default(),
    ))
}

fn json_request(method: Method, uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn catalog_route_hides_ghosts_and_rule_internals() {
    let router = progression_router(registry(MemoryBadgeStore::new()));

    let response = router.oneshot(get("/api/v1/badges")).await.expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    let badges = payload.as_array().expect("array of badges");
    assert_eq!(badges.len(), 8);
    assert!(badges
        .iter()
        .all(|badge| !badge["id"].as_str().unwrap().starts_with("ghost-")));
    assert!(badges.iter().any(|badge| badge["id"] == "mystere"));
    let cuisine = badges
        .iter()
        .find(|badge| badge["id"] == "cuisine")
        .expect("cuisine listed");
    assert_eq!(cuisine["answerType"], "singleSelect");
    assert_eq!(cuisine["options"][0], "Jamais");
    assert!(cuisine.get("optionSkillLabel").is_none());
}

#[tokio::test]
async fn answer_route_returns_outcome_and_aggregate() {
    let router = progression_router(registry(MemoryBadgeStore::new()));

    let response = router
        .oneshot(json_request(
            Method::POST,
            "/api/v1/users/alice/answers",
            json!({
                "badgeId": "langues",
                "selectedOptions": ["français", "anglais", "espagnol"],
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["evaluation"]["verdict"], "unlocked");
    assert_eq!(payload["evaluation"]["level"], "niveau 2");
    assert_eq!(payload["points"], 4);
    assert_eq!(payload["aggregate"]["skillTotal"], 4);
}

#[tokio::test]
async fn answer_route_maps_engine_errors_to_statuses() {
    let registry = registry(MemoryBadgeStore::new());

    let cases = [
        (json!({ "badgeId": "licorne", "answer": "oui" }), StatusCode::NOT_FOUND),
        (json!({ "badgeId": "lecture", "answer": "beaucoup" }), StatusCode::UNPROCESSABLE_ENTITY),
        (json!({ "badgeId": "ghost-sage", "answer": "oui" }), StatusCode::UNPROCESSABLE_ENTITY),
    ];
    for (payload, expected) in cases {
        let response = progression_router(Arc::clone(&registry))
            .oneshot(json_request(Method::POST, "/api/v1/users/alice/answers", payload))
            .await
            .expect("route executes");
        assert_eq!(response.status(), expected);
        assert!(body_json(response).await["error"].is_string());
    }
}

#[tokio::test]
async fn failed_write_surfaces_as_service_unavailable() {
    let store = FlakyStore::default();
    store.fail_writes(true);
    let router = progression_router(registry(store));

    let response = router
        .oneshot(json_request(
            Method::POST,
            "/api/v1/users/alice/answers",
            json!({ "badgeId": "lever-tot", "answer": "oui" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let payload = body_json(response).await;
    assert!(payload["error"]
        .as_str()
        .expect("error message")
        .contains("please retry"));
}

#[tokio::test]
async fn unreadable_store_fails_session_open() {
    let router = progression_router(registry(UnavailableStore));

    let response = router
        .oneshot(get("/api/v1/users/alice/aggregate"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn change_route_rejects_records_for_another_user() {
    let router = progression_router(registry(MemoryBadgeStore::new()));
    let event = json!({
        "kind": "insert",
        "record": serde_json::to_value(unlocked("cuisine", Some("expert"))).unwrap(),
    });

    let response = router
        .oneshot(json_request(Method::POST, "/api/v1/users/bob/changes", event))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn change_route_merges_remote_records() {
    let registry = registry(MemoryBadgeStore::new());
    let event = json!({
        "kind": "insert",
        "record": serde_json::to_value(unlocked("cuisine", Some("expert"))).unwrap(),
    });

    let response = progression_router(Arc::clone(&registry))
        .oneshot(json_request(Method::POST, "/api/v1/users/alice/changes", event))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["skillTotal"], 10);

    let response = progression_router(registry)
        .oneshot(get("/api/v1/users/alice/aggregate"))
        .await
        .expect("route executes");
    let payload = body_json(response).await;
    assert_eq!(payload["unlockedBadgeIds"], json!(["cuisine"]));
    assert_eq!(payload["rank"], "Apprenti");
}

#[tokio::test]
async fn aggregate_route_pumps_store_notifications() {
    let registry = registry(MemoryBadgeStore::new());
    progression_router(Arc::clone(&registry))
        .oneshot(get("/api/v1/users/alice/aggregate"))
        .await
        .expect("session opened");

    registry
        .store()
        .upsert_user_badge(write_for(&unlocked("lever-tot", None)))
        .await
        .expect("remote write");

    let response = progression_router(registry)
        .oneshot(get("/api/v1/users/alice/aggregate"))
        .await
        .expect("route executes");
    assert_eq!(body_json(response).await["skillTotal"], 2);
}

#[tokio::test]
async fn events_route_drains_pending_events() {
    let registry = registry(MemoryBadgeStore::new());
    progression_router(Arc::clone(&registry))
        .oneshot(json_request(
            Method::POST,
            "/api/v1/users/alice/answers",
            json!({ "badgeId": "cuisine", "answer": "chef" }),
        ))
        .await
        .expect("route executes");

    let response = progression_router(Arc::clone(&registry))
        .oneshot(get("/api/v1/users/alice/events"))
        .await
        .expect("route executes");
    let payload = body_json(response).await;
    assert_eq!(payload[0]["type"], "badgeUnlocked");
    assert_eq!(payload[0]["badgeId"], "cuisine");
    assert_eq!(payload[0]["level"], "expert");

    let response = progression_router(registry)
        .oneshot(get("/api/v1/users/alice/events"))
        .await
        .expect("route executes");
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn retract_handler_deletes_and_reports_unknown_badges() {
    let registry = registry(MemoryBadgeStore::new());
    registry
        .store()
        .seed([unlocked("cuisine", Some("niveau 2"))]);

    let response = retract_handler::<MemoryBadgeStore>(
        State(Arc::clone(&registry)),
        Path((ALICE.to_string(), "cuisine".to_string())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["unlockedCount"], 0);
    assert!(registry.store().snapshot(&user()).is_empty());

    let response = retract_handler::<MemoryBadgeStore>(
        State(registry),
        Path((ALICE.to_string(), "licorne".to_string())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sessions_are_reused_until_evicted() {
    let registry = registry(MemoryBadgeStore::new());

    let first = registry.session(&user()).await.expect("session opens");
    let again = registry.session(&user()).await.expect("session reused");
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(registry.open_sessions().await, 1);

    assert_eq!(registry.evict_idle(Duration::ZERO).await, 0, "held sessions stay");
    drop((first, again));
    assert_eq!(registry.evict_idle(Duration::from_secs(3600)).await, 0);
    assert_eq!(registry.evict_idle(Duration::ZERO).await, 1);
    assert_eq!(registry.open_sessions().await, 0);
}

#[tokio::test]
async fn evicted_session_reopens_from_the_store() {
    let registry = registry(MemoryBadgeStore::new());
    registry.session(&user()).await.expect("session opens");
    registry.evict_idle(Duration::ZERO).await;

    registry
        .store()
        .seed([unlocked("cuisine", Some("niveau 2"))]);
    let session = registry.session(&user()).await.expect("session reopens");

    let session = session.lock().await;
    assert!(session.aggregate().unlocked_badge_ids.contains(&id("cuisine")));
}

#[tokio::test]
async fn close_route_drops_the_session() {
    let registry = registry(MemoryBadgeStore::new());
    registry.session(&user()).await.expect("session opens");
    let router = progression_router(Arc::clone(&registry));

    let delete = || {
        Request::delete("/api/v1/users/alice/session")
            .body(Body::empty())
            .unwrap()
    };
    let response = router.clone().oneshot(delete()).await.expect("route executes");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(registry.open_sessions().await, 0);

    let response = router.oneshot(delete()).await.expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
