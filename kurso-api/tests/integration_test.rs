use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use kurso_api::collab::{LoggingCalendarPublisher, LoggingNotifier};
use kurso_api::{app, AppState};
use kurso_cancellation::CancellationEngine;
use kurso_catalog::{CapacityEvaluator, OfferingManager, TierManager};
use kurso_core::repository::{OfferingRepository, SessionRepository};
use kurso_core::{Grouping, Offering, OfferingKind, Session, SessionWindow};
use kurso_registration::RegistrationEngine;
use kurso_store::MemoryStore;

fn test_state() -> (Arc<MemoryStore>, AppState) {
    let store = Arc::new(MemoryStore::new());
    let calendar = Arc::new(LoggingCalendarPublisher);
    let notifier = Arc::new(LoggingNotifier);

    let state = AppState {
        offerings: Arc::new(OfferingManager::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            calendar.clone(),
        )),
        tiers: Arc::new(TierManager::new(store.clone(), store.clone())),
        capacity: Arc::new(CapacityEvaluator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        )),
        registration: Arc::new(RegistrationEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        )),
        cancellation: Arc::new(CancellationEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            calendar,
            notifier,
        )),
        cancellation_log: store.clone(),
    };
    (store, state)
}

async fn seed_session(store: &MemoryStore, capacity: i32) -> (Offering, Session) {
    let offering = Offering::new("Figure drawing", OfferingKind::Standard, capacity);
    OfferingRepository::create(store, &offering).await.unwrap();

    let start = chrono::Utc::now() + chrono::Duration::days(3);
    let window = SessionWindow {
        start_at: start,
        end_at: start + chrono::Duration::hours(2),
        local_start: start.naive_utc(),
        local_end: (start + chrono::Duration::hours(2)).naive_utc(),
    };
    let session = Session::new(offering.id, window, "Europe/Berlin", Grouping::Standalone);
    SessionRepository::create(store, &session).await.unwrap();
    (offering, session)
}

async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn register_until_session_is_full() {
    let (store, state) = test_state();
    let (_, session) = seed_session(&store, 1).await;
    let router = app(state);

    let (status, body) = post_json(
        router.clone(),
        "/v1/registrations",
        serde_json::json!({ "session_id": session.id, "user_id": Uuid::new_v4() }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcomes"][0]["outcome"]["result"], "registered");

    let (status, body) = post_json(
        router,
        "/v1/registrations",
        serde_json::json!({ "session_id": session.id, "user_id": Uuid::new_v4() }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "session_full");
    assert_eq!(body["counts"]["registered"], 1);
}

#[tokio::test]
async fn capacity_endpoint_reflects_registrations() {
    let (store, state) = test_state();
    let (_, session) = seed_session(&store, 2).await;
    let router = app(state);

    post_json(
        router.clone(),
        "/v1/registrations",
        serde_json::json!({ "session_id": session.id, "user_id": Uuid::new_v4() }),
    )
    .await;

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/v1/capacity?session_id={}", session.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let decision: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(decision["has_capacity"], true);
    assert_eq!(decision["counts"]["registered"], 1);
    assert_eq!(decision["counts"]["capacity"], 2);
}

#[tokio::test]
async fn admin_cancel_session_reports_audit_counts() {
    let (store, state) = test_state();
    let (_, session) = seed_session(&store, 5).await;
    let router = app(state);

    for _ in 0..2 {
        let (status, _) = post_json(
            router.clone(),
            "/v1/registrations",
            serde_json::json!({ "session_id": session.id, "user_id": Uuid::new_v4() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = post_json(
        router.clone(),
        &format!("/v1/sessions/{}/cancel", session.id),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registrations_cancelled"], 2);
    assert_eq!(body["records_created"], 2);

    // Registering on a cancelled session is refused.
    let (status, _) = post_json(
        router,
        "/v1/registrations",
        serde_json::json!({ "session_id": session.id, "user_id": Uuid::new_v4() }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_offering_roundtrip_mints_series_key() {
    let (_store, state) = test_state();
    let router = app(state);

    let (status, offering) = post_json(
        router.clone(),
        "/v1/admin/offerings",
        serde_json::json!({
            "title": "Blacksmithing weekend",
            "kind": "standard",
            "capacity": 8,
            "multi_day": true
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(offering["multi_day"], true);
    assert!(offering["series_key"].is_i64());

    let response = router
        .oneshot(
            Request::builder()
                .uri("/v1/admin/offerings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let list: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
}
