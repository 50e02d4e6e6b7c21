use std::sync::Arc;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use serde_json::{json, Value};
use uuid::Uuid;

use patient_queue_cell::*;
use shared_config::AppConfig;

fn create_test_state() -> Arc<QueueState> {
    let config = Arc::new(AppConfig::default());
    let directory = InMemoryDoctorDirectory::new();
    let notifier = BroadcastNotifier::new(16);
    let engine = QueueEngine::new(
        QueueEngineConfig::from(config.as_ref()),
        Arc::new(directory.clone()),
        Arc::new(notifier.clone()),
    );

    Arc::new(QueueState {
        engine: Arc::new(engine),
        directory,
        notifier,
        triage: None,
        config,
    })
}

fn create_test_app() -> Router {
    create_patient_queue_router(create_test_state())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn register_doctor(app: &Router, avg: u32) -> Uuid {
    let doctor_id = Uuid::new_v4();
    let (status, _) = send(
        app,
        "PUT",
        &format!("/doctors/{}", doctor_id),
        Some(json!({ "avg_consultation_minutes": avg })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    doctor_id
}

fn walk_in(doctor_id: Uuid, urgency: Option<&str>) -> Value {
    json!({
        "doctor_id": doctor_id,
        "patient_id": Uuid::new_v4(),
        "manual_urgency": urgency,
        "symptoms": "persistent cough",
        "pain_level": 2,
        "patient_age": 41
    })
}

#[tokio::test]
async fn test_walk_in_with_manual_urgency() {
    let app = create_test_app();
    let doctor_id = register_doctor(&app, 15).await;

    let (status, json) = send(&app, "POST", "/walk-in", Some(walk_in(doctor_id, Some("high")))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["queue"]["position"], 1);
    assert_eq!(json["data"]["triage"]["urgency_tier"], "elevated");
    assert_eq!(json["data"]["triage"]["source"], "manual");
}

#[tokio::test]
async fn test_walk_in_without_classifier_is_routine() {
    let app = create_test_app();
    let doctor_id = register_doctor(&app, 15).await;

    let (status, json) = send(&app, "POST", "/walk-in", Some(walk_in(doctor_id, None))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["triage"]["urgency_tier"], "routine");
    assert_eq!(json["data"]["triage"]["source"], "fallback");
}

#[tokio::test]
async fn test_emergency_goes_to_front() {
    let app = create_test_app();
    let doctor_id = register_doctor(&app, 20).await;
    send(&app, "POST", "/walk-in", Some(walk_in(doctor_id, None))).await;

    let (status, json) = send(
        &app,
        "POST",
        "/emergency",
        Some(json!({ "doctor_id": doctor_id, "patient_id": Uuid::new_v4() })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["queue"]["position"], 1);
    assert_eq!(json["data"]["queue"]["estimated_wait_minutes"], 0);

    let (_, queue) = send(&app, "GET", &format!("/?doctor_id={}", doctor_id), None).await;
    let entries = queue["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["urgency_tier"], "emergency");
    assert_eq!(entries[1]["estimated_wait_minutes"], 20);
}

#[tokio::test]
async fn test_check_in_maps_urgency_label() {
    let app = create_test_app();
    let doctor_id = register_doctor(&app, 15).await;
    let appointment_id = Uuid::new_v4();

    let (status, _) = send(
        &app,
        "POST",
        "/check-in",
        Some(json!({
            "appointment_id": appointment_id,
            "doctor_id": doctor_id,
            "patient_id": Uuid::new_v4(),
            "urgency_level": "critical"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, queue) = send(&app, "GET", &format!("/?doctor_id={}", doctor_id), None).await;
    assert_eq!(queue["data"][0]["urgency_tier"], "emergency");
    assert_eq!(queue["data"][0]["source_appointment_id"], appointment_id.to_string());
}

#[tokio::test]
async fn test_call_next_and_consultation_state() {
    let app = create_test_app();
    let doctor_id = register_doctor(&app, 15).await;
    send(&app, "POST", "/walk-in", Some(walk_in(doctor_id, None))).await;

    let (status, json) = send(&app, "POST", "/next", Some(json!({ "doctor_id": doctor_id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "in_consultation");
    assert_eq!(json["message"], "Next patient called");

    let (_, state) = send(&app, "GET", &format!("/doctors/{}/state", doctor_id), None).await;
    assert_eq!(state["data"]["state"], "consulting");

    let (status, json) = send(&app, "POST", "/next", Some(json!({ "doctor_id": doctor_id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], Value::Null);
    assert_eq!(json["message"], "No more patients in queue");
}

#[tokio::test]
async fn test_unknown_doctor_returns_not_found() {
    let app = create_test_app();

    let (status, json) = send(&app, "POST", "/next", Some(json!({ "doctor_id": Uuid::new_v4() }))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_invalid_pain_level_is_bad_request() {
    let app = create_test_app();
    let doctor_id = register_doctor(&app, 15).await;
    let mut body = walk_in(doctor_id, None);
    body["pain_level"] = json!(9);

    let (status, _) = send(&app, "POST", "/walk-in", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_remove_entry_twice_conflicts() {
    let app = create_test_app();
    let doctor_id = register_doctor(&app, 15).await;
    let (_, json) = send(&app, "POST", "/walk-in", Some(walk_in(doctor_id, None))).await;
    let entry_id = json["data"]["queue"]["entry_id"].as_str().unwrap().to_string();

    let (status, json) = send(&app, "DELETE", &format!("/entries/{}", entry_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "skipped");

    let (status, _) = send(&app, "DELETE", &format!("/entries/{}", entry_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reorder_rejects_partial_order() {
    let app = create_test_app();
    let doctor_id = register_doctor(&app, 15).await;
    let (_, first) = send(&app, "POST", "/walk-in", Some(walk_in(doctor_id, None))).await;
    send(&app, "POST", "/walk-in", Some(walk_in(doctor_id, None))).await;

    let (status, _) = send(
        &app,
        "PUT",
        "/reorder",
        Some(json!({ "doctor_id": doctor_id, "order": [first["data"]["queue"]["entry_id"]] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rebalance_all_doctors() {
    let app = create_test_app();
    let doctor_id = register_doctor(&app, 15).await;
    send(&app, "POST", "/walk-in", Some(walk_in(doctor_id, None))).await;

    let (status, json) = send(&app, "POST", "/rebalance", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["queues_reordered"], 0);

    let (status, json) = send(&app, "POST", "/rebalance", Some(json!({ "doctor_id": doctor_id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"][0]["position"], 1);
}

#[tokio::test]
async fn test_zero_consultation_length_is_rejected() {
    let app = create_test_app();

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/doctors/{}", Uuid::new_v4()),
        Some(json!({ "avg_consultation_minutes": 0 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rebalance_without_body_covers_all_doctors() {
    let app = create_test_app();
    let doctor_id = register_doctor(&app, 15).await;
    send(&app, "POST", "/walk-in", Some(walk_in(doctor_id, None))).await;

    let (status, json) = send(&app, "POST", "/rebalance", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["queues_reordered"], 0);
}

#[tokio::test]
async fn test_state_notifier_receives_route_events() {
    let state = create_test_state();
    let mut events = state.notifier.subscribe_global();
    let app = create_patient_queue_router(state);
    let doctor_id = register_doctor(&app, 15).await;

    let (status, _) = send(
        &app,
        "POST",
        "/emergency",
        Some(json!({ "doctor_id": doctor_id, "patient_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let kinds: Vec<String> = (0..2)
        .map(|_| {
            let message = events.try_recv().expect("event should be published");
            let event: Value = serde_json::from_str(&message).unwrap();
            event["type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(kinds, vec!["queue_update", "emergency"]);
}
