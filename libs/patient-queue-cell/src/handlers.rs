use std::sync::Arc;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde_json::{json, Value};
use tokio::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::{
    AddToQueueRequest, CheckInRequest, DoctorQueueRequest, EmergencyRequest, QueueError, QueueQuery,
    RebalanceRequest, ReorderRequest, TriageRequest, UpsertDoctorRequest, UrgencyTier, WalkInRequest,
};
use crate::router::QueueState;
use crate::services::triage::resolve_urgency_tier;

pub(crate) fn map_queue_error(e: QueueError) -> AppError {
    match e {
        QueueError::DoctorNotFound(_) | QueueError::EntryNotFound(_) => AppError::NotFound(e.to_string()),
        QueueError::ValidationError(_) => AppError::ValidationError(e.to_string()),
        QueueError::InvalidState(_) | QueueError::InvalidStatusTransition { .. } => AppError::Conflict(e.to_string()),
        QueueError::DirectoryError(_) | QueueError::TriageError(_) => AppError::ServiceUnavailable(e.to_string()),
        QueueError::ConcurrentModification { .. } => {
            error!("Queue operation failed: {}", e);
            AppError::Internal("Operation failed".to_string())
        }
    }
}

/// Current queue, for one doctor or grouped across all doctors
pub async fn get_queue(
    State(state): State<Arc<QueueState>>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Value>, AppError> {
    match query.doctor_id {
        Some(doctor_id) => {
            let entries = state.engine.get_doctor_queue(doctor_id).await.map_err(map_queue_error)?;
            Ok(Json(json!({ "success": true, "data": entries })))
        }
        None => {
            let queues = state.engine.get_queue(None).await.map_err(map_queue_error)?;
            Ok(Json(json!({ "success": true, "data": queues })))
        }
    }
}

/// Register a walk-in; urgency comes from the receptionist or the triage classifier
pub async fn add_walk_in(
    State(state): State<Arc<QueueState>>,
    Json(request): Json<WalkInRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Walk-in registration for patient {} with doctor {}", request.patient_id, request.doctor_id);

    let triage_request = TriageRequest {
        symptoms: request.symptoms.clone().unwrap_or_default(),
        patient_age: request.patient_age,
        pain_level: request.pain_level,
    };
    let resolved = resolve_urgency_tier(
        request.manual_urgency.as_deref(),
        state.triage.as_ref(),
        &triage_request,
        Duration::from_millis(state.config.triage_timeout_ms),
        UrgencyTier::Routine,
    )
    .await;

    let admission = state
        .engine
        .add_to_queue(AddToQueueRequest {
            doctor_id: request.doctor_id,
            patient_id: request.patient_id,
            source_appointment_id: request.source_appointment_id,
            urgency_tier: resolved.tier,
            pain_level: request.pain_level,
            patient_age: request.patient_age,
        })
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "queue": admission,
            "triage": {
                "urgency_tier": resolved.tier,
                "source": format!("{:?}", resolved.source).to_lowercase(),
            }
        }
    })))
}

/// Emergency intake: takes slot 1 ahead of everyone already waiting
pub async fn add_emergency(
    State(state): State<Arc<QueueState>>,
    Json(request): Json<EmergencyRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Emergency intake for patient {} with doctor {}", request.patient_id, request.doctor_id);

    let admission = state
        .engine
        .add_to_queue(AddToQueueRequest {
            doctor_id: request.doctor_id,
            patient_id: request.patient_id,
            source_appointment_id: request.source_appointment_id,
            urgency_tier: UrgencyTier::Emergency,
            pain_level: request.pain_level,
            patient_age: request.patient_age,
        })
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({
        "success": true,
        "data": { "queue": admission },
        "message": "Emergency patient added. Doctor notified."
    })))
}

/// Check in a scheduled appointment
pub async fn check_in(
    State(state): State<Arc<QueueState>>,
    Json(request): Json<CheckInRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Check-in for appointment {}", request.appointment_id);

    let tier = request
        .urgency_level
        .as_deref()
        .map(UrgencyTier::from_urgency_label)
        .unwrap_or(UrgencyTier::Routine);

    let admission = state
        .engine
        .add_to_queue(AddToQueueRequest {
            doctor_id: request.doctor_id,
            patient_id: request.patient_id,
            source_appointment_id: Some(request.appointment_id),
            urgency_tier: tier,
            pain_level: request.pain_level,
            patient_age: request.patient_age,
        })
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({ "success": true, "data": admission })))
}

pub async fn reorder_queue(
    State(state): State<Arc<QueueState>>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<Value>, AppError> {
    let entries = state
        .engine
        .reorder_queue(request.doctor_id, request.order)
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({ "success": true, "data": entries, "message": "Queue reordered" })))
}

/// Rebalance one doctor, or every doctor when `doctor_id` (or the whole body) is omitted
pub async fn rebalance_queue(
    State(state): State<Arc<QueueState>>,
    request: Option<Json<RebalanceRequest>>,
) -> Result<Json<Value>, AppError> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    match request.doctor_id {
        Some(doctor_id) => {
            let entries = state.engine.rebalance_queue(doctor_id).await.map_err(map_queue_error)?;
            Ok(Json(json!({ "success": true, "data": entries, "message": "Queue rebalanced" })))
        }
        None => {
            let reordered = state.engine.rebalance_all().await;
            Ok(Json(json!({
                "success": true,
                "data": { "queues_reordered": reordered },
                "message": "Queue rebalanced"
            })))
        }
    }
}

pub async fn call_next(
    State(state): State<Arc<QueueState>>,
    Json(request): Json<DoctorQueueRequest>,
) -> Result<Json<Value>, AppError> {
    let next = state.engine.call_next(request.doctor_id).await.map_err(map_queue_error)?;

    let message = if next.is_some() {
        "Next patient called"
    } else {
        "No more patients in queue"
    };
    Ok(Json(json!({ "success": true, "data": next, "message": message })))
}

/// Mark an entry skipped, e.g. when its appointment is cancelled
pub async fn remove_entry(
    State(state): State<Arc<QueueState>>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let removed = state.engine.remove_from_queue(entry_id).await.map_err(map_queue_error)?;
    Ok(Json(json!({ "success": true, "data": removed })))
}

pub async fn get_consultation_state(
    State(state): State<Arc<QueueState>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let consultation = state.engine.consultation_state(doctor_id).await.map_err(map_queue_error)?;
    Ok(Json(json!({
        "success": true,
        "data": { "doctor_id": doctor_id, "state": consultation }
    })))
}

pub async fn upsert_doctor(
    State(state): State<Arc<QueueState>>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<UpsertDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let profile = state
        .directory
        .upsert_doctor(doctor_id, request.avg_consultation_minutes)
        .await
        .map_err(map_queue_error)?;
    Ok(Json(json!({ "success": true, "data": profile })))
}
