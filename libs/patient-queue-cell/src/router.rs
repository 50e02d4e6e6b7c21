use std::sync::Arc;
use axum::{
    Router,
    routing::{delete, get, post, put},
};

use shared_config::AppConfig;

use crate::handlers;
use crate::services::{BroadcastNotifier, InMemoryDoctorDirectory, QueueEngine, TriageClassifier};

/// Shared state behind every queue route.
#[derive(Clone)]
pub struct QueueState {
    pub engine: Arc<QueueEngine>,
    pub directory: InMemoryDoctorDirectory,
    /// Same channels the engine publishes to; transports subscribe here.
    pub notifier: BroadcastNotifier,
    pub triage: Option<Arc<dyn TriageClassifier>>,
    pub config: Arc<AppConfig>,
}

pub fn create_patient_queue_router(state: Arc<QueueState>) -> Router {
    Router::new()
        .route("/", get(handlers::get_queue))
        .route("/walk-in", post(handlers::add_walk_in))
        .route("/emergency", post(handlers::add_emergency))
        .route("/check-in", post(handlers::check_in))
        .route("/reorder", put(handlers::reorder_queue))
        .route("/rebalance", post(handlers::rebalance_queue))
        .route("/next", post(handlers::call_next))
        .route("/entries/{entry_id}", delete(handlers::remove_entry))
        .route("/doctors/{doctor_id}", put(handlers::upsert_doctor))
        .route("/doctors/{doctor_id}/state", get(handlers::get_consultation_state))
        .with_state(state)
}
