use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use patient_queue_cell::{create_patient_queue_router, QueueState};

pub fn create_router(state: Arc<QueueState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic queue API is running!" }))
        .nest("/queue", create_patient_queue_router(state))
}
