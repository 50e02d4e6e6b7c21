use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Doctor not found: {0}")]
    DoctorNotFound(Uuid),

    #[error("Queue entry not found: {0}")]
    EntryNotFound(Uuid),

    #[error("Invalid queue state: {0}")]
    InvalidState(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Concurrent modification detected for doctor {doctor_id}: {detail}")]
    ConcurrentModification { doctor_id: Uuid, detail: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Doctor directory error: {0}")]
    DirectoryError(String),

    #[error("Triage classification failed: {0}")]
    TriageError(String),
}
