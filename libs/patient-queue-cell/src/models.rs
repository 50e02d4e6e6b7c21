use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub source_appointment_id: Option<Uuid>,
    /// 1-based rank among waiting entries; 0 once the entry leaves the waiting set.
    pub position: u32,
    pub status: QueueStatus,
    pub urgency_tier: UrgencyTier,
    pub priority_score: i64,
    pub pain_level: Option<u8>,
    pub patient_age: Option<u32>,
    pub checked_in_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_wait_minutes: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    InConsultation,
    Completed,
    Skipped,
}

impl QueueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Skipped)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, target: &QueueStatus) -> bool {
        use QueueStatus::*;
        match (self, target) {
            (Waiting, InConsultation) => true,
            (Waiting, Skipped) => true,
            (InConsultation, Completed) => true,
            (InConsultation, Skipped) => true,
            (from, to) if from == to => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Coarse urgency class fixed when the entry is admitted. Only decides the
/// insertion slot; later ordering comes from the priority score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyTier {
    Emergency,
    Elevated,
    Routine,
}

impl UrgencyTier {
    /// Maps the urgency labels used by appointments and triage results.
    /// Unknown labels degrade to `Routine`.
    pub fn from_urgency_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "emergency" | "critical" => UrgencyTier::Emergency,
            "high" | "elevated" | "urgent" => UrgencyTier::Elevated,
            _ => UrgencyTier::Routine,
        }
    }

    pub fn is_emergency(&self) -> bool {
        matches!(self, UrgencyTier::Emergency)
    }

    pub fn name(&self) -> &'static str {
        match self {
            UrgencyTier::Emergency => "emergency",
            UrgencyTier::Elevated => "elevated",
            UrgencyTier::Routine => "routine",
        }
    }
}

/// Per-doctor call-next state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationState {
    Idle,
    Consulting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddToQueueRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub source_appointment_id: Option<Uuid>,
    pub urgency_tier: UrgencyTier,
    pub pain_level: Option<u8>,
    pub patient_age: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueAdmission {
    pub entry_id: Uuid,
    pub position: u32,
    pub estimated_wait_minutes: u32,
}

/// Partial update applied through the store. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct QueueEntryPatch {
    pub position: Option<u32>,
    pub status: Option<QueueStatus>,
    pub priority_score: Option<i64>,
    pub estimated_wait_minutes: Option<u32>,
    pub called_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorQueueSnapshot {
    pub doctor_id: Uuid,
    pub entries: Vec<QueueEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub doctor_id: Uuid,
    pub avg_consultation_minutes: u32,
}

/// Published to the broadcast sink after every successful mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    QueueUpdate {
        doctor_id: Uuid,
        entries: Vec<QueueEntry>,
        timestamp: DateTime<Utc>,
    },
    Emergency {
        doctor_id: Uuid,
        entry_id: Uuid,
        patient_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    PatientCalled {
        doctor_id: Uuid,
        entry: QueueEntry,
        timestamp: DateTime<Utc>,
    },
}

impl QueueEvent {
    pub fn doctor_id(&self) -> Uuid {
        match self {
            QueueEvent::QueueUpdate { doctor_id, .. }
            | QueueEvent::Emergency { doctor_id, .. }
            | QueueEvent::PatientCalled { doctor_id, .. } => *doctor_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueueEvent::QueueUpdate { .. } => "queue_update",
            QueueEvent::Emergency { .. } => "emergency",
            QueueEvent::PatientCalled { .. } => "patient_called",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueEngineConfig {
    pub default_avg_consultation_minutes: u32,
    pub rebalance_on_insert: bool,
}

impl Default for QueueEngineConfig {
    fn default() -> Self {
        Self {
            default_avg_consultation_minutes: 15,
            rebalance_on_insert: true,
        }
    }
}

impl From<&AppConfig> for QueueEngineConfig {
    fn from(config: &AppConfig) -> Self {
        let defaults = Self::default();
        Self {
            default_avg_consultation_minutes: if config.default_avg_consultation_minutes > 0 {
                config.default_avg_consultation_minutes
            } else {
                defaults.default_avg_consultation_minutes
            },
            rebalance_on_insert: config.rebalance_on_insert,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RebalanceWorkerConfig {
    pub worker_id: String,
    pub interval_seconds: u64,
    pub finished_retention_minutes: i64,
}

impl Default for RebalanceWorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("rebalancer-{}", Uuid::new_v4()),
            interval_seconds: 60,
            finished_retention_minutes: 720,
        }
    }
}

impl From<&AppConfig> for RebalanceWorkerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            interval_seconds: config.rebalance_interval_seconds.max(1),
            finished_retention_minutes: config.finished_retention_minutes.max(0),
            ..Self::default()
        }
    }
}

// HTTP request bodies

#[derive(Debug, Clone, Deserialize)]
pub struct WalkInRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub source_appointment_id: Option<Uuid>,
    pub manual_urgency: Option<String>,
    pub symptoms: Option<String>,
    pub pain_level: Option<u8>,
    pub patient_age: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmergencyRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub source_appointment_id: Option<Uuid>,
    pub pain_level: Option<u8>,
    pub patient_age: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckInRequest {
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub urgency_level: Option<String>,
    pub pain_level: Option<u8>,
    pub patient_age: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    pub doctor_id: Uuid,
    pub order: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoctorQueueRequest {
    pub doctor_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RebalanceRequest {
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct QueueQuery {
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertDoctorRequest {
    pub avg_consultation_minutes: u32,
}
