#![allow(dead_code)]

use std::sync::Arc;
use chrono::{TimeZone, Utc};
use uuid::Uuid;

use patient_queue_cell::*;

/// Engine wired to in-memory collaborators and a frozen clock.
pub struct QueueTestHarness {
    pub engine: Arc<QueueEngine>,
    pub clock: ManualClock,
    pub directory: InMemoryDoctorDirectory,
    pub notifier: BroadcastNotifier,
}

impl QueueTestHarness {
    pub fn new() -> Self {
        Self::with_config(QueueEngineConfig::default())
    }

    pub fn with_config(config: QueueEngineConfig) -> Self {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap());
        let directory = InMemoryDoctorDirectory::new();
        let notifier = BroadcastNotifier::new(256);

        let engine = QueueEngine::new(
            config,
            Arc::new(directory.clone()),
            Arc::new(notifier.clone()),
        )
        .with_clock(Arc::new(clock.clone()));

        Self {
            engine: Arc::new(engine),
            clock,
            directory,
            notifier,
        }
    }

    pub async fn doctor(&self, avg_consultation_minutes: u32) -> Uuid {
        let doctor_id = Uuid::new_v4();
        self.directory
            .upsert_doctor(doctor_id, avg_consultation_minutes)
            .await
            .expect("Failed to register doctor");
        doctor_id
    }

    pub async fn admit(&self, doctor_id: Uuid, tier: UrgencyTier) -> QueueAdmission {
        self.engine
            .add_to_queue(admission_request(doctor_id, tier))
            .await
            .expect("Failed to add to queue")
    }

    pub async fn waiting(&self, doctor_id: Uuid) -> Vec<QueueEntry> {
        self.engine
            .get_doctor_queue(doctor_id)
            .await
            .expect("Failed to read queue")
            .into_iter()
            .filter(|e| e.status == QueueStatus::Waiting)
            .collect()
    }

    pub async fn waiting_ids(&self, doctor_id: Uuid) -> Vec<Uuid> {
        self.waiting(doctor_id).await.iter().map(|e| e.id).collect()
    }
}

pub fn admission_request(doctor_id: Uuid, tier: UrgencyTier) -> AddToQueueRequest {
    AddToQueueRequest {
        doctor_id,
        patient_id: Uuid::new_v4(),
        source_appointment_id: Some(Uuid::new_v4()),
        urgency_tier: tier,
        pain_level: Some(1),
        patient_age: Some(35),
    }
}

/// Waiting positions must be exactly 1..=N and at most one consultation may run.
pub fn assert_queue_invariants(entries: &[QueueEntry]) {
    let mut positions: Vec<u32> = entries
        .iter()
        .filter(|e| e.status == QueueStatus::Waiting)
        .map(|e| e.position)
        .collect();
    positions.sort_unstable();
    let expected: Vec<u32> = (1..=positions.len() as u32).collect();
    assert_eq!(positions, expected, "waiting positions must be dense");

    let consulting = entries
        .iter()
        .filter(|e| e.status == QueueStatus::InConsultation)
        .count();
    assert!(consulting <= 1, "at most one consultation per doctor, found {}", consulting);
}
