use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::{DoctorProfile, QueueError};

/// Source of the per-doctor settings the engine reads. Implementations may
/// hit a database; the engine always resolves them before taking a queue lock.
#[async_trait]
pub trait DoctorDirectory: Send + Sync {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, QueueError>;
}

#[derive(Clone, Default)]
pub struct InMemoryDoctorDirectory {
    doctors: Arc<RwLock<HashMap<Uuid, DoctorProfile>>>,
}

impl InMemoryDoctorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_doctor(&self, doctor_id: Uuid, avg_consultation_minutes: u32) -> Result<DoctorProfile, QueueError> {
        if avg_consultation_minutes == 0 {
            return Err(QueueError::ValidationError(
                "avg_consultation_minutes must be greater than zero".to_string(),
            ));
        }

        let profile = DoctorProfile {
            doctor_id,
            avg_consultation_minutes,
        };
        self.doctors.write().await.insert(doctor_id, profile.clone());
        info!("Doctor {} registered with {} min average consultation", doctor_id, avg_consultation_minutes);
        Ok(profile)
    }

    pub async fn remove_doctor(&self, doctor_id: Uuid) -> Option<DoctorProfile> {
        self.doctors.write().await.remove(&doctor_id)
    }
}

#[async_trait]
impl DoctorDirectory for InMemoryDoctorDirectory {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, QueueError> {
        Ok(self.doctors.read().await.get(&doctor_id).cloned())
    }
}
