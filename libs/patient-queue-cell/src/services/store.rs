use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{QueueEntry, QueueEntryPatch, QueueError, QueueStatus};

/// State of a single doctor's queue. Pure data plus CRUD; ordering decisions
/// live in the allocator, rebalancer and call-next modules.
#[derive(Debug, Clone)]
pub struct DoctorQueue {
    doctor_id: Uuid,
    entries: Vec<QueueEntry>,
}

impl DoctorQueue {
    pub fn new(doctor_id: Uuid) -> Self {
        Self {
            doctor_id,
            entries: Vec::new(),
        }
    }

    pub fn doctor_id(&self) -> Uuid {
        self.doctor_id
    }

    /// Waiting and in-consultation entries; consulting first, then by position.
    pub fn active(&self) -> Vec<QueueEntry> {
        let mut active: Vec<QueueEntry> = self
            .entries
            .iter()
            .filter(|e| e.status.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|e| (e.status == QueueStatus::Waiting, e.position));
        active
    }

    pub fn waiting(&self) -> Vec<QueueEntry> {
        let mut waiting: Vec<QueueEntry> = self
            .entries
            .iter()
            .filter(|e| e.status == QueueStatus::Waiting)
            .cloned()
            .collect();
        waiting.sort_by_key(|e| e.position);
        waiting
    }

    pub fn waiting_count(&self) -> usize {
        self.entries.iter().filter(|e| e.status == QueueStatus::Waiting).count()
    }

    pub fn in_consultation(&self) -> Vec<&QueueEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == QueueStatus::InConsultation)
            .collect()
    }

    pub fn has_consultation(&self) -> bool {
        self.entries.iter().any(|e| e.status == QueueStatus::InConsultation)
    }

    pub fn get(&self, id: Uuid) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn is_empty(&self) -> bool {
        !self.entries.iter().any(|e| e.status.is_active())
    }

    pub fn insert(&mut self, entry: QueueEntry) -> Result<(), QueueError> {
        if entry.doctor_id != self.doctor_id {
            return Err(QueueError::InvalidState(format!(
                "entry {} belongs to doctor {}, not {}",
                entry.id, entry.doctor_id, self.doctor_id
            )));
        }
        if self.get(entry.id).is_some() {
            return Err(QueueError::InvalidState(format!("entry {} already queued", entry.id)));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn update(&mut self, id: Uuid, patch: QueueEntryPatch) -> Result<&QueueEntry, QueueError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(QueueError::EntryNotFound(id))?;

        if entry.status.is_terminal() {
            return Err(QueueError::InvalidState(format!(
                "entry {} is {:?} and can no longer change",
                id, entry.status
            )));
        }

        if let Some(status) = patch.status {
            if !entry.status.can_transition_to(&status) {
                return Err(QueueError::InvalidStatusTransition {
                    from: format!("{:?}", entry.status),
                    to: format!("{:?}", status),
                });
            }
            entry.status = status;
        }
        if let Some(position) = patch.position {
            entry.position = position;
        }
        if let Some(score) = patch.priority_score {
            entry.priority_score = score;
        }
        if let Some(wait) = patch.estimated_wait_minutes {
            entry.estimated_wait_minutes = wait;
        }
        if let Some(called_at) = patch.called_at {
            entry.called_at = Some(called_at);
        }
        if let Some(completed_at) = patch.completed_at {
            entry.completed_at = Some(completed_at);
        }

        Ok(entry)
    }

    pub fn delete(&mut self, id: Uuid) -> Result<QueueEntry, QueueError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(QueueError::EntryNotFound(id))?;
        Ok(self.entries.remove(index))
    }

    /// Adds `delta` to the position of every waiting entry whose position is
    /// at least `from`.
    pub fn shift_waiting_from(&mut self, from: u32, delta: i64) {
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.status == QueueStatus::Waiting && e.position >= from)
        {
            entry.position = (entry.position as i64 + delta).max(0) as u32;
        }
    }

    pub fn set_position(&mut self, id: Uuid, position: u32) -> Result<(), QueueError> {
        self.update(id, QueueEntryPatch { position: Some(position), ..Default::default() })?;
        Ok(())
    }

    /// Mutable access to waiting entries for bulk recomputation.
    pub fn waiting_mut(&mut self) -> impl Iterator<Item = &mut QueueEntry> {
        self.entries.iter_mut().filter(|e| e.status == QueueStatus::Waiting)
    }

    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut QueueEntry> {
        self.entries.iter_mut().filter(|e| e.status.is_active())
    }

    /// Checks position density and the single-consultation rule.
    pub fn verify_positions(&self) -> Result<(), QueueError> {
        let mut positions: Vec<u32> = self
            .entries
            .iter()
            .filter(|e| e.status == QueueStatus::Waiting)
            .map(|e| e.position)
            .collect();
        positions.sort_unstable();

        for (index, position) in positions.iter().enumerate() {
            let expected = index as u32 + 1;
            if *position != expected {
                return Err(QueueError::ConcurrentModification {
                    doctor_id: self.doctor_id,
                    detail: format!("expected position {} but found {}", expected, position),
                });
            }
        }

        let consulting = self.in_consultation().len();
        if consulting > 1 {
            return Err(QueueError::ConcurrentModification {
                doctor_id: self.doctor_id,
                detail: format!("{} entries in consultation", consulting),
            });
        }

        Ok(())
    }

    /// Drops terminal entries finished before `cutoff`.
    pub fn purge_finished(&mut self, cutoff: DateTime<Utc>) -> Vec<Uuid> {
        let mut purged = Vec::new();
        self.entries.retain(|e| {
            let expired = e.status.is_terminal()
                && e.completed_at.map(|at| at < cutoff).unwrap_or(true);
            if expired {
                purged.push(e.id);
            }
            !expired
        });
        purged
    }
}

/// Holds every doctor's queue behind its own lock, plus an index from entry id
/// to owning doctor.
pub struct QueueStore {
    queues: RwLock<HashMap<Uuid, Arc<RwLock<DoctorQueue>>>>,
    entry_owners: RwLock<HashMap<Uuid, Uuid>>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            entry_owners: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the doctor's queue handle, creating an empty queue on first use.
    pub async fn queue_for(&self, doctor_id: Uuid) -> Arc<RwLock<DoctorQueue>> {
        if let Some(queue) = self.queues.read().await.get(&doctor_id) {
            return Arc::clone(queue);
        }

        let mut queues = self.queues.write().await;
        let queue = queues
            .entry(doctor_id)
            .or_insert_with(|| {
                debug!("Created queue for doctor {}", doctor_id);
                Arc::new(RwLock::new(DoctorQueue::new(doctor_id)))
            });
        Arc::clone(queue)
    }

    pub async fn existing(&self, doctor_id: Uuid) -> Option<Arc<RwLock<DoctorQueue>>> {
        self.queues.read().await.get(&doctor_id).cloned()
    }

    pub async fn doctor_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.queues.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    pub async fn register_entry(&self, entry_id: Uuid, doctor_id: Uuid) {
        self.entry_owners.write().await.insert(entry_id, doctor_id);
    }

    pub async fn forget_entries(&self, entry_ids: &[Uuid]) {
        if entry_ids.is_empty() {
            return;
        }
        let mut owners = self.entry_owners.write().await;
        for id in entry_ids {
            owners.remove(id);
        }
    }

    pub async fn owner_of(&self, entry_id: Uuid) -> Option<Uuid> {
        self.entry_owners.read().await.get(&entry_id).copied()
    }
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new()
    }
}
