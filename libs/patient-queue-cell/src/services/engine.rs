use std::collections::HashSet;
use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    AddToQueueRequest, ConsultationState, DoctorQueue, DoctorQueueSnapshot, QueueAdmission,
    QueueEngineConfig, QueueEntry, QueueEntryPatch, QueueError, QueueEvent, QueueStatus, UrgencyTier,
};
use crate::services::{
    allocator::allocate,
    call_next::{call_next, consultation_state},
    clock::{Clock, SystemClock},
    directory::DoctorDirectory,
    estimator::recompute_wait_times,
    notifier::QueueEventSink,
    rebalancer::{rebalance, rebalance_pinned},
    scorer::priority_score,
    store::QueueStore,
};

/// Scheduler service owning every doctor's queue. All reads and writes go
/// through here; each doctor has its own lock so unrelated queues never wait
/// on each other.
pub struct QueueEngine {
    store: QueueStore,
    directory: Arc<dyn DoctorDirectory>,
    notifier: Arc<dyn QueueEventSink>,
    clock: Arc<dyn Clock>,
    config: QueueEngineConfig,
}

impl QueueEngine {
    pub fn new(
        config: QueueEngineConfig,
        directory: Arc<dyn DoctorDirectory>,
        notifier: Arc<dyn QueueEventSink>,
    ) -> Self {
        Self {
            store: QueueStore::new(),
            directory,
            notifier,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &QueueEngineConfig {
        &self.config
    }

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, tier = request.urgency_tier.name()))]
    pub async fn add_to_queue(&self, request: AddToQueueRequest) -> Result<QueueAdmission, QueueError> {
        validate_pain_level(request.pain_level)?;
        let avg = self.avg_consultation_minutes(request.doctor_id).await?;
        let now = self.clock.now();

        let mut entry = QueueEntry {
            id: Uuid::new_v4(),
            doctor_id: request.doctor_id,
            patient_id: request.patient_id,
            source_appointment_id: request.source_appointment_id,
            position: 0,
            status: QueueStatus::Waiting,
            urgency_tier: request.urgency_tier,
            priority_score: 0,
            pain_level: request.pain_level,
            patient_age: request.patient_age,
            checked_in_at: now,
            called_at: None,
            completed_at: None,
            estimated_wait_minutes: 0,
        };
        entry.priority_score = priority_score(&entry, now);
        let entry_id = entry.id;

        let handle = self.store.queue_for(request.doctor_id).await;
        let (admission, entries) = {
            let mut queue = handle.write().await;
            let allocated = allocate(&mut queue, entry)?;
            if self.config.rebalance_on_insert {
                // A new emergency keeps slot 1 until the next rebalance.
                let pinned = request.urgency_tier.is_emergency().then_some(entry_id);
                rebalance_pinned(&mut queue, now, pinned);
            }
            self.settle(&mut queue, avg, now);

            let admitted = queue.get(entry_id).ok_or(QueueError::EntryNotFound(entry_id))?;
            if admitted.position != allocated {
                debug!("Entry {} moved from slot {} to {} on rebalance", entry_id, allocated, admitted.position);
            }
            let admission = QueueAdmission {
                entry_id,
                position: admitted.position,
                estimated_wait_minutes: admitted.estimated_wait_minutes,
            };
            (admission, queue.active())
        };
        self.store.register_entry(entry_id, request.doctor_id).await;

        info!(
            "Patient {} queued for doctor {} at position {} (~{} min)",
            request.patient_id, request.doctor_id, admission.position, admission.estimated_wait_minutes
        );

        self.publish_update(request.doctor_id, entries, now);
        if request.urgency_tier == UrgencyTier::Emergency {
            self.notifier.publish(QueueEvent::Emergency {
                doctor_id: request.doctor_id,
                entry_id,
                patient_id: request.patient_id,
                timestamp: now,
            });
        }

        Ok(admission)
    }

    /// Active entries grouped by doctor. Scoped to one doctor when `doctor_id`
    /// is given; otherwise every doctor with a non-empty queue, ordered by id.
    pub async fn get_queue(&self, doctor_id: Option<Uuid>) -> Result<Vec<DoctorQueueSnapshot>, QueueError> {
        match doctor_id {
            Some(doctor_id) => {
                let entries = self.get_doctor_queue(doctor_id).await?;
                Ok(vec![DoctorQueueSnapshot { doctor_id, entries }])
            }
            None => {
                let doctor_ids = self.store.doctor_ids().await;
                let reads = doctor_ids.into_iter().map(|doctor_id| async move {
                    let handle = self.store.existing(doctor_id).await?;
                    let entries = handle.read().await.active();
                    Some(DoctorQueueSnapshot { doctor_id, entries })
                });

                Ok(join_all(reads)
                    .await
                    .into_iter()
                    .flatten()
                    .filter(|snapshot| !snapshot.entries.is_empty())
                    .collect())
            }
        }
    }

    pub async fn get_doctor_queue(&self, doctor_id: Uuid) -> Result<Vec<QueueEntry>, QueueError> {
        match self.store.existing(doctor_id).await {
            Some(handle) => Ok(handle.read().await.active()),
            None => {
                self.ensure_doctor_exists(doctor_id).await?;
                Ok(Vec::new())
            }
        }
    }

    pub async fn consultation_state(&self, doctor_id: Uuid) -> Result<ConsultationState, QueueError> {
        match self.store.existing(doctor_id).await {
            Some(handle) => Ok(consultation_state(&*handle.read().await)),
            None => {
                self.ensure_doctor_exists(doctor_id).await?;
                Ok(ConsultationState::Idle)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn rebalance_queue(&self, doctor_id: Uuid) -> Result<Vec<QueueEntry>, QueueError> {
        let avg = self.avg_consultation_minutes(doctor_id).await?;
        let (entries, _) = self.rebalance_doctor(doctor_id, avg, true).await;
        Ok(entries)
    }

    /// Rebalances every known doctor one after another. Returns how many
    /// queues changed order.
    pub async fn rebalance_all(&self) -> usize {
        let mut reordered = 0;
        for doctor_id in self.store.doctor_ids().await {
            let avg = match self.avg_consultation_minutes(doctor_id).await {
                Ok(avg) => avg,
                Err(e) => {
                    warn!("Using default consultation length for doctor {}: {}", doctor_id, e);
                    self.config.default_avg_consultation_minutes
                }
            };
            let (_, moved) = self.rebalance_doctor(doctor_id, avg, false).await;
            if moved > 0 {
                reordered += 1;
            }
        }
        reordered
    }

    #[instrument(skip(self))]
    pub async fn call_next(&self, doctor_id: Uuid) -> Result<Option<QueueEntry>, QueueError> {
        let avg = self.avg_consultation_minutes(doctor_id).await?;
        let now = self.clock.now();

        let handle = self.store.queue_for(doctor_id).await;
        let (outcome, entries) = {
            let mut queue = handle.write().await;
            let outcome = call_next(&mut queue, now)?;
            if !outcome.changed() {
                debug!("Call-next on empty queue for doctor {}", doctor_id);
                return Ok(None);
            }
            rebalance(&mut queue, now);
            self.settle(&mut queue, avg, now);
            (outcome, queue.active())
        };

        match &outcome.called {
            Some(called) => info!("Doctor {} called patient {} (entry {})", doctor_id, called.patient_id, called.id),
            None => info!("Doctor {} finished consulting; no more patients waiting", doctor_id),
        }

        self.publish_update(doctor_id, entries, now);
        if let Some(called) = &outcome.called {
            self.notifier.publish(QueueEvent::PatientCalled {
                doctor_id,
                entry: called.clone(),
                timestamp: now,
            });
        }

        Ok(outcome.called)
    }

    /// Marks an entry skipped (e.g. appointment cancelled) and closes its gap.
    #[instrument(skip(self))]
    pub async fn remove_from_queue(&self, entry_id: Uuid) -> Result<QueueEntry, QueueError> {
        let doctor_id = self
            .store
            .owner_of(entry_id)
            .await
            .ok_or(QueueError::EntryNotFound(entry_id))?;
        let avg = self
            .avg_consultation_minutes(doctor_id)
            .await
            .unwrap_or(self.config.default_avg_consultation_minutes);
        let now = self.clock.now();

        let handle = self
            .store
            .existing(doctor_id)
            .await
            .ok_or(QueueError::EntryNotFound(entry_id))?;
        let (removed, entries) = {
            let mut queue = handle.write().await;
            let current = queue.get(entry_id).ok_or(QueueError::EntryNotFound(entry_id))?;
            if current.status.is_terminal() {
                return Err(QueueError::InvalidState(format!(
                    "entry {} is already {:?}",
                    entry_id, current.status
                )));
            }
            let was_waiting = current.status == QueueStatus::Waiting;
            let old_position = current.position;

            let removed = queue
                .update(
                    entry_id,
                    QueueEntryPatch {
                        status: Some(QueueStatus::Skipped),
                        position: Some(0),
                        estimated_wait_minutes: Some(0),
                        completed_at: Some(now),
                        ..Default::default()
                    },
                )?
                .clone();
            if was_waiting {
                queue.shift_waiting_from(old_position + 1, -1);
            }
            self.settle(&mut queue, avg, now);
            (removed, queue.active())
        };

        info!("Entry {} removed from doctor {}'s queue", entry_id, doctor_id);
        self.publish_update(doctor_id, entries, now);
        Ok(removed)
    }

    /// Applies a receptionist's manual ordering. `order` must list exactly the
    /// doctor's waiting entries and keep emergencies in front.
    #[instrument(skip(self, order), fields(entries = order.len()))]
    pub async fn reorder_queue(&self, doctor_id: Uuid, order: Vec<Uuid>) -> Result<Vec<QueueEntry>, QueueError> {
        let avg = self.avg_consultation_minutes(doctor_id).await?;
        let now = self.clock.now();

        let handle = self.store.queue_for(doctor_id).await;
        let entries = {
            let mut queue = handle.write().await;
            validate_reorder(&queue, &order)?;
            for (index, id) in order.iter().enumerate() {
                queue.set_position(*id, index as u32 + 1)?;
            }
            self.settle(&mut queue, avg, now);
            queue.active()
        };

        info!("Doctor {} queue manually reordered", doctor_id);
        self.publish_update(doctor_id, entries.clone(), now);
        Ok(entries)
    }

    /// Forgets completed/skipped entries finished more than `older_than` ago.
    pub async fn purge_finished(&self, older_than: Duration) -> usize {
        let cutoff = self.clock.now() - older_than;
        let mut purged_total = 0;

        for doctor_id in self.store.doctor_ids().await {
            let Some(handle) = self.store.existing(doctor_id).await else {
                continue;
            };
            let purged = handle.write().await.purge_finished(cutoff);
            self.store.forget_entries(&purged).await;
            purged_total += purged.len();
        }

        if purged_total > 0 {
            info!("Purged {} finished queue entries", purged_total);
        }
        purged_total
    }

    // Private helpers

    async fn rebalance_doctor(&self, doctor_id: Uuid, avg: u32, always_publish: bool) -> (Vec<QueueEntry>, usize) {
        let now = self.clock.now();
        let handle = self.store.queue_for(doctor_id).await;
        let (entries, moved) = {
            let mut queue = handle.write().await;
            let outcome = rebalance(&mut queue, now);
            self.settle(&mut queue, avg, now);
            (queue.active(), outcome.moved.len())
        };

        if always_publish || moved > 0 {
            self.publish_update(doctor_id, entries.clone(), now);
        }
        (entries, moved)
    }

    /// Final step of every mutation while the doctor's lock is held: repair
    /// position density if needed, then refresh wait estimates.
    fn settle(&self, queue: &mut DoctorQueue, avg: u32, now: DateTime<Utc>) {
        if let Err(e) = queue.verify_positions() {
            warn!("{}; rebalancing to repair", e);
            if queue.in_consultation().len() > 1 {
                // Keep the earliest-called consultation, finish the rest.
                let mut consulting: Vec<(Option<DateTime<Utc>>, Uuid)> =
                    queue.in_consultation().iter().map(|e| (e.called_at, e.id)).collect();
                consulting.sort();
                for (_, id) in consulting.into_iter().skip(1) {
                    let patch = QueueEntryPatch {
                        status: Some(QueueStatus::Completed),
                        completed_at: Some(now),
                        ..Default::default()
                    };
                    if let Err(e) = queue.update(id, patch) {
                        warn!("Failed to close duplicate consultation {}: {}", id, e);
                    }
                }
            }
            rebalance(queue, now);
        }
        recompute_wait_times(queue, avg);
    }

    async fn avg_consultation_minutes(&self, doctor_id: Uuid) -> Result<u32, QueueError> {
        match self.directory.find_doctor(doctor_id).await {
            Ok(Some(profile)) if profile.avg_consultation_minutes > 0 => Ok(profile.avg_consultation_minutes),
            Ok(Some(_)) => {
                warn!("Doctor {} has no consultation length, using default", doctor_id);
                Ok(self.config.default_avg_consultation_minutes)
            }
            Ok(None) => Err(QueueError::DoctorNotFound(doctor_id)),
            Err(e) => {
                warn!("Doctor directory unavailable for {}: {}; using default", doctor_id, e);
                Ok(self.config.default_avg_consultation_minutes)
            }
        }
    }

    async fn ensure_doctor_exists(&self, doctor_id: Uuid) -> Result<(), QueueError> {
        match self.directory.find_doctor(doctor_id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(QueueError::DoctorNotFound(doctor_id)),
            Err(e) => {
                warn!("Doctor directory unavailable for {}: {}", doctor_id, e);
                Ok(())
            }
        }
    }

    fn publish_update(&self, doctor_id: Uuid, entries: Vec<QueueEntry>, now: DateTime<Utc>) {
        self.notifier.publish(QueueEvent::QueueUpdate {
            doctor_id,
            entries,
            timestamp: now,
        });
    }
}

fn validate_pain_level(pain_level: Option<u8>) -> Result<(), QueueError> {
    match pain_level {
        Some(level) if !(1..=5).contains(&level) => Err(QueueError::ValidationError(format!(
            "pain_level must be between 1 and 5, got {}",
            level
        ))),
        _ => Ok(()),
    }
}

fn validate_reorder(queue: &DoctorQueue, order: &[Uuid]) -> Result<(), QueueError> {
    let waiting = queue.waiting();
    let unique: HashSet<&Uuid> = order.iter().collect();

    if unique.len() != order.len() {
        return Err(QueueError::ValidationError("order contains duplicate entries".to_string()));
    }
    if order.len() != waiting.len() || waiting.iter().any(|e| !unique.contains(&e.id)) {
        return Err(QueueError::ValidationError(format!(
            "order must list exactly the {} waiting entries",
            waiting.len()
        )));
    }

    let mut seen_non_emergency = false;
    for id in order {
        let is_emergency = waiting
            .iter()
            .find(|e| e.id == *id)
            .map(|e| e.urgency_tier.is_emergency())
            .unwrap_or(false);
        if is_emergency && seen_non_emergency {
            return Err(QueueError::ValidationError(
                "emergency entries must stay ahead of non-emergency entries".to_string(),
            ));
        }
        seen_non_emergency |= !is_emergency;
    }

    Ok(())
}
