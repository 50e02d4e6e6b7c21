use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{ConsultationState, DoctorQueue, QueueEntry, QueueEntryPatch, QueueError, QueueStatus};

#[derive(Debug, Clone, Default)]
pub struct CallNextOutcome {
    pub completed: Vec<QueueEntry>,
    pub called: Option<QueueEntry>,
}

impl CallNextOutcome {
    pub fn changed(&self) -> bool {
        !self.completed.is_empty() || self.called.is_some()
    }
}

pub fn consultation_state(queue: &DoctorQueue) -> ConsultationState {
    if queue.has_consultation() {
        ConsultationState::Consulting
    } else {
        ConsultationState::Idle
    }
}

/// Completes whoever is being seen, promotes the head of the waiting list into
/// consultation and closes the gap it leaves.
pub fn call_next(queue: &mut DoctorQueue, now: DateTime<Utc>) -> Result<CallNextOutcome, QueueError> {
    let mut outcome = CallNextOutcome::default();

    let consulting: Vec<Uuid> = queue.in_consultation().iter().map(|e| e.id).collect();
    if consulting.len() > 1 {
        warn!(
            "Doctor {} had {} entries in consultation; completing all of them",
            queue.doctor_id(),
            consulting.len()
        );
    }
    for id in consulting {
        let completed = queue.update(
            id,
            QueueEntryPatch {
                status: Some(QueueStatus::Completed),
                position: Some(0),
                estimated_wait_minutes: Some(0),
                completed_at: Some(now),
                ..Default::default()
            },
        )?;
        debug!("Completed consultation {} for doctor {}", id, completed.doctor_id);
        outcome.completed.push(completed.clone());
    }

    let head = queue.waiting().into_iter().next();
    if let Some(head) = head {
        let head_position = head.position;
        let called = queue
            .update(
                head.id,
                QueueEntryPatch {
                    status: Some(QueueStatus::InConsultation),
                    position: Some(0),
                    estimated_wait_minutes: Some(0),
                    called_at: Some(now),
                    ..Default::default()
                },
            )?
            .clone();
        queue.shift_waiting_from(head_position + 1, -1);
        debug!("Called entry {} for doctor {}", called.id, called.doctor_id);
        outcome.called = Some(called);
    }

    Ok(outcome)
}
