use tracing::debug;

use crate::{DoctorQueue, QueueEntry, QueueError, QueueStatus, UrgencyTier};

/// Zero-based slot for a new arrival among `waiting` (sorted by position).
/// Only the tier matters here; scores are left to the rebalancer.
pub fn insertion_index(waiting: &[QueueEntry], tier: UrgencyTier) -> usize {
    match tier {
        UrgencyTier::Emergency => 0,
        UrgencyTier::Elevated => waiting
            .iter()
            .filter(|e| matches!(e.urgency_tier, UrgencyTier::Emergency | UrgencyTier::Elevated))
            .count(),
        UrgencyTier::Routine => waiting.len(),
    }
}

/// Places `entry` into the doctor's queue at its tier slot, shifting every
/// waiting entry at or behind that slot down by one. Returns the assigned
/// position.
pub fn allocate(queue: &mut DoctorQueue, mut entry: QueueEntry) -> Result<u32, QueueError> {
    if entry.status != QueueStatus::Waiting {
        return Err(QueueError::InvalidState(format!(
            "only waiting entries can be allocated, got {:?}",
            entry.status
        )));
    }
    if entry.doctor_id != queue.doctor_id() || queue.get(entry.id).is_some() {
        return Err(QueueError::InvalidState(format!(
            "entry {} cannot be admitted to doctor {}",
            entry.id,
            queue.doctor_id()
        )));
    }

    let waiting = queue.waiting();
    let position = insertion_index(&waiting, entry.urgency_tier) as u32 + 1;

    queue.shift_waiting_from(position, 1);
    entry.position = position;

    debug!(
        "Allocating {} entry {} at position {} for doctor {} ({} already waiting)",
        entry.urgency_tier.name(),
        entry.id,
        position,
        queue.doctor_id(),
        waiting.len()
    );

    queue.insert(entry)?;
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn waiting_entry(doctor_id: Uuid, tier: UrgencyTier) -> QueueEntry {
        QueueEntry {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id: Uuid::new_v4(),
            source_appointment_id: None,
            position: 0,
            status: QueueStatus::Waiting,
            urgency_tier: tier,
            priority_score: 0,
            pain_level: None,
            patient_age: None,
            checked_in_at: Utc::now(),
            called_at: None,
            completed_at: None,
            estimated_wait_minutes: 0,
        }
    }

    fn tiers_in_order(queue: &DoctorQueue) -> Vec<UrgencyTier> {
        queue.waiting().iter().map(|e| e.urgency_tier).collect()
    }

    #[test]
    fn test_elevated_goes_after_emergencies_and_elevated() {
        let doctor_id = Uuid::new_v4();
        let mut queue = DoctorQueue::new(doctor_id);
        allocate(&mut queue, waiting_entry(doctor_id, UrgencyTier::Routine)).unwrap();
        allocate(&mut queue, waiting_entry(doctor_id, UrgencyTier::Emergency)).unwrap();
        allocate(&mut queue, waiting_entry(doctor_id, UrgencyTier::Elevated)).unwrap();
        let position = allocate(&mut queue, waiting_entry(doctor_id, UrgencyTier::Elevated)).unwrap();

        assert_eq!(position, 3);
        assert_eq!(
            tiers_in_order(&queue),
            vec![
                UrgencyTier::Emergency,
                UrgencyTier::Elevated,
                UrgencyTier::Elevated,
                UrgencyTier::Routine
            ]
        );
        assert!(queue.verify_positions().is_ok());
    }

    #[test]
    fn test_emergency_always_takes_first_slot() {
        let doctor_id = Uuid::new_v4();
        let mut queue = DoctorQueue::new(doctor_id);
        let first = waiting_entry(doctor_id, UrgencyTier::Emergency);
        let first_id = first.id;
        allocate(&mut queue, first).unwrap();

        let position = allocate(&mut queue, waiting_entry(doctor_id, UrgencyTier::Emergency)).unwrap();

        assert_eq!(position, 1);
        assert_eq!(queue.get(first_id).unwrap().position, 2);
    }

    #[test]
    fn test_routine_appends() {
        let doctor_id = Uuid::new_v4();
        let mut queue = DoctorQueue::new(doctor_id);
        for expected in 1..=3 {
            let position = allocate(&mut queue, waiting_entry(doctor_id, UrgencyTier::Routine)).unwrap();
            assert_eq!(position, expected);
        }
    }

    #[test]
    fn test_rejects_non_waiting_entry() {
        let doctor_id = Uuid::new_v4();
        let mut queue = DoctorQueue::new(doctor_id);
        let mut entry = waiting_entry(doctor_id, UrgencyTier::Routine);
        entry.status = QueueStatus::Completed;

        assert!(matches!(allocate(&mut queue, entry), Err(QueueError::InvalidState(_))));
    }
}
