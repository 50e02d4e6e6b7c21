use crate::{DoctorQueue, QueueStatus};

/// Minutes until an entry at `position` is seen. Linear on purpose; it is
/// recomputed wholesale on every structural change.
pub fn estimate_wait_minutes(position: u32, avg_consultation_minutes: u32, consultation_in_progress: bool) -> u32 {
    let ahead = position.saturating_sub(1).saturating_mul(avg_consultation_minutes);
    if consultation_in_progress {
        ahead.saturating_add(avg_consultation_minutes / 2)
    } else {
        ahead
    }
}

pub fn recompute_wait_times(queue: &mut DoctorQueue, avg_consultation_minutes: u32) {
    let consulting = queue.has_consultation();

    for entry in queue.active_mut() {
        entry.estimated_wait_minutes = match entry.status {
            QueueStatus::Waiting => estimate_wait_minutes(entry.position, avg_consultation_minutes, consulting),
            _ => 0,
        };
    }
}
