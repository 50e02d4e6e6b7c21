use std::cmp::{Ordering, Reverse};
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::DoctorQueue;
use crate::services::scorer::priority_score;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebalanceOutcome {
    /// Entries whose position changed, in their new order.
    pub moved: Vec<Uuid>,
    pub waiting: usize,
}

/// Re-scores every waiting entry at `now` and reassigns positions 1..N.
///
/// Emergencies stay ahead of everyone else; within that split, higher score
/// wins and equal scores keep their previous relative order, so repeated
/// passes with no time elapsed are no-ops. Status and tier are never touched.
pub fn rebalance(queue: &mut DoctorQueue, now: DateTime<Utc>) -> RebalanceOutcome {
    rebalance_pinned(queue, now, None)
}

/// Same as [`rebalance`], but `pinned` (if waiting) is ranked first
/// regardless of score. Used for a freshly admitted emergency.
pub fn rebalance_pinned(queue: &mut DoctorQueue, now: DateTime<Utc>, pinned: Option<Uuid>) -> RebalanceOutcome {
    let mut ranked: Vec<(Uuid, bool, i64, u32, DateTime<Utc>)> = queue
        .waiting_mut()
        .map(|entry| {
            entry.priority_score = priority_score(entry, now);
            (
                entry.id,
                entry.urgency_tier.is_emergency(),
                entry.priority_score,
                entry.position,
                entry.checked_in_at,
            )
        })
        .collect();

    ranked.sort_by(|a, b| {
        let a_pinned = Some(a.0) == pinned;
        let b_pinned = Some(b.0) == pinned;
        b_pinned
            .cmp(&a_pinned)
            .then_with(|| compare_ranked((a.1, a.2, a.3), (b.1, b.2, b.3)))
            .then_with(|| a.4.cmp(&b.4))
            .then_with(|| a.0.cmp(&b.0))
    });

    let new_positions: Vec<(Uuid, u32)> = ranked
        .iter()
        .enumerate()
        .map(|(index, (id, ..))| (*id, index as u32 + 1))
        .collect();

    let mut moved = Vec::new();
    for entry in queue.waiting_mut() {
        if let Some((_, position)) = new_positions.iter().find(|(id, _)| *id == entry.id) {
            if entry.position != *position {
                entry.position = *position;
                moved.push((*position, entry.id));
            }
        }
    }
    moved.sort_by_key(|(position, _)| *position);

    if !moved.is_empty() {
        debug!(
            "Rebalanced doctor {}: {} of {} waiting entries moved",
            queue.doctor_id(),
            moved.len(),
            ranked.len()
        );
    }

    RebalanceOutcome {
        moved: moved.into_iter().map(|(_, id)| id).collect(),
        waiting: ranked.len(),
    }
}

/// `(is_emergency, score, previous_position)`: emergencies first, then higher
/// score, then lower previous position.
pub fn compare_ranked(a: (bool, i64, u32), b: (bool, i64, u32)) -> Ordering {
    (Reverse(a.0), Reverse(a.1), a.2).cmp(&(Reverse(b.0), Reverse(b.1), b.2))
}
