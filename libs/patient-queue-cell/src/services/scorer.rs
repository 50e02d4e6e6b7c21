use chrono::{DateTime, Utc};

use crate::{QueueEntry, UrgencyTier};

pub const EMERGENCY_BONUS: i64 = 50;
pub const PAIN_WEIGHT: i64 = 10;
pub const SENIOR_AGE_THRESHOLD: u32 = 60;
pub const SENIOR_BONUS: i64 = 10;
pub const DEFAULT_PAIN_LEVEL: u8 = 1;

/// Live priority of a waiting entry. Grows by one point per full minute
/// waited, so long-waiting routine patients eventually overtake stale
/// elevated ones on rebalance.
pub fn priority_score(entry: &QueueEntry, now: DateTime<Utc>) -> i64 {
    let mut score = 0;

    if entry.urgency_tier == UrgencyTier::Emergency {
        score += EMERGENCY_BONUS;
    }

    let pain = entry.pain_level.unwrap_or(DEFAULT_PAIN_LEVEL) as i64;
    score += pain * PAIN_WEIGHT;

    if entry.patient_age.map(|age| age > SENIOR_AGE_THRESHOLD).unwrap_or(false) {
        score += SENIOR_BONUS;
    }

    score + waited_minutes(entry.checked_in_at, now)
}

/// Full minutes between check-in and `now`; zero if check-in lies ahead.
pub fn waited_minutes(checked_in_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - checked_in_at).num_minutes().max(0)
}
