use crate::domain::models::StudyBlock;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

// Sums full block durations for every block whose start falls inside the
// window, both endpoints inclusive. Blocks spilling past `window_end` are not
// clipped, and keys are the stored subject strings, casing intact.
pub fn subject_hours(
    blocks: &[StudyBlock],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> HashMap<String, f64> {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for block in blocks {
        if block.start < window_start || block.start > window_end {
            continue;
        }
        *totals.entry(block.subject.clone()).or_insert(0.0) += block.duration_hours();
    }
    totals
}
