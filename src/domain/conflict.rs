use crate::domain::models::StudyBlock;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    InvalidRange,
    Overlap,
}

// A business-rule rejection, returned as a value rather than raised as an
// error. `block_id` names the candidate itself for range violations and the
// first conflicting block for overlaps.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConflictError {
    pub kind: ConflictKind,
    pub block_id: String,
    pub message: String,
}

pub fn check_conflict(
    candidate: &StudyBlock,
    existing: &[StudyBlock],
    exclude_id: Option<&str>,
    display_tz: Tz,
) -> Option<ConflictError> {
    if candidate.end <= candidate.start {
        return Some(ConflictError {
            kind: ConflictKind::InvalidRange,
            block_id: candidate.id.clone(),
            message: "end time must be after start time".to_string(),
        });
    }

    existing
        .iter()
        .filter(|block| exclude_id != Some(block.id.as_str()))
        .find(|block| overlaps(candidate.start, candidate.end, block.start, block.end))
        .map(|block| ConflictError {
            kind: ConflictKind::Overlap,
            block_id: block.id.clone(),
            message: format!(
                "conflicts with {} from {} to {}",
                block.subject,
                format_clock_time(block.start, display_tz),
                format_clock_time(block.end, display_tz),
            ),
        })
}

// Half-open intervals; touching endpoints are not a conflict.
fn overlaps(
    start_a: DateTime<Utc>,
    end_a: DateTime<Utc>,
    start_b: DateTime<Utc>,
    end_b: DateTime<Utc>,
) -> bool {
    start_a < end_b && end_a > start_b
}

pub fn format_clock_time(instant: DateTime<Utc>, display_tz: Tz) -> String {
    instant
        .with_timezone(&display_tz)
        .format("%-I:%M %p")
        .to_string()
}
