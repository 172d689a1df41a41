//! Point rules: pure, stateless maps from an event's status to its signed
//! point delta. Unknown statuses are rejected rather than silently scored 0.

use crate::error::LedgerError;
use crate::models::ToolItem;

pub fn attendance_points(status: &str) -> Result<i64, LedgerError> {
    match status {
        "present" => Ok(1),
        "absent" => Ok(-1),
        "excused" => Ok(0),
        other => Err(LedgerError::InvalidEventKind {
            kind: "attendance",
            value: other.to_string(),
        }),
    }
}

/// Rating-derived recitation delta. Every write path recomputes
/// `points_awarded` from this, so the stored value never drifts from the
/// rating.
pub fn recitation_points(rating: &str) -> Result<i64, LedgerError> {
    match rating {
        "excellent" => Ok(2),
        "good" => Ok(1),
        "redo" => Ok(0),
        other => Err(LedgerError::InvalidEventKind {
            kind: "recitation",
            value: other.to_string(),
        }),
    }
}

/// Tool-check delta, read from the item's catalog configuration.
pub fn tool_check_points(status: &str, item: &ToolItem) -> Result<i64, LedgerError> {
    match status {
        "brought" => Ok(item.points_brought),
        "not-brought" => Ok(item.points_not_brought),
        "lost" => Ok(item.points_lost),
        "skipped" => Ok(item.points_skipped),
        other => Err(LedgerError::InvalidEventKind {
            kind: "tool-check",
            value: other.to_string(),
        }),
    }
}
