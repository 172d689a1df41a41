// Allow dead code: event records carry every column the store returns
#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Grade ladder walked by promotion batches, lowest first. The final entry is
/// terminal: students there are skipped by `promote`.
pub const GRADE_SEQUENCE: [&str; 13] = [
    "1st", "2nd", "3rd", "4th", "5th", "6th", "7th", "8th", "9th", "10th", "11th", "12th",
    "university student",
];

/// Next grade up the ladder, or `None` for the terminal grade or a token not
/// in the sequence.
pub fn next_grade(grade: &str) -> Option<&'static str> {
    let pos = GRADE_SEQUENCE.iter().position(|g| *g == grade)?;
    GRADE_SEQUENCE.get(pos + 1).copied()
}

/// Previous grade down the ladder, or `None` for the lowest grade or an
/// unrecognized token.
pub fn prev_grade(grade: &str) -> Option<&'static str> {
    let pos = GRADE_SEQUENCE.iter().position(|g| *g == grade)?;
    pos.checked_sub(1).map(|p| GRADE_SEQUENCE[p])
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub grade: Option<String>,
    pub teacher_id: Option<Uuid>,
    pub registration_status: String,
}

/// Inclusive [from, to] date window. Both bounds are required; callers meaning
/// "all time" pass an explicitly wide range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, LedgerError> {
        let range = Self { from, to };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.from > self.to {
            return Err(LedgerError::InvalidRange {
                from: self.from,
                to: self.to,
            });
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceEvent {
    pub id: Uuid,
    pub student_id: Uuid,
    pub happened_on: NaiveDate,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct RecitationEvent {
    pub id: Uuid,
    pub student_id: Uuid,
    pub happened_on: NaiveDate,
    pub rating: String,
    pub points_awarded: i64,
    pub notes: String,
    pub portion: String,
}

#[derive(Debug, Clone)]
pub struct BonusAdjustment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub teacher_id: Option<Uuid>,
    pub happened_on: NaiveDate,
    pub points: i64,
    pub reason: String,
}

/// Catalog entry for a checkable physical item. Each status carries its own
/// configured signed delta.
#[derive(Debug, Clone)]
pub struct ToolItem {
    pub id: Uuid,
    pub name: String,
    pub points_brought: i64,
    pub points_not_brought: i64,
    pub points_lost: i64,
    pub points_skipped: i64,
}

#[derive(Debug, Clone)]
pub struct ToolCheckEvent {
    pub id: Uuid,
    pub student_id: Uuid,
    pub tool_item_id: Uuid,
    pub happened_on: NaiveDate,
    pub status: String,
}

/// Per-category point totals for one student over a date range. Derived, never
/// persisted. `bonus_points` is always populated; `total` includes it only
/// when the summarize call asked for bonus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointsSummary {
    pub attendance_points: i64,
    pub recitation_points: i64,
    pub bonus_points: i64,
    pub tool_points: i64,
    pub total: i64,
}

/// One attempted grade change inside a promotion batch. `succeeded: false`
/// rows record attempts whose store update failed, so the audit distinguishes
/// attempted from succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionDetail {
    pub student_id: Uuid,
    pub old_grade: String,
    pub new_grade: String,
    pub succeeded: bool,
}

/// Audit row written once per promotion or revert batch. `students_promoted`
/// is negative for a revert. The most recent record with
/// `is_reverted = false` is the only one eligible for reversal.
#[derive(Debug, Clone)]
pub struct PromotionAuditRecord {
    pub id: Uuid,
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
    pub students_promoted: i64,
    pub details: Vec<PromotionDetail>,
    pub is_reverted: bool,
    pub reverted_by: Option<String>,
    pub reverted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_ladder_steps_forward() {
        assert_eq!(next_grade("1st"), Some("2nd"));
        assert_eq!(next_grade("5th"), Some("6th"));
        assert_eq!(next_grade("12th"), Some("university student"));
        assert_eq!(next_grade("university student"), None);
        assert_eq!(next_grade("kindergarten"), None);
    }

    #[test]
    fn grade_ladder_steps_backward() {
        assert_eq!(prev_grade("university student"), Some("12th"));
        assert_eq!(prev_grade("6th"), Some("5th"));
        assert_eq!(prev_grade("1st"), None);
        assert_eq!(prev_grade("freshman"), None);
    }

    #[test]
    fn ladder_round_trips_for_non_terminal_grades() {
        for grade in GRADE_SEQUENCE.iter().take(GRADE_SEQUENCE.len() - 1) {
            let up = next_grade(grade).unwrap();
            assert_eq!(prev_grade(up), Some(*grade));
        }
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        let from = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        assert!(matches!(
            DateRange::new(from, to),
            Err(LedgerError::InvalidRange { .. })
        ));
        assert!(DateRange::new(to, from).is_ok());
        assert!(DateRange::new(from, from).is_ok());
    }

    #[test]
    fn range_contains_is_inclusive() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
        )
        .unwrap();
        assert!(range.contains(range.from));
        assert!(range.contains(range.to));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()));
    }
}
