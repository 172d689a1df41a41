//! Bulk grade promotion and its single-level reversal.
//!
//! Both operations are best-effort sagas: every eligible student gets an
//! independent grade update, failures are collected rather than rolled back,
//! and one audit record covers every attempt. `students_promoted` counts
//! successes only and is negative on a revert.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{next_grade, prev_grade, PromotionAuditRecord, PromotionDetail, Student};
use crate::store::EventStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Promote,
    Revert,
}

impl Direction {
    fn step(&self, grade: &str) -> Option<&'static str> {
        match self {
            Direction::Promote => next_grade(grade),
            Direction::Revert => prev_grade(grade),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No grade set on the roster record.
    NoGrade,
    /// Grade token not in the known sequence.
    UnrecognizedGrade,
    /// Already at the end of the sequence for this direction.
    AtSequenceBoundary,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoGrade => write!(f, "no grade set"),
            SkipReason::UnrecognizedGrade => write!(f, "unrecognized grade"),
            SkipReason::AtSequenceBoundary => write!(f, "at sequence boundary"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub student: Student,
    pub old_grade: String,
    pub new_grade: String,
}

#[derive(Debug, Clone)]
pub struct SkippedStudent {
    pub student: Student,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    pub eligible: Vec<PlannedChange>,
    pub skipped: Vec<SkippedStudent>,
}

/// One per-student update failure, reported as data, never as an `Err`.
#[derive(Debug, Clone)]
pub struct BatchError {
    pub student_id: Uuid,
    pub student_name: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct PromotionOutcome {
    pub audit_id: Uuid,
    pub success_count: usize,
    pub total_eligible: usize,
    pub skipped: Vec<SkippedStudent>,
    pub errors: Vec<BatchError>,
}

/// Partition a roster into students whose grade can step in `direction` and
/// students that must be skipped. Pure; the store is not consulted.
pub fn plan_batch(students: Vec<Student>, direction: Direction) -> BatchPlan {
    let mut plan = BatchPlan::default();
    for student in students {
        let Some(grade) = student.grade.clone() else {
            plan.skipped.push(SkippedStudent {
                student,
                reason: SkipReason::NoGrade,
            });
            continue;
        };
        match direction.step(&grade) {
            Some(new_grade) => plan.eligible.push(PlannedChange {
                student,
                old_grade: grade,
                new_grade: new_grade.to_string(),
            }),
            None => {
                let reason = if crate::models::GRADE_SEQUENCE.contains(&grade.as_str()) {
                    SkipReason::AtSequenceBoundary
                } else {
                    SkipReason::UnrecognizedGrade
                };
                plan.skipped.push(SkippedStudent { student, reason });
            }
        }
    }
    plan
}

/// Promote every eligible student one grade up the ladder.
pub async fn promote(
    store: &dyn EventStore,
    performed_by: &str,
) -> Result<PromotionOutcome, LedgerError> {
    let students = store.list_students(None).await?;
    let plan = plan_batch(students, Direction::Promote);
    let (outcome, record) = execute(store, plan, performed_by, Direction::Promote).await?;
    info!(
        audit_id = %record.id,
        promoted = outcome.success_count,
        skipped = outcome.skipped.len(),
        failed = outcome.errors.len(),
        "promotion batch finished"
    );
    Ok(outcome)
}

/// Walk every eligible student one grade back down and mark the most recent
/// non-reverted promotion audit as reverted. Exactly one level of reversal is
/// supported: with no non-reverted promotion on file this refuses with
/// `NotFound` before touching any student.
pub async fn revert(
    store: &dyn EventStore,
    performed_by: &str,
) -> Result<PromotionOutcome, LedgerError> {
    let prior = store
        .latest_non_reverted_promotion()
        .await?
        .ok_or_else(|| LedgerError::NotFound("no promotion batch to revert".to_string()))?;

    let students = store.list_students(None).await?;
    let plan = plan_batch(students, Direction::Revert);
    let (outcome, record) = execute(store, plan, performed_by, Direction::Revert).await?;

    store
        .mark_promotion_reverted(prior.id, performed_by, record.performed_at)
        .await?;
    info!(
        audit_id = %record.id,
        reverted_audit_id = %prior.id,
        downgraded = outcome.success_count,
        "revert batch finished"
    );
    Ok(outcome)
}

async fn execute(
    store: &dyn EventStore,
    plan: BatchPlan,
    performed_by: &str,
    direction: Direction,
) -> Result<(PromotionOutcome, PromotionAuditRecord), LedgerError> {
    let total_eligible = plan.eligible.len();
    let mut details = Vec::with_capacity(total_eligible);
    let mut errors = Vec::new();
    let mut success_count = 0usize;

    for change in &plan.eligible {
        let succeeded = match store
            .update_student_grade(change.student.id, &change.new_grade)
            .await
        {
            Ok(()) => {
                success_count += 1;
                true
            }
            Err(err) => {
                warn!(
                    student_id = %change.student.id,
                    error = %err,
                    "grade update failed; continuing batch"
                );
                errors.push(BatchError {
                    student_id: change.student.id,
                    student_name: change.student.full_name.clone(),
                    message: err.to_string(),
                });
                false
            }
        };
        details.push(PromotionDetail {
            student_id: change.student.id,
            old_grade: change.old_grade.clone(),
            new_grade: change.new_grade.clone(),
            succeeded,
        });
    }

    let students_promoted = match direction {
        Direction::Promote => success_count as i64,
        Direction::Revert => -(success_count as i64),
    };
    let record = PromotionAuditRecord {
        id: Uuid::new_v4(),
        performed_by: performed_by.to_string(),
        performed_at: Utc::now(),
        students_promoted,
        details,
        // A revert's own record is born reverted so it can never itself be
        // picked up as the next batch to reverse.
        is_reverted: direction == Direction::Revert,
        reverted_by: None,
        reverted_at: None,
    };
    store.insert_promotion_audit(&record).await?;

    let outcome = PromotionOutcome {
        audit_id: record.id,
        success_count,
        total_eligible,
        skipped: plan.skipped,
        errors,
    };
    Ok((outcome, record))
}
