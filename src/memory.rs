//! In-memory `EventStore` used by the engine tests. Mirrors the Postgres
//! store's behavior (range filtering, write-path validation, grade updates)
//! and adds per-call failure injection so partial-failure paths are testable.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{
    AttendanceEvent, BonusAdjustment, DateRange, PromotionAuditRecord, RecitationEvent, Student,
    ToolCheckEvent, ToolItem,
};
use crate::rules;
use crate::store::EventStore;

#[derive(Default)]
struct Inner {
    students: HashMap<Uuid, Student>,
    attendance: Vec<AttendanceEvent>,
    recitations: Vec<RecitationEvent>,
    bonuses: Vec<BonusAdjustment>,
    tool_items: HashMap<Uuid, ToolItem>,
    tool_checks: Vec<ToolCheckEvent>,
    audits: Vec<PromotionAuditRecord>,
    failing_fetches: HashSet<&'static str>,
    failing_grade_updates: HashSet<Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn unavailable() -> LedgerError {
    LedgerError::StoreUnavailable(sqlx::Error::PoolClosed)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_student(&self, student: Student) {
        let mut inner = self.inner.lock().unwrap();
        inner.students.insert(student.id, student);
    }

    pub fn add_tool_item(&self, item: ToolItem) {
        let mut inner = self.inner.lock().unwrap();
        inner.tool_items.insert(item.id, item);
    }

    /// Make a `list_*` fetch fail; `kind` is one of "attendance",
    /// "recitation", "bonus", "tool-check".
    pub fn fail_fetch(&self, kind: &'static str) {
        self.inner.lock().unwrap().failing_fetches.insert(kind);
    }

    /// Make every future grade update for this student fail.
    pub fn fail_grade_update(&self, student_id: Uuid) {
        self.inner
            .lock()
            .unwrap()
            .failing_grade_updates
            .insert(student_id);
    }

    pub fn student_grade(&self, student_id: Uuid) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.students.get(&student_id).and_then(|s| s.grade.clone())
    }

    pub fn audits(&self) -> Vec<PromotionAuditRecord> {
        self.inner.lock().unwrap().audits.clone()
    }

    fn check_fetch(&self, kind: &'static str) -> Result<(), LedgerError> {
        if self.inner.lock().unwrap().failing_fetches.contains(kind) {
            return Err(unavailable());
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn get_student(&self, id: Uuid) -> Result<Option<Student>, LedgerError> {
        Ok(self.inner.lock().unwrap().students.get(&id).cloned())
    }

    async fn list_students(&self, teacher_id: Option<Uuid>) -> Result<Vec<Student>, LedgerError> {
        let inner = self.inner.lock().unwrap();
        let mut students: Vec<Student> = inner
            .students
            .values()
            .filter(|s| teacher_id.is_none() || s.teacher_id == teacher_id)
            .cloned()
            .collect();
        students.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(students)
    }

    async fn update_student_grade(&self, id: Uuid, grade: &str) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_grade_updates.contains(&id) {
            return Err(unavailable());
        }
        let student = inner
            .students
            .get_mut(&id)
            .ok_or_else(|| LedgerError::NotFound(format!("student {id}")))?;
        student.grade = Some(grade.to_string());
        Ok(())
    }

    async fn list_attendance(
        &self,
        student_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<AttendanceEvent>, LedgerError> {
        self.check_fetch("attendance")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .attendance
            .iter()
            .filter(|e| student_ids.contains(&e.student_id) && range.contains(e.happened_on))
            .cloned()
            .collect())
    }

    async fn list_recitations(
        &self,
        student_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<RecitationEvent>, LedgerError> {
        self.check_fetch("recitation")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .recitations
            .iter()
            .filter(|e| student_ids.contains(&e.student_id) && range.contains(e.happened_on))
            .cloned()
            .collect())
    }

    async fn list_bonus_adjustments(
        &self,
        student_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<BonusAdjustment>, LedgerError> {
        self.check_fetch("bonus")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .bonuses
            .iter()
            .filter(|e| student_ids.contains(&e.student_id) && range.contains(e.happened_on))
            .cloned()
            .collect())
    }

    async fn list_tool_checks(
        &self,
        student_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<ToolCheckEvent>, LedgerError> {
        self.check_fetch("tool-check")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tool_checks
            .iter()
            .filter(|e| student_ids.contains(&e.student_id) && range.contains(e.happened_on))
            .cloned()
            .collect())
    }

    async fn get_tool_item(&self, id: Uuid) -> Result<Option<ToolItem>, LedgerError> {
        Ok(self.inner.lock().unwrap().tool_items.get(&id).cloned())
    }

    async fn list_tool_items(&self) -> Result<Vec<ToolItem>, LedgerError> {
        Ok(self.inner.lock().unwrap().tool_items.values().cloned().collect())
    }

    async fn record_attendance(
        &self,
        student_id: Uuid,
        happened_on: NaiveDate,
        status: &str,
    ) -> Result<Uuid, LedgerError> {
        rules::attendance_points(status)?;
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().attendance.push(AttendanceEvent {
            id,
            student_id,
            happened_on,
            status: status.to_string(),
        });
        Ok(id)
    }

    async fn record_recitation(
        &self,
        student_id: Uuid,
        happened_on: NaiveDate,
        rating: &str,
        notes: &str,
        portion: &str,
    ) -> Result<Uuid, LedgerError> {
        let points_awarded = rules::recitation_points(rating)?;
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().recitations.push(RecitationEvent {
            id,
            student_id,
            happened_on,
            rating: rating.to_string(),
            points_awarded,
            notes: notes.to_string(),
            portion: portion.to_string(),
        });
        Ok(id)
    }

    async fn add_bonus(
        &self,
        student_id: Uuid,
        teacher_id: Option<Uuid>,
        happened_on: NaiveDate,
        points: i64,
        reason: &str,
    ) -> Result<Uuid, LedgerError> {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().bonuses.push(BonusAdjustment {
            id,
            student_id,
            teacher_id,
            happened_on,
            points,
            reason: reason.to_string(),
        });
        Ok(id)
    }

    async fn record_tool_check(
        &self,
        student_id: Uuid,
        tool_item_id: Uuid,
        happened_on: NaiveDate,
        status: &str,
    ) -> Result<Uuid, LedgerError> {
        let item = self
            .get_tool_item(tool_item_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("tool item {tool_item_id}")))?;
        rules::tool_check_points(status, &item)?;
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().tool_checks.push(ToolCheckEvent {
            id,
            student_id,
            tool_item_id,
            happened_on,
            status: status.to_string(),
        });
        Ok(id)
    }

    async fn insert_promotion_audit(
        &self,
        record: &PromotionAuditRecord,
    ) -> Result<(), LedgerError> {
        self.inner.lock().unwrap().audits.push(record.clone());
        Ok(())
    }

    async fn mark_promotion_reverted(
        &self,
        id: Uuid,
        reverted_by: &str,
        reverted_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        let audit = inner
            .audits
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| LedgerError::NotFound(format!("promotion audit {id}")))?;
        audit.is_reverted = true;
        audit.reverted_by = Some(reverted_by.to_string());
        audit.reverted_at = Some(reverted_at);
        Ok(())
    }

    async fn latest_non_reverted_promotion(
        &self,
    ) -> Result<Option<PromotionAuditRecord>, LedgerError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .audits
            .iter()
            .filter(|a| !a.is_reverted)
            .max_by_key(|a| a.performed_at)
            .cloned())
    }
}
