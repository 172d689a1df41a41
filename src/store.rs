use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{
    AttendanceEvent, BonusAdjustment, DateRange, PromotionAuditRecord, RecitationEvent, Student,
    ToolCheckEvent, ToolItem,
};
use crate::rules;

/// Query contract over the roster and the four event streams. The engine only
/// ever talks to this trait; the binary wires in [`PgStore`], tests wire in an
/// in-memory fake.
///
/// All `list_*` event fetches are range-filtered (inclusive on both bounds)
/// and accept a whole population of student ids so callers ranking many
/// students issue one query per event kind, not one per student.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get_student(&self, id: Uuid) -> Result<Option<Student>, LedgerError>;

    /// All students, optionally restricted to one teacher.
    async fn list_students(&self, teacher_id: Option<Uuid>) -> Result<Vec<Student>, LedgerError>;

    async fn update_student_grade(&self, id: Uuid, grade: &str) -> Result<(), LedgerError>;

    async fn list_attendance(
        &self,
        student_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<AttendanceEvent>, LedgerError>;

    async fn list_recitations(
        &self,
        student_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<RecitationEvent>, LedgerError>;

    async fn list_bonus_adjustments(
        &self,
        student_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<BonusAdjustment>, LedgerError>;

    async fn list_tool_checks(
        &self,
        student_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<ToolCheckEvent>, LedgerError>;

    async fn get_tool_item(&self, id: Uuid) -> Result<Option<ToolItem>, LedgerError>;

    async fn list_tool_items(&self) -> Result<Vec<ToolItem>, LedgerError>;

    /// Record one attendance mark. Callers own the one-event-per-day
    /// convention; the status itself is validated here.
    async fn record_attendance(
        &self,
        student_id: Uuid,
        happened_on: NaiveDate,
        status: &str,
    ) -> Result<Uuid, LedgerError>;

    /// Record a recitation. `points_awarded` is always recomputed from the
    /// rating; there is no way to store an arbitrary value.
    async fn record_recitation(
        &self,
        student_id: Uuid,
        happened_on: NaiveDate,
        rating: &str,
        notes: &str,
        portion: &str,
    ) -> Result<Uuid, LedgerError>;

    /// Append a bonus adjustment. Append-only: corrections insert another row
    /// and the ledger sums every row for the date.
    async fn add_bonus(
        &self,
        student_id: Uuid,
        teacher_id: Option<Uuid>,
        happened_on: NaiveDate,
        points: i64,
        reason: &str,
    ) -> Result<Uuid, LedgerError>;

    async fn record_tool_check(
        &self,
        student_id: Uuid,
        tool_item_id: Uuid,
        happened_on: NaiveDate,
        status: &str,
    ) -> Result<Uuid, LedgerError>;

    async fn insert_promotion_audit(
        &self,
        record: &PromotionAuditRecord,
    ) -> Result<(), LedgerError>;

    async fn mark_promotion_reverted(
        &self,
        id: Uuid,
        reverted_by: &str,
        reverted_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    /// Most recent promotion audit with `is_reverted = false`, if any. Revert
    /// records are written already-reverted so they never come back here.
    async fn latest_non_reverted_promotion(
        &self,
    ) -> Result<Option<PromotionAuditRecord>, LedgerError>;
}

/// Postgres-backed store. Schema lives under `hifz_points.*`, created by
/// `init_db`.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn student_from_row(row: &sqlx::postgres::PgRow) -> Student {
    Student {
        id: row.get("id"),
        full_name: row.get("full_name"),
        grade: row.get("grade"),
        teacher_id: row.get("teacher_id"),
        registration_status: row.get("registration_status"),
    }
}

fn audit_from_row(row: &sqlx::postgres::PgRow) -> Result<PromotionAuditRecord, LedgerError> {
    let details: serde_json::Value = row.get("details");
    let details = serde_json::from_value(details)
        .map_err(|e| LedgerError::StoreUnavailable(sqlx::Error::Decode(Box::new(e))))?;
    Ok(PromotionAuditRecord {
        id: row.get("id"),
        performed_by: row.get("performed_by"),
        performed_at: row.get("performed_at"),
        students_promoted: row.get("students_promoted"),
        details,
        is_reverted: row.get("is_reverted"),
        reverted_by: row.get("reverted_by"),
        reverted_at: row.get("reverted_at"),
    })
}

#[async_trait]
impl EventStore for PgStore {
    async fn get_student(&self, id: Uuid) -> Result<Option<Student>, LedgerError> {
        let row = sqlx::query(
            "SELECT id, full_name, grade, teacher_id, registration_status \
             FROM hifz_points.students WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(student_from_row))
    }

    async fn list_students(&self, teacher_id: Option<Uuid>) -> Result<Vec<Student>, LedgerError> {
        let mut query = String::from(
            "SELECT id, full_name, grade, teacher_id, registration_status \
             FROM hifz_points.students",
        );
        if teacher_id.is_some() {
            query.push_str(" WHERE teacher_id = $1");
        }
        query.push_str(" ORDER BY full_name");

        let mut rows = sqlx::query(&query);
        if let Some(value) = teacher_id {
            rows = rows.bind(value);
        }

        let records = rows.fetch_all(&self.pool).await?;
        Ok(records.iter().map(student_from_row).collect())
    }

    async fn update_student_grade(&self, id: Uuid, grade: &str) -> Result<(), LedgerError> {
        let result = sqlx::query("UPDATE hifz_points.students SET grade = $1 WHERE id = $2")
            .bind(grade)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("student {id}")));
        }
        debug!(student_id = %id, grade = %grade, "updated student grade");
        Ok(())
    }

    async fn list_attendance(
        &self,
        student_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<AttendanceEvent>, LedgerError> {
        let rows = sqlx::query(
            "SELECT id, student_id, happened_on, status \
             FROM hifz_points.attendance_events \
             WHERE student_id = ANY($1) AND happened_on BETWEEN $2 AND $3",
        )
        .bind(student_ids)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AttendanceEvent {
                id: row.get("id"),
                student_id: row.get("student_id"),
                happened_on: row.get("happened_on"),
                status: row.get("status"),
            })
            .collect())
    }

    async fn list_recitations(
        &self,
        student_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<RecitationEvent>, LedgerError> {
        let rows = sqlx::query(
            "SELECT id, student_id, happened_on, rating, points_awarded, notes, portion \
             FROM hifz_points.recitation_events \
             WHERE student_id = ANY($1) AND happened_on BETWEEN $2 AND $3",
        )
        .bind(student_ids)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RecitationEvent {
                id: row.get("id"),
                student_id: row.get("student_id"),
                happened_on: row.get("happened_on"),
                rating: row.get("rating"),
                points_awarded: row.get("points_awarded"),
                notes: row.get("notes"),
                portion: row.get("portion"),
            })
            .collect())
    }

    async fn list_bonus_adjustments(
        &self,
        student_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<BonusAdjustment>, LedgerError> {
        let rows = sqlx::query(
            "SELECT id, student_id, teacher_id, happened_on, points, reason \
             FROM hifz_points.bonus_adjustments \
             WHERE student_id = ANY($1) AND happened_on BETWEEN $2 AND $3",
        )
        .bind(student_ids)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BonusAdjustment {
                id: row.get("id"),
                student_id: row.get("student_id"),
                teacher_id: row.get("teacher_id"),
                happened_on: row.get("happened_on"),
                points: row.get("points"),
                reason: row.get("reason"),
            })
            .collect())
    }

    async fn list_tool_checks(
        &self,
        student_ids: &[Uuid],
        range: DateRange,
    ) -> Result<Vec<ToolCheckEvent>, LedgerError> {
        let rows = sqlx::query(
            "SELECT id, student_id, tool_item_id, happened_on, status \
             FROM hifz_points.tool_check_events \
             WHERE student_id = ANY($1) AND happened_on BETWEEN $2 AND $3",
        )
        .bind(student_ids)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ToolCheckEvent {
                id: row.get("id"),
                student_id: row.get("student_id"),
                tool_item_id: row.get("tool_item_id"),
                happened_on: row.get("happened_on"),
                status: row.get("status"),
            })
            .collect())
    }

    async fn get_tool_item(&self, id: Uuid) -> Result<Option<ToolItem>, LedgerError> {
        let row = sqlx::query(
            "SELECT id, name, points_brought, points_not_brought, points_lost, points_skipped \
             FROM hifz_points.tool_items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ToolItem {
            id: row.get("id"),
            name: row.get("name"),
            points_brought: row.get("points_brought"),
            points_not_brought: row.get("points_not_brought"),
            points_lost: row.get("points_lost"),
            points_skipped: row.get("points_skipped"),
        }))
    }

    async fn list_tool_items(&self) -> Result<Vec<ToolItem>, LedgerError> {
        let rows = sqlx::query(
            "SELECT id, name, points_brought, points_not_brought, points_lost, points_skipped \
             FROM hifz_points.tool_items",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ToolItem {
                id: row.get("id"),
                name: row.get("name"),
                points_brought: row.get("points_brought"),
                points_not_brought: row.get("points_not_brought"),
                points_lost: row.get("points_lost"),
                points_skipped: row.get("points_skipped"),
            })
            .collect())
    }

    async fn record_attendance(
        &self,
        student_id: Uuid,
        happened_on: NaiveDate,
        status: &str,
    ) -> Result<Uuid, LedgerError> {
        rules::attendance_points(status)?;
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO hifz_points.attendance_events (id, student_id, happened_on, status) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(student_id)
        .bind(happened_on)
        .bind(status)
        .execute(&self.pool)
        .await?;
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
        sqlx::query(
            "INSERT INTO hifz_points.recitation_events \
             (id, student_id, happened_on, rating, points_awarded, notes, portion) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(student_id)
        .bind(happened_on)
        .bind(rating)
        .bind(points_awarded)
        .bind(notes)
        .bind(portion)
        .execute(&self.pool)
        .await?;
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
        sqlx::query(
            "INSERT INTO hifz_points.bonus_adjustments \
             (id, student_id, teacher_id, happened_on, points, reason) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(student_id)
        .bind(teacher_id)
        .bind(happened_on)
        .bind(points)
        .bind(reason)
        .execute(&self.pool)
        .await?;
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
        sqlx::query(
            "INSERT INTO hifz_points.tool_check_events \
             (id, student_id, tool_item_id, happened_on, status) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(student_id)
        .bind(tool_item_id)
        .bind(happened_on)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn insert_promotion_audit(
        &self,
        record: &PromotionAuditRecord,
    ) -> Result<(), LedgerError> {
        let details = serde_json::to_value(&record.details)
            .map_err(|e| LedgerError::StoreUnavailable(sqlx::Error::Protocol(e.to_string())))?;
        sqlx::query(
            "INSERT INTO hifz_points.promotion_audits \
             (id, performed_by, performed_at, students_promoted, details, is_reverted, \
              reverted_by, reverted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.id)
        .bind(&record.performed_by)
        .bind(record.performed_at)
        .bind(record.students_promoted)
        .bind(details)
        .bind(record.is_reverted)
        .bind(&record.reverted_by)
        .bind(record.reverted_at)
        .execute(&self.pool)
        .await?;
        debug!(audit_id = %record.id, students_promoted = record.students_promoted, "wrote promotion audit");
        Ok(())
    }

    async fn mark_promotion_reverted(
        &self,
        id: Uuid,
        reverted_by: &str,
        reverted_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE hifz_points.promotion_audits \
             SET is_reverted = TRUE, reverted_by = $1, reverted_at = $2 \
             WHERE id = $3",
        )
        .bind(reverted_by)
        .bind(reverted_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("promotion audit {id}")));
        }
        Ok(())
    }

    async fn latest_non_reverted_promotion(
        &self,
    ) -> Result<Option<PromotionAuditRecord>, LedgerError> {
        let row = sqlx::query(
            "SELECT id, performed_by, performed_at, students_promoted, details, is_reverted, \
                    reverted_by, reverted_at \
             FROM hifz_points.promotion_audits \
             WHERE is_reverted = FALSE \
             ORDER BY performed_at DESC \
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(audit_from_row).transpose()
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Load a small realistic roster with a week of events.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let teacher_id = Uuid::parse_str("7b8f2b9e-6a6d-4c53-9f2e-5b1a4c0d8e31")?;

    let students = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Ahmad Mansour",
            Some("5th"),
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Yusuf Rahman",
            Some("8th"),
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Bilal Haddad",
            Some("university student"),
        ),
        (
            Uuid::parse_str("91b1f9f0-51d0-4f6b-8a4e-2e3f1b6c7d88")?,
            "Omar Siddiqui",
            None,
        ),
    ];

    for (id, name, grade) in &students {
        sqlx::query(
            "INSERT INTO hifz_points.students \
             (id, full_name, grade, teacher_id, registration_status) \
             VALUES ($1, $2, $3, $4, 'active') \
             ON CONFLICT (id) DO UPDATE \
             SET full_name = EXCLUDED.full_name, grade = EXCLUDED.grade",
        )
        .bind(id)
        .bind(name)
        .bind(grade)
        .bind(teacher_id)
        .execute(pool)
        .await?;
    }

    let mushaf_id = Uuid::parse_str("5f3c1d2e-8b4a-4e6f-9c7d-1a2b3c4d5e6f")?;
    sqlx::query(
        "INSERT INTO hifz_points.tool_items \
         (id, name, points_brought, points_not_brought, points_lost, points_skipped) \
         VALUES ($1, 'mushaf', 1, -1, -3, 0) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(mushaf_id)
    .execute(pool)
    .await?;

    let store = PgStore::new(pool.clone());
    let monday = NaiveDate::from_ymd_opt(2026, 2, 2).context("invalid date")?;
    let ahmad = students[0].0;
    let yusuf = students[1].0;
    let bilal = students[2].0;

    let attendance = vec![
        (ahmad, monday, "present"),
        (ahmad, monday + chrono::Duration::days(1), "absent"),
        (yusuf, monday, "present"),
        (yusuf, monday + chrono::Duration::days(1), "excused"),
        (bilal, monday, "present"),
    ];
    for (student_id, date, status) in attendance {
        store.record_attendance(student_id, date, status).await?;
    }

    store
        .record_recitation(ahmad, monday, "excellent", "fluent, minor tajwid slips", "al-baqarah 1-20")
        .await?;
    store
        .record_recitation(yusuf, monday, "good", "", "ya-sin 1-12")
        .await?;
    store
        .record_recitation(bilal, monday, "redo", "needs another pass", "al-kahf 60-82")
        .await?;

    store.record_tool_check(ahmad, mushaf_id, monday, "brought").await?;
    store.record_tool_check(yusuf, mushaf_id, monday, "not-brought").await?;

    store
        .add_bonus(ahmad, Some(teacher_id), monday, 3, "helped younger halaqa")
        .await?;

    Ok(())
}
