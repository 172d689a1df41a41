//! Ledger aggregation: fold a student's event streams into a `PointsSummary`.
//!
//! The four kind fetches are independent, so `summarize` issues them
//! concurrently and joins on all of them. Any one failing fails the whole
//! call; no partial summary is ever returned.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{
    AttendanceEvent, BonusAdjustment, DateRange, PointsSummary, RecitationEvent, ToolCheckEvent,
    ToolItem,
};
use crate::rules;
use crate::store::EventStore;

pub async fn summarize(
    store: &dyn EventStore,
    student_id: Uuid,
    range: DateRange,
    include_bonus: bool,
) -> Result<PointsSummary, LedgerError> {
    range.validate()?;
    store
        .get_student(student_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("student {student_id}")))?;

    let ids = [student_id];
    let (attendance, recitations, bonuses, tool_checks, tool_items) = tokio::try_join!(
        store.list_attendance(&ids, range),
        store.list_recitations(&ids, range),
        store.list_bonus_adjustments(&ids, range),
        store.list_tool_checks(&ids, range),
        store.list_tool_items(),
    )?;

    let items = tool_items_by_id(tool_items);
    let attendance_points = fold_attendance(&attendance)?;
    let recitation_points = fold_recitations(&recitations)?;
    let bonus_points = fold_bonuses(&bonuses);
    let tool_points = fold_tool_checks(&tool_checks, &items)?;

    let mut total = attendance_points + recitation_points + tool_points;
    if include_bonus {
        total += bonus_points;
    }

    Ok(PointsSummary {
        attendance_points,
        recitation_points,
        bonus_points,
        tool_points,
        total,
    })
}

pub(crate) fn tool_items_by_id(items: Vec<ToolItem>) -> HashMap<Uuid, ToolItem> {
    items.into_iter().map(|item| (item.id, item)).collect()
}

pub(crate) fn fold_attendance(events: &[AttendanceEvent]) -> Result<i64, LedgerError> {
    let mut sum = 0;
    for event in events {
        sum += rules::attendance_points(&event.status)?;
    }
    Ok(sum)
}

pub(crate) fn fold_recitations(events: &[RecitationEvent]) -> Result<i64, LedgerError> {
    // Scored from the rating, not the stored points_awarded; the write path
    // keeps them equal but the rating is the source of truth.
    let mut sum = 0;
    for event in events {
        sum += rules::recitation_points(&event.rating)?;
    }
    Ok(sum)
}

pub(crate) fn fold_bonuses(events: &[BonusAdjustment]) -> i64 {
    events.iter().map(|event| event.points).sum()
}

pub(crate) fn fold_tool_checks(
    events: &[ToolCheckEvent],
    items: &HashMap<Uuid, ToolItem>,
) -> Result<i64, LedgerError> {
    let mut sum = 0;
    for event in events {
        let item = items
            .get(&event.tool_item_id)
            .ok_or_else(|| LedgerError::NotFound(format!("tool item {}", event.tool_item_id)))?;
        sum += rules::tool_check_points(&event.status, item)?;
    }
    Ok(sum)
}
