//! Leaderboards over a population of students: top-N by total points (bonus
//! included) and top-N by absence count.
//!
//! The underlying fetches are batched across the whole population, one query
//! per event kind, then grouped per student in memory. Ties are broken by
//! ascending student id, so equal totals always order the same way regardless
//! of fetch order.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::LedgerError;
use crate::ledger::tool_items_by_id;
use crate::models::{DateRange, Student};
use crate::rules;
use crate::store::EventStore;

#[derive(Debug, Clone)]
pub struct RankedByPoints {
    pub student: Student,
    pub total: i64,
}

#[derive(Debug, Clone)]
pub struct RankedByAbsences {
    pub student: Student,
    pub absent_count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct Leaderboards {
    pub top_by_points: Vec<RankedByPoints>,
    pub top_by_absences: Vec<RankedByAbsences>,
}

/// Rank `population` over `range`. Teacher scoping is the caller's concern:
/// pass a pre-filtered population.
pub async fn rank(
    store: &dyn EventStore,
    population: &[Student],
    range: DateRange,
    top_n: usize,
) -> Result<Leaderboards, LedgerError> {
    range.validate()?;
    if population.is_empty() {
        return Ok(Leaderboards::default());
    }

    let ids: Vec<Uuid> = population.iter().map(|s| s.id).collect();
    let (attendance, recitations, bonuses, tool_checks, tool_items) = tokio::try_join!(
        store.list_attendance(&ids, range),
        store.list_recitations(&ids, range),
        store.list_bonus_adjustments(&ids, range),
        store.list_tool_checks(&ids, range),
        store.list_tool_items(),
    )?;
    let items = tool_items_by_id(tool_items);

    let mut totals: HashMap<Uuid, i64> = ids.iter().map(|id| (*id, 0)).collect();
    let mut absences: HashMap<Uuid, i64> = HashMap::new();

    for event in &attendance {
        if let Some(total) = totals.get_mut(&event.student_id) {
            *total += rules::attendance_points(&event.status)?;
            if event.status == "absent" {
                *absences.entry(event.student_id).or_insert(0) += 1;
            }
        }
    }
    for event in &recitations {
        if let Some(total) = totals.get_mut(&event.student_id) {
            *total += rules::recitation_points(&event.rating)?;
        }
    }
    for event in &bonuses {
        if let Some(total) = totals.get_mut(&event.student_id) {
            *total += event.points;
        }
    }
    for event in &tool_checks {
        if let Some(total) = totals.get_mut(&event.student_id) {
            let item = items.get(&event.tool_item_id).ok_or_else(|| {
                LedgerError::NotFound(format!("tool item {}", event.tool_item_id))
            })?;
            *total += rules::tool_check_points(&event.status, item)?;
        }
    }

    let mut top_by_points: Vec<RankedByPoints> = population
        .iter()
        .map(|student| RankedByPoints {
            student: student.clone(),
            total: totals[&student.id],
        })
        .collect();
    top_by_points.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.student.id.cmp(&b.student.id))
    });
    top_by_points.truncate(top_n);

    let mut top_by_absences: Vec<RankedByAbsences> = population
        .iter()
        .filter_map(|student| {
            let absent_count = absences.get(&student.id).copied().unwrap_or(0);
            (absent_count > 0).then(|| RankedByAbsences {
                student: student.clone(),
                absent_count,
            })
        })
        .collect();
    top_by_absences.sort_by(|a, b| {
        b.absent_count
            .cmp(&a.absent_count)
            .then_with(|| a.student.id.cmp(&b.student.id))
    });
    top_by_absences.truncate(top_n);

    Ok(Leaderboards {
        top_by_points,
        top_by_absences,
    })
}
