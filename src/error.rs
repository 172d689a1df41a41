use chrono::NaiveDate;
use thiserror::Error;

/// Errors surfaced by the ledger, ranking, and promotion operations.
///
/// Per-student failures inside a promotion batch are *not* errors; they are
/// collected into `PromotionOutcome::errors` and the batch completes.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid date range: {from} is after {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },

    #[error("unrecognized {kind} status: {value:?}")]
    InvalidEventKind { kind: &'static str, value: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),
}
