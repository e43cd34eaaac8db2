use thiserror::Error;

use super::types::{MinimumSource, SourceType, format_cents};

/// Error taxonomy for budget operations.
///
/// Business-rule failures (`Validation`, `NotEditable`, `AutomaticCategory`,
/// `BelowMinimum`) are always turned into structured client responses at the
/// API boundary; `Storage` is logged with context and surfaced as a generic
/// failure without internal detail.
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("{0}")]
    Validation(String),

    #[error("budget not found")]
    NotFound,

    #[error("category not found")]
    CategoryNotFound,

    #[error("budget is not user-editable (source type: {source_type})")]
    NotEditable { source_type: SourceType },

    #[error("category is automatic (source type: {source_type}); its amounts are derived, not authored")]
    AutomaticCategory { source_type: SourceType },

    #[error("planned amount is below the automatic minimum of {}", format_cents(*minimum_cents))]
    BelowMinimum {
        minimum_cents: i64,
        sources: Vec<MinimumSource>,
        sources_text: String,
        suggestion: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl BudgetError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
