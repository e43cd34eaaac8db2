mod edit;
mod error;
mod minimum;
mod replicate;
mod schedule;
mod types;

pub use edit::{EditRequest, EditResolution, check_deletable, check_editable, resolve_edit};
pub use error::BudgetError;
pub use minimum::{compute_minimum, reduction_suggestion, sources_text};
pub use replicate::{
    Horizon, MAX_HORIZON_MONTHS, ReplicationPlan, plan_replication, resolve_horizon, resolve_range,
};
pub use schedule::contribution_for_month;
pub use types::{
    AutoSource, BreakdownItem, Budget, BudgetBreakdown, Category, ContributionSchedule, Frequency,
    MinimumBudget, MinimumSource, MonthKey, PlanEntry, ReplicationOutcome, SourceKind,
    SourceStatus, SourceType, format_cents,
};
