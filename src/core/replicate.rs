use std::collections::HashSet;

use super::error::BudgetError;
use super::types::{MonthKey, ReplicationOutcome};

/// Hard bound on any replication horizon: five years past the source month.
pub const MAX_HORIZON_MONTHS: u32 = 60;

/// How far forward a replication reaches: a month count or an explicit end.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Horizon {
    Months(u32),
    Until(MonthKey),
}

/// Resolves a horizon into the ordered list of target months, exclusive of
/// the source month. Rejected before any write: a zero/negative span, an end
/// not strictly after the source, or an end past the 60-month cap.
pub fn resolve_horizon(source: MonthKey, horizon: Horizon) -> Result<Vec<MonthKey>, BudgetError> {
    let span = match horizon {
        Horizon::Months(0) => {
            return Err(BudgetError::validation("months must be at least 1"));
        }
        Horizon::Months(n) => n as i64,
        Horizon::Until(end) => {
            let span = source.months_until(end);
            if span <= 0 {
                return Err(BudgetError::validation(format!(
                    "end month {end} must be after the source month {source}"
                )));
            }
            span
        }
    };
    if span > MAX_HORIZON_MONTHS as i64 {
        return Err(BudgetError::validation(format!(
            "replication horizon of {span} months exceeds the {MAX_HORIZON_MONTHS}-month cap"
        )));
    }
    Ok((1..=span).map(|i| source.plus_months(i as u32)).collect())
}

/// Resolves an inclusive `[start, end]` range for category replication,
/// where the start month itself is a written target. The cap is measured
/// from the start month.
pub fn resolve_range(start: MonthKey, end: MonthKey) -> Result<Vec<MonthKey>, BudgetError> {
    let span = start.months_until(end);
    if span < 0 {
        return Err(BudgetError::validation(format!(
            "end month {end} must not be before the start month {start}"
        )));
    }
    if span > MAX_HORIZON_MONTHS as i64 {
        return Err(BudgetError::validation(format!(
            "end month {end} is more than {MAX_HORIZON_MONTHS} months after {start}"
        )));
    }
    Ok((0..=span).map(|i| start.plus_months(i as u32)).collect())
}

/// Per-month replication decisions, before anything touches storage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplicationPlan {
    pub created: Vec<MonthKey>,
    pub overwritten: Vec<MonthKey>,
    pub skipped: Vec<MonthKey>,
}

impl ReplicationPlan {
    pub fn outcome(&self) -> ReplicationOutcome {
        let created = self.created.len() as u32;
        let overwritten = self.overwritten.len() as u32;
        let skipped = self.skipped.len() as u32;
        ReplicationOutcome {
            created,
            overwritten,
            skipped,
            total: created + overwritten + skipped,
        }
    }

    /// Months that will actually be written (the skip set is left untouched).
    pub fn writes(&self) -> impl Iterator<Item = MonthKey> + '_ {
        self.created.iter().chain(self.overwritten.iter()).copied()
    }
}

/// Sorts each target month into created/overwritten/skipped against the set
/// of months that already have a budget row.
pub fn plan_replication(
    targets: &[MonthKey],
    existing: &HashSet<MonthKey>,
    overwrite: bool,
) -> ReplicationPlan {
    let mut plan = ReplicationPlan::default();
    for &month in targets {
        if !existing.contains(&month) {
            plan.created.push(month);
        } else if overwrite {
            plan.overwritten.push(month);
        } else {
            plan.skipped.push(month);
        }
    }
    plan
}
