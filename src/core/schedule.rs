use super::types::{ContributionSchedule, Frequency, MonthKey};

/// Converts a contribution schedule into the amount attributable to one
/// month, in integer cents.
///
/// This is the only place frequency math lives: the minimum calculator and
/// the auto budget generator both go through it, so their answers can never
/// drift apart. Rounding happens exactly once, at the biweekly-to-monthly
/// boundary; everything else is exact integer arithmetic.
pub fn contribution_for_month(schedule: &ContributionSchedule, month: MonthKey) -> i64 {
    if month < schedule.start {
        return 0;
    }
    if let Some(end) = schedule.end {
        if month > end {
            return 0;
        }
    }
    if let Some(entries) = &schedule.plan_entries {
        return entries
            .iter()
            .find(|entry| entry.month == month)
            .map(|entry| entry.amount_cents)
            .unwrap_or(0);
    }

    match schedule.frequency {
        Frequency::Monthly => schedule.amount_cents,
        Frequency::Biweekly => biweekly_monthly_equivalent(schedule.amount_cents),
        Frequency::Installments(count) => {
            if schedule.start.months_until(month) < count as i64 {
                schedule.amount_cents
            } else {
                0
            }
        }
    }
}

/// 26 pay periods a year spread over 12 months, rounded half up.
fn biweekly_monthly_equivalent(amount_cents: i64) -> i64 {
    (amount_cents * 26 + 6) / 12
}
