use super::schedule::contribution_for_month;
use super::types::{AutoSource, MinimumBudget, MinimumSource, MonthKey, format_cents};

/// Aggregates every eligible automatic source bound to `category_id` into
/// the floor for one month. Read-only; sums in integer cents; sources with a
/// zero contribution for the month are omitted rather than erroring.
pub fn compute_minimum(sources: &[AutoSource], category_id: i64, month: MonthKey) -> MinimumBudget {
    let mut minimum_cents = 0i64;
    let mut contributing = Vec::new();

    for source in sources {
        if source.category_id != category_id || !source.counts_toward_minimum() {
            continue;
        }
        let amount_cents = contribution_for_month(&source.schedule, month);
        if amount_cents == 0 {
            continue;
        }
        minimum_cents += amount_cents;
        contributing.push(MinimumSource {
            label: source.label.clone(),
            amount_cents,
        });
    }

    MinimumBudget {
        minimum_cents,
        sources: contributing,
    }
}

/// "Goal A (200.00) + Car loan (150.00)"
pub fn sources_text(sources: &[MinimumSource]) -> String {
    sources
        .iter()
        .map(|s| format!("{} ({})", s.label, format_cents(s.amount_cents)))
        .collect::<Vec<_>>()
        .join(" + ")
}

/// Tells the user which automatic commitments to un-mark before the planned
/// amount can drop below the floor.
pub fn reduction_suggestion(sources: &[MinimumSource]) -> String {
    if sources.is_empty() {
        return String::new();
    }
    let labels = sources
        .iter()
        .map(|s| s.label.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "To plan less than the minimum, remove these sources from automatic budgeting first: {labels}"
    )
}
