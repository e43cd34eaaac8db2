use super::error::BudgetError;
use super::types::{
    Budget, BudgetBreakdown, BreakdownItem, Category, SourceType,
};

/// A budget edit as submitted by the caller. `breakdown_items: Some(vec![])`
/// is an explicit request to clear the breakdown, not an omission.
#[derive(Clone, Debug, Default)]
pub struct EditRequest {
    pub amount_planned_cents: Option<i64>,
    pub breakdown_items: Option<Vec<BreakdownItem>>,
    pub source_type: Option<SourceType>,
    pub is_projected: Option<bool>,
}

impl EditRequest {
    fn is_empty(&self) -> bool {
        self.amount_planned_cents.is_none()
            && self.breakdown_items.is_none()
            && self.source_type.is_none()
            && self.is_projected.is_none()
    }
}

/// What an accepted edit will persist, before the floor check.
#[derive(Clone, Debug, PartialEq)]
pub struct EditResolution {
    pub target_cents: i64,
    /// `None` means the breakdown ends up absent/cleared.
    pub breakdown: Option<BudgetBreakdown>,
}

/// Editability guards for user-initiated changes.
///
/// Auto-generated rows are owned by their generating subsystem; only
/// goal-sourced ones may additionally be hand-adjusted. A row living in an
/// automatic category is only touchable through that category's subsystem.
pub fn check_editable(budget: &Budget, category: &Category) -> Result<(), BudgetError> {
    if budget.is_auto_generated && budget.source_type != Some(SourceType::Goal) {
        return Err(BudgetError::NotEditable {
            source_type: budget.source_type.unwrap_or(SourceType::Manual),
        });
    }
    if let Some(category_source) = category.automatic_source() {
        if budget.source_type != Some(category_source) {
            return Err(BudgetError::AutomaticCategory {
                source_type: category_source,
            });
        }
    }
    Ok(())
}

/// A manual budget may always be deleted; an auto-generated one is deleted
/// only by its owning subsystem, never through the user path.
pub fn check_deletable(budget: &Budget) -> Result<(), BudgetError> {
    if budget.is_auto_generated {
        return Err(BudgetError::NotEditable {
            source_type: budget.source_type.unwrap_or(SourceType::Manual),
        });
    }
    Ok(())
}

/// Resolves the target amount and resulting breakdown for an edit.
///
/// A row with an active breakdown refuses plain amount edits: the caller has
/// to restate the items (or clear them with an empty array) so the
/// sum-equals-planned invariant cannot silently break.
pub fn resolve_edit(budget: &Budget, request: &EditRequest) -> Result<EditResolution, BudgetError> {
    if request.is_empty() {
        return Err(BudgetError::validation(
            "nothing to update: provide amount_planned_cents or breakdown_items",
        ));
    }
    if let Some(amount) = request.amount_planned_cents {
        if amount < 0 {
            return Err(BudgetError::validation("amount_planned_cents must be >= 0"));
        }
    }

    let has_active_breakdown = budget
        .breakdown
        .as_ref()
        .is_some_and(BudgetBreakdown::is_active);

    match &request.breakdown_items {
        Some(items) if !items.is_empty() => {
            if items.iter().any(|item| item.amount_cents < 0) {
                return Err(BudgetError::validation("breakdown item amounts must be >= 0"));
            }
            let breakdown = BudgetBreakdown {
                enabled: true,
                items: items.clone(),
            };
            Ok(EditResolution {
                target_cents: breakdown.total_cents(),
                breakdown: Some(breakdown),
            })
        }
        Some(_) => Ok(EditResolution {
            // Explicit clear: the flat amount (or the current plan) stands alone.
            target_cents: request
                .amount_planned_cents
                .unwrap_or(budget.amount_planned_cents),
            breakdown: None,
        }),
        None => {
            if has_active_breakdown && request.amount_planned_cents.is_some() {
                return Err(BudgetError::validation(
                    "budget has an itemized breakdown; submit breakdown_items instead of a flat amount",
                ));
            }
            Ok(EditResolution {
                target_cents: request
                    .amount_planned_cents
                    .unwrap_or(budget.amount_planned_cents),
                breakdown: budget.breakdown.clone(),
            })
        }
    }
}
