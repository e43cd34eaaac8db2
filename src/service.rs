use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::warn;

use crate::cache::ProjectionCache;
use crate::core::{
    AutoSource, BreakdownItem, Budget, BudgetBreakdown, BudgetError, Category, EditRequest,
    Frequency, Horizon, MinimumBudget, MonthKey, ReplicationOutcome, ReplicationPlan, SourceType,
    check_deletable, check_editable, compute_minimum, contribution_for_month, plan_replication,
    reduction_suggestion, resolve_edit, resolve_horizon, resolve_range, sources_text,
};
use crate::store::{BudgetWrite, Store, WriteMode};

/// Request to create a manual budget row.
#[derive(Clone, Debug)]
pub struct CreateBudget {
    pub owner_id: i64,
    pub category_id: i64,
    pub month: MonthKey,
    pub amount_planned_cents: Option<i64>,
    pub breakdown_items: Option<Vec<BreakdownItem>>,
    pub is_projected: bool,
}

/// Outcome of replicating every manual budget of one month.
#[derive(Clone, Debug, Serialize)]
pub struct MonthReplication {
    pub budgets_replicated: u32,
    pub months_replicated: u32,
    #[serde(flatten)]
    pub outcome: ReplicationOutcome,
}

/// Outcome of seeding a category across a month range.
#[derive(Clone, Debug, Serialize)]
pub struct CategoryReplication {
    pub amount_used_cents: i64,
    pub months_replicated: u32,
    #[serde(flatten)]
    pub outcome: ReplicationOutcome,
}

/// Result of registering an automatic source: generation failure degrades to
/// a warning instead of failing the registration.
#[derive(Clone, Debug, Serialize)]
pub struct SourceRegistration {
    pub source_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Orchestrates budget operations: read current rows, decide in pure core
/// code, persist in one batched write, then invalidate the owner's cached
/// projections. Every successful mutation invalidates before returning.
pub struct BudgetService {
    store: Mutex<Store>,
    cache: Arc<dyn ProjectionCache>,
}

impl BudgetService {
    pub fn new(store: Store, cache: Arc<dyn ProjectionCache>) -> Self {
        Self {
            store: Mutex::new(store),
            cache,
        }
    }

    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- reads ----

    pub fn minimum(
        &self,
        owner_id: i64,
        category_id: i64,
        month: MonthKey,
    ) -> Result<MinimumBudget, BudgetError> {
        let store = self.store();
        let sources = store.auto_sources_for_category(owner_id, category_id)?;
        Ok(compute_minimum(&sources, category_id, month))
    }

    pub fn budgets_for_month(
        &self,
        owner_id: i64,
        month: MonthKey,
    ) -> Result<Vec<Budget>, BudgetError> {
        Ok(self.store().budgets_for_month(owner_id, month)?)
    }

    pub fn get_budget(&self, id: i64) -> Result<Budget, BudgetError> {
        self.store().get_budget(id)?.ok_or(BudgetError::NotFound)
    }

    // ---- categories ----

    pub fn create_category(
        &self,
        owner_id: i64,
        name: &str,
        source_type: Option<SourceType>,
    ) -> Result<Category, BudgetError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BudgetError::validation("category name must not be empty"));
        }
        Ok(self.store().insert_category(owner_id, name, source_type)?)
    }

    // ---- manual budget lifecycle ----

    pub fn create_budget(&self, request: CreateBudget) -> Result<Budget, BudgetError> {
        let mut store = self.store();
        let category = store
            .get_category(request.category_id)?
            .ok_or(BudgetError::CategoryNotFound)?;
        if let Some(source_type) = category.automatic_source() {
            return Err(BudgetError::AutomaticCategory { source_type });
        }

        let (amount_cents, breakdown) = match &request.breakdown_items {
            Some(items) if !items.is_empty() => {
                if items.iter().any(|item| item.amount_cents < 0) {
                    return Err(BudgetError::validation("breakdown item amounts must be >= 0"));
                }
                let breakdown = BudgetBreakdown {
                    enabled: true,
                    items: items.clone(),
                };
                (breakdown.total_cents(), Some(breakdown))
            }
            _ => {
                let amount = request
                    .amount_planned_cents
                    .ok_or_else(|| BudgetError::validation("amount_planned_cents is required"))?;
                if amount < 0 {
                    return Err(BudgetError::validation("amount_planned_cents must be >= 0"));
                }
                (amount, None)
            }
        };

        let sources = store.auto_sources_for_category(request.owner_id, request.category_id)?;
        let floor = compute_minimum(&sources, request.category_id, request.month);
        if amount_cents < floor.minimum_cents {
            return Err(below_minimum(floor));
        }

        let write = BudgetWrite {
            owner_id: request.owner_id,
            category_id: request.category_id,
            month: request.month,
            amount_planned_cents: amount_cents,
            minimum_amount_planned_cents: floor.minimum_cents,
            auto_contributions_cents: floor.minimum_cents,
            source_type: Some(SourceType::Manual),
            is_auto_generated: false,
            is_projected: request.is_projected,
            breakdown,
        };
        let result = store.write_budgets(&[write], WriteMode::InsertIfAbsent)?;
        if result.written == 0 {
            return Err(BudgetError::validation(format!(
                "a budget already exists for this category in {}",
                request.month
            )));
        }
        let budget = store
            .find_budget(request.owner_id, request.category_id, request.month)?
            .ok_or(BudgetError::NotFound)?;
        drop(store);

        self.cache.invalidate_owner(budget.owner_id);
        Ok(budget)
    }

    /// Applies a user edit: editability guards, breakdown consistency, floor
    /// recomputation, then one persisted row and an invalidation.
    pub fn patch_budget(&self, id: i64, request: &EditRequest) -> Result<Budget, BudgetError> {
        let mut store = self.store();
        let mut budget = store.get_budget(id)?.ok_or(BudgetError::NotFound)?;
        let category = store
            .get_category(budget.category_id)?
            .ok_or(BudgetError::CategoryNotFound)?;

        check_editable(&budget, &category)?;
        let resolution = resolve_edit(&budget, request)?;

        let sources = store.auto_sources_for_category(budget.owner_id, budget.category_id)?;
        let floor = compute_minimum(&sources, budget.category_id, budget.month);
        if resolution.target_cents < floor.minimum_cents {
            return Err(below_minimum(floor));
        }

        budget.amount_planned_cents = resolution.target_cents;
        budget.minimum_amount_planned_cents = floor.minimum_cents;
        budget.auto_contributions_cents = floor.minimum_cents;
        budget.breakdown = resolution.breakdown;
        if let Some(source_type) = request.source_type {
            budget.source_type = Some(source_type);
        }
        if let Some(is_projected) = request.is_projected {
            budget.is_projected = is_projected;
        }

        if !store.update_budget(&budget)? {
            return Err(BudgetError::NotFound);
        }
        drop(store);

        self.cache.invalidate_owner(budget.owner_id);
        Ok(budget)
    }

    pub fn delete_budget(&self, id: i64) -> Result<(), BudgetError> {
        let mut store = self.store();
        let budget = store.get_budget(id)?.ok_or(BudgetError::NotFound)?;
        check_deletable(&budget)?;
        if !store.delete_budget(id)? {
            return Err(BudgetError::NotFound);
        }
        drop(store);

        self.cache.invalidate_owner(budget.owner_id);
        Ok(())
    }

    // ---- replication ----

    /// Replicates one budget row forward over the horizon.
    pub fn replicate_budget(
        &self,
        id: i64,
        horizon: Horizon,
        overwrite: bool,
    ) -> Result<ReplicationOutcome, BudgetError> {
        let mut store = self.store();
        let budget = store.get_budget(id)?.ok_or(BudgetError::NotFound)?;
        if budget.is_auto_generated {
            return Err(BudgetError::NotEditable {
                source_type: budget.source_type.unwrap_or(SourceType::Manual),
            });
        }
        let category = store
            .get_category(budget.category_id)?
            .ok_or(BudgetError::CategoryNotFound)?;
        if let Some(source_type) = category.automatic_source() {
            return Err(BudgetError::AutomaticCategory { source_type });
        }

        let targets = resolve_horizon(budget.month, horizon)?;
        let existing = store.existing_months(budget.owner_id, budget.category_id, &targets)?;
        let plan = plan_replication(&targets, &existing, overwrite);

        let rows: Vec<BudgetWrite> = plan
            .writes()
            .map(|month| replica_of(&budget, month))
            .collect();
        let outcome = commit_plan(&mut store, &plan, rows, overwrite)?;
        drop(store);

        self.cache.invalidate_owner(budget.owner_id);
        Ok(outcome)
    }

    /// Replicates every manual budget of one month forward. Automatic rows
    /// and rows in automatic categories are left alone.
    pub fn replicate_month(
        &self,
        owner_id: i64,
        month: MonthKey,
        horizon: Horizon,
        overwrite: bool,
    ) -> Result<MonthReplication, BudgetError> {
        let mut store = self.store();
        let targets = resolve_horizon(month, horizon)?;

        let mut sources = Vec::new();
        for budget in store.budgets_for_month(owner_id, month)? {
            if budget.is_auto_generated || budget.is_projected {
                continue;
            }
            if !matches!(budget.source_type, None | Some(SourceType::Manual)) {
                continue;
            }
            let automatic_category = store
                .get_category(budget.category_id)?
                .is_some_and(|c| c.automatic_source().is_some());
            if automatic_category {
                continue;
            }
            sources.push(budget);
        }

        let mut combined = ReplicationPlan::default();
        let mut rows = Vec::new();
        for budget in &sources {
            let existing = store.existing_months(owner_id, budget.category_id, &targets)?;
            let plan = plan_replication(&targets, &existing, overwrite);
            rows.extend(plan.writes().map(|target| replica_of(budget, target)));
            combined.created.extend(plan.created);
            combined.overwritten.extend(plan.overwritten);
            combined.skipped.extend(plan.skipped);
        }
        let outcome = commit_plan(&mut store, &combined, rows, overwrite)?;
        drop(store);

        if !sources.is_empty() {
            self.cache.invalidate_owner(owner_id);
        }
        Ok(MonthReplication {
            budgets_replicated: sources.len() as u32,
            months_replicated: targets.len() as u32,
            outcome,
        })
    }

    /// Seeds a category over an inclusive month range with a flat amount:
    /// the explicit one, or the category's most recent planned amount.
    pub fn replicate_category(
        &self,
        category_id: i64,
        owner_id: i64,
        start: MonthKey,
        end: MonthKey,
        initial_amount_cents: Option<i64>,
        overwrite: bool,
    ) -> Result<CategoryReplication, BudgetError> {
        let mut store = self.store();
        let category = store
            .get_category(category_id)?
            .ok_or(BudgetError::CategoryNotFound)?;
        if let Some(source_type) = category.automatic_source() {
            return Err(BudgetError::AutomaticCategory { source_type });
        }
        if let Some(amount) = initial_amount_cents {
            if amount < 0 {
                return Err(BudgetError::validation("initial_amount_cents must be >= 0"));
            }
        }
        let amount_cents = match initial_amount_cents {
            Some(amount) => amount,
            None => store
                .latest_planned_amount(owner_id, category_id)?
                .ok_or_else(|| {
                    BudgetError::validation(
                        "category has no existing budgets; provide initial_amount_cents",
                    )
                })?,
        };

        let targets = resolve_range(start, end)?;
        let existing = store.existing_months(owner_id, category_id, &targets)?;
        let plan = plan_replication(&targets, &existing, overwrite);

        let rows: Vec<BudgetWrite> = plan
            .writes()
            .map(|month| BudgetWrite {
                owner_id,
                category_id,
                month,
                amount_planned_cents: amount_cents,
                minimum_amount_planned_cents: 0,
                auto_contributions_cents: 0,
                source_type: Some(SourceType::Manual),
                is_auto_generated: false,
                is_projected: false,
                breakdown: None,
            })
            .collect();
        let outcome = commit_plan(&mut store, &plan, rows, overwrite)?;
        drop(store);

        self.cache.invalidate_owner(owner_id);
        Ok(CategoryReplication {
            amount_used_cents: amount_cents,
            months_replicated: targets.len() as u32,
            outcome,
        })
    }

    // ---- automatic sources ----

    /// Registers an automatic source and generates its budget rows. A failed
    /// generation never fails the registration: it is logged and reported as
    /// a warning alongside the new source id.
    pub fn register_source(&self, source: &AutoSource) -> Result<SourceRegistration, BudgetError> {
        let source_id = self.store().insert_auto_source(source)?;

        let start = source.schedule.start;
        let end = source.schedule.end.unwrap_or_else(|| default_end(source));
        let warning = match self.generate_auto_budgets(source, start, end, false) {
            Ok(_) => None,
            Err(err) => {
                warn!(
                    source_id,
                    owner_id = source.owner_id,
                    category_id = source.category_id,
                    error = %err,
                    "automatic budget generation failed after source registration"
                );
                Some(format!("automatic budgets were not generated: {err}"))
            }
        };
        Ok(SourceRegistration { source_id, warning })
    }

    /// Writes the source's budget rows for every month in `[start, end]`.
    /// Months where the schedule contributes nothing are skipped entirely, so
    /// an exhausted installment plan stops producing rows.
    pub fn generate_auto_budgets(
        &self,
        source: &AutoSource,
        start: MonthKey,
        end: MonthKey,
        overwrite: bool,
    ) -> Result<ReplicationOutcome, BudgetError> {
        if start.months_until(end) < 0 {
            return Err(BudgetError::validation(format!(
                "end month {end} must not be before the start month {start}"
            )));
        }

        let mut store = self.store();
        let mut rows = Vec::new();
        let mut month = start;
        while month <= end {
            let amount_cents = contribution_for_month(&source.schedule, month);
            if amount_cents != 0 {
                rows.push(BudgetWrite {
                    owner_id: source.owner_id,
                    category_id: source.category_id,
                    month,
                    amount_planned_cents: amount_cents,
                    minimum_amount_planned_cents: amount_cents,
                    auto_contributions_cents: amount_cents,
                    source_type: Some(source.kind.source_type()),
                    is_auto_generated: true,
                    is_projected: false,
                    breakdown: None,
                });
            }
            month = month.plus_months(1);
        }

        let mode = if overwrite {
            WriteMode::Upsert
        } else {
            WriteMode::InsertIfAbsent
        };
        let result = store.write_budgets(&rows, mode)?;
        drop(store);

        self.cache.invalidate_owner(source.owner_id);
        Ok(ReplicationOutcome {
            created: result.written as u32,
            overwritten: 0,
            skipped: result.conflicted as u32,
            total: (result.written + result.conflicted) as u32,
        })
    }
}

fn below_minimum(floor: MinimumBudget) -> BudgetError {
    BudgetError::BelowMinimum {
        minimum_cents: floor.minimum_cents,
        sources_text: sources_text(&floor.sources),
        suggestion: reduction_suggestion(&floor.sources),
        sources: floor.sources,
    }
}

/// Copies a source row to a target month. The minimum and auto-contribution
/// columns start at zero; the floor is recomputed when the row is next
/// edited, against that month's own schedules.
fn replica_of(budget: &Budget, month: MonthKey) -> BudgetWrite {
    BudgetWrite {
        owner_id: budget.owner_id,
        category_id: budget.category_id,
        month,
        amount_planned_cents: budget.amount_planned_cents,
        minimum_amount_planned_cents: 0,
        auto_contributions_cents: 0,
        source_type: budget.source_type.or(Some(SourceType::Manual)),
        is_auto_generated: false,
        is_projected: budget.is_projected,
        breakdown: budget.breakdown.clone(),
    }
}

/// Persists a plan's writes and reconciles insert races: an insert that lost
/// the uniqueness conflict under insert-if-absent moves from `created` to
/// `skipped` instead of erroring.
fn commit_plan(
    store: &mut Store,
    plan: &ReplicationPlan,
    rows: Vec<BudgetWrite>,
    overwrite: bool,
) -> Result<ReplicationOutcome, BudgetError> {
    let mode = if overwrite {
        WriteMode::Upsert
    } else {
        WriteMode::InsertIfAbsent
    };
    let result = store.write_budgets(&rows, mode)?;

    let mut outcome = plan.outcome();
    let lost = (result.conflicted as u32).min(outcome.created);
    outcome.created -= lost;
    outcome.skipped += lost;
    Ok(outcome)
}

/// Generation horizon when the schedule has no end month: installments run
/// to their last payment, everything else seeds one year ahead.
fn default_end(source: &AutoSource) -> MonthKey {
    match source.schedule.frequency {
        Frequency::Installments(count) if count > 0 => source.schedule.start.plus_months(count - 1),
        _ => source.schedule.start.plus_months(11),
    }
}
