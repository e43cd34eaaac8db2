use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::cache::InMemoryProjectionCache;
use crate::core::{
    AutoSource, BreakdownItem, BudgetError, ContributionSchedule, EditRequest, Frequency, Horizon,
    MinimumSource, MonthKey, PlanEntry, SourceKind, SourceStatus, SourceType, format_cents,
};
use crate::service::{BudgetService, CreateBudget};
use crate::store::Store;

type AppState = Arc<BudgetService>;

pub async fn run_http_server(port: u16, store: Store) -> std::io::Result<()> {
    let service = Arc::new(BudgetService::new(
        store,
        Arc::new(InMemoryProjectionCache::new()),
    ));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(service);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "budget HTTP API listening");
    axum::serve(listener, app).await
}

fn router(service: AppState) -> Router {
    Router::new()
        .route("/api/budgets/minimum", get(minimum_handler))
        .route("/api/budgets", get(list_handler).post(create_handler))
        .route(
            "/api/budgets/:id",
            patch(patch_handler).delete(delete_handler),
        )
        .route("/api/budgets/:id/replicate", post(replicate_handler))
        .route("/api/budgets/replicate-all", post(replicate_all_handler))
        .route(
            "/api/categories/:id/replicate",
            post(replicate_category_handler),
        )
        .route("/api/categories", post(create_category_handler))
        .route("/api/sources", post(register_source_handler))
        .fallback(not_found_handler)
        .with_state(service)
}

// ---- payloads ----

#[derive(Debug, Deserialize)]
struct MinimumQuery {
    owner_id: i64,
    category_id: i64,
    month: String,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    owner_id: i64,
    month: String,
}

#[derive(Debug, Deserialize)]
struct CreateBudgetPayload {
    owner_id: i64,
    category_id: i64,
    month: String,
    #[serde(default)]
    amount_planned_cents: Option<i64>,
    #[serde(default)]
    breakdown_items: Option<Vec<BreakdownItem>>,
    #[serde(default)]
    is_projected: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EditPayload {
    amount_planned_cents: Option<i64>,
    breakdown_items: Option<Vec<BreakdownItem>>,
    source_type: Option<SourceType>,
    is_projected: Option<bool>,
}

impl From<EditPayload> for EditRequest {
    fn from(payload: EditPayload) -> Self {
        EditRequest {
            amount_planned_cents: payload.amount_planned_cents,
            breakdown_items: payload.breakdown_items,
            source_type: payload.source_type,
            is_projected: payload.is_projected,
        }
    }
}

/// Horizon selector shared by the replicate endpoints: either a month count
/// or an explicit end month, never both.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HorizonPayload {
    months: Option<u32>,
    end_month: Option<String>,
}

impl HorizonPayload {
    fn resolve(&self) -> Result<Horizon, BudgetError> {
        match (self.months, &self.end_month) {
            (Some(_), Some(_)) => Err(BudgetError::validation(
                "provide either months or end_month, not both",
            )),
            (Some(months), None) => Ok(Horizon::Months(months)),
            (None, Some(end)) => Ok(Horizon::Until(parse_month(end)?)),
            (None, None) => Err(BudgetError::validation("provide months or end_month")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReplicatePayload {
    #[serde(flatten)]
    horizon: HorizonPayload,
    #[serde(default)]
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
struct ReplicateAllPayload {
    owner_id: i64,
    month: String,
    #[serde(flatten)]
    horizon: HorizonPayload,
    #[serde(default)]
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
struct ReplicateCategoryPayload {
    owner_id: i64,
    start_month: String,
    end_month: String,
    #[serde(default)]
    initial_amount_cents: Option<i64>,
    #[serde(default)]
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
struct CreateCategoryPayload {
    owner_id: i64,
    name: String,
    #[serde(default)]
    source_type: Option<SourceType>,
}

#[derive(Debug, Deserialize)]
struct PlanEntryPayload {
    month: String,
    amount_cents: i64,
}

#[derive(Debug, Deserialize)]
struct SourcePayload {
    owner_id: i64,
    category_id: i64,
    kind: SourceKind,
    label: String,
    #[serde(default = "default_status")]
    status: SourceStatus,
    #[serde(default = "default_true")]
    include_in_plan: bool,
    #[serde(default)]
    is_negotiated: bool,
    #[serde(default = "default_frequency")]
    frequency: String,
    amount_cents: i64,
    start_month: String,
    #[serde(default)]
    end_month: Option<String>,
    #[serde(default)]
    installment_count: Option<u32>,
    #[serde(default)]
    plan_entries: Option<Vec<PlanEntryPayload>>,
}

fn default_status() -> SourceStatus {
    SourceStatus::Active
}

fn default_true() -> bool {
    true
}

fn default_frequency() -> String {
    "monthly".to_string()
}

impl SourcePayload {
    fn into_source(self) -> Result<AutoSource, BudgetError> {
        if self.label.trim().is_empty() {
            return Err(BudgetError::validation("label must not be empty"));
        }
        if self.amount_cents < 0 {
            return Err(BudgetError::validation("amount_cents must be >= 0"));
        }
        let frequency = match self.frequency.as_str() {
            "monthly" => Frequency::Monthly,
            "biweekly" => Frequency::Biweekly,
            "installments" => {
                let count = self.installment_count.ok_or_else(|| {
                    BudgetError::validation(
                        "installment_count is required for installments frequency",
                    )
                })?;
                if count == 0 {
                    return Err(BudgetError::validation("installment_count must be >= 1"));
                }
                Frequency::Installments(count)
            }
            other => {
                return Err(BudgetError::validation(format!(
                    "unknown frequency '{other}', expected monthly, biweekly or installments"
                )));
            }
        };
        let start = parse_month(&self.start_month)?;
        let end = self.end_month.as_deref().map(parse_month).transpose()?;
        let plan_entries = self
            .plan_entries
            .map(|entries| {
                entries
                    .into_iter()
                    .map(|entry| {
                        Ok(PlanEntry {
                            month: parse_month(&entry.month)?,
                            amount_cents: entry.amount_cents,
                        })
                    })
                    .collect::<Result<Vec<_>, BudgetError>>()
            })
            .transpose()?;

        Ok(AutoSource {
            id: 0,
            owner_id: self.owner_id,
            category_id: self.category_id,
            kind: self.kind,
            label: self.label.trim().to_string(),
            status: self.status,
            include_in_plan: self.include_in_plan,
            is_negotiated: self.is_negotiated,
            schedule: ContributionSchedule {
                frequency,
                amount_cents: self.amount_cents,
                start,
                end,
                plan_entries,
            },
        })
    }
}

// ---- responses ----

#[derive(Debug, Serialize)]
struct MinimumResponse {
    minimum_cents: i64,
    minimum_amount: String,
    sources: Vec<MinimumSource>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_type: Option<SourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources: Option<Vec<MinimumSource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

impl ErrorBody {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            source_type: None,
            minimum_cents: None,
            minimum_amount: None,
            sources: None,
            suggestion: None,
        }
    }
}

fn error_to_response(err: BudgetError) -> Response {
    match err {
        BudgetError::Validation(_) => {
            json_response(StatusCode::BAD_REQUEST, ErrorBody::message(err.to_string()))
        }
        BudgetError::NotFound | BudgetError::CategoryNotFound => {
            json_response(StatusCode::NOT_FOUND, ErrorBody::message(err.to_string()))
        }
        BudgetError::NotEditable { source_type } | BudgetError::AutomaticCategory { source_type } => {
            let mut body = ErrorBody::message(err.to_string());
            body.source_type = Some(source_type);
            json_response(StatusCode::BAD_REQUEST, body)
        }
        BudgetError::BelowMinimum {
            minimum_cents,
            sources,
            sources_text,
            suggestion,
        } => {
            let error = if sources_text.is_empty() {
                format!("planned amount is below the automatic minimum of {}", format_cents(minimum_cents))
            } else {
                format!(
                    "planned amount is below the automatic minimum of {}: {sources_text}",
                    format_cents(minimum_cents)
                )
            };
            json_response(
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error,
                    source_type: None,
                    minimum_cents: Some(minimum_cents),
                    minimum_amount: Some(format_cents(minimum_cents)),
                    sources: Some(sources),
                    suggestion: Some(suggestion),
                },
            )
        }
        BudgetError::Storage(e) => {
            error!(error = %e, "storage failure while handling request");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::message("internal storage error"),
            )
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

fn parse_month(s: &str) -> Result<MonthKey, BudgetError> {
    s.parse().map_err(BudgetError::Validation)
}

// ---- handlers ----

async fn not_found_handler() -> Response {
    json_response(StatusCode::NOT_FOUND, ErrorBody::message("not found"))
}

async fn minimum_handler(
    State(service): State<AppState>,
    Query(query): Query<MinimumQuery>,
) -> Response {
    let result = parse_month(&query.month)
        .and_then(|month| service.minimum(query.owner_id, query.category_id, month));
    match result {
        Ok(floor) => json_response(
            StatusCode::OK,
            MinimumResponse {
                minimum_cents: floor.minimum_cents,
                minimum_amount: format_cents(floor.minimum_cents),
                sources: floor.sources,
            },
        ),
        Err(err) => error_to_response(err),
    }
}

async fn list_handler(State(service): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    let result = parse_month(&query.month)
        .and_then(|month| service.budgets_for_month(query.owner_id, month));
    match result {
        Ok(budgets) => json_response(StatusCode::OK, budgets),
        Err(err) => error_to_response(err),
    }
}

async fn create_handler(
    State(service): State<AppState>,
    Json(payload): Json<CreateBudgetPayload>,
) -> Response {
    let result = parse_month(&payload.month).and_then(|month| {
        service.create_budget(CreateBudget {
            owner_id: payload.owner_id,
            category_id: payload.category_id,
            month,
            amount_planned_cents: payload.amount_planned_cents,
            breakdown_items: payload.breakdown_items,
            is_projected: payload.is_projected,
        })
    });
    match result {
        Ok(budget) => json_response(StatusCode::CREATED, budget),
        Err(err) => error_to_response(err),
    }
}

async fn patch_handler(
    State(service): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<EditPayload>,
) -> Response {
    match service.patch_budget(id, &payload.into()) {
        Ok(budget) => json_response(StatusCode::OK, budget),
        Err(err) => error_to_response(err),
    }
}

async fn delete_handler(State(service): State<AppState>, Path(id): Path<i64>) -> Response {
    match service.delete_budget(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_to_response(err),
    }
}

async fn replicate_handler(
    State(service): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ReplicatePayload>,
) -> Response {
    let result = payload
        .horizon
        .resolve()
        .and_then(|horizon| service.replicate_budget(id, horizon, payload.overwrite));
    match result {
        Ok(outcome) => json_response(StatusCode::OK, outcome),
        Err(err) => error_to_response(err),
    }
}

async fn replicate_all_handler(
    State(service): State<AppState>,
    Json(payload): Json<ReplicateAllPayload>,
) -> Response {
    let result = parse_month(&payload.month).and_then(|month| {
        let horizon = payload.horizon.resolve()?;
        service.replicate_month(payload.owner_id, month, horizon, payload.overwrite)
    });
    match result {
        Ok(outcome) => json_response(StatusCode::OK, outcome),
        Err(err) => error_to_response(err),
    }
}

async fn replicate_category_handler(
    State(service): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ReplicateCategoryPayload>,
) -> Response {
    let result = parse_month(&payload.start_month).and_then(|start| {
        let end = parse_month(&payload.end_month)?;
        service.replicate_category(
            id,
            payload.owner_id,
            start,
            end,
            payload.initial_amount_cents,
            payload.overwrite,
        )
    });
    match result {
        Ok(outcome) => json_response(StatusCode::OK, outcome),
        Err(err) => error_to_response(err),
    }
}

async fn create_category_handler(
    State(service): State<AppState>,
    Json(payload): Json<CreateCategoryPayload>,
) -> Response {
    match service.create_category(payload.owner_id, &payload.name, payload.source_type) {
        Ok(category) => json_response(StatusCode::CREATED, category),
        Err(err) => error_to_response(err),
    }
}

async fn register_source_handler(
    State(service): State<AppState>,
    Json(payload): Json<SourcePayload>,
) -> Response {
    let result = payload
        .into_source()
        .and_then(|source| service.register_source(&source));
    match result {
        Ok(registration) => json_response(StatusCode::CREATED, registration),
        Err(err) => error_to_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("valid json body")
    }

    #[test]
    fn horizon_payload_requires_exactly_one_form() {
        let both = HorizonPayload {
            months: Some(3),
            end_month: Some("2025-06".to_string()),
        };
        assert!(both.resolve().is_err());
        assert!(HorizonPayload::default().resolve().is_err());

        let by_count = HorizonPayload { months: Some(3), end_month: None };
        assert_eq!(by_count.resolve().expect("valid"), Horizon::Months(3));

        let by_end = HorizonPayload {
            months: None,
            end_month: Some("2025-06".to_string()),
        };
        assert_eq!(
            by_end.resolve().expect("valid"),
            Horizon::Until(MonthKey { year: 2025, month: 6 })
        );
    }

    #[test]
    fn replicate_payload_parses_flattened_horizon() {
        let payload: ReplicatePayload =
            serde_json::from_str(r#"{"months": 6, "overwrite": true}"#).expect("parses");
        assert_eq!(payload.horizon.resolve().expect("valid"), Horizon::Months(6));
        assert!(payload.overwrite);

        let payload: ReplicatePayload =
            serde_json::from_str(r#"{"end_month": "2026-01"}"#).expect("parses");
        assert!(!payload.overwrite);
        assert!(matches!(payload.horizon.resolve(), Ok(Horizon::Until(_))));
    }

    #[test]
    fn source_payload_validates_frequency_details() {
        let json = r#"{
            "owner_id": 1, "category_id": 7, "kind": "debt", "label": "Car loan",
            "is_negotiated": true, "frequency": "installments", "installment_count": 12,
            "amount_cents": 15000, "start_month": "2025-03"
        }"#;
        let source = serde_json::from_str::<SourcePayload>(json)
            .expect("parses")
            .into_source()
            .expect("valid source");
        assert_eq!(source.kind, SourceKind::Debt);
        assert_eq!(source.schedule.frequency, Frequency::Installments(12));
        assert_eq!(source.status, SourceStatus::Active);
        assert!(source.include_in_plan);

        let missing_count = r#"{
            "owner_id": 1, "category_id": 7, "kind": "debt", "label": "Car loan",
            "frequency": "installments", "amount_cents": 15000, "start_month": "2025-03"
        }"#;
        let err = serde_json::from_str::<SourcePayload>(missing_count)
            .expect("parses")
            .into_source()
            .expect_err("must reject");
        assert!(matches!(err, BudgetError::Validation(_)));
    }

    #[test]
    fn source_payload_accepts_custom_plan_entries() {
        let json = r#"{
            "owner_id": 1, "category_id": 7, "kind": "goal", "label": "Vacation",
            "amount_cents": 20000, "start_month": "2025-01",
            "plan_entries": [{"month": "2025-03", "amount_cents": 7500}]
        }"#;
        let source = serde_json::from_str::<SourcePayload>(json)
            .expect("parses")
            .into_source()
            .expect("valid source");
        let entries = source.schedule.plan_entries.expect("entries kept");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].month, MonthKey { year: 2025, month: 3 });
    }

    #[tokio::test]
    async fn below_minimum_maps_to_structured_400() {
        let err = BudgetError::BelowMinimum {
            minimum_cents: 35_000,
            sources: vec![
                MinimumSource { label: "Emergency fund".to_string(), amount_cents: 20_000 },
                MinimumSource { label: "Car loan".to_string(), amount_cents: 15_000 },
            ],
            sources_text: "Emergency fund (200.00) + Car loan (150.00)".to_string(),
            suggestion: "To plan less than the minimum, remove these sources from automatic budgeting first: Emergency fund, Car loan".to_string(),
        };
        let response = error_to_response(err);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["minimum_cents"], 35_000);
        assert_eq!(body["minimum_amount"], "350.00");
        assert_eq!(body["sources"].as_array().expect("array").len(), 2);
        assert!(body["error"].as_str().expect("string").contains("Emergency fund (200.00)"));
        assert!(body["suggestion"].as_str().expect("string").contains("Car loan"));
    }

    #[tokio::test]
    async fn error_statuses_follow_the_taxonomy() {
        let response = error_to_response(BudgetError::NotFound);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = error_to_response(BudgetError::NotEditable {
            source_type: SourceType::Debt,
        });
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["source_type"], "debt");

        let response = error_to_response(BudgetError::validation("bad input"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn minimum_endpoint_reports_floor_and_sources() {
        let service = Arc::new(BudgetService::new(
            Store::open_in_memory().expect("open store"),
            Arc::new(InMemoryProjectionCache::new()),
        ));
        let category = service
            .create_category(1, "Savings", None)
            .expect("category");
        let source = SourcePayload {
            owner_id: 1,
            category_id: category.id,
            kind: SourceKind::Goal,
            label: "Emergency fund".to_string(),
            status: SourceStatus::Active,
            include_in_plan: true,
            is_negotiated: false,
            frequency: "monthly".to_string(),
            amount_cents: 20_000,
            start_month: "2025-01".to_string(),
            end_month: None,
            installment_count: None,
            plan_entries: None,
        };
        service
            .register_source(&source.into_source().expect("valid"))
            .expect("register");

        let response = minimum_handler(
            State(service),
            Query(MinimumQuery {
                owner_id: 1,
                category_id: category.id,
                month: "2025-03".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["minimum_cents"], 20_000);
        assert_eq!(body["minimum_amount"], "200.00");
        assert_eq!(body["sources"][0]["label"], "Emergency fund");
    }

    #[tokio::test]
    async fn invalid_month_string_is_a_400() {
        let service = Arc::new(BudgetService::new(
            Store::open_in_memory().expect("open store"),
            Arc::new(InMemoryProjectionCache::new()),
        ));
        let response = minimum_handler(
            State(service),
            Query(MinimumQuery {
                owner_id: 1,
                category_id: 1,
                month: "march".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
