//! HTTP API for the payroll engine.
//!
//! A thin [`axum`](https://crates.io/crates/axum) surface over the
//! calculator and the payroll ledger.  All state is built once by
//! [`build_state`] and passed into the router; handlers only translate
//! between JSON and library calls.

use crate::config::Settings;
use crate::engine::run_payroll;
use crate::error::PayrollError;
use crate::ledger::{PayrollEntry, PayrollFilter, PayrollLedger, PayrollSummary, TaxReport};
use crate::lifecycle::{NewPayroll, PayrollRecord, PayrollUpdate};
use crate::models::{PayRunInput, PayRunResult};
use crate::rules::{RuleBook, TaxRuleSet};
use crate::tax::{JamaicaCalculator, TaxCalculator};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state shared across requests.
pub struct AppState {
    pub rules: RuleBook,
    pub calculator: Arc<dyn TaxCalculator>,
    pub ledger: RwLock<PayrollLedger>,
}

impl AppState {
    pub fn new(rules: RuleBook, calculator: Arc<dyn TaxCalculator>) -> Self {
        Self {
            rules,
            calculator,
            ledger: RwLock::new(PayrollLedger::new()),
        }
    }
}

/// Build the rule book (national defaults plus on-disk overrides) and
/// the calculator described by `settings`.
pub fn build_state(settings: &Settings) -> Result<Arc<AppState>> {
    let mut rules = RuleBook::new(TaxRuleSet::jamaica(settings.tax_year))
        .context("national default rule set is invalid")?;
    let loaded = rules.load_overrides(&settings.rules_dir)?;
    tracing::info!(
        overrides = loaded,
        dir = %settings.rules_dir.display(),
        tax_year = settings.tax_year,
        "tax rules loaded"
    );
    let calculator: Arc<dyn TaxCalculator> = Arc::new(JamaicaCalculator::new(settings.annualization));
    Ok(Arc::new(AppState::new(rules, calculator)))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/calculate", post(calculate_run))
        .route(
            "/api/businesses/:business_id/payrolls",
            get(list_payrolls).post(create_payroll),
        )
        .route(
            "/api/businesses/:business_id/payrolls/:id",
            get(payroll_detail).put(update_payroll).delete(delete_payroll),
        )
        .route(
            "/api/businesses/:business_id/payrolls/:id/calculate",
            post(calculate_payroll),
        )
        .route(
            "/api/businesses/:business_id/payrolls/:id/approve",
            post(approve_payroll),
        )
        .route(
            "/api/businesses/:business_id/payrolls/:id/mark-paid",
            post(mark_payroll_paid),
        )
        .route(
            "/api/businesses/:business_id/payrolls/:id/cancel",
            post(cancel_payroll),
        )
        .route(
            "/api/businesses/:business_id/payroll-summary",
            get(payroll_summary),
        )
        .route("/api/businesses/:business_id/tax-report", get(tax_report))
        .with_state(state)
}

impl IntoResponse for PayrollError {
    fn into_response(self) -> Response {
        let status = match &self {
            PayrollError::Validation(_) => StatusCode::BAD_REQUEST,
            PayrollError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PayrollError::InvalidTransition { .. } | PayrollError::Conflict(_) => StatusCode::CONFLICT,
            PayrollError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, PayrollError>;

#[derive(Debug, Deserialize)]
struct ApproveRequest {
    approver: String,
    #[serde(default)]
    comment: String,
}

#[derive(Debug, Deserialize)]
struct MarkPaidRequest {
    processor: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DateRange {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

/// POST /api/calculate
async fn calculate_run(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PayRunInput>,
) -> ApiResult<Json<PayRunResult>> {
    let result = run_payroll(&input, &state.rules, state.calculator.as_ref())?;
    Ok(Json(result))
}

async fn list_payrolls(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
    Query(filter): Query<PayrollFilter>,
) -> Json<Vec<PayrollEntry>> {
    let ledger = state.ledger.read().await;
    let entries = ledger
        .list(&business_id, &filter)
        .into_iter()
        .map(PayrollEntry::from)
        .collect();
    Json(entries)
}

async fn create_payroll(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
    Json(new): Json<NewPayroll>,
) -> ApiResult<(StatusCode, Json<PayrollRecord>)> {
    let rules = state.rules.rules_for(&business_id);
    let mut ledger = state.ledger.write().await;
    let record = ledger
        .create(&business_id, new, state.calculator.as_ref(), rules)?
        .clone();
    Ok((StatusCode::CREATED, Json(record)))
}

async fn payroll_detail(
    State(state): State<Arc<AppState>>,
    Path((business_id, id)): Path<(String, u64)>,
) -> ApiResult<Json<PayrollRecord>> {
    let ledger = state.ledger.read().await;
    Ok(Json(ledger.get(&business_id, id)?.clone()))
}

async fn update_payroll(
    State(state): State<Arc<AppState>>,
    Path((business_id, id)): Path<(String, u64)>,
    Json(update): Json<PayrollUpdate>,
) -> ApiResult<Json<PayrollRecord>> {
    let rules = state.rules.rules_for(&business_id);
    let mut ledger = state.ledger.write().await;
    let record = ledger.update(&business_id, id, update, state.calculator.as_ref(), rules)?;
    Ok(Json(record.clone()))
}

async fn delete_payroll(
    State(state): State<Arc<AppState>>,
    Path((business_id, id)): Path<(String, u64)>,
) -> ApiResult<StatusCode> {
    let mut ledger = state.ledger.write().await;
    ledger.delete(&business_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn calculate_payroll(
    State(state): State<Arc<AppState>>,
    Path((business_id, id)): Path<(String, u64)>,
) -> ApiResult<Json<PayrollRecord>> {
    let rules = state.rules.rules_for(&business_id);
    let mut ledger = state.ledger.write().await;
    let record = ledger.calculate(&business_id, id, state.calculator.as_ref(), rules)?;
    Ok(Json(record.clone()))
}

async fn approve_payroll(
    State(state): State<Arc<AppState>>,
    Path((business_id, id)): Path<(String, u64)>,
    Json(req): Json<ApproveRequest>,
) -> ApiResult<Json<PayrollRecord>> {
    let mut ledger = state.ledger.write().await;
    ledger.approve(&business_id, id, &req.approver, &req.comment)?;
    Ok(Json(ledger.get(&business_id, id)?.clone()))
}

async fn mark_payroll_paid(
    State(state): State<Arc<AppState>>,
    Path((business_id, id)): Path<(String, u64)>,
    Json(req): Json<MarkPaidRequest>,
) -> ApiResult<Json<PayrollRecord>> {
    let mut ledger = state.ledger.write().await;
    Ok(Json(ledger.mark_paid(&business_id, id, &req.processor)?.clone()))
}

async fn cancel_payroll(
    State(state): State<Arc<AppState>>,
    Path((business_id, id)): Path<(String, u64)>,
) -> ApiResult<Json<PayrollRecord>> {
    let mut ledger = state.ledger.write().await;
    Ok(Json(ledger.cancel(&business_id, id)?.clone()))
}

async fn payroll_summary(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
    Query(range): Query<DateRange>,
) -> Json<PayrollSummary> {
    let ledger = state.ledger.read().await;
    Json(ledger.summary(&business_id, range.start_date, range.end_date))
}

async fn tax_report(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
    Query(range): Query<DateRange>,
) -> ApiResult<Json<TaxReport>> {
    let (Some(start), Some(end)) = (range.start_date, range.end_date) else {
        return Err(PayrollError::validation(
            "start_date and end_date are required for tax reports",
        ));
    };
    let ledger = state.ledger.read().await;
    Ok(Json(ledger.tax_report(&business_id, start, end)?))
}

/// Launch the API server and block until it terminates.
pub async fn serve(settings: Settings) -> Result<()> {
    let state = build_state(&settings)?;
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.bind_addr))?;
    tracing::info!(addr = %settings.bind_addr, "payroll server listening");
    axum::serve(listener, router).await.context("server error")
}
