use axum::{Json, Router, extract::State, routing::get};
use chrono::Utc;
use serde::Serialize;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::input::DateRangeInfo;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub sales_rows: usize,
    pub customers: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        sales_rows: state.dataset.sales.len(),
        customers: state.rfm.len(),
    })
}

#[derive(Debug, Serialize)]
pub struct ServiceIndex {
    pub service: String,
    pub version: String,
    pub endpoints: Vec<&'static str>,
}

pub const ENDPOINTS: &[&str] = &[
    "GET /health",
    "GET /date-range-info",
    "POST /calculate-rfm",
    "POST /run-segmentation",
    "GET /segment-overview",
    "POST /market-basket-analysis",
    "POST /segment-basket-analysis",
    "POST /product-bundles",
    "GET /product-search",
    "POST /generate-recommendations",
    "POST /cross-sell-insights",
    "GET /customer-info/:customer_id",
    "POST /product-network",
    "GET /customer-recommendations/:customer_id",
    "GET /top-bundles",
    "POST /calculate-risk-score",
    "POST /simulate-policy",
    "POST /find-optimal-threshold",
    "GET /risk-distribution",
    "POST /kpis",
    "POST /monthly-trend",
    "POST /top-countries",
    "POST /top-products",
    "POST /revenue-summary",
    "GET /revenue-forecast",
];

/// GET /
pub async fn index() -> Json<ServiceIndex> {
    Json(ServiceIndex {
        service: "Retail decision support".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: ENDPOINTS.to_vec(),
    })
}

/// GET /date-range-info
pub async fn date_range_info(State(state): State<AppState>) -> ApiResult<Json<DateRangeInfo>> {
    state
        .dataset
        .date_range_info()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no dated transactions loaded".to_string()))
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(index))
        .route("/date-range-info", get(date_range_info))
}
