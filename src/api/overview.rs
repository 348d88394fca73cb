use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::{AppState, Envelope, ok};
use crate::input::dates::parse_date_arg;
use crate::pipeline::stage6_overview::{
    Kpis, MonthlyTrendItem, OverviewFilter, RevenueForecast, RevenueSummary, TopItem, kpis,
    monthly_trend, revenue_forecast, revenue_summary, select_rows, top_countries, top_products,
};

#[derive(Debug, Default, Deserialize)]
pub struct FilterRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub countries: Option<Vec<String>>,
    pub top_n: Option<usize>,
    pub exclude_cancelled: Option<bool>,
}

fn parse_optional_date(raw: Option<&str>) -> ApiResult<Option<chrono::NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_date_arg(s).map(Some).map_err(ApiError::BadRequest),
        None => Ok(None),
    }
}

impl FilterRequest {
    fn to_filter(&self, state: &AppState) -> ApiResult<OverviewFilter> {
        let base = OverviewFilter::from_params(&state.params.overview);
        let filter = OverviewFilter {
            start_date: parse_optional_date(self.start_date.as_deref())?,
            end_date: parse_optional_date(self.end_date.as_deref())?,
            countries: self.countries.clone().unwrap_or_default(),
            top_n: self.top_n.unwrap_or(base.top_n),
            exclude_cancelled: self.exclude_cancelled.unwrap_or(base.exclude_cancelled),
        };
        filter.validate()?;
        Ok(filter)
    }
}

/// An empty body means "no filters"; anything else must be a valid filter object.
fn filter_from(state: &AppState, body: &[u8]) -> ApiResult<OverviewFilter> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return FilterRequest::default().to_filter(state);
    }
    let request: FilterRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid filter body: {e}")))?;
    request.to_filter(state)
}

/// POST /kpis
pub async fn kpis_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Kpis>> {
    let filter = filter_from(&state, &body)?;
    let rows = select_rows(&state.dataset, &filter);
    Ok(Json(kpis(&rows, filter.top_n)?))
}

#[derive(Debug, Serialize)]
pub struct TrendResponse {
    pub data: Vec<MonthlyTrendItem>,
    pub total_months: usize,
}

/// POST /monthly-trend
pub async fn monthly_trend_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Envelope<TrendResponse>>> {
    let filter = filter_from(&state, &body)?;
    let rows = select_rows(&state.dataset, &filter);
    let data = monthly_trend(&rows)?;
    Ok(ok(TrendResponse {
        total_months: data.len(),
        data,
    }))
}

#[derive(Debug, Serialize)]
pub struct TopResponse {
    pub data: Vec<TopItem>,
    pub top_n: usize,
}

/// POST /top-countries
pub async fn top_countries_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Envelope<TopResponse>>> {
    let filter = filter_from(&state, &body)?;
    let rows = select_rows(&state.dataset, &filter);
    Ok(ok(TopResponse {
        data: top_countries(&rows, filter.top_n)?,
        top_n: filter.top_n,
    }))
}

/// POST /top-products
pub async fn top_products_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Envelope<TopResponse>>> {
    let filter = filter_from(&state, &body)?;
    let rows = select_rows(&state.dataset, &filter);
    Ok(ok(TopResponse {
        data: top_products(&rows, filter.top_n)?,
        top_n: filter.top_n,
    }))
}

/// POST /revenue-summary
pub async fn revenue_summary_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Envelope<RevenueSummary>>> {
    let filter = filter_from(&state, &body)?;
    Ok(ok(revenue_summary(&state.dataset, &filter)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ForecastQuery {
    pub horizon: Option<usize>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// GET /revenue-forecast
pub async fn revenue_forecast_handler(
    State(state): State<AppState>,
    q: Result<Query<ForecastQuery>, QueryRejection>,
) -> ApiResult<Json<Envelope<RevenueForecast>>> {
    let Query(q) = q?;
    let horizon = q.horizon.unwrap_or(state.params.overview.forecast_horizon);
    if !(1..=24).contains(&horizon) {
        return Err(ApiError::BadRequest(format!(
            "horizon must be within [1, 24], got {horizon}"
        )));
    }
    let filter = FilterRequest {
        start_date: q.start_date,
        end_date: q.end_date,
        exclude_cancelled: Some(true),
        ..FilterRequest::default()
    }
    .to_filter(&state)?;
    let rows = select_rows(&state.dataset, &filter);
    Ok(ok(revenue_forecast(&rows, horizon)?))
}

pub fn overview_routes() -> Router<AppState> {
    Router::new()
        .route("/kpis", post(kpis_handler))
        .route("/monthly-trend", post(monthly_trend_handler))
        .route("/top-countries", post(top_countries_handler))
        .route("/top-products", post(top_products_handler))
        .route("/revenue-summary", post(revenue_summary_handler))
        .route("/revenue-forecast", get(revenue_forecast_handler))
}
