use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::{AppState, Envelope, ok, run_blocking};
use crate::model::params::PolicyParams;
use crate::pipeline::stage5_risk::{
    OptimalThreshold, OrderInput, PolicySimulation, RiskAssessment, RiskDistribution,
    find_optimal_threshold, risk_distribution, simulate_policy,
};

#[derive(Debug, Deserialize)]
pub struct RiskScoreRequest {
    pub customer_id: Option<String>,
    pub stock_code: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub country: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RiskScoreResponse {
    pub customer_id: Option<String>,
    pub stock_code: String,
    #[serde(flatten)]
    pub assessment: RiskAssessment,
}

/// POST /calculate-risk-score
pub async fn calculate_risk_score(
    State(state): State<AppState>,
    request: Result<Json<RiskScoreRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<RiskScoreResponse>>> {
    let Json(request) = request?;
    if request.stock_code.trim().is_empty() {
        return Err(ApiError::BadRequest("stock_code is required".to_string()));
    }
    if request.quantity <= 0 || request.unit_price.is_nan() || request.unit_price <= 0.0 {
        return Err(ApiError::BadRequest(
            "quantity and unit_price must be positive".to_string(),
        ));
    }
    let order = OrderInput {
        customer_id: request
            .customer_id
            .as_deref()
            .and_then(crate::input::csv::normalize_customer_id),
        stock_code: request.stock_code.trim().to_ascii_uppercase(),
        quantity: request.quantity,
        unit_price: request.unit_price,
    };
    let assessment = state.risk.score(&order);
    tracing::debug!(
        stock_code = %order.stock_code,
        country = request.country.as_deref().unwrap_or("Unknown"),
        risk = assessment.risk_score,
        "scored order"
    );
    Ok(ok(RiskScoreResponse {
        customer_id: order.customer_id,
        stock_code: order.stock_code,
        assessment,
    }))
}

/// Overrides for the risk profile; absent fields keep the loaded values.
#[derive(Debug, Default, Deserialize)]
pub struct PolicyRequest {
    pub threshold_tau: Option<f64>,
    pub return_processing_cost: Option<f64>,
    pub conversion_impact: Option<f64>,
    pub sample_size: Option<usize>,
}

impl PolicyRequest {
    fn params(&self, base: &PolicyParams) -> ApiResult<PolicyParams> {
        let params = PolicyParams {
            threshold_tau: self.threshold_tau.unwrap_or(base.threshold_tau),
            return_processing_cost: self
                .return_processing_cost
                .unwrap_or(base.return_processing_cost),
            conversion_impact: self.conversion_impact.unwrap_or(base.conversion_impact),
            sample_size: self.sample_size.unwrap_or(base.sample_size),
        };
        params.validate()?;
        Ok(params)
    }
}

/// POST /simulate-policy
pub async fn simulate(
    State(state): State<AppState>,
    request: Result<Json<PolicyRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<PolicySimulation>>> {
    let Json(request) = request?;
    let params = request.params(&state.params.risk)?;
    run_blocking(move || Ok(simulate_policy(&state.dataset, &state.risk, &params)?))
        .await
        .map(ok)
}

/// POST /find-optimal-threshold; parameters come from the query string.
pub async fn optimal_threshold(
    State(state): State<AppState>,
    request: Result<Query<PolicyRequest>, QueryRejection>,
) -> ApiResult<Json<Envelope<OptimalThreshold>>> {
    let Query(request) = request?;
    let params = request.params(&state.params.risk)?;
    run_blocking(move || Ok(find_optimal_threshold(&state.dataset, &state.risk, &params)?))
        .await
        .map(ok)
}

#[derive(Debug, Deserialize)]
pub struct DistributionQuery {
    pub sample_size: Option<usize>,
}

/// GET /risk-distribution
pub async fn distribution(
    State(state): State<AppState>,
    q: Result<Query<DistributionQuery>, QueryRejection>,
) -> ApiResult<Json<Envelope<RiskDistribution>>> {
    let Query(q) = q?;
    let sample_size = q.sample_size.unwrap_or(state.params.risk.sample_size);
    if sample_size == 0 {
        return Err(ApiError::BadRequest(
            "sample_size must be positive".to_string(),
        ));
    }
    run_blocking(move || Ok(risk_distribution(&state.dataset, &state.risk, sample_size)?))
        .await
        .map(ok)
}

pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/calculate-risk-score", post(calculate_risk_score))
        .route("/simulate-policy", post(simulate))
        .route("/find-optimal-threshold", post(optimal_threshold))
        .route("/risk-distribution", get(distribution))
}
