use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::{AppState, Envelope, ok, run_blocking};
use crate::model::params::RecommendParams;
use crate::pipeline::stage4_recommend::{
    CrossSellInsights, CustomerProfile, CustomerRecommendations, NetworkGraph, ProductRef,
    RecommendRequest, RecommendationResult, TopBundle, cross_sell_insights, customer_profile,
    customer_recommendations, product_network, recommend, suggest_products, top_bundles,
};

const SEARCH_LIMIT: usize = 10;
const MAX_NETWORK_RULES: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<ProductRef>,
    pub total: usize,
}

/// GET /product-search?query=...
pub async fn product_search(
    State(state): State<AppState>,
    q: Result<Query<SearchQuery>, QueryRejection>,
) -> ApiResult<Json<Envelope<SearchResponse>>> {
    let Query(q) = q?;
    if q.query.trim().chars().count() < 2 {
        return Err(ApiError::BadRequest(
            "query must be at least 2 characters".to_string(),
        ));
    }
    let results = suggest_products(&state.dataset.sales_refs(), &q.query, SEARCH_LIMIT);
    Ok(ok(SearchResponse {
        query: q.query,
        total: results.len(),
        results,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RecommendBody {
    /// Stock code or description fragment.
    #[serde(alias = "product_search", alias = "stock_code")]
    pub product: String,
    pub customer_id: Option<String>,
    pub confidence_threshold: Option<f64>,
    pub top_n: Option<usize>,
    pub min_support: Option<f64>,
}

impl RecommendBody {
    fn split(self, base: &RecommendParams) -> (RecommendRequest, RecommendParams) {
        let params = RecommendParams {
            min_support: self.min_support.unwrap_or(base.min_support),
            confidence_threshold: self.confidence_threshold.unwrap_or(base.confidence_threshold),
            top_n: self.top_n.unwrap_or(base.top_n),
            ..base.clone()
        };
        let request = RecommendRequest {
            product: self.product,
            customer_id: self.customer_id.filter(|c| !c.trim().is_empty()),
        };
        (request, params)
    }
}

async fn run_recommend(state: AppState, body: RecommendBody) -> ApiResult<RecommendationResult> {
    let (request, params) = body.split(&state.params.recommend);
    params.validate()?;
    run_blocking(move || Ok(recommend(&state.dataset.sales_refs(), &request, &params)?)).await
}

/// POST /generate-recommendations
pub async fn generate_recommendations(
    State(state): State<AppState>,
    body: Result<Json<RecommendBody>, JsonRejection>,
) -> ApiResult<Json<Envelope<RecommendationResult>>> {
    let Json(body) = body?;
    run_recommend(state, body).await.map(ok)
}

/// POST /cross-sell-insights
pub async fn cross_sell(
    State(state): State<AppState>,
    body: Result<Json<RecommendBody>, JsonRejection>,
) -> ApiResult<Json<Envelope<CrossSellInsights>>> {
    let Json(body) = body?;
    let result = run_recommend(state, body).await?;
    Ok(ok(cross_sell_insights(&result)))
}

/// GET /customer-info/:customer_id
pub async fn customer_info(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<CustomerProfile>> {
    let reference = state
        .rfm
        .reference_date
        .ok_or_else(|| ApiError::NotFound("no customer transactions loaded".to_string()))?;
    customer_profile(&state.dataset.sales_refs(), &customer_id, reference)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Customer {customer_id} not found")))
}

fn check_count(name: &str, value: usize, max: usize) -> ApiResult<()> {
    if value == 0 || value > max {
        return Err(ApiError::BadRequest(format!(
            "{name} must be within [1, {max}], got {value}"
        )));
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkRequest {
    #[serde(default)]
    pub stock_codes: Vec<String>,
    pub min_support: Option<f64>,
    pub min_confidence: Option<f64>,
    pub max_products: Option<usize>,
}

/// POST /product-network
pub async fn product_network_handler(
    State(state): State<AppState>,
    body: Result<Json<NetworkRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<NetworkGraph>>> {
    let Json(body) = body?;
    let max_rules = body.max_products.unwrap_or(20);
    check_count("max_products", max_rules, MAX_NETWORK_RULES)?;
    let base = &state.params.recommend;
    let params = RecommendParams {
        min_support: body.min_support.unwrap_or(base.min_support),
        confidence_threshold: body.min_confidence.unwrap_or(base.confidence_threshold),
        ..base.clone()
    };
    params.validate()?;
    run_blocking(move || {
        Ok(product_network(
            &state.dataset.sales_refs(),
            &body.stock_codes,
            max_rules,
            &params,
        )?)
    })
    .await
    .map(ok)
}

#[derive(Debug, Deserialize)]
pub struct TopNQuery {
    pub top_n: Option<usize>,
}

/// GET /customer-recommendations/:customer_id
pub async fn customer_recommendations_handler(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    q: Result<Query<TopNQuery>, QueryRejection>,
) -> ApiResult<Json<Envelope<CustomerRecommendations>>> {
    let Query(q) = q?;
    let top_n = q.top_n.unwrap_or(5);
    check_count("top_n", top_n, 20)?;
    run_blocking(move || {
        Ok(customer_recommendations(
            &state.dataset.sales_refs(),
            &customer_id,
            top_n,
            &state.params.recommend,
        )?)
    })
    .await
    .map(ok)
}

#[derive(Debug, Deserialize)]
pub struct TopBundlesQuery {
    pub min_support: Option<f64>,
    pub min_confidence: Option<f64>,
    pub top_n: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TopBundlesResponse {
    pub bundles: Vec<TopBundle>,
    pub total_bundles: usize,
}

/// GET /top-bundles
pub async fn top_bundles_handler(
    State(state): State<AppState>,
    q: Result<Query<TopBundlesQuery>, QueryRejection>,
) -> ApiResult<Json<Envelope<TopBundlesResponse>>> {
    let Query(q) = q?;
    let base = &state.params.recommend;
    let params = RecommendParams {
        min_support: q.min_support.unwrap_or(base.min_support),
        confidence_threshold: q.min_confidence.unwrap_or(base.confidence_threshold),
        top_n: q.top_n.unwrap_or(10),
        ..base.clone()
    };
    params.validate()?;
    let bundles =
        run_blocking(move || Ok(top_bundles(&state.dataset.sales_refs(), &params)?)).await?;
    Ok(ok(TopBundlesResponse {
        total_bundles: bundles.len(),
        bundles,
    }))
}

pub fn sales_routes() -> Router<AppState> {
    Router::new()
        .route("/product-search", get(product_search))
        .route("/generate-recommendations", post(generate_recommendations))
        .route("/cross-sell-insights", post(cross_sell))
        .route("/customer-info/:customer_id", get(customer_info))
        .route("/product-network", post(product_network_handler))
        .route(
            "/customer-recommendations/:customer_id",
            get(customer_recommendations_handler),
        )
        .route("/top-bundles", get(top_bundles_handler))
}
