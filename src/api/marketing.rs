use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::{AppState, Envelope, ok, run_blocking};
use crate::model::params::BasketParams;
use crate::model::segment::Segment;
use crate::pipeline::AnalysisError;
use crate::pipeline::stage1_rfm::{RfmQuantiles, RfmSummary};
use crate::pipeline::stage2_segments::{SegmentSummary, segment_customers};
use crate::pipeline::stage3_basket::{BasketResult, SegmentBundles, mine_bundles, segment_bundles};

#[derive(Debug, Serialize)]
pub struct RfmResponse {
    pub message: String,
    pub customers_analyzed: usize,
    pub summary: RfmSummary,
    pub quantiles: RfmQuantiles,
}

/// POST /calculate-rfm
pub async fn calculate_rfm(State(state): State<AppState>) -> ApiResult<Json<Envelope<RfmResponse>>> {
    if state.rfm.is_empty() {
        return Err(ApiError::NotFound(
            "no customer transactions found".to_string(),
        ));
    }
    Ok(ok(RfmResponse {
        message: "RFM calculation completed".to_string(),
        customers_analyzed: state.rfm.len(),
        summary: state.rfm.summary(),
        quantiles: state.rfm.quantiles,
    }))
}

#[derive(Debug, Serialize)]
pub struct SegmentationResponse {
    pub n_segments: usize,
    pub total_customers: usize,
    pub segments: Vec<SegmentSummary>,
}

fn segmentation(state: &AppState) -> ApiResult<SegmentationResponse> {
    if state.rfm.is_empty() {
        return Err(AnalysisError::NotEnoughData(
            "segmentation needs customers with an id".to_string(),
        )
        .into());
    }
    let segments = segment_customers(&state.rfm);
    Ok(SegmentationResponse {
        n_segments: segments.len(),
        total_customers: state.rfm.len(),
        segments,
    })
}

/// POST /run-segmentation
pub async fn run_segmentation(
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<SegmentationResponse>>> {
    segmentation(&state).map(ok)
}

/// GET /segment-overview
pub async fn segment_overview(
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<SegmentationResponse>>> {
    segmentation(&state).map(ok)
}

/// Mining overrides; absent fields fall back to the loaded profile.
#[derive(Debug, Default, Deserialize)]
pub struct BasketRequest {
    pub segment: Option<String>,
    pub segment_id: Option<usize>,
    pub min_support: Option<f64>,
    pub min_confidence: Option<f64>,
    pub top_n: Option<usize>,
}

impl BasketRequest {
    fn params(&self, base: &BasketParams) -> BasketParams {
        BasketParams {
            min_support: self.min_support.unwrap_or(base.min_support),
            min_confidence: self.min_confidence.unwrap_or(base.min_confidence),
            top_n: self.top_n.unwrap_or(base.top_n),
            ..base.clone()
        }
    }

    fn segment(&self) -> ApiResult<Option<Segment>> {
        match (&self.segment, self.segment_id) {
            (Some(name), _) => Segment::from_name(name)
                .map(Some)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown segment: {name}"))),
            (None, Some(id)) => Segment::from_id(id)
                .map(Some)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown segment id: {id}"))),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BasketResponse {
    #[serde(flatten)]
    pub result: BasketResult,
    pub parameters: BasketParams,
}

async fn mine(state: AppState, request: BasketRequest) -> ApiResult<BasketResponse> {
    let params = request.params(&state.params.basket);
    params.validate()?;
    let segment = request.segment()?;
    info!(
        "basket request: min_support={}, min_confidence={}, top_n={}, segment={:?}",
        params.min_support, params.min_confidence, params.top_n, segment
    );
    run_blocking(move || {
        let result = match segment {
            Some(segment) => segment_bundles(&state.dataset, &state.rfm, segment, &params)?.result,
            None => mine_bundles(&state.dataset.sales_refs(), &params)?,
        };
        Ok(BasketResponse {
            result,
            parameters: params,
        })
    })
    .await
}

/// POST /market-basket-analysis
pub async fn market_basket_analysis(
    State(state): State<AppState>,
    request: Result<Json<BasketRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<BasketResponse>>> {
    let Json(request) = request?;
    mine(state, request).await.map(ok)
}

/// POST /product-bundles; parameters come from the query string.
pub async fn product_bundles(
    State(state): State<AppState>,
    request: Result<Query<BasketRequest>, QueryRejection>,
) -> ApiResult<Json<Envelope<BasketResponse>>> {
    let Query(request) = request?;
    mine(state, request).await.map(ok)
}

/// POST /segment-basket-analysis
pub async fn segment_basket_analysis(
    State(state): State<AppState>,
    request: Result<Json<BasketRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<SegmentBundles>>> {
    let Json(request) = request?;
    let Some(segment) = request.segment()? else {
        return Err(ApiError::BadRequest(
            "segment or segment_id is required".to_string(),
        ));
    };
    let params = request.params(&state.params.basket);
    params.validate()?;
    let result = run_blocking(move || {
        Ok(segment_bundles(
            &state.dataset,
            &state.rfm,
            segment,
            &params,
        )?)
    })
    .await?;
    Ok(ok(result))
}

pub fn marketing_routes() -> Router<AppState> {
    Router::new()
        .route("/calculate-rfm", post(calculate_rfm))
        .route("/run-segmentation", post(run_segmentation))
        .route("/segment-overview", get(segment_overview))
        .route("/market-basket-analysis", post(market_basket_analysis))
        .route("/segment-basket-analysis", post(segment_basket_analysis))
        .route("/product-bundles", post(product_bundles))
}
