//! JSON HTTP layer over a dataset loaded once at startup.

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::input::Dataset;
use crate::model::params::AnalysisParams;
use crate::pipeline::stage1_rfm::{RfmTable, compute_rfm};
use crate::pipeline::stage5_risk::RiskModel;

pub mod error;
pub mod health;
pub mod inventory;
pub mod marketing;
pub mod overview;
pub mod sales;

use error::{ApiError, ApiResult};

/// Shared read-only state; cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub dataset: Arc<Dataset>,
    pub params: Arc<AnalysisParams>,
    pub rfm: Arc<RfmTable>,
    pub risk: Arc<RiskModel>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(dataset: Dataset, params: AnalysisParams) -> Self {
        let rfm = compute_rfm(&dataset.sales_refs());
        let risk = RiskModel::build(&dataset);
        info!(
            "api state: sales={}, cancellations={}, customers={}",
            dataset.sales.len(),
            dataset.cancellations.len(),
            rfm.len()
        );
        Self {
            dataset: Arc::new(dataset),
            params: Arc::new(params),
            rfm: Arc::new(rfm),
            risk: Arc::new(risk),
            startup_time: Utc::now(),
        }
    }
}

/// Successful responses carry `"success": true` next to the payload fields.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> axum::Json<Envelope<T>> {
    axum::Json(Envelope {
        success: true,
        data,
    })
}

/// Runs CPU-heavy analysis off the async workers.
pub async fn run_blocking<T, F>(f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ApiResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("analysis task failed: {e}")))?
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::health_routes())
        .merge(marketing::marketing_routes())
        .merge(sales::sales_routes())
        .merge(inventory::inventory_routes())
        .merge(overview::overview_routes())
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, build_router(state)).await
}

#[cfg(test)]
#[path = "../../tests/src_inline/api/tests.rs"]
mod tests;
