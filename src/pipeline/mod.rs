use thiserror::Error;

use crate::model::params::ParamError;

pub mod apriori;
pub mod stage1_rfm;
pub mod stage2_segments;
pub mod stage3_basket;
pub mod stage4_recommend;
pub mod stage5_risk;
pub mod stage6_overview;
pub mod stage7_report;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not enough data: {0}")]
    NotEnoughData(String),
    #[error(transparent)]
    Params(#[from] ParamError),
}
