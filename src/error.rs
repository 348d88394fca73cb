use thiserror::Error;

use crate::input::InputError;
use crate::model::params::ParamError;
use crate::pipeline::AnalysisError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid argument: {0}")]
    Usage(String),
}
