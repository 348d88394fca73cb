use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("invalid config {path}: {message}")]
    Config { path: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ParamError> {
    if value.is_nan() || value < min || value > max {
        return Err(ParamError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasketParams {
    pub min_support: f64,
    pub min_confidence: f64,
    pub top_n: usize,
    /// Only the most frequent items enter the item/transaction matrix.
    pub top_items: usize,
    /// Only the most recent rows are mined.
    pub max_rows: usize,
    pub max_len: Option<usize>,
}

impl Default for BasketParams {
    fn default() -> Self {
        Self {
            min_support: 0.01,
            min_confidence: 0.3,
            top_n: 10,
            top_items: 100,
            max_rows: 50_000,
            max_len: None,
        }
    }
}

impl BasketParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_range("min_support", self.min_support, 0.001, 0.5)?;
        check_range("min_confidence", self.min_confidence, 0.1, 1.0)?;
        check_range("top_n", self.top_n as f64, 1.0, 50.0)?;
        check_range("top_items", self.top_items as f64, 2.0, 10_000.0)?;
        check_range("max_rows", self.max_rows as f64, 1.0, 10_000_000.0)?;
        if let Some(max_len) = self.max_len {
            check_range("max_len", max_len as f64, 2.0, 10.0)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendParams {
    pub min_support: f64,
    pub confidence_threshold: f64,
    pub top_n: usize,
    pub top_items: usize,
    pub max_rows: usize,
}

impl Default for RecommendParams {
    fn default() -> Self {
        Self {
            min_support: 0.01,
            confidence_threshold: 0.3,
            top_n: 5,
            top_items: 50,
            max_rows: 10_000,
        }
    }
}

impl RecommendParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_range("min_support", self.min_support, 0.001, 0.5)?;
        check_range(
            "confidence_threshold",
            self.confidence_threshold,
            0.1,
            1.0,
        )?;
        check_range("top_n", self.top_n as f64, 1.0, 20.0)?;
        check_range("top_items", self.top_items as f64, 2.0, 10_000.0)?;
        check_range("max_rows", self.max_rows as f64, 1.0, 10_000_000.0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyParams {
    pub threshold_tau: f64,
    pub return_processing_cost: f64,
    pub conversion_impact: f64,
    pub sample_size: usize,
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            threshold_tau: 50.0,
            return_processing_cost: 10.0,
            conversion_impact: 0.2,
            sample_size: 1000,
        }
    }
}

impl PolicyParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_range("threshold_tau", self.threshold_tau, 0.0, 100.0)?;
        check_range(
            "return_processing_cost",
            self.return_processing_cost,
            0.0,
            f64::MAX,
        )?;
        check_range("conversion_impact", self.conversion_impact, 0.0, 1.0)?;
        check_range("sample_size", self.sample_size as f64, 1.0, 1_000_000.0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverviewParams {
    pub top_n: usize,
    pub exclude_cancelled: bool,
    pub forecast_horizon: usize,
}

impl Default for OverviewParams {
    fn default() -> Self {
        Self {
            top_n: 10,
            exclude_cancelled: true,
            forecast_horizon: 3,
        }
    }
}

impl OverviewParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_range("top_n", self.top_n as f64, 5.0, 50.0)?;
        check_range("forecast_horizon", self.forecast_horizon as f64, 1.0, 24.0)?;
        Ok(())
    }
}

/// Analysis defaults, optionally overridden section by section from a TOML profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    pub basket: BasketParams,
    pub recommend: RecommendParams,
    pub risk: PolicyParams,
    pub overview: OverviewParams,
}

impl AnalysisParams {
    pub fn from_toml_str(raw: &str, origin: &str) -> Result<Self, ParamError> {
        let params: AnalysisParams = toml::from_str(raw).map_err(|e| ParamError::Config {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        params.validate()?;
        Ok(params)
    }

    pub fn load(path: &Path) -> Result<Self, ParamError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw, &path.display().to_string())
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        self.basket.validate()?;
        self.recommend.validate()?;
        self.risk.validate()?;
        self.overview.validate()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/params.rs"]
mod tests;
