use std::cmp::Ordering;

use serde::Serialize;

use crate::input::LoadStats;
use crate::model::params::AnalysisParams;
use crate::pipeline::stage3_basket::Bundle;
use crate::pipeline::stage6_overview::{Kpis, MonthlyTrendItem};

pub mod json;
pub mod text;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSummary {
    pub source: String,
    pub stats: LoadStats,
    pub customers: usize,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentStat {
    pub name: String,
    pub customers: usize,
    pub share_pct: f64,
    pub total_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasketStat {
    pub transactions: usize,
    pub items: usize,
    pub frequent_itemsets: usize,
    pub total_rules: usize,
    pub top_bundle: Option<Bundle>,
    pub message: Option<String>,
}

/// Contents of `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryData {
    pub tool: String,
    pub version: String,
    pub input: InputSummary,
    pub params: AnalysisParams,
    pub reference_date: Option<String>,
    pub segments: Vec<SegmentStat>,
    pub basket: BasketStat,
    pub kpis: Option<Kpis>,
    pub monthly_trend: Vec<MonthlyTrendItem>,
}

/// Values `report.txt` is rendered from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportContext {
    pub tool: String,
    pub version: String,
    pub source: String,
    pub raw_rows: u64,
    pub sales_rows: u64,
    pub cancelled_rows: u64,
    pub missing_customer_rows: u64,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
    pub customers: usize,
    pub segments: Vec<SegmentStat>,
    pub basket: BasketStat,
    pub top_bundles: Vec<Bundle>,
    pub kpis: Option<Kpis>,
    pub best_month: Option<MonthlyTrendItem>,
    pub worst_month: Option<MonthlyTrendItem>,
    pub months: usize,
}

pub fn format_f64_6(v: f64) -> String {
    format!("{:.6}", v)
}

pub fn round_to(v: f64, decimals: i32) -> f64 {
    if !v.is_finite() {
        return v;
    }
    let scale = 10f64.powi(decimals);
    (v * scale).round() / scale
}

pub fn round2(v: f64) -> f64 {
    round_to(v, 2)
}

pub fn round4(v: f64) -> f64 {
    round_to(v, 4)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Linear interpolation between closest ranks on an already sorted slice.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn quantile_linear(values: &[f64], p: f64) -> f64 {
    quantile_sorted(&sorted_copy(values), p)
}

pub fn median(values: &[f64]) -> f64 {
    quantile_linear(values, 0.5)
}

pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

pub fn percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    part / whole * 100.0
}

/// Truncates to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/report/mod.rs"]
mod tests;
