use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::info;

use crate::input::csv::normalize_customer_id;
use crate::input::{Dataset, Transaction};
use crate::model::labels::RiskLevel;
use crate::model::params::PolicyParams;
use crate::pipeline::AnalysisError;
use crate::report::{mean, median, population_std, round2};

const DEFAULT_CUSTOMER_RETURN_RATE: f64 = 30.0;
const DEFAULT_PRODUCT_RETURN_RATE: f64 = 20.0;
const EMPTY_DATASET_SCORE: f64 = 50.0;
const COST_RATIO: f64 = 0.3;
const TAU_STEP: usize = 5;

#[derive(Debug, Clone, Default, PartialEq)]
struct InvoiceCounts {
    sales: HashSet<String>,
    cancelled: HashSet<String>,
}

impl InvoiceCounts {
    fn return_rate(&self) -> Option<f64> {
        if self.sales.is_empty() {
            return None;
        }
        Some(self.cancelled.len() as f64 / self.sales.len() as f64 * 100.0)
    }
}

/// Cancellation history and order-size baselines used to score single orders.
#[derive(Debug, Clone, Default)]
pub struct RiskModel {
    customers: HashMap<String, InvoiceCounts>,
    products: HashMap<String, InvoiceCounts>,
    mean_quantity: f64,
    mean_revenue: f64,
    n_sales: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderInput {
    pub customer_id: Option<String>,
    pub stock_code: String,
    pub quantity: i64,
    pub unit_price: f64,
}

impl OrderInput {
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            customer_id: tx.customer_id.clone(),
            stock_code: tx.stock_code.clone(),
            quantity: tx.quantity,
            unit_price: tx.unit_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub customer_return_rate: f64,
    pub product_return_rate: f64,
    pub quantity_risk: f64,
    pub value_risk: f64,
    pub message: String,
}

impl RiskModel {
    pub fn build(dataset: &Dataset) -> Self {
        let mut customers: HashMap<String, InvoiceCounts> = HashMap::new();
        let mut products: HashMap<String, InvoiceCounts> = HashMap::new();
        for tx in &dataset.sales {
            if let Some(c) = &tx.customer_id {
                customers
                    .entry(c.clone())
                    .or_default()
                    .sales
                    .insert(tx.invoice_no.clone());
            }
            products
                .entry(tx.stock_code.clone())
                .or_default()
                .sales
                .insert(tx.invoice_no.clone());
        }
        for tx in &dataset.cancellations {
            if let Some(c) = &tx.customer_id {
                customers
                    .entry(c.clone())
                    .or_default()
                    .cancelled
                    .insert(tx.invoice_no.clone());
            }
            products
                .entry(tx.stock_code.clone())
                .or_default()
                .cancelled
                .insert(tx.invoice_no.clone());
        }

        let quantities = dataset
            .sales
            .iter()
            .map(|t| t.quantity as f64)
            .collect::<Vec<_>>();
        let revenues = dataset.sales.iter().map(|t| t.revenue()).collect::<Vec<_>>();
        info!(
            "risk model: customers={}, products={}, sales_rows={}",
            customers.len(),
            products.len(),
            dataset.sales.len()
        );
        Self {
            customers,
            products,
            mean_quantity: mean(&quantities),
            mean_revenue: mean(&revenues),
            n_sales: dataset.sales.len(),
        }
    }

    pub fn customer_return_rate(&self, customer_id: Option<&str>) -> f64 {
        customer_id
            .and_then(normalize_customer_id)
            .and_then(|id| self.customers.get(&id))
            .and_then(|c| c.return_rate())
            .unwrap_or(DEFAULT_CUSTOMER_RETURN_RATE)
    }

    pub fn product_return_rate(&self, stock_code: &str) -> f64 {
        self.products
            .get(&stock_code.trim().to_ascii_uppercase())
            .and_then(|p| p.return_rate())
            .unwrap_or(DEFAULT_PRODUCT_RETURN_RATE)
    }

    /// Unrounded score in [0, 100].
    pub fn raw_score(&self, order: &OrderInput) -> f64 {
        self.components(order).0
    }

    fn components(&self, order: &OrderInput) -> (f64, f64, f64, f64, f64) {
        if self.n_sales == 0 {
            return (EMPTY_DATASET_SCORE, 0.0, 0.0, 0.0, 0.0);
        }
        let customer = self.customer_return_rate(order.customer_id.as_deref());
        let product = self.product_return_rate(&order.stock_code);
        let quantity = if self.mean_quantity > 0.0 {
            (order.quantity as f64 / self.mean_quantity * 30.0).min(100.0)
        } else {
            0.0
        };
        let order_value = order.quantity as f64 * order.unit_price;
        let value = if self.mean_revenue > 0.0 {
            ((order_value - self.mean_revenue).abs() / self.mean_revenue * 50.0).min(100.0)
        } else {
            0.0
        };
        let score = (customer * 0.4 + product * 0.3 + quantity * 0.2 + value * 0.1).clamp(0.0, 100.0);
        (score, customer, product, quantity, value)
    }

    pub fn score(&self, order: &OrderInput) -> RiskAssessment {
        let (score, customer, product, quantity, value) = self.components(order);
        RiskAssessment {
            risk_score: round2(score),
            risk_level: RiskLevel::from_score(score),
            customer_return_rate: round2(customer),
            product_return_rate: round2(product),
            quantity_risk: round2(quantity),
            value_risk: round2(value),
            message: format!("Risk assessment completed. Score: {:.2}/100", score),
        }
    }
}

/// Evenly spaced sample of at most `size` rows.
pub fn stride_sample<T>(rows: &[T], size: usize) -> Vec<&T> {
    if rows.len() <= size {
        return rows.iter().collect();
    }
    (0..size).map(|i| &rows[i * rows.len() / size]).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredOrder {
    pub revenue: f64,
    pub risk: f64,
}

pub fn score_sample(dataset: &Dataset, model: &RiskModel, size: usize) -> Vec<ScoredOrder> {
    stride_sample(&dataset.sales, size)
        .into_iter()
        .map(|tx| ScoredOrder {
            revenue: tx.revenue(),
            risk: model.raw_score(&OrderInput::from_transaction(tx)),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySimulation {
    pub threshold_tau: f64,
    pub sample_size: usize,
    pub total_expected_profit: f64,
    pub orders_blocked: usize,
    pub orders_allowed: usize,
    pub avg_risk_blocked: f64,
    pub avg_risk_allowed: f64,
    pub recommendation: String,
}

pub fn policy_recommendation(tau: f64) -> &'static str {
    if tau < 20.0 {
        "Very lenient policy - Low protection against returns"
    } else if tau < 40.0 {
        "Balanced policy - Moderate risk management"
    } else if tau < 60.0 {
        "Strict policy - Good protection but may impact conversion"
    } else {
        "Very strict policy - High protection but significant conversion impact"
    }
}

pub fn simulate_scored(scored: &[ScoredOrder], params: &PolicyParams) -> PolicySimulation {
    let mut total = 0.0;
    let mut blocked = Vec::new();
    let mut allowed = Vec::new();
    for order in scored {
        let base = order.revenue * (1.0 - COST_RATIO);
        if order.risk >= params.threshold_tau {
            total += base * (1.0 - params.conversion_impact);
            blocked.push(order.risk);
        } else {
            total += base - order.risk / 100.0 * params.return_processing_cost;
            allowed.push(order.risk);
        }
    }
    PolicySimulation {
        threshold_tau: params.threshold_tau,
        sample_size: scored.len(),
        total_expected_profit: round2(total),
        orders_blocked: blocked.len(),
        orders_allowed: allowed.len(),
        avg_risk_blocked: round2(mean(&blocked)),
        avg_risk_allowed: round2(mean(&allowed)),
        recommendation: policy_recommendation(params.threshold_tau).to_string(),
    }
}

pub fn simulate_policy(
    dataset: &Dataset,
    model: &RiskModel,
    params: &PolicyParams,
) -> Result<PolicySimulation, AnalysisError> {
    params.validate()?;
    if dataset.is_empty() {
        return Err(AnalysisError::NotFound(
            "no transaction data found".to_string(),
        ));
    }
    let scored = score_sample(dataset, model, params.sample_size);
    Ok(simulate_scored(&scored, params))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdPoint {
    pub tau: f64,
    pub expected_profit: f64,
    pub orders_blocked: usize,
    pub orders_allowed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimalThreshold {
    pub optimal_tau: f64,
    pub max_expected_profit: f64,
    pub orders_blocked_at_optimal: usize,
    pub simulation_results: Vec<ThresholdPoint>,
}

/// Grid search over tau = 0, 5, ..., 100; the first tau with the highest profit wins.
pub fn find_optimal_threshold(
    dataset: &Dataset,
    model: &RiskModel,
    params: &PolicyParams,
) -> Result<OptimalThreshold, AnalysisError> {
    params.validate()?;
    if dataset.is_empty() {
        return Err(AnalysisError::NotFound(
            "no transaction data found".to_string(),
        ));
    }
    let scored = score_sample(dataset, model, params.sample_size);
    let mut points = Vec::new();
    for tau in (0..=100).step_by(TAU_STEP) {
        let sim = simulate_scored(
            &scored,
            &PolicyParams {
                threshold_tau: tau as f64,
                ..params.clone()
            },
        );
        points.push(ThresholdPoint {
            tau: tau as f64,
            expected_profit: sim.total_expected_profit,
            orders_blocked: sim.orders_blocked,
            orders_allowed: sim.orders_allowed,
        });
    }

    let mut best = 0usize;
    for (i, p) in points.iter().enumerate() {
        if p.expected_profit > points[best].expected_profit {
            best = i;
        }
    }
    let optimum = &points[best];
    info!(
        "optimal threshold: tau={}, profit={}",
        optimum.tau, optimum.expected_profit
    );
    Ok(OptimalThreshold {
        optimal_tau: optimum.tau,
        max_expected_profit: optimum.expected_profit,
        orders_blocked_at_optimal: optimum.orders_blocked,
        simulation_results: points,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RiskBuckets {
    #[serde(rename = "0-20")]
    pub b0_20: usize,
    #[serde(rename = "20-40")]
    pub b20_40: usize,
    #[serde(rename = "40-60")]
    pub b40_60: usize,
    #[serde(rename = "60-80")]
    pub b60_80: usize,
    #[serde(rename = "80-100")]
    pub b80_100: usize,
}

impl RiskBuckets {
    fn add(&mut self, risk: f64) {
        match risk {
            r if r < 20.0 => self.b0_20 += 1,
            r if r < 40.0 => self.b20_40 += 1,
            r if r < 60.0 => self.b40_60 += 1,
            r if r < 80.0 => self.b60_80 += 1,
            _ => self.b80_100 += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskDistribution {
    pub sample_size: usize,
    pub distribution: RiskBuckets,
    pub mean_risk: f64,
    pub median_risk: f64,
    pub std_risk: f64,
}

pub fn risk_distribution(
    dataset: &Dataset,
    model: &RiskModel,
    sample_size: usize,
) -> Result<RiskDistribution, AnalysisError> {
    if dataset.is_empty() {
        return Err(AnalysisError::NotFound("no data found".to_string()));
    }
    let risks = score_sample(dataset, model, sample_size.max(1))
        .into_iter()
        .map(|o| o.risk)
        .collect::<Vec<_>>();
    let mut buckets = RiskBuckets::default();
    for &r in &risks {
        buckets.add(r);
    }
    Ok(RiskDistribution {
        sample_size: risks.len(),
        distribution: buckets,
        mean_risk: round2(mean(&risks)),
        median_risk: round2(median(&risks)),
        std_risk: round2(population_std(&risks)),
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage5_risk.rs"]
mod tests;
