use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use tracing::info;

use crate::input::Transaction;
use crate::report::{mean, quantile_sorted, round2, sorted_copy};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmRow {
    pub customer_id: String,
    pub recency: i64,
    pub frequency: u64,
    pub monetary: f64,
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,
    pub rfm_score: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QuantileTriple {
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
}

impl QuantileTriple {
    pub fn from_values(values: &[f64]) -> Self {
        let sorted = sorted_copy(values);
        Self {
            q25: quantile_sorted(&sorted, 0.25),
            q50: quantile_sorted(&sorted, 0.50),
            q75: quantile_sorted(&sorted, 0.75),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RfmQuantiles {
    pub recency: QuantileTriple,
    pub frequency: QuantileTriple,
    pub monetary: QuantileTriple,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmSummary {
    pub customers_analyzed: usize,
    pub avg_recency: f64,
    pub avg_frequency: f64,
    pub avg_monetary: f64,
    pub reference_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RfmTable {
    /// Ordered by customer id.
    pub rows: Vec<RfmRow>,
    pub quantiles: RfmQuantiles,
    pub reference_date: Option<NaiveDateTime>,
}

impl RfmTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn summary(&self) -> RfmSummary {
        let recency = self.rows.iter().map(|r| r.recency as f64).collect::<Vec<_>>();
        let frequency = self.rows.iter().map(|r| r.frequency as f64).collect::<Vec<_>>();
        let monetary = self.rows.iter().map(|r| r.monetary).collect::<Vec<_>>();
        RfmSummary {
            customers_analyzed: self.rows.len(),
            avg_recency: round2(mean(&recency)),
            avg_frequency: round2(mean(&frequency)),
            avg_monetary: round2(mean(&monetary)),
            reference_date: self.reference_date,
        }
    }
}

/// Latest invoice timestamp plus one day.
pub fn reference_date(sales: &[&Transaction]) -> Option<NaiveDateTime> {
    sales
        .iter()
        .map(|t| t.invoice_date)
        .max()
        .map(|ts| ts + Duration::days(1))
}

#[derive(Default)]
struct CustomerAcc<'a> {
    last_purchase: Option<NaiveDateTime>,
    invoices: BTreeSet<&'a str>,
    monetary: f64,
}

pub fn compute_rfm(sales: &[&Transaction]) -> RfmTable {
    let Some(reference) = reference_date(sales) else {
        return RfmTable::default();
    };

    let mut by_customer: BTreeMap<&str, CustomerAcc<'_>> = BTreeMap::new();
    for tx in sales {
        let Some(customer) = tx.customer_id.as_deref() else {
            continue;
        };
        let acc = by_customer.entry(customer).or_default();
        acc.last_purchase = Some(match acc.last_purchase {
            Some(prev) => prev.max(tx.invoice_date),
            None => tx.invoice_date,
        });
        acc.invoices.insert(tx.invoice_no.as_str());
        acc.monetary += tx.revenue();
    }

    let mut rows = by_customer
        .into_iter()
        .map(|(customer, acc)| {
            let last = acc.last_purchase.unwrap_or(reference);
            RfmRow {
                customer_id: customer.to_string(),
                recency: (reference - last).num_days(),
                frequency: acc.invoices.len() as u64,
                monetary: acc.monetary,
                r_score: 0,
                f_score: 0,
                m_score: 0,
                rfm_score: 0,
            }
        })
        .collect::<Vec<_>>();

    let recency = rows.iter().map(|r| r.recency as f64).collect::<Vec<_>>();
    let frequency = rows.iter().map(|r| r.frequency as f64).collect::<Vec<_>>();
    let monetary = rows.iter().map(|r| r.monetary).collect::<Vec<_>>();

    let r_scores = quintile_scores(&recency);
    let f_scores = quintile_scores(&frequency);
    let m_scores = quintile_scores(&monetary);
    for (i, row) in rows.iter_mut().enumerate() {
        // recent purchases score high
        row.r_score = 6 - r_scores[i];
        row.f_score = f_scores[i];
        row.m_score = m_scores[i];
        row.rfm_score = row.r_score + row.f_score + row.m_score;
    }

    let quantiles = RfmQuantiles {
        recency: QuantileTriple::from_values(&recency),
        frequency: QuantileTriple::from_values(&frequency),
        monetary: QuantileTriple::from_values(&monetary),
    };

    info!(
        "rfm: customers={}, reference_date={}",
        rows.len(),
        reference
    );

    RfmTable {
        rows,
        quantiles,
        reference_date: Some(reference),
    }
}

/// Scores 1..=5 by quintile of the average rank; tied values share a score.
pub fn quintile_scores(values: &[f64]) -> Vec<u8> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let mut order = (0..n).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut scores = vec![1u8; n];
    let mut start = 0usize;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // 1-based average rank of the tie group
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let score = (avg_rank * 5.0 / n as f64).ceil().clamp(1.0, 5.0) as u8;
        for &idx in &order[start..end] {
            scores[idx] = score;
        }
        start = end;
    }
    scores
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage1_rfm.rs"]
mod tests;
