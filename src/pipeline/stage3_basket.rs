use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::input::{Dataset, Transaction, most_recent_refs};
use crate::model::labels::LiftStrength;
use crate::model::params::BasketParams;
use crate::model::segment::Segment;
use crate::pipeline::AnalysisError;
use crate::pipeline::apriori::{Baskets, Rule, apriori, association_rules};
use crate::pipeline::stage1_rfm::RfmTable;
use crate::pipeline::stage2_segments::customers_in_segment;
use crate::report::{mean, round2, round4, truncate_chars};

const DISPLAY_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKey {
    Description,
    StockCode,
}

impl ItemKey {
    pub fn of<'a>(&self, tx: &'a Transaction) -> &'a str {
        match self {
            ItemKey::Description => &tx.description,
            ItemKey::StockCode => &tx.stock_code,
        }
    }
}

/// Baskets plus the rows they were built from.
#[derive(Debug, Clone)]
pub struct BasketInput<'a> {
    pub baskets: Baskets,
    pub rows: Vec<&'a Transaction>,
}

/// Items ranked by row count, ties broken by key.
pub fn top_items<'a>(rows: &[&'a Transaction], key: ItemKey, limit: usize) -> Vec<&'a str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for &tx in rows {
        *counts.entry(key.of(tx)).or_default() += 1;
    }
    let mut ranked = counts.into_iter().collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(limit).map(|(k, _)| k).collect()
}

/// Builds the item/transaction matrix over `keep` items and the `max_rows` most recent rows.
pub fn build_baskets_over<'a>(
    rows: &[&'a Transaction],
    keep: &HashSet<&str>,
    max_rows: usize,
    key: ItemKey,
) -> BasketInput<'a> {
    let filtered = rows
        .iter()
        .copied()
        .filter(|tx| keep.contains(key.of(tx)))
        .collect::<Vec<_>>();
    let filtered = most_recent_refs(&filtered, max_rows);

    let labels = filtered
        .iter()
        .map(|&tx| key.of(tx))
        .collect::<BTreeSet<_>>();
    let ids = labels
        .iter()
        .enumerate()
        .map(|(i, label)| (*label, i as u32))
        .collect::<HashMap<_, _>>();

    let mut by_invoice: BTreeMap<&str, BTreeMap<u32, i64>> = BTreeMap::new();
    for &tx in &filtered {
        if let Some(&id) = ids.get(key.of(tx)) {
            *by_invoice
                .entry(tx.invoice_no.as_str())
                .or_default()
                .entry(id)
                .or_default() += tx.quantity;
        }
    }
    let transactions = by_invoice
        .into_values()
        .map(|items| {
            items
                .into_iter()
                .filter(|(_, qty)| *qty > 0)
                .map(|(id, _)| id)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    BasketInput {
        baskets: Baskets {
            items: labels.into_iter().map(|s| s.to_string()).collect(),
            transactions,
        },
        rows: filtered,
    }
}

pub fn build_baskets<'a>(
    rows: &[&'a Transaction],
    params: &BasketParams,
    key: ItemKey,
) -> BasketInput<'a> {
    let keep = top_items(rows, key, params.top_items)
        .into_iter()
        .collect::<HashSet<_>>();
    build_baskets_over(rows, &keep, params.max_rows, key)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bundle {
    pub antecedents: Vec<String>,
    pub consequents: Vec<String>,
    pub antecedents_display: String,
    pub consequents_display: String,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
    pub leverage: f64,
    pub conviction: Option<f64>,
    pub expected_revenue: f64,
    pub strength: LiftStrength,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasketResult {
    pub transactions: usize,
    pub items: usize,
    pub frequent_itemsets: usize,
    pub total_rules: usize,
    pub displayed_bundles: usize,
    pub bundles: Vec<Bundle>,
    pub message: Option<String>,
}

impl BasketResult {
    fn empty(transactions: usize, items: usize, frequent: usize, message: &str) -> Self {
        Self {
            transactions,
            items,
            frequent_itemsets: frequent,
            total_rules: 0,
            displayed_bundles: 0,
            bundles: Vec::new(),
            message: Some(message.to_string()),
        }
    }
}

/// Lift desc, then confidence desc, then item labels.
pub fn rank_rules(rules: &mut [Rule], baskets: &Baskets) {
    rules.sort_by(|a, b| {
        b.lift
            .partial_cmp(&a.lift)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| baskets.labels(&a.antecedent).cmp(&baskets.labels(&b.antecedent)))
            .then_with(|| baskets.labels(&a.consequent).cmp(&baskets.labels(&b.consequent)))
    });
}

pub fn display_items(items: &[String]) -> String {
    items
        .iter()
        .map(|s| truncate_chars(s, DISPLAY_CHARS))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn mine_bundles(
    rows: &[&Transaction],
    params: &BasketParams,
) -> Result<BasketResult, AnalysisError> {
    params.validate()?;
    if rows.is_empty() {
        return Err(AnalysisError::NotFound(
            "no transaction data found".to_string(),
        ));
    }
    let key = ItemKey::Description;
    let input = build_baskets(rows, params, key);
    let n_tx = input.baskets.n_transactions();
    let n_items = input.baskets.items.len();
    debug!("basket matrix: transactions={}, items={}", n_tx, n_items);

    let itemsets = apriori(&input.baskets, params.min_support, params.max_len);
    if itemsets.is_empty() {
        return Ok(BasketResult::empty(
            n_tx,
            n_items,
            0,
            "No frequent itemsets found. Try lowering min_support.",
        ));
    }
    let mut rules = association_rules(&itemsets, params.min_confidence);
    if rules.is_empty() {
        return Ok(BasketResult::empty(
            n_tx,
            n_items,
            itemsets.len(),
            "No rules found. Try lowering min_confidence.",
        ));
    }
    let total_rules = rules.len();
    rank_rules(&mut rules, &input.baskets);
    rules.truncate(params.top_n);

    let mut revenue_by_item: HashMap<&str, Vec<f64>> = HashMap::new();
    for tx in &input.rows {
        revenue_by_item
            .entry(key.of(tx))
            .or_default()
            .push(tx.revenue());
    }
    let n_rows = input.rows.len() as f64;

    let bundles = rules
        .iter()
        .map(|rule| {
            let antecedents = input.baskets.labels(&rule.antecedent);
            let consequents = input.baskets.labels(&rule.consequent);
            let consequent_revenue = consequents
                .iter()
                .filter_map(|c| revenue_by_item.get(c.as_str()))
                .flatten()
                .copied()
                .collect::<Vec<_>>();
            let expected =
                mean(&consequent_revenue) * rule.confidence * rule.support * n_rows;
            Bundle {
                antecedents_display: display_items(&antecedents),
                consequents_display: display_items(&consequents),
                antecedents,
                consequents,
                support: round4(rule.support),
                confidence: round4(rule.confidence),
                lift: round4(rule.lift),
                leverage: round4(rule.leverage),
                conviction: rule.conviction.map(round4),
                expected_revenue: round2(expected),
                strength: LiftStrength::from_lift(rule.lift),
            }
        })
        .collect::<Vec<_>>();

    info!(
        "basket: transactions={}, items={}, itemsets={}, rules={}, kept={}",
        n_tx,
        n_items,
        itemsets.len(),
        total_rules,
        bundles.len()
    );

    Ok(BasketResult {
        transactions: n_tx,
        items: n_items,
        frequent_itemsets: itemsets.len(),
        total_rules,
        displayed_bundles: bundles.len(),
        bundles,
        message: None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentBundles {
    pub segment: Segment,
    pub customer_count: usize,
    pub total_bundles_found: usize,
    pub displayed_bundles: usize,
    pub top_recommendation: Option<Bundle>,
    pub result: BasketResult,
}

pub fn segment_bundles(
    dataset: &Dataset,
    rfm: &RfmTable,
    segment: Segment,
    params: &BasketParams,
) -> Result<SegmentBundles, AnalysisError> {
    let customers = customers_in_segment(rfm, segment);
    if customers.is_empty() {
        return Err(AnalysisError::NotFound(format!(
            "no customers in segment {}",
            segment
        )));
    }
    let rows = dataset
        .sales
        .iter()
        .filter(|tx| {
            tx.customer_id
                .as_ref()
                .is_some_and(|c| customers.contains(c))
        })
        .collect::<Vec<_>>();
    let result = mine_bundles(&rows, params)?;
    Ok(SegmentBundles {
        segment,
        customer_count: customers.len(),
        total_bundles_found: result.total_rules,
        displayed_bundles: result.displayed_bundles,
        top_recommendation: result.bundles.first().cloned(),
        result,
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage3_basket.rs"]
mod tests;
