use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::input::Transaction;
use crate::input::dates::quarter;
use crate::model::labels::ValueTier;
use crate::model::params::RecommendParams;
use crate::pipeline::AnalysisError;
use crate::pipeline::apriori::{Rule, apriori, association_rules};
use crate::pipeline::stage1_rfm::reference_date;
use crate::pipeline::stage3_basket::{
    BasketInput, ItemKey, build_baskets_over, rank_rules, top_items,
};
use crate::report::{mean, round_to, round2, round4, truncate_chars};

const SUGGESTION_LIMIT: usize = 10;
const NETWORK_TARGETS: usize = 10;
const NETWORK_LABEL_CHARS: usize = 20;
const CATALOG_TOP_ITEMS: usize = 100;
const CATALOG_MAX_ROWS: usize = 50_000;
const CATALOG_LABEL_CHARS: usize = 30;
const HISTORY_SOURCES: usize = 5;
const RECS_PER_SOURCE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductRef {
    pub stock_code: String,
    pub description: String,
}

impl ProductRef {
    fn of(tx: &Transaction) -> Self {
        Self {
            stock_code: tx.stock_code.clone(),
            description: tx.description.clone(),
        }
    }
}

/// Exact stock code match first, then the first description containing `term`.
pub fn search_product(rows: &[&Transaction], term: &str) -> Option<ProductRef> {
    let term = term.trim();
    if term.is_empty() {
        return None;
    }
    if let Some(tx) = rows
        .iter()
        .find(|tx| tx.stock_code.eq_ignore_ascii_case(term))
    {
        return Some(ProductRef::of(tx));
    }
    let needle = term.to_lowercase();
    rows.iter()
        .find(|tx| tx.description.to_lowercase().contains(&needle))
        .map(|tx| ProductRef::of(tx))
}

/// Autocomplete suggestions, unique by stock code, in row order.
pub fn suggest_products(rows: &[&Transaction], query: &str, limit: usize) -> Vec<ProductRef> {
    let query = query.trim();
    if query.chars().count() < 2 {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tx in rows {
        if out.len() >= limit.min(SUGGESTION_LIMIT) {
            break;
        }
        let hit = tx.stock_code.to_lowercase().contains(&needle)
            || tx.description.to_lowercase().contains(&needle);
        if hit && seen.insert(tx.stock_code.as_str()) {
            out.push(ProductRef::of(tx));
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerProfile {
    pub customer_id: String,
    pub segment: ValueTier,
    pub order_frequency: usize,
    pub unique_products: usize,
    pub avg_order_value: f64,
    pub rfm_score: String,
}

/// Value tier and a coarse RFM string, with recency measured from `reference`.
pub fn customer_profile(
    rows: &[&Transaction],
    customer_id: &str,
    reference: NaiveDateTime,
) -> Option<CustomerProfile> {
    let wanted = crate::input::csv::normalize_customer_id(customer_id)?;
    let mine = rows
        .iter()
        .filter(|tx| tx.customer_id.as_deref() == Some(wanted.as_str()))
        .collect::<Vec<_>>();
    if mine.is_empty() {
        return None;
    }

    let mut invoice_totals: BTreeMap<&str, f64> = BTreeMap::new();
    let mut products = BTreeSet::new();
    let mut latest = mine[0].invoice_date;
    for tx in &mine {
        *invoice_totals.entry(tx.invoice_no.as_str()).or_default() += tx.revenue();
        products.insert(tx.stock_code.as_str());
        latest = latest.max(tx.invoice_date);
    }
    let totals = invoice_totals.values().copied().collect::<Vec<_>>();
    let avg_order_value = mean(&totals);
    let frequency = invoice_totals.len();

    let recency = (reference - latest).num_days();
    let r = (6 - recency.div_euclid(100)).clamp(1, 5);
    let f = frequency.min(5);
    let m = ((avg_order_value / 100.0).floor() as i64).clamp(0, 5);

    Some(CustomerProfile {
        customer_id: wanted,
        segment: ValueTier::from_order_value(avg_order_value),
        order_frequency: frequency,
        unique_products: products.len(),
        avg_order_value: round2(avg_order_value),
        rfm_score: format!("R:{} F:{} M:{}", r, f, m),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub rank: usize,
    pub product_code: String,
    pub description: String,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
    pub estimated_impact: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BundleStrength {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleOpportunity {
    pub message: String,
    pub suggested_products: Vec<String>,
    pub bundle_strength: BundleStrength,
}

impl BundleOpportunity {
    fn weak(message: &str) -> Self {
        Self {
            message: message.to_string(),
            suggested_products: Vec::new(),
            bundle_strength: BundleStrength::Weak,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueImpact {
    pub message: String,
    pub min_percent: f64,
    pub max_percent: f64,
    pub estimated_revenue_lift: f64,
}

impl RevenueImpact {
    fn none(message: &str) -> Self {
        Self {
            message: message.to_string(),
            min_percent: 0.0,
            max_percent: 0.0,
            estimated_revenue_lift: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingStrategy {
    pub message: String,
    pub optimal_period: String,
    pub target_customer_profile: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkNode {
    pub id: String,
    pub label: String,
    pub value: f64,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkEdge {
    pub source: String,
    pub target: String,
    pub confidence: f64,
    pub lift: f64,
    pub width: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkGraph {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
    pub total_nodes: usize,
    pub total_edges: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationResult {
    pub source_product: ProductRef,
    pub customer_segment: Option<CustomerProfile>,
    pub recommendations: Vec<Recommendation>,
    pub network_visualization: NetworkGraph,
    pub bundle_opportunity: BundleOpportunity,
    pub revenue_impact: RevenueImpact,
    pub timing_strategy: TimingStrategy,
    pub total_recommendations: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendRequest {
    pub product: String,
    pub customer_id: Option<String>,
}

#[derive(Default)]
struct ProductStats<'a> {
    description: Option<&'a str>,
    revenue: f64,
    price_sum: f64,
    rows: usize,
}

fn product_stats<'a>(rows: &[&'a Transaction]) -> HashMap<&'a str, ProductStats<'a>> {
    let mut stats: HashMap<&str, ProductStats<'_>> = HashMap::new();
    for &tx in rows {
        let entry = stats.entry(tx.stock_code.as_str()).or_default();
        entry.description.get_or_insert(tx.description.as_str());
        entry.revenue += tx.revenue();
        entry.price_sum += tx.unit_price;
        entry.rows += 1;
    }
    stats
}

pub fn recommend(
    rows: &[&Transaction],
    request: &RecommendRequest,
    params: &RecommendParams,
) -> Result<RecommendationResult, AnalysisError> {
    params.validate()?;
    if rows.is_empty() {
        return Err(AnalysisError::NotFound(
            "no transaction data available".to_string(),
        ));
    }
    let source = search_product(rows, &request.product).ok_or_else(|| {
        AnalysisError::NotFound(format!("product '{}' not found", request.product))
    })?;

    let reference = reference_date(rows).unwrap_or_default();
    let customer = request
        .customer_id
        .as_deref()
        .and_then(|id| customer_profile(rows, id, reference));

    let key = ItemKey::StockCode;
    let mut keep = top_items(rows, key, params.top_items)
        .into_iter()
        .collect::<HashSet<_>>();
    keep.insert(source.stock_code.as_str());
    let input = build_baskets_over(rows, &keep, params.max_rows, key);

    let empty = |bundle: &str, impact: &str, timing: TimingStrategy| RecommendationResult {
        source_product: source.clone(),
        customer_segment: customer.clone(),
        recommendations: Vec::new(),
        network_visualization: NetworkGraph::default(),
        bundle_opportunity: BundleOpportunity::weak(bundle),
        revenue_impact: RevenueImpact::none(impact),
        timing_strategy: timing,
        total_recommendations: 0,
    };

    let itemsets = apriori(&input.baskets, params.min_support, Some(2));
    if itemsets.is_empty() {
        return Ok(empty(
            "No frequent patterns found",
            "Insufficient data",
            TimingStrategy {
                message: "Unable to determine optimal timing".to_string(),
                optimal_period: "N/A".to_string(),
                target_customer_profile: "N/A".to_string(),
            },
        ));
    }
    let rules = association_rules(&itemsets, params.confidence_threshold);
    if rules.is_empty() {
        return Ok(empty(
            "No association rules found with current threshold",
            "No recommendations available",
            timing_strategy(rows, customer.as_ref()),
        ));
    }

    let source_id = input
        .baskets
        .items
        .iter()
        .position(|s| *s == source.stock_code)
        .map(|i| i as u32);
    let mut relevant = rules
        .into_iter()
        .filter(|r| source_id.is_some_and(|id| r.antecedent.contains(&id)))
        .collect::<Vec<_>>();
    if relevant.is_empty() {
        return Ok(empty(
            &format!("No recommendations found for product {}", source.stock_code),
            "No recommendations available",
            timing_strategy(rows, customer.as_ref()),
        ));
    }
    relevant.sort_by(|a, b| {
        (b.confidence * b.lift)
            .partial_cmp(&(a.confidence * a.lift))
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                input
                    .baskets
                    .labels(&a.consequent)
                    .cmp(&input.baskets.labels(&b.consequent))
            })
    });

    let stats = product_stats(rows);
    let mut recommendations = Vec::new();
    'rules: for rule in &relevant {
        for code in input.baskets.labels(&rule.consequent) {
            let Some(product) = stats.get(code.as_str()) else {
                continue;
            };
            let avg_price = if product.rows == 0 {
                0.0
            } else {
                product.price_sum / product.rows as f64
            };
            recommendations.push(Recommendation {
                rank: recommendations.len() + 1,
                description: product.description.unwrap_or_default().to_string(),
                product_code: code,
                support: round4(rule.support),
                confidence: round4(rule.confidence),
                lift: round4(rule.lift),
                estimated_impact: round2(rule.confidence * avg_price * rule.support * 1000.0),
            });
            if recommendations.len() >= params.top_n {
                break 'rules;
            }
        }
    }

    info!(
        "recommend: source={}, candidate_rules={}, recommendations={}",
        source.stock_code,
        relevant.len(),
        recommendations.len()
    );

    let bundle_opportunity = bundle_opportunity(&recommendations, &source.description);
    let revenue_impact = revenue_impact(&recommendations, rows);
    let timing_strategy = timing_strategy(rows, customer.as_ref());
    let network_visualization = network_graph(&source, &recommendations, &stats);

    Ok(RecommendationResult {
        total_recommendations: recommendations.len(),
        source_product: source,
        customer_segment: customer,
        recommendations,
        network_visualization,
        bundle_opportunity,
        revenue_impact,
        timing_strategy,
    })
}

pub fn bundle_opportunity(recs: &[Recommendation], source_description: &str) -> BundleOpportunity {
    if recs.is_empty() {
        return BundleOpportunity::weak("Insufficient data for bundle analysis");
    }
    let strong = recs
        .iter()
        .filter(|r| r.lift > 3.0 && r.confidence > 0.6)
        .collect::<Vec<_>>();
    if strong.len() >= 2 {
        let products = strong
            .iter()
            .take(3)
            .map(|r| r.description.clone())
            .collect::<Vec<_>>();
        BundleOpportunity {
            message: format!(
                "Product '{}' has strong associations with {}. Create seasonal gift bundles or themed packages.",
                source_description,
                products.join(", ")
            ),
            suggested_products: products,
            bundle_strength: BundleStrength::Strong,
        }
    } else if recs.len() >= 2 {
        let products = recs
            .iter()
            .take(2)
            .map(|r| r.description.clone())
            .collect::<Vec<_>>();
        BundleOpportunity {
            message: format!(
                "Product '{}' shows moderate association with {}. Consider promotional bundling.",
                source_description,
                products.join(", ")
            ),
            suggested_products: products,
            bundle_strength: BundleStrength::Moderate,
        }
    } else {
        BundleOpportunity::weak(
            "Weak bundle signal. Focus on individual cross-sells or explore alternative product combinations.",
        )
    }
}

/// Mean revenue per invoice.
pub fn average_basket(rows: &[&Transaction]) -> f64 {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for &tx in rows {
        *totals.entry(tx.invoice_no.as_str()).or_default() += tx.revenue();
    }
    if totals.is_empty() {
        return 0.0;
    }
    totals.values().sum::<f64>() / totals.len() as f64
}

pub fn revenue_impact(recs: &[Recommendation], rows: &[&Transaction]) -> RevenueImpact {
    if recs.is_empty() {
        return RevenueImpact::none("No recommendations available for impact analysis");
    }
    let avg_confidence = mean(&recs.iter().map(|r| r.confidence).collect::<Vec<_>>());
    let avg_lift = mean(&recs.iter().map(|r| r.lift).collect::<Vec<_>>());
    let min_percent = round_to(avg_confidence * 10.0, 1);
    let max_percent = round_to((avg_confidence + avg_lift / 10.0) * 15.0, 1);
    let lift = average_basket(rows) * (min_percent + max_percent) / 200.0;
    RevenueImpact {
        message: format!(
            "Implementing these recommendations could increase basket size by {}-{}% for targeted segments.",
            min_percent, max_percent
        ),
        min_percent,
        max_percent,
        estimated_revenue_lift: round2(lift),
    }
}

pub fn peak_quarter(rows: &[&Transaction]) -> Option<u32> {
    let mut by_quarter: BTreeMap<u32, f64> = BTreeMap::new();
    for tx in rows {
        *by_quarter.entry(quarter(&tx.invoice_date)).or_default() += tx.revenue();
    }
    let mut best: Option<(u32, f64)> = None;
    for (q, revenue) in by_quarter {
        if best.is_none_or(|(_, top)| revenue > top) {
            best = Some((q, revenue));
        }
    }
    best.map(|(q, _)| q)
}

pub fn timing_strategy(rows: &[&Transaction], customer: Option<&CustomerProfile>) -> TimingStrategy {
    let optimal_period = match peak_quarter(rows) {
        Some(1) => "Q1",
        Some(2) => "Q2",
        Some(3) => "Q3",
        _ => "Q4 (Holiday Season)",
    };
    let target = match customer.map(|c| c.segment) {
        Some(ValueTier::HighValue) => "premium gift-oriented customers",
        Some(ValueTier::Medium) => "regular customers looking for value bundles",
        _ => "price-sensitive customers during promotional periods",
    };
    TimingStrategy {
        message: format!(
            "Deploy recommendations during {} for maximum effectiveness with {}.",
            optimal_period, target
        ),
        optimal_period: optimal_period.to_string(),
        target_customer_profile: target.to_string(),
    }
}

fn confidence_color(confidence: f64) -> &'static str {
    if confidence > 0.7 {
        "#F97316"
    } else if confidence > 0.5 {
        "#10B981"
    } else {
        "#6B7280"
    }
}

fn network_graph(
    source: &ProductRef,
    recs: &[Recommendation],
    stats: &HashMap<&str, ProductStats<'_>>,
) -> NetworkGraph {
    let revenue_of = |code: &str| stats.get(code).map(|s| s.revenue).unwrap_or(0.0);

    let source_revenue = revenue_of(&source.stock_code);
    let mut nodes = vec![NetworkNode {
        id: source.stock_code.clone(),
        label: truncate_chars(&source.description, NETWORK_LABEL_CHARS),
        value: if source_revenue > 0.0 { source_revenue } else { 100.0 },
        color: "#1E40AF",
    }];
    let mut edges = Vec::new();
    for rec in recs.iter().take(NETWORK_TARGETS) {
        let revenue = revenue_of(&rec.product_code);
        nodes.push(NetworkNode {
            id: rec.product_code.clone(),
            label: truncate_chars(&rec.description, NETWORK_LABEL_CHARS),
            value: if revenue > 0.0 { revenue } else { 50.0 },
            color: confidence_color(rec.confidence),
        });
        edges.push(NetworkEdge {
            source: source.stock_code.clone(),
            target: rec.product_code.clone(),
            confidence: rec.confidence,
            lift: rec.lift,
            width: rec.confidence * 5.0,
        });
    }
    NetworkGraph {
        total_nodes: nodes.len(),
        total_edges: edges.len(),
        nodes,
        edges,
    }
}

/// Rules keyed by stock code over the most frequent products and most recent rows.
fn catalog_rules<'a>(
    rows: &[&'a Transaction],
    params: &RecommendParams,
) -> (BasketInput<'a>, Vec<Rule>) {
    let key = ItemKey::StockCode;
    let keep = top_items(rows, key, CATALOG_TOP_ITEMS)
        .into_iter()
        .collect::<HashSet<_>>();
    let input = build_baskets_over(rows, &keep, CATALOG_MAX_ROWS, key);
    let itemsets = apriori(&input.baskets, params.min_support, None);
    let rules = association_rules(&itemsets, params.confidence_threshold);
    (input, rules)
}

fn rule_score(rule: &Rule) -> f64 {
    rule.confidence * rule.lift
}

/// Association graph across the catalogue. When `stock_codes` is non-empty only rules
/// touching one of them are kept; at most `max_rules` rules, strongest lift first.
pub fn product_network(
    rows: &[&Transaction],
    stock_codes: &[String],
    max_rules: usize,
    params: &RecommendParams,
) -> Result<NetworkGraph, AnalysisError> {
    params.validate()?;
    if rows.is_empty() {
        return Err(AnalysisError::NotFound(
            "no transaction data available".to_string(),
        ));
    }
    let (input, mut rules) = catalog_rules(rows, params);
    let baskets = &input.baskets;
    if !stock_codes.is_empty() {
        let wanted = stock_codes
            .iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .collect::<HashSet<_>>();
        rules.retain(|r| {
            r.antecedent
                .iter()
                .chain(&r.consequent)
                .any(|&id| wanted.contains(baskets.label(id)))
        });
    }
    rank_rules(&mut rules, baskets);
    rules.truncate(max_rules);

    let stats = product_stats(&input.rows);
    let mut seen = HashSet::new();
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for rule in &rules {
        for &id in rule.antecedent.iter().chain(&rule.consequent) {
            if !seen.insert(id) {
                continue;
            }
            let code = baskets.label(id);
            let product = stats.get(code);
            nodes.push(NetworkNode {
                id: code.to_string(),
                label: truncate_chars(
                    product.and_then(|p| p.description).unwrap_or(code),
                    CATALOG_LABEL_CHARS,
                ),
                value: round2(product.map(|p| p.revenue).unwrap_or(0.0)),
                color: if rule.antecedent.contains(&id) {
                    "#1E40AF"
                } else {
                    confidence_color(rule.confidence)
                },
            });
        }
        for &a in &rule.antecedent {
            for &c in &rule.consequent {
                edges.push(NetworkEdge {
                    source: baskets.label(a).to_string(),
                    target: baskets.label(c).to_string(),
                    confidence: round4(rule.confidence),
                    lift: round4(rule.lift),
                    width: round4(rule.confidence * 5.0),
                });
            }
        }
    }
    info!(
        "product network: rules={}, nodes={}, edges={}",
        rules.len(),
        nodes.len(),
        edges.len()
    );
    Ok(NetworkGraph {
        total_nodes: nodes.len(),
        total_edges: edges.len(),
        nodes,
        edges,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRecommendations {
    pub customer_id: String,
    pub purchase_history_count: usize,
    pub recommendations: Vec<Recommendation>,
    pub total_recommendations: usize,
}

/// Pools recommendations for the first products a customer bought, drops anything
/// already purchased and keeps the `top_n` best by confidence times lift.
pub fn customer_recommendations(
    rows: &[&Transaction],
    customer_id: &str,
    top_n: usize,
    params: &RecommendParams,
) -> Result<CustomerRecommendations, AnalysisError> {
    params.validate()?;
    let not_found = || {
        AnalysisError::NotFound(format!(
            "customer {} not found or has no purchase history",
            customer_id.trim()
        ))
    };
    let wanted = crate::input::csv::normalize_customer_id(customer_id).ok_or_else(not_found)?;
    let mut seen = HashSet::new();
    let purchased = rows
        .iter()
        .filter(|tx| tx.customer_id.as_deref() == Some(wanted.as_str()))
        .map(|tx| tx.stock_code.as_str())
        .filter(|code| seen.insert(*code))
        .collect::<Vec<_>>();
    if purchased.is_empty() {
        return Err(not_found());
    }

    let per_source = RecommendParams {
        top_n: RECS_PER_SOURCE,
        ..params.clone()
    };
    let mut candidates = Vec::new();
    for code in purchased.iter().take(HISTORY_SOURCES) {
        let request = RecommendRequest {
            product: code.to_string(),
            customer_id: Some(wanted.clone()),
        };
        candidates.extend(recommend(rows, &request, &per_source)?.recommendations);
    }

    let mut picked = HashSet::new();
    let mut recommendations = candidates
        .into_iter()
        .filter(|r| {
            !purchased.contains(&r.product_code.as_str()) && picked.insert(r.product_code.clone())
        })
        .collect::<Vec<_>>();
    recommendations.sort_by(|a, b| {
        (b.confidence * b.lift)
            .partial_cmp(&(a.confidence * a.lift))
            .unwrap_or(Ordering::Equal)
    });
    recommendations.truncate(top_n);
    for (i, rec) in recommendations.iter_mut().enumerate() {
        rec.rank = i + 1;
    }

    Ok(CustomerRecommendations {
        customer_id: wanted,
        purchase_history_count: purchased.len(),
        total_recommendations: recommendations.len(),
        recommendations,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopBundle {
    pub rank: usize,
    pub antecedent_codes: Vec<String>,
    pub consequent_codes: Vec<String>,
    pub antecedent_names: Vec<String>,
    pub consequent_names: Vec<String>,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
    pub score: f64,
}

/// Strongest stock-code rules across the catalogue, ranked by confidence times lift.
pub fn top_bundles(
    rows: &[&Transaction],
    params: &RecommendParams,
) -> Result<Vec<TopBundle>, AnalysisError> {
    params.validate()?;
    if rows.is_empty() {
        return Err(AnalysisError::NotFound(
            "no transaction data available".to_string(),
        ));
    }
    let (input, mut rules) = catalog_rules(rows, params);
    let baskets = &input.baskets;
    rules.sort_by(|a, b| {
        rule_score(b)
            .partial_cmp(&rule_score(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| baskets.labels(&a.antecedent).cmp(&baskets.labels(&b.antecedent)))
            .then_with(|| baskets.labels(&a.consequent).cmp(&baskets.labels(&b.consequent)))
    });
    rules.truncate(params.top_n);

    let stats = product_stats(&input.rows);
    let names = |codes: &[String]| {
        codes
            .iter()
            .filter_map(|c| stats.get(c.as_str()).and_then(|p| p.description))
            .map(str::to_string)
            .collect::<Vec<_>>()
    };
    Ok(rules
        .iter()
        .enumerate()
        .map(|(i, rule)| {
            let antecedent_codes = baskets.labels(&rule.antecedent);
            let consequent_codes = baskets.labels(&rule.consequent);
            TopBundle {
                rank: i + 1,
                antecedent_names: names(&antecedent_codes),
                consequent_names: names(&consequent_codes),
                antecedent_codes,
                consequent_codes,
                support: round4(rule.support),
                confidence: round4(rule.confidence),
                lift: round4(rule.lift),
                score: round4(rule_score(rule)),
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossSellInsights {
    pub source_product: ProductRef,
    pub bundle_opportunity: String,
    pub timing_strategy: String,
    pub expected_aov_increase: f64,
    pub avg_confidence: f64,
    pub avg_lift: f64,
    pub total_expected_impact: f64,
}

pub fn cross_sell_insights(result: &RecommendationResult) -> CrossSellInsights {
    if result.recommendations.is_empty() {
        return CrossSellInsights {
            source_product: result.source_product.clone(),
            bundle_opportunity: "Insufficient data for bundle analysis".to_string(),
            timing_strategy: "N/A".to_string(),
            expected_aov_increase: 0.0,
            avg_confidence: 0.0,
            avg_lift: 0.0,
            total_expected_impact: 0.0,
        };
    }
    let recs = &result.recommendations;
    CrossSellInsights {
        source_product: result.source_product.clone(),
        bundle_opportunity: result.bundle_opportunity.message.clone(),
        timing_strategy: result.timing_strategy.message.clone(),
        expected_aov_increase: result.revenue_impact.max_percent,
        avg_confidence: round4(mean(&recs.iter().map(|r| r.confidence).collect::<Vec<_>>())),
        avg_lift: round4(mean(&recs.iter().map(|r| r.lift).collect::<Vec<_>>())),
        total_expected_impact: round2(recs.iter().map(|r| r.estimated_impact).sum()),
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage4_recommend.rs"]
mod tests;
