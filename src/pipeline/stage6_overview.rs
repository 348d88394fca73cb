use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Datelike;
use serde::Serialize;

use crate::input::dates::quarter;
use crate::input::{Dataset, DateRange, Transaction};
use crate::model::params::OverviewParams;
use crate::pipeline::AnalysisError;
use crate::pipeline::stage4_recommend::average_basket;
use crate::report::{percent, round2};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverviewFilter {
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
    pub countries: Vec<String>,
    pub top_n: usize,
    pub exclude_cancelled: bool,
}

impl OverviewFilter {
    pub fn from_params(params: &OverviewParams) -> Self {
        Self {
            top_n: params.top_n,
            exclude_cancelled: params.exclude_cancelled,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        OverviewParams {
            top_n: self.top_n,
            exclude_cancelled: self.exclude_cancelled,
            ..OverviewParams::default()
        }
        .validate()?;
        Ok(())
    }

    fn keeps(&self, tx: &Transaction) -> bool {
        let range = DateRange::new(self.start_date, self.end_date);
        range.contains(&tx.invoice_date)
            && (self.countries.is_empty()
                || self
                    .countries
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(&tx.country)))
    }
}

pub fn select_rows<'a>(dataset: &'a Dataset, filter: &OverviewFilter) -> Vec<&'a Transaction> {
    let cancellations: &[Transaction] = if filter.exclude_cancelled {
        &[]
    } else {
        &dataset.cancellations
    };
    let mut rows = dataset
        .sales
        .iter()
        .chain(cancellations.iter())
        .filter(|tx| filter.keeps(tx))
        .collect::<Vec<_>>();
    if !filter.exclude_cancelled {
        rows.sort_by_key(|tx| tx.invoice_date);
    }
    rows
}

fn non_empty<'a, 'b>(rows: &'b [&'a Transaction]) -> Result<&'b [&'a Transaction], AnalysisError> {
    if rows.is_empty() {
        return Err(AnalysisError::NotFound(
            "no data found for given filters".to_string(),
        ));
    }
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub total_revenue: f64,
    pub total_transactions: usize,
    pub countries_active: usize,
    pub top_n_revenue_share: f64,
    pub avg_order_value: f64,
}

pub fn kpis(rows: &[&Transaction], top_n: usize) -> Result<Kpis, AnalysisError> {
    let rows = non_empty(rows)?;
    let total = rows.iter().map(|t| t.revenue()).sum::<f64>();
    let invoices = rows
        .iter()
        .map(|t| t.invoice_no.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    let countries = revenue_by(rows, |t| t.country.clone());
    let top_share = ranked(countries.iter().map(|(k, v)| (k.clone(), v.revenue)).collect())
        .into_iter()
        .take(top_n)
        .map(|(_, revenue)| revenue)
        .sum::<f64>();
    Ok(Kpis {
        total_revenue: round2(total),
        total_transactions: invoices,
        countries_active: countries.len(),
        top_n_revenue_share: if total > 0.0 {
            round2(percent(top_share, total))
        } else {
            0.0
        },
        avg_order_value: if invoices > 0 {
            round2(total / invoices as f64)
        } else {
            0.0
        },
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrendItem {
    pub year_month: String,
    pub revenue: f64,
    pub mom_growth: Option<f64>,
    pub transactions: usize,
}

#[derive(Default)]
struct GroupAcc<'a> {
    revenue: f64,
    invoices: BTreeSet<&'a str>,
}

fn revenue_by<'a, K: Ord>(
    rows: &[&'a Transaction],
    key: impl Fn(&Transaction) -> K,
) -> BTreeMap<K, GroupAcc<'a>> {
    let mut groups: BTreeMap<K, GroupAcc<'a>> = BTreeMap::new();
    for &tx in rows {
        let acc = groups.entry(key(tx)).or_default();
        acc.revenue += tx.revenue();
        acc.invoices.insert(tx.invoice_no.as_str());
    }
    groups
}

fn month_key(tx: &Transaction) -> (i32, u32) {
    (tx.invoice_date.year(), tx.invoice_date.month())
}

fn month_label((year, month): (i32, u32)) -> String {
    format!("{:04}-{:02}", year, month)
}

pub fn monthly_trend(rows: &[&Transaction]) -> Result<Vec<MonthlyTrendItem>, AnalysisError> {
    let rows = non_empty(rows)?;
    let mut out: Vec<MonthlyTrendItem> = Vec::new();
    let mut prev: Option<f64> = None;
    for (month, acc) in revenue_by(rows, month_key) {
        let mom_growth = match prev {
            Some(p) if p != 0.0 => Some(round2((acc.revenue - p) / p * 100.0)),
            _ => None,
        };
        out.push(MonthlyTrendItem {
            year_month: month_label(month),
            revenue: round2(acc.revenue),
            mom_growth,
            transactions: acc.invoices.len(),
        });
        prev = Some(acc.revenue);
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopItem {
    pub rank: usize,
    pub item: String,
    pub revenue: f64,
    pub share_pct: f64,
    pub transactions: usize,
}

/// Revenue desc, ties by name.
fn ranked(mut items: Vec<(String, f64)>) -> Vec<(String, f64)> {
    items.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    items
}

fn top_by(
    rows: &[&Transaction],
    top_n: usize,
    key: impl Fn(&Transaction) -> String,
) -> Result<Vec<TopItem>, AnalysisError> {
    let rows = non_empty(rows)?;
    let total = rows.iter().map(|t| t.revenue()).sum::<f64>();
    let groups = revenue_by(rows, key);
    let order = ranked(groups.iter().map(|(k, v)| (k.clone(), v.revenue)).collect());
    Ok(order
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(i, (item, revenue))| TopItem {
            rank: i + 1,
            transactions: groups.get(&item).map(|g| g.invoices.len()).unwrap_or(0),
            item,
            revenue: round2(revenue),
            share_pct: if total > 0.0 {
                round2(percent(revenue, total))
            } else {
                0.0
            },
        })
        .collect())
}

pub fn top_countries(rows: &[&Transaction], top_n: usize) -> Result<Vec<TopItem>, AnalysisError> {
    top_by(rows, top_n, |t| t.country.clone())
}

pub fn top_products(rows: &[&Transaction], top_n: usize) -> Result<Vec<TopItem>, AnalysisError> {
    top_by(rows, top_n, |t| format!("{} - {}", t.stock_code, t.description))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueSummary {
    pub filters_applied: OverviewFilter,
    pub kpis: Kpis,
    pub monthly_trend: Vec<MonthlyTrendItem>,
    pub top_countries: Vec<TopItem>,
    pub top_products: Vec<TopItem>,
}

pub fn revenue_summary(
    dataset: &Dataset,
    filter: &OverviewFilter,
) -> Result<RevenueSummary, AnalysisError> {
    filter.validate()?;
    let rows = select_rows(dataset, filter);
    Ok(RevenueSummary {
        filters_applied: filter.clone(),
        kpis: kpis(&rows, filter.top_n)?,
        monthly_trend: monthly_trend(&rows)?,
        top_countries: top_countries(&rows, filter.top_n)?,
        top_products: top_products(&rows, filter.top_n)?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthRevenue {
    pub year_month: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRevenue {
    pub stock_code: String,
    pub description: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueForecast {
    pub monthly_trend: Vec<MonthRevenue>,
    pub quarterly_revenue: BTreeMap<u32, f64>,
    pub top_revenue_products: Vec<ProductRevenue>,
    pub total_revenue: f64,
    pub avg_basket_size: f64,
    pub projection: Vec<MonthRevenue>,
}

/// Least-squares line through `ys` at x = 0, 1, ...; returns (slope, intercept).
pub fn linear_fit(ys: &[f64]) -> (f64, f64) {
    let n = ys.len() as f64;
    if ys.is_empty() {
        return (0.0, 0.0);
    }
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (slope, mean_y - slope * mean_x)
}

fn next_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

pub fn revenue_forecast(
    rows: &[&Transaction],
    horizon: usize,
) -> Result<RevenueForecast, AnalysisError> {
    let rows = non_empty(rows)?;
    let months = revenue_by(rows, month_key);
    let monthly_trend = months
        .iter()
        .map(|(m, acc)| MonthRevenue {
            year_month: month_label(*m),
            revenue: round2(acc.revenue),
        })
        .collect::<Vec<_>>();

    let mut quarterly_revenue: BTreeMap<u32, f64> = BTreeMap::new();
    for tx in rows {
        *quarterly_revenue.entry(quarter(&tx.invoice_date)).or_default() += tx.revenue();
    }
    for v in quarterly_revenue.values_mut() {
        *v = round2(*v);
    }

    let mut products: HashMap<&str, (&str, f64)> = HashMap::new();
    for &tx in rows {
        let entry = products
            .entry(tx.stock_code.as_str())
            .or_insert((tx.description.as_str(), 0.0));
        entry.1 += tx.revenue();
    }
    let mut top = products.into_iter().collect::<Vec<_>>();
    top.sort_by(|a, b| {
        b.1.1
            .partial_cmp(&a.1.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    let top_revenue_products = top
        .into_iter()
        .take(10)
        .map(|(code, (desc, revenue))| ProductRevenue {
            stock_code: code.to_string(),
            description: desc.to_string(),
            revenue: round2(revenue),
        })
        .collect();

    let ys = months.values().map(|acc| acc.revenue).collect::<Vec<_>>();
    let (slope, intercept) = linear_fit(&ys);
    let mut projection = Vec::with_capacity(horizon);
    let mut month = months.keys().next_back().copied().unwrap_or((1970, 1));
    for step in 0..horizon {
        month = next_month(month);
        let x = (ys.len() + step) as f64;
        projection.push(MonthRevenue {
            year_month: month_label(month),
            revenue: round2((intercept + slope * x).max(0.0)),
        });
    }

    Ok(RevenueForecast {
        monthly_trend,
        quarterly_revenue,
        top_revenue_products,
        total_revenue: round2(rows.iter().map(|t| t.revenue()).sum()),
        avg_basket_size: round2(average_basket(rows)),
        projection,
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage6_overview.rs"]
mod tests;
