use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub mod cache;
pub mod clean;
pub mod csv;
pub mod dates;

use cache::{cache_path_for, hash_file, read_dataset_cache, write_dataset_cache};
use csv::CsvReader;

pub const UNKNOWN_PRODUCT: &str = "UNKNOWN PRODUCT";

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub invoice_no: String,
    pub stock_code: String,
    pub description: String,
    pub quantity: i64,
    pub invoice_date: NaiveDateTime,
    pub unit_price: f64,
    pub customer_id: Option<String>,
    pub country: String,
}

impl Transaction {
    pub fn revenue(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }

    pub fn is_cancelled(&self) -> bool {
        is_cancelled_invoice(&self.invoice_no)
    }
}

pub fn is_cancelled_invoice(invoice_no: &str) -> bool {
    invoice_no.starts_with('C') || invoice_no.starts_with('c')
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub raw_rows: u64,
    pub sales_rows: u64,
    pub cancelled_rows: u64,
    pub dropped_invalid: u64,
    pub dropped_unparsable: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub source: PathBuf,
    pub sales: Vec<Transaction>,
    pub cancellations: Vec<Transaction>,
    pub stats: LoadStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        let day = ts.date();
        if let Some(start) = self.start {
            if day < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if day > end {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub use_cache: bool,
    pub date_range: Option<DateRange>,
    pub max_rows: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRangeInfo {
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
    pub default_start: NaiveDate,
    pub default_end: NaiveDate,
    pub total_days: i64,
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing input: {0}")]
    MissingInput(String),
    #[error("missing column: {0}")]
    MissingColumn(String),
    #[error("input is empty: {0}")]
    Empty(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("cache error: {0}")]
    Cache(String),
}

pub fn load_dataset(path: &Path, options: &LoadOptions) -> Result<Dataset, InputError> {
    if !path.exists() {
        return Err(InputError::MissingInput(format!(
            "transactions file not found: {}",
            path.display()
        )));
    }

    let mut dataset = if options.use_cache {
        load_with_cache(path)?
    } else {
        parse_transactions(path)?
    };

    if let Some(range) = &options.date_range {
        if !range.is_unbounded() {
            dataset = dataset.filter_dates(range);
            info!(
                "date filter applied: start={:?}, end={:?}, sales_rows={}",
                range.start,
                range.end,
                dataset.sales.len()
            );
        }
    }

    if let Some(limit) = options.max_rows {
        if dataset.sales.len() > limit {
            let sales = std::mem::take(&mut dataset.sales);
            dataset.sales = keep_most_recent(sales, limit);
            info!("limited to {} most recent sales rows", limit);
        }
    }

    Ok(dataset)
}

fn load_with_cache(path: &Path) -> Result<Dataset, InputError> {
    let cache_path = cache_path_for(path);
    let source_hash = hash_file(path)?;
    match read_dataset_cache(&cache_path, source_hash) {
        Ok(Some(mut dataset)) => {
            info!("loaded dataset cache {}", cache_path.display());
            dataset.source = path.to_path_buf();
            return Ok(dataset);
        }
        Ok(None) => {}
        Err(e) => warn!("ignoring unreadable cache {}: {}", cache_path.display(), e),
    }

    let dataset = parse_transactions(path)?;
    if let Err(e) = write_dataset_cache(&cache_path, source_hash, &dataset) {
        warn!("failed to write cache {}: {}", cache_path.display(), e);
    } else {
        info!("wrote dataset cache {}", cache_path.display());
    }
    Ok(dataset)
}

pub fn parse_transactions(path: &Path) -> Result<Dataset, InputError> {
    let mut reader = CsvReader::open(path)?;
    let mut stats = LoadStats::default();
    let mut sales = Vec::new();
    let mut cancellations = Vec::new();
    let mut first_bad_line: Option<usize> = None;

    while let Some((line_no, record)) = reader.next_record()? {
        stats.raw_rows += 1;
        let record = match record {
            Ok(r) => r,
            Err(msg) => {
                stats.dropped_unparsable += 1;
                if first_bad_line.is_none() {
                    warn!("skipping unparsable row (line {}): {}", line_no, msg);
                    first_bad_line = Some(line_no);
                }
                continue;
            }
        };
        let tx = record.into_transaction();
        if tx.is_cancelled() {
            stats.cancelled_rows += 1;
            cancellations.push(tx);
        } else if tx.quantity <= 0 || tx.unit_price <= 0.0 {
            stats.dropped_invalid += 1;
        } else {
            stats.sales_rows += 1;
            sales.push(tx);
        }
    }

    if stats.raw_rows == 0 {
        return Err(InputError::Empty(format!(
            "no data rows in {}",
            path.display()
        )));
    }
    if stats.dropped_unparsable > 1 {
        warn!(
            "{} unparsable rows skipped in total",
            stats.dropped_unparsable
        );
    }
    if reader.latin1_lines() > 0 {
        info!("{} lines decoded as Latin-1", reader.latin1_lines());
    }

    info!(
        "loaded {}: raw_rows={}, sales_rows={}, cancelled_rows={}, dropped_invalid={}",
        path.display(),
        stats.raw_rows,
        stats.sales_rows,
        stats.cancelled_rows,
        stats.dropped_invalid
    );

    Ok(Dataset {
        source: path.to_path_buf(),
        sales,
        cancellations,
        stats,
    })
}

impl Dataset {
    pub fn sales_refs(&self) -> Vec<&Transaction> {
        self.sales.iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sales.is_empty()
    }

    pub fn filter_dates(&self, range: &DateRange) -> Dataset {
        Dataset {
            source: self.source.clone(),
            sales: self
                .sales
                .iter()
                .filter(|t| range.contains(&t.invoice_date))
                .cloned()
                .collect(),
            cancellations: self
                .cancellations
                .iter()
                .filter(|t| range.contains(&t.invoice_date))
                .cloned()
                .collect(),
            stats: self.stats.clone(),
        }
    }

    pub fn filter_countries(&self, countries: &[String]) -> Dataset {
        if countries.is_empty() {
            return self.clone();
        }
        let keep = |t: &&Transaction| countries.iter().any(|c| c.eq_ignore_ascii_case(&t.country));
        Dataset {
            source: self.source.clone(),
            sales: self.sales.iter().filter(keep).cloned().collect(),
            cancellations: self.cancellations.iter().filter(keep).cloned().collect(),
            stats: self.stats.clone(),
        }
    }

    /// Earliest and latest sale timestamps.
    pub fn date_span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut iter = self.sales.iter().map(|t| t.invoice_date);
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));
        Some((min, max))
    }

    pub fn date_range_info(&self) -> Option<DateRangeInfo> {
        let (min, max) = self.date_span()?;
        let min_date = min.date();
        let max_date = max.date();
        let default_start = (max_date - Duration::days(365)).max(min_date);
        Some(DateRangeInfo {
            min_date,
            max_date,
            default_start,
            default_end: max_date,
            total_days: (max_date - min_date).num_days(),
        })
    }
}

/// Keeps the `limit` most recent rows, preserving their original order.
pub fn keep_most_recent(rows: Vec<Transaction>, limit: usize) -> Vec<Transaction> {
    if rows.len() <= limit {
        return rows;
    }
    let mut order = (0..rows.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| rows[b].invoice_date.cmp(&rows[a].invoice_date));
    let mut keep = vec![false; rows.len()];
    for &idx in order.iter().take(limit) {
        keep[idx] = true;
    }
    rows.into_iter()
        .zip(keep)
        .filter_map(|(row, k)| if k { Some(row) } else { None })
        .collect()
}

/// Reference-slice variant of [`keep_most_recent`].
pub fn most_recent_refs<'a>(rows: &[&'a Transaction], limit: usize) -> Vec<&'a Transaction> {
    if rows.len() <= limit {
        return rows.to_vec();
    }
    let mut order = (0..rows.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| rows[b].invoice_date.cmp(&rows[a].invoice_date));
    let mut kept = order.into_iter().take(limit).collect::<Vec<_>>();
    kept.sort_unstable();
    kept.into_iter().map(|idx| rows[idx]).collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/tests.rs"]
mod tests;
