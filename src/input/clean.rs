use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::input::csv::{CsvReader, ParsedRecord, escape_csv_field};
use crate::input::{InputError, UNKNOWN_PRODUCT, is_cancelled_invoice};

const CLEAN_HEADER: &str = "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country,TotalPrice,InvoiceYear,InvoiceMonth";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleaningSummary {
    pub raw_rows: u64,
    pub cleaned_rows: u64,
    pub dropped_duplicates: u64,
    pub dropped_cancelled: u64,
    pub dropped_non_positive: u64,
    pub dropped_unparsable: u64,
    pub missing_description_before: u64,
    pub missing_description_after: u64,
    pub missing_customer_id_before: u64,
    pub missing_customer_id_after: u64,
    pub unique_stock_codes: u64,
    pub processing_timestamp: String,
}

pub fn summary_path_for(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "cleaned".into());
    name.push(".summary.json");
    output.with_file_name(name)
}

/// Cleans a raw transactions CSV into `output` and writes `<output>.summary.json` beside it.
pub fn clean_dataset(input: &Path, output: &Path) -> Result<CleaningSummary, InputError> {
    if !input.exists() {
        return Err(InputError::MissingInput(format!(
            "raw dataset not found: {}",
            input.display()
        )));
    }
    let mut reader = CsvReader::open(input)?;

    let mut raw_rows = 0u64;
    let mut dropped_unparsable = 0u64;
    let mut dropped_cancelled = 0u64;
    let mut dropped_non_positive = 0u64;
    let mut dropped_duplicates = 0u64;
    let mut missing_description_before = 0u64;
    let mut missing_customer_id_before = 0u64;
    let mut missing_customer_id_after = 0u64;

    let mut seen = HashSet::new();
    let mut stock_codes = BTreeSet::new();
    let mut kept: Vec<ParsedRecord> = Vec::new();

    while let Some((line_no, record)) = reader.next_record()? {
        raw_rows += 1;
        let record = match record {
            Ok(r) => r,
            Err(msg) => {
                if dropped_unparsable == 0 {
                    warn!("skipping unparsable row (line {}): {}", line_no, msg);
                }
                dropped_unparsable += 1;
                continue;
            }
        };
        if record.description.is_none() {
            missing_description_before += 1;
        }
        if record.customer_id.is_none() {
            missing_customer_id_before += 1;
        }
        if is_cancelled_invoice(&record.invoice_no) {
            dropped_cancelled += 1;
            continue;
        }
        if record.quantity <= 0 || record.unit_price <= 0.0 {
            dropped_non_positive += 1;
            continue;
        }
        if !seen.insert(duplicate_key(&record)) {
            dropped_duplicates += 1;
            continue;
        }
        if record.customer_id.is_none() {
            missing_customer_id_after += 1;
        }
        stock_codes.insert(record.stock_code.clone());
        kept.push(record);
    }

    if raw_rows == 0 {
        return Err(InputError::Empty(format!(
            "no data rows in {}",
            input.display()
        )));
    }

    write_cleaned_csv(output, &kept)?;

    let summary = CleaningSummary {
        raw_rows,
        cleaned_rows: kept.len() as u64,
        dropped_duplicates,
        dropped_cancelled,
        dropped_non_positive,
        dropped_unparsable,
        missing_description_before,
        missing_description_after: 0,
        missing_customer_id_before,
        missing_customer_id_after,
        unique_stock_codes: stock_codes.len() as u64,
        processing_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };

    let summary_path = summary_path_for(output);
    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| InputError::Parse(format!("summary serialisation failed: {}", e)))?;
    fs::write(&summary_path, json)?;

    info!(
        "cleaned {} -> {}: raw_rows={}, cleaned_rows={}, duplicates={}, cancelled={}, non_positive={}",
        input.display(),
        output.display(),
        summary.raw_rows,
        summary.cleaned_rows,
        summary.dropped_duplicates,
        summary.dropped_cancelled,
        summary.dropped_non_positive
    );
    Ok(summary)
}

fn duplicate_key(r: &ParsedRecord) -> String {
    format!(
        "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
        r.invoice_no,
        r.stock_code,
        r.description.as_deref().unwrap_or(UNKNOWN_PRODUCT),
        r.quantity,
        r.invoice_date,
        r.unit_price.to_bits(),
        r.customer_id.as_deref().unwrap_or(""),
        r.country
    )
}

fn write_cleaned_csv(path: &Path, rows: &[ParsedRecord]) -> Result<(), InputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{}", CLEAN_HEADER)?;
    for r in rows {
        let total = (r.quantity as f64 * r.unit_price * 100.0).round() / 100.0;
        writeln!(
            w,
            "{},{},{},{},{},{},{},{},{:.2},{},{}",
            escape_csv_field(&r.invoice_no),
            escape_csv_field(&r.stock_code),
            escape_csv_field(r.description.as_deref().unwrap_or(UNKNOWN_PRODUCT)),
            r.quantity,
            r.invoice_date.format("%Y-%m-%d %H:%M:%S"),
            r.unit_price,
            r.customer_id.as_deref().map(escape_csv_field).unwrap_or_default(),
            escape_csv_field(&r.country),
            total,
            r.invoice_date.year(),
            r.invoice_date.month()
        )?;
    }
    w.flush()?;
    Ok(())
}
