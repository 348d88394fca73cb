use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDateTime;
use flate2::read::MultiGzDecoder;
use tracing::warn;

use crate::input::dates::parse_invoice_date;
use crate::input::{InputError, Transaction, UNKNOWN_PRODUCT};

pub fn open_maybe_gz(path: &Path) -> Result<Box<dyn BufRead>, InputError> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub invoice_no: usize,
    pub stock_code: usize,
    pub description: Option<usize>,
    pub quantity: usize,
    pub invoice_date: usize,
    pub unit_price: usize,
    pub customer_id: Option<usize>,
    pub country: Option<usize>,
}

impl ColumnMap {
    pub fn from_header(fields: &[String]) -> Result<Self, InputError> {
        let keys = fields.iter().map(|f| header_key(f)).collect::<Vec<_>>();
        let find = |names: &[&str]| keys.iter().position(|k| names.contains(&k.as_str()));
        let require = |names: &[&str], label: &str| {
            find(names).ok_or_else(|| InputError::MissingColumn(label.to_string()))
        };

        Ok(Self {
            invoice_no: require(&["invoiceno", "invoice", "invoicenumber"], "InvoiceNo")?,
            stock_code: require(&["stockcode", "sku", "productcode"], "StockCode")?,
            description: find(&["description", "productname"]),
            quantity: require(&["quantity", "qty"], "Quantity")?,
            invoice_date: require(&["invoicedate", "date"], "InvoiceDate")?,
            unit_price: require(&["unitprice", "price"], "UnitPrice")?,
            customer_id: find(&["customerid", "customer"]),
            country: find(&["country"]),
        })
    }
}

fn header_key(field: &str) -> String {
    field
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub invoice_no: String,
    pub stock_code: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub invoice_date: NaiveDateTime,
    pub unit_price: f64,
    pub customer_id: Option<String>,
    pub country: String,
}

impl ParsedRecord {
    pub fn into_transaction(self) -> Transaction {
        Transaction {
            invoice_no: self.invoice_no,
            stock_code: self.stock_code,
            description: self
                .description
                .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string()),
            quantity: self.quantity,
            invoice_date: self.invoice_date,
            unit_price: self.unit_price,
            customer_id: self.customer_id,
            country: self.country,
        }
    }
}

pub struct CsvReader {
    reader: Box<dyn BufRead>,
    columns: ColumnMap,
    line_no: usize,
    raw: Vec<u8>,
    latin1_lines: usize,
}

impl CsvReader {
    pub fn open(path: &Path) -> Result<Self, InputError> {
        let mut reader = open_maybe_gz(path)?;
        let mut raw = Vec::new();
        let mut line_no = 0usize;
        let header_line = loop {
            raw.clear();
            let read = reader.read_until(b'\n', &mut raw)?;
            if read == 0 {
                return Err(InputError::Empty(format!(
                    "{} has no header",
                    path.display()
                )));
            }
            line_no += 1;
            let line = decode_line(&raw);
            if !line.trim().is_empty() {
                break line.into_owned();
            }
        };
        let header = split_csv_line(header_line.trim_end_matches(['\r', '\n']));
        let columns = ColumnMap::from_header(&header)?;
        Ok(Self {
            reader,
            columns,
            line_no,
            raw,
            latin1_lines: 0,
        })
    }

    /// Lines that were not valid UTF-8 and were read as Latin-1.
    pub fn latin1_lines(&self) -> usize {
        self.latin1_lines
    }

    /// Next non-empty record with its 1-based line number.
    pub fn next_record(
        &mut self,
    ) -> Result<Option<(usize, Result<ParsedRecord, String>)>, InputError> {
        loop {
            self.raw.clear();
            let read = self.reader.read_until(b'\n', &mut self.raw)?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let decoded = decode_line(&self.raw);
            if matches!(decoded, Cow::Owned(_)) {
                if self.latin1_lines == 0 {
                    warn!(
                        "line {} is not valid UTF-8, decoding as Latin-1",
                        self.line_no
                    );
                }
                self.latin1_lines += 1;
            }
            let line = decoded.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_csv_line(line);
            return Ok(Some((self.line_no, parse_record(&fields, &self.columns))));
        }
    }
}

/// UTF-8 when valid, otherwise each byte maps to the Latin-1 code point of the same value.
pub fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(raw) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(raw.iter().map(|&b| b as char).collect()),
    }
}

pub fn parse_record(fields: &[String], columns: &ColumnMap) -> Result<ParsedRecord, String> {
    let get = |idx: usize| fields.get(idx).map(|s| s.trim()).unwrap_or("");
    let get_opt = |idx: Option<usize>| idx.map(get).filter(|s| !s.is_empty());

    let invoice_no = get(columns.invoice_no);
    if invoice_no.is_empty() {
        return Err("empty InvoiceNo".to_string());
    }
    let stock_code = get(columns.stock_code);
    if stock_code.is_empty() {
        return Err("empty StockCode".to_string());
    }
    let quantity = parse_quantity(get(columns.quantity))?;
    let unit_price = get(columns.unit_price)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid UnitPrice '{}'", get(columns.unit_price)))?;
    let invoice_date = parse_invoice_date(get(columns.invoice_date))
        .ok_or_else(|| format!("invalid InvoiceDate '{}'", get(columns.invoice_date)))?;

    Ok(ParsedRecord {
        invoice_no: invoice_no.to_string(),
        stock_code: stock_code.to_ascii_uppercase(),
        description: get_opt(columns.description).map(|s| s.to_string()),
        quantity,
        invoice_date,
        unit_price,
        customer_id: get_opt(columns.customer_id).and_then(normalize_customer_id),
        country: get_opt(columns.country).unwrap_or("Unknown").to_string(),
    })
}

fn parse_quantity(raw: &str) -> Result<i64, String> {
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(v as i64),
        _ => Err(format!("invalid Quantity '{}'", raw)),
    }
}

/// `17850.0` and `17850` name the same customer; `nan` and blanks name nobody.
pub fn normalize_customer_id(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("<na>") {
        return None;
    }
    if let Some((int_part, frac)) = s.split_once('.') {
        if !int_part.is_empty()
            && int_part.bytes().all(|b| b.is_ascii_digit())
            && frac.bytes().all(|b| b == b'0')
        {
            return Some(int_part.to_string());
        }
    }
    Some(s.to_string())
}

/// Splits one CSV line, honouring double-quoted fields and `""` escapes.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
        } else {
            match ch {
                '"' => in_quotes = true,
                ',' => fields.push(std::mem::take(&mut field)),
                _ => field.push(ch),
            }
        }
    }
    fields.push(field);
    fields
}

pub fn escape_csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
