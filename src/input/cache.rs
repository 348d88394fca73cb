use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};
use memmap2::Mmap;

use crate::input::{Dataset, InputError, LoadStats, Transaction};

const CACHE_MAGIC: &[u8; 8] = b"RDSSTX1\0";
const CACHE_VERSION: u32 = 1;
const HEADER_BYTES: usize = 8 + 4 + 8 + 5 * 8 + 8 + 8;
/// Five length-prefixed strings plus quantity, timestamp and price.
const MIN_RECORD_BYTES: usize = 5 * 4 + 3 * 8;

pub fn cache_path_for(input: &Path) -> PathBuf {
    let mut name = input
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "transactions".into());
    name.push(".dsscache");
    input.with_file_name(name)
}

pub fn hash_file(path: &Path) -> Result<u64, InputError> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; 8192];
    let mut hasher = Fnv64::new();
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

pub fn write_dataset_cache(
    path: &Path,
    source_hash: u64,
    dataset: &Dataset,
) -> Result<(), InputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(CACHE_MAGIC)?;
    write_u32(&mut w, CACHE_VERSION)?;
    write_u64(&mut w, source_hash)?;
    let stats = &dataset.stats;
    for v in [
        stats.raw_rows,
        stats.sales_rows,
        stats.cancelled_rows,
        stats.dropped_invalid,
        stats.dropped_unparsable,
    ] {
        write_u64(&mut w, v)?;
    }
    write_u64(&mut w, dataset.sales.len() as u64)?;
    write_u64(&mut w, dataset.cancellations.len() as u64)?;
    for tx in dataset.sales.iter().chain(dataset.cancellations.iter()) {
        write_transaction(&mut w, tx)?;
    }
    w.flush()?;
    Ok(())
}

/// Returns `Ok(None)` when the cache is absent or was built from different input bytes.
pub fn read_dataset_cache(path: &Path, source_hash: u64) -> Result<Option<Dataset>, InputError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let bytes = &mmap[..];
    if bytes.len() < HEADER_BYTES || &bytes[0..8] != CACHE_MAGIC {
        return Ok(None);
    }

    let mut cur = ByteCursor::new(bytes, 8);
    if cur.u32()? != CACHE_VERSION {
        return Ok(None);
    }
    if cur.u64()? != source_hash {
        return Ok(None);
    }
    let stats = LoadStats {
        raw_rows: cur.u64()?,
        sales_rows: cur.u64()?,
        cancelled_rows: cur.u64()?,
        dropped_invalid: cur.u64()?,
        dropped_unparsable: cur.u64()?,
    };
    let n_sales = cur.u64()? as usize;
    let n_cancelled = cur.u64()? as usize;
    let max_records = (bytes.len() - cur.pos) / MIN_RECORD_BYTES;
    if n_sales.saturating_add(n_cancelled) > max_records {
        return Err(InputError::Cache(format!(
            "record counts {}+{} exceed file size",
            n_sales, n_cancelled
        )));
    }

    let mut sales = Vec::with_capacity(n_sales);
    for _ in 0..n_sales {
        sales.push(cur.transaction()?);
    }
    let mut cancellations = Vec::with_capacity(n_cancelled);
    for _ in 0..n_cancelled {
        cancellations.push(cur.transaction()?);
    }
    if cur.pos != bytes.len() {
        return Err(InputError::Cache("trailing bytes after last record".to_string()));
    }

    Ok(Some(Dataset {
        source: PathBuf::new(),
        sales,
        cancellations,
        stats,
    }))
}

fn write_transaction<W: Write>(w: &mut W, tx: &Transaction) -> Result<(), InputError> {
    write_str(w, &tx.invoice_no)?;
    write_str(w, &tx.stock_code)?;
    write_str(w, &tx.description)?;
    write_str(w, tx.customer_id.as_deref().unwrap_or(""))?;
    write_str(w, &tx.country)?;
    w.write_all(&tx.quantity.to_le_bytes())?;
    w.write_all(&tx.invoice_date.and_utc().timestamp().to_le_bytes())?;
    w.write_all(&tx.unit_price.to_le_bytes())?;
    Ok(())
}

fn write_str<W: Write>(w: &mut W, s: &str) -> Result<(), InputError> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<(), InputError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<(), InputError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], InputError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| InputError::Cache(format!("truncated at offset {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], InputError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, InputError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, InputError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, InputError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, InputError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String, InputError> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(|s| s.to_string())
            .map_err(|_| InputError::Cache(format!("invalid utf-8 at offset {}", self.pos)))
    }

    fn timestamp(&mut self) -> Result<NaiveDateTime, InputError> {
        let secs = self.i64()?;
        DateTime::from_timestamp(secs, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| InputError::Cache(format!("timestamp out of range: {}", secs)))
    }

    fn transaction(&mut self) -> Result<Transaction, InputError> {
        let invoice_no = self.string()?;
        let stock_code = self.string()?;
        let description = self.string()?;
        let customer = self.string()?;
        let country = self.string()?;
        let quantity = self.i64()?;
        let invoice_date = self.timestamp()?;
        let unit_price = self.f64()?;
        Ok(Transaction {
            invoice_no,
            stock_code,
            description,
            quantity,
            invoice_date,
            unit_price,
            customer_id: if customer.is_empty() {
                None
            } else {
                Some(customer)
            },
            country,
        })
    }
}

struct Fnv64 {
    hash: u64,
}

impl Fnv64 {
    fn new() -> Self {
        Self {
            hash: 0xcbf29ce484222325,
        }
    }

    fn update(&mut self, data: &[u8]) {
        let mut h = self.hash;
        for &b in data {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        self.hash = h;
    }

    fn finish(&self) -> u64 {
        self.hash
    }
}
