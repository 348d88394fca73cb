use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::input::Dataset;
use crate::model::params::AnalysisParams;
use crate::model::segment::Segment;
use crate::pipeline::stage1_rfm::RfmTable;
use crate::pipeline::stage2_segments::SegmentSummary;
use crate::pipeline::stage3_basket::BasketResult;
use crate::pipeline::stage6_overview::{Kpis, MonthlyTrendItem};
use crate::report::json::render_summary_json;
use crate::report::text::render_report_text;
use crate::report::{
    BasketStat, InputSummary, ReportContext, SegmentStat, SummaryData, format_f64_6,
};

const REPORT_BUNDLES: usize = 5;
const DATE_FMT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct Stage7Input<'a> {
    pub dataset: &'a Dataset,
    pub rfm: &'a RfmTable,
    /// One label per `rfm.rows` entry.
    pub segments: &'a [Segment],
    pub segment_summaries: &'a [SegmentSummary],
    pub basket: &'a BasketResult,
    pub kpis: Option<&'a Kpis>,
    pub monthly: &'a [MonthlyTrendItem],
    pub params: &'a AnalysisParams,

    pub tool_name: String,
    pub tool_version: String,
}

pub fn write_reports(input: &Stage7Input<'_>, out_dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(out_dir)?;

    write_rfm_tsv(input, &out_dir.join("rfm.tsv"))?;
    write_segments_tsv(input, &out_dir.join("segments.tsv"))?;
    write_rules_tsv(input, &out_dir.join("basket_rules.tsv"))?;
    write_monthly_tsv(input, &out_dir.join("monthly_trend.tsv"))?;

    let summary = build_summary(input);
    let json = render_summary_json(&summary)?;
    write_text(&out_dir.join("summary.json"), &json)?;

    let report_ctx = build_report_context(input, &summary);
    let report = render_report_text(&report_ctx);
    write_text(&out_dir.join("report.txt"), &report)?;

    Ok(())
}

fn write_rfm_tsv(input: &Stage7Input<'_>, path: &Path) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    let header = [
        "customer_id",
        "recency",
        "frequency",
        "monetary",
        "r_score",
        "f_score",
        "m_score",
        "rfm_score",
        "segment",
    ];
    writeln!(w, "{}", header.join("\t"))?;
    for (i, row) in input.rfm.rows.iter().enumerate() {
        let segment = input.segments.get(i).map(|s| s.name()).unwrap_or("NA");
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            tsv_field(&row.customer_id),
            row.recency,
            row.frequency,
            format_f64_6(row.monetary),
            row.r_score,
            row.f_score,
            row.m_score,
            row.rfm_score,
            segment
        )?;
    }
    w.flush()
}

fn write_segments_tsv(input: &Stage7Input<'_>, path: &Path) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    let header = [
        "segment_id",
        "segment",
        "customers",
        "share_pct",
        "avg_recency",
        "avg_frequency",
        "avg_monetary",
        "total_value",
    ];
    writeln!(w, "{}", header.join("\t"))?;
    for s in input.segment_summaries {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            s.segment_id,
            s.segment_name.name(),
            s.customer_count,
            format_f64_6(s.share_pct),
            format_f64_6(s.avg_recency),
            format_f64_6(s.avg_frequency),
            format_f64_6(s.avg_monetary),
            format_f64_6(s.total_value)
        )?;
    }
    w.flush()
}

fn write_rules_tsv(input: &Stage7Input<'_>, path: &Path) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    let header = [
        "rank",
        "antecedents",
        "consequents",
        "support",
        "confidence",
        "lift",
        "leverage",
        "conviction",
        "expected_revenue",
        "strength",
    ];
    writeln!(w, "{}", header.join("\t"))?;
    for (i, b) in input.basket.bundles.iter().enumerate() {
        let conviction = match b.conviction {
            Some(v) => format_f64_6(v),
            None => "inf".to_string(),
        };
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            i + 1,
            tsv_field(&b.antecedents.join(" | ")),
            tsv_field(&b.consequents.join(" | ")),
            format_f64_6(b.support),
            format_f64_6(b.confidence),
            format_f64_6(b.lift),
            format_f64_6(b.leverage),
            conviction,
            format_f64_6(b.expected_revenue),
            b.strength.label()
        )?;
    }
    w.flush()
}

fn write_monthly_tsv(input: &Stage7Input<'_>, path: &Path) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "year_month\trevenue\tmom_growth\ttransactions")?;
    for m in input.monthly {
        let growth = match m.mom_growth {
            Some(v) => format_f64_6(v),
            None => "NA".to_string(),
        };
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            m.year_month,
            format_f64_6(m.revenue),
            growth,
            m.transactions
        )?;
    }
    w.flush()
}

fn write_text(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(contents.as_bytes())?;
    w.flush()
}

/// Descriptions can carry tabs or newlines; TSV cells cannot.
fn tsv_field(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

fn segment_stats(summaries: &[SegmentSummary]) -> Vec<SegmentStat> {
    summaries
        .iter()
        .map(|s| SegmentStat {
            name: s.segment_name.name().to_string(),
            customers: s.customer_count,
            share_pct: s.share_pct,
            total_value: s.total_value,
        })
        .collect()
}

pub fn build_summary(input: &Stage7Input<'_>) -> SummaryData {
    let span = input.dataset.date_span();
    SummaryData {
        tool: input.tool_name.clone(),
        version: input.tool_version.clone(),
        input: InputSummary {
            source: input.dataset.source.display().to_string(),
            stats: input.dataset.stats.clone(),
            customers: input.rfm.len(),
            date_min: span.map(|(min, _)| min.format(DATE_FMT).to_string()),
            date_max: span.map(|(_, max)| max.format(DATE_FMT).to_string()),
        },
        params: input.params.clone(),
        reference_date: input
            .rfm
            .reference_date
            .map(|d| d.format(DATE_FMT).to_string()),
        segments: segment_stats(input.segment_summaries),
        basket: BasketStat {
            transactions: input.basket.transactions,
            items: input.basket.items,
            frequent_itemsets: input.basket.frequent_itemsets,
            total_rules: input.basket.total_rules,
            top_bundle: input.basket.bundles.first().cloned(),
            message: input.basket.message.clone(),
        },
        kpis: input.kpis.cloned(),
        monthly_trend: input.monthly.to_vec(),
    }
}

pub fn build_report_context(input: &Stage7Input<'_>, summary: &SummaryData) -> ReportContext {
    let missing_customer_rows = input
        .dataset
        .sales
        .iter()
        .filter(|t| t.customer_id.is_none())
        .count() as u64;
    let by_revenue = |a: &&MonthlyTrendItem, b: &&MonthlyTrendItem| {
        a.revenue
            .partial_cmp(&b.revenue)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.year_month.cmp(&a.year_month))
    };
    ReportContext {
        tool: summary.tool.clone(),
        version: summary.version.clone(),
        source: summary.input.source.clone(),
        raw_rows: summary.input.stats.raw_rows,
        sales_rows: summary.input.stats.sales_rows,
        cancelled_rows: summary.input.stats.cancelled_rows,
        missing_customer_rows,
        date_min: summary.input.date_min.clone(),
        date_max: summary.input.date_max.clone(),
        customers: summary.input.customers,
        segments: summary.segments.clone(),
        basket: summary.basket.clone(),
        top_bundles: input
            .basket
            .bundles
            .iter()
            .take(REPORT_BUNDLES)
            .cloned()
            .collect(),
        kpis: summary.kpis.clone(),
        best_month: input.monthly.iter().max_by(by_revenue).cloned(),
        worst_month: input.monthly.iter().min_by(by_revenue).cloned(),
        months: input.monthly.len(),
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage7_report.rs"]
mod tests;
