use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::segment::{SEGMENT_ORDER, Segment};
use crate::pipeline::stage1_rfm::{RfmQuantiles, RfmRow, RfmTable};
use crate::report::{mean, percent, round2};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub segment_id: usize,
    pub segment_name: Segment,
    pub customer_count: usize,
    pub share_pct: f64,
    pub avg_recency: f64,
    pub avg_frequency: f64,
    pub avg_monetary: f64,
    pub total_value: f64,
    pub characteristics: String,
    pub recommended_actions: Vec<String>,
}

pub fn segment_label(row: &RfmRow, q: &RfmQuantiles) -> Segment {
    let r = row.recency as f64;
    let f = row.frequency as f64;
    let m = row.monetary;
    if r <= q.recency.q25 && f >= q.frequency.q75 && m >= q.monetary.q75 {
        Segment::Champions
    } else if r <= q.recency.q50 && f >= q.frequency.q50 {
        Segment::Loyal
    } else if r >= q.recency.q75 && f <= q.frequency.q25 {
        Segment::AtRisk
    } else if r >= q.recency.q50 && f <= q.frequency.q50 {
        Segment::Hibernating
    } else {
        Segment::Regulars
    }
}

/// One label per RFM row, in row order.
pub fn assign_segments(table: &RfmTable) -> Vec<Segment> {
    table
        .rows
        .iter()
        .map(|row| segment_label(row, &table.quantiles))
        .collect()
}

pub fn segment_customers(table: &RfmTable) -> Vec<SegmentSummary> {
    let labels = assign_segments(table);
    let total = table.rows.len();

    let mut out = Vec::new();
    for segment in SEGMENT_ORDER {
        let members = table
            .rows
            .iter()
            .zip(&labels)
            .filter(|(_, label)| **label == segment)
            .map(|(row, _)| row)
            .collect::<Vec<_>>();
        if members.is_empty() {
            continue;
        }
        let recency = members.iter().map(|r| r.recency as f64).collect::<Vec<_>>();
        let frequency = members.iter().map(|r| r.frequency as f64).collect::<Vec<_>>();
        let monetary = members.iter().map(|r| r.monetary).collect::<Vec<_>>();
        out.push(SegmentSummary {
            segment_id: segment.id(),
            segment_name: segment,
            customer_count: members.len(),
            share_pct: round2(percent(members.len() as f64, total as f64)),
            avg_recency: round2(mean(&recency)),
            avg_frequency: round2(mean(&frequency)),
            avg_monetary: round2(mean(&monetary)),
            total_value: round2(monetary.iter().sum()),
            characteristics: segment.characteristics().to_string(),
            recommended_actions: segment
                .recommended_actions()
                .iter()
                .map(|a| a.to_string())
                .collect(),
        });
    }
    out
}

pub fn customers_in_segment(table: &RfmTable, segment: Segment) -> BTreeSet<String> {
    table
        .rows
        .iter()
        .filter(|row| segment_label(row, &table.quantiles) == segment)
        .map(|row| row.customer_id.clone())
        .collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage2_segments.rs"]
mod tests;
