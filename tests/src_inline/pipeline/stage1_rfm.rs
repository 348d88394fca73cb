use chrono::NaiveDate;

use super::*;

fn tx(invoice: &str, day: u32, qty: i64, price: f64, customer: Option<&str>) -> Transaction {
    Transaction {
        invoice_no: invoice.to_string(),
        stock_code: "A".to_string(),
        description: "ITEM A".to_string(),
        quantity: qty,
        invoice_date: NaiveDate::from_ymd_opt(2011, 1, day)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap(),
        unit_price: price,
        customer_id: customer.map(|c| c.to_string()),
        country: "United Kingdom".to_string(),
    }
}

#[test]
fn test_quintile_scores_spread() {
    let values = (1..=10).map(|v| v as f64).collect::<Vec<_>>();
    assert_eq!(quintile_scores(&values), vec![1, 1, 2, 2, 3, 3, 4, 4, 5, 5]);
}

#[test]
fn test_quintile_scores_ties_share_score() {
    assert_eq!(quintile_scores(&[5.0, 5.0, 5.0, 5.0]), vec![4, 4, 4, 4]);
    let scores = quintile_scores(&[1.0, 2.0, 2.0, 3.0]);
    assert_eq!(scores[1], scores[2]);
    assert!(quintile_scores(&[]).is_empty());
}

#[test]
fn test_reference_date_is_day_after_latest() {
    let rows = [tx("1", 3, 1, 1.0, None), tx("2", 9, 1, 1.0, None)];
    let refs = rows.iter().collect::<Vec<_>>();
    let expected = NaiveDate::from_ymd_opt(2011, 1, 10)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    assert_eq!(reference_date(&refs), Some(expected));
    assert_eq!(reference_date(&[]), None);
}

#[test]
fn test_compute_rfm_groups_by_customer() {
    let rows = [
        tx("100", 1, 2, 5.0, Some("B")),
        tx("101", 5, 1, 10.0, Some("A")),
        tx("101", 5, 3, 10.0, Some("A")),
        tx("102", 10, 1, 20.0, Some("A")),
        tx("103", 10, 50, 1.0, None),
    ];
    let refs = rows.iter().collect::<Vec<_>>();
    let table = compute_rfm(&refs);

    assert_eq!(table.len(), 2);
    let a = &table.rows[0];
    let b = &table.rows[1];
    assert_eq!(a.customer_id, "A");
    assert_eq!(b.customer_id, "B");

    assert_eq!(a.recency, 1);
    assert_eq!(a.frequency, 2);
    assert!((a.monetary - 60.0).abs() < 1e-9);
    assert_eq!(b.recency, 10);
    assert_eq!(b.frequency, 1);
    assert!((b.monetary - 10.0).abs() < 1e-9);

    assert_eq!((a.r_score, a.f_score, a.m_score), (3, 5, 5));
    assert_eq!((b.r_score, b.f_score, b.m_score), (1, 3, 3));
    assert_eq!(a.rfm_score, 13);

    let summary = table.summary();
    assert_eq!(summary.customers_analyzed, 2);
    assert_eq!(summary.avg_recency, 5.5);
    assert_eq!(summary.avg_monetary, 35.0);
    assert_eq!(table.quantiles.frequency.q50, 1.5);
}

#[test]
fn test_compute_rfm_empty_input() {
    let table = compute_rfm(&[]);
    assert!(table.is_empty());
    assert!(table.reference_date.is_none());
}
