use chrono::NaiveDate;

use super::*;

fn tx(invoice: &str, desc: &str, day: u32, qty: i64) -> Transaction {
    Transaction {
        invoice_no: invoice.to_string(),
        stock_code: format!("SKU-{}", desc),
        description: desc.to_string(),
        quantity: qty,
        invoice_date: NaiveDate::from_ymd_opt(2011, 3, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
        unit_price: 2.0,
        customer_id: Some(format!("C{}", invoice)),
        country: "United Kingdom".to_string(),
    }
}

fn breakfast() -> Vec<Transaction> {
    vec![
        tx("1", "BREAD", 1, 1),
        tx("1", "BUTTER", 1, 1),
        tx("2", "BREAD", 2, 1),
        tx("2", "BUTTER", 2, 1),
        tx("2", "JAM", 2, 1),
        tx("3", "BREAD", 3, 1),
        tx("3", "JAM", 3, 1),
        tx("4", "BUTTER", 4, 1),
        tx("4", "JAM", 4, 1),
        tx("5", "BREAD", 5, 1),
        tx("5", "BUTTER", 5, 1),
        tx("5", "JAM", 5, 1),
    ]
}

fn params() -> BasketParams {
    BasketParams {
        min_support: 0.5,
        min_confidence: 0.7,
        ..BasketParams::default()
    }
}

#[test]
fn test_top_items_ranked_by_count_then_key() {
    let rows = breakfast();
    let refs = rows.iter().collect::<Vec<_>>();
    let top = top_items(&refs, ItemKey::Description, 2);
    assert_eq!(top, vec!["BREAD", "BUTTER"]);
    let codes = top_items(&refs, ItemKey::StockCode, 1);
    assert_eq!(codes, vec!["SKU-BREAD"]);
}

#[test]
fn test_build_baskets_nets_quantities_per_invoice() {
    let rows = vec![
        tx("1", "BREAD", 1, 2),
        tx("1", "BREAD", 1, -2),
        tx("1", "JAM", 1, 1),
        tx("2", "BREAD", 2, 1),
    ];
    let refs = rows.iter().collect::<Vec<_>>();
    let input = build_baskets(&refs, &BasketParams::default(), ItemKey::Description);
    assert_eq!(input.baskets.items, vec!["BREAD".to_string(), "JAM".to_string()]);
    assert_eq!(input.baskets.transactions, vec![vec![1], vec![0]]);
    assert_eq!(input.rows.len(), 4);
}

#[test]
fn test_build_baskets_limits_rows_to_most_recent() {
    let rows = breakfast();
    let refs = rows.iter().collect::<Vec<_>>();
    let keep = ["BREAD", "BUTTER", "JAM"].into_iter().collect::<HashSet<_>>();
    let input = build_baskets_over(&refs, &keep, 3, ItemKey::Description);
    assert_eq!(input.rows.len(), 3);
    assert!(input.rows.iter().all(|t| t.invoice_no == "5"));
    assert_eq!(input.baskets.n_transactions(), 1);
}

#[test]
fn test_mine_bundles_ranks_and_prices_rules() {
    let rows = breakfast();
    let refs = rows.iter().collect::<Vec<_>>();
    let result = mine_bundles(&refs, &params()).unwrap();
    assert_eq!(result.transactions, 5);
    assert_eq!(result.items, 3);
    assert_eq!(result.frequent_itemsets, 6);
    assert_eq!(result.total_rules, 6);
    assert_eq!(result.displayed_bundles, 6);
    assert!(result.message.is_none());

    let first = &result.bundles[0];
    assert_eq!(first.antecedents, vec!["BREAD".to_string()]);
    assert_eq!(first.consequents, vec!["BUTTER".to_string()]);
    assert_eq!(first.support, 0.6);
    assert_eq!(first.confidence, 0.75);
    assert_eq!(first.lift, 0.9375);
    assert_eq!(first.conviction, Some(0.8));
    assert_eq!(first.expected_revenue, 10.8);
    assert_eq!(first.strength, LiftStrength::Weak);
}

#[test]
fn test_mine_bundles_truncates_to_top_n() {
    let rows = breakfast();
    let refs = rows.iter().collect::<Vec<_>>();
    let p = BasketParams {
        top_n: 2,
        ..params()
    };
    let result = mine_bundles(&refs, &p).unwrap();
    assert_eq!(result.total_rules, 6);
    assert_eq!(result.bundles.len(), 2);
}

#[test]
fn test_mine_bundles_messages() {
    let rows = breakfast();
    let refs = rows.iter().collect::<Vec<_>>();
    let strict = BasketParams {
        min_confidence: 0.8,
        ..params()
    };
    let result = mine_bundles(&refs, &strict).unwrap();
    assert_eq!(result.frequent_itemsets, 6);
    assert!(result.bundles.is_empty());
    assert_eq!(
        result.message.as_deref(),
        Some("No rules found. Try lowering min_confidence.")
    );

    let sparse = vec![tx("1", "A", 1, 1), tx("2", "B", 2, 1), tx("3", "C", 3, 1)];
    let refs = sparse.iter().collect::<Vec<_>>();
    let result = mine_bundles(&refs, &params()).unwrap();
    assert_eq!(result.frequent_itemsets, 0);
    assert_eq!(
        result.message.as_deref(),
        Some("No frequent itemsets found. Try lowering min_support.")
    );
}

#[test]
fn test_mine_bundles_errors() {
    assert!(matches!(
        mine_bundles(&[], &params()),
        Err(AnalysisError::NotFound(_))
    ));
    let rows = breakfast();
    let refs = rows.iter().collect::<Vec<_>>();
    let bad = BasketParams {
        min_support: 0.0,
        ..params()
    };
    assert!(matches!(
        mine_bundles(&refs, &bad),
        Err(AnalysisError::Params(_))
    ));
}

#[test]
fn test_display_items_truncates_each_label() {
    let long = "X".repeat(50);
    let shown = display_items(&[long, "JAM".to_string()]);
    assert_eq!(shown, format!("{}, JAM", "X".repeat(40)));
}

#[test]
fn test_segment_bundles_requires_members() {
    let dataset = Dataset {
        sales: breakfast(),
        ..Dataset::default()
    };
    let rfm = RfmTable::default();
    assert!(matches!(
        segment_bundles(&dataset, &rfm, Segment::Champions, &params()),
        Err(AnalysisError::NotFound(_))
    ));
}

#[test]
fn test_segment_bundles_mines_member_rows() {
    let mut sales = breakfast();
    for t in &mut sales {
        t.customer_id = Some("C1".to_string());
    }
    let dataset = Dataset {
        sales,
        ..Dataset::default()
    };
    let rfm = crate::pipeline::stage1_rfm::compute_rfm(&dataset.sales_refs());
    let result = segment_bundles(&dataset, &rfm, Segment::Champions, &params()).unwrap();
    assert_eq!(result.customer_count, 1);
    assert_eq!(result.total_bundles_found, 6);
    assert_eq!(result.top_recommendation, result.result.bundles.first().cloned());
}
