use chrono::NaiveDate;

use super::*;

fn tx(invoice: &str, code: &str, desc: &str, price: f64, day: u32, customer: &str) -> Transaction {
    Transaction {
        invoice_no: invoice.to_string(),
        stock_code: code.to_string(),
        description: desc.to_string(),
        quantity: 1,
        invoice_date: NaiveDate::from_ymd_opt(2011, 3, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
        unit_price: price,
        customer_id: Some(customer.to_string()),
        country: "United Kingdom".to_string(),
    }
}

fn kitchen() -> Vec<Transaction> {
    vec![
        tx("1", "A", "MUG", 5.0, 1, "12345"),
        tx("1", "B", "TEA", 2.0, 1, "12345"),
        tx("2", "A", "MUG", 5.0, 2, "12345"),
        tx("2", "B", "TEA", 2.0, 2, "12345"),
        tx("3", "A", "MUG", 5.0, 3, "67890"),
        tx("3", "B", "TEA", 2.0, 3, "67890"),
        tx("3", "C", "SPOON", 1.0, 3, "67890"),
        tx("4", "C", "SPOON", 1.0, 4, "67890"),
    ]
}

fn params() -> RecommendParams {
    RecommendParams {
        min_support: 0.3,
        confidence_threshold: 0.5,
        ..RecommendParams::default()
    }
}

fn rec(code: &str, confidence: f64, lift: f64) -> Recommendation {
    Recommendation {
        rank: 1,
        product_code: code.to_string(),
        description: format!("ITEM {}", code),
        support: 0.1,
        confidence,
        lift,
        estimated_impact: 10.0,
    }
}

#[test]
fn test_search_product_prefers_stock_code() {
    let rows = kitchen();
    let refs = rows.iter().collect::<Vec<_>>();
    assert_eq!(search_product(&refs, "b").unwrap().description, "TEA");
    assert_eq!(search_product(&refs, " mug ").unwrap().stock_code, "A");
    assert!(search_product(&refs, "kettle").is_none());
    assert!(search_product(&refs, "  ").is_none());
}

#[test]
fn test_suggest_products_unique_and_min_length() {
    let rows = kitchen();
    let refs = rows.iter().collect::<Vec<_>>();
    assert!(suggest_products(&refs, "m", 10).is_empty());
    let hits = suggest_products(&refs, "mu", 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].stock_code, "A");
    let all = suggest_products(&refs, "o", 10);
    assert!(all.is_empty());
    let limited = suggest_products(&refs, "ea", 1);
    assert_eq!(limited.len(), 1);
}

#[test]
fn test_customer_profile() {
    let rows = kitchen();
    let refs = rows.iter().collect::<Vec<_>>();
    let reference = crate::pipeline::stage1_rfm::reference_date(&refs).unwrap();
    let profile = customer_profile(&refs, "12345.0", reference).unwrap();
    assert_eq!(profile.customer_id, "12345");
    assert_eq!(profile.order_frequency, 2);
    assert_eq!(profile.unique_products, 2);
    assert_eq!(profile.avg_order_value, 7.0);
    assert_eq!(profile.segment, ValueTier::Low);
    assert_eq!(profile.rfm_score, "R:5 F:2 M:0");
    assert!(customer_profile(&refs, "99999", reference).is_none());
    assert!(customer_profile(&refs, "nan", reference).is_none());
}

#[test]
fn test_recommend_follows_source_rules() {
    let rows = kitchen();
    let refs = rows.iter().collect::<Vec<_>>();
    let request = RecommendRequest {
        product: "MUG".to_string(),
        customer_id: Some("12345".to_string()),
    };
    let result = recommend(&refs, &request, &params()).unwrap();
    assert_eq!(result.source_product.stock_code, "A");
    assert_eq!(result.total_recommendations, 1);
    let first = &result.recommendations[0];
    assert_eq!(first.rank, 1);
    assert_eq!(first.product_code, "B");
    assert_eq!(first.description, "TEA");
    assert_eq!(first.support, 0.75);
    assert_eq!(first.confidence, 1.0);
    assert_eq!(first.lift, 1.3333);
    assert_eq!(first.estimated_impact, 1500.0);

    assert_eq!(result.bundle_opportunity.bundle_strength, BundleStrength::Weak);
    assert_eq!(result.revenue_impact.min_percent, 10.0);
    assert_eq!(result.revenue_impact.max_percent, 17.0);
    assert_eq!(result.timing_strategy.optimal_period, "Q1");
    assert_eq!(
        result.timing_strategy.target_customer_profile,
        "price-sensitive customers during promotional periods"
    );
    assert_eq!(result.customer_segment.as_ref().unwrap().customer_id, "12345");

    let graph = &result.network_visualization;
    assert_eq!(graph.total_nodes, 2);
    assert_eq!(graph.total_edges, 1);
    assert_eq!(graph.nodes[0].value, 15.0);
    assert_eq!(graph.nodes[1].color, "#F97316");
    assert_eq!(graph.edges[0].width, 5.0);
}

#[test]
fn test_recommend_without_matching_rules() {
    let rows = kitchen();
    let refs = rows.iter().collect::<Vec<_>>();
    let request = RecommendRequest {
        product: "SPOON".to_string(),
        customer_id: None,
    };
    let result = recommend(&refs, &request, &params()).unwrap();
    assert!(result.recommendations.is_empty());
    assert_eq!(
        result.bundle_opportunity.message,
        "No recommendations found for product C"
    );
    assert_eq!(result.revenue_impact.estimated_revenue_lift, 0.0);
    assert!(result.network_visualization.nodes.is_empty());
}

#[test]
fn test_recommend_errors() {
    let rows = kitchen();
    let refs = rows.iter().collect::<Vec<_>>();
    let request = RecommendRequest {
        product: "KETTLE".to_string(),
        customer_id: None,
    };
    assert!(matches!(
        recommend(&refs, &request, &params()),
        Err(AnalysisError::NotFound(_))
    ));
    assert!(matches!(
        recommend(&[], &request, &params()),
        Err(AnalysisError::NotFound(_))
    ));
    let bad = RecommendParams {
        top_n: 0,
        ..params()
    };
    assert!(matches!(
        recommend(&refs, &request, &bad),
        Err(AnalysisError::Params(_))
    ));
}

#[test]
fn test_bundle_opportunity_tiers() {
    assert_eq!(
        bundle_opportunity(&[], "MUG").message,
        "Insufficient data for bundle analysis"
    );
    let strong = bundle_opportunity(&[rec("B", 0.8, 3.5), rec("C", 0.7, 4.0)], "MUG");
    assert_eq!(strong.bundle_strength, BundleStrength::Strong);
    assert_eq!(strong.suggested_products, vec!["ITEM B", "ITEM C"]);
    let moderate = bundle_opportunity(&[rec("B", 0.4, 1.2), rec("C", 0.9, 4.0)], "MUG");
    assert_eq!(moderate.bundle_strength, BundleStrength::Moderate);
    assert!(moderate.message.starts_with("Product 'MUG' shows moderate"));
}

#[test]
fn test_average_basket_and_peak_quarter() {
    let mut rows = kitchen();
    assert_eq!(
        average_basket(&rows.iter().collect::<Vec<_>>()),
        23.0 / 4.0
    );
    rows.push(Transaction {
        invoice_date: NaiveDate::from_ymd_opt(2011, 11, 20)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap(),
        unit_price: 100.0,
        ..tx("5", "A", "MUG", 5.0, 1, "12345")
    });
    let refs = rows.iter().collect::<Vec<_>>();
    assert_eq!(peak_quarter(&refs), Some(4));
    assert_eq!(peak_quarter(&[]), None);
    assert_eq!(timing_strategy(&[], None).optimal_period, "Q4 (Holiday Season)");
}

#[test]
fn test_cross_sell_insights() {
    let rows = kitchen();
    let refs = rows.iter().collect::<Vec<_>>();
    let request = RecommendRequest {
        product: "A".to_string(),
        customer_id: None,
    };
    let result = recommend(&refs, &request, &params()).unwrap();
    let insights = cross_sell_insights(&result);
    assert_eq!(insights.expected_aov_increase, 17.0);
    assert_eq!(insights.avg_confidence, 1.0);
    assert_eq!(insights.avg_lift, 1.3333);
    assert_eq!(insights.total_expected_impact, 1500.0);

    let empty = RecommendationResult {
        recommendations: Vec::new(),
        ..result
    };
    let insights = cross_sell_insights(&empty);
    assert_eq!(insights.timing_strategy, "N/A");
    assert_eq!(insights.total_expected_impact, 0.0);
}

#[test]
fn test_product_network_over_catalogue() {
    let rows = kitchen();
    let refs = rows.iter().collect::<Vec<_>>();
    let graph = product_network(&refs, &[], 20, &params()).unwrap();
    assert_eq!(graph.total_edges, 2);
    assert_eq!(graph.edges[0].source, "A");
    assert_eq!(graph.edges[0].target, "B");
    assert_eq!(graph.edges[0].lift, 1.3333);
    assert_eq!(graph.total_nodes, 2);
    assert_eq!(graph.nodes[0].label, "MUG");
    assert_eq!(graph.nodes[0].value, 15.0);
    assert_eq!(graph.nodes[0].color, "#1E40AF");
    assert_eq!(graph.nodes[1].value, 6.0);
    assert_eq!(graph.nodes[1].color, "#F97316");

    let limited = product_network(&refs, &[], 1, &params()).unwrap();
    assert_eq!(limited.total_edges, 1);

    let spoon = product_network(&refs, &["c".to_string()], 20, &params()).unwrap();
    assert!(spoon.nodes.is_empty());
    assert!(spoon.edges.is_empty());

    assert!(matches!(
        product_network(&[], &[], 20, &params()),
        Err(AnalysisError::NotFound(_))
    ));
}

#[test]
fn test_product_network_truncates_labels() {
    let long = "EXTRA LONG DESCRIPTION OF A CERAMIC MUG";
    let rows = vec![
        tx("1", "A", long, 5.0, 1, "12345"),
        tx("1", "B", "TEA", 2.0, 1, "12345"),
        tx("2", "A", long, 5.0, 2, "12345"),
        tx("2", "B", "TEA", 2.0, 2, "12345"),
    ];
    let refs = rows.iter().collect::<Vec<_>>();
    let graph = product_network(&refs, &["A".to_string()], 20, &params()).unwrap();
    let node = graph.nodes.iter().find(|n| n.id == "A").unwrap();
    assert_eq!(node.label.chars().count(), 30);
    assert!(long.starts_with(&node.label));
}

#[test]
fn test_customer_recommendations_skip_purchased_products() {
    let mut rows = kitchen();
    rows.push(tx("5", "A", "MUG", 5.0, 5, "11111"));
    rows.push(tx("5", "C", "SPOON", 1.0, 5, "11111"));
    let refs = rows.iter().collect::<Vec<_>>();

    let result = customer_recommendations(&refs, "11111.0", 5, &params()).unwrap();
    assert_eq!(result.customer_id, "11111");
    assert_eq!(result.purchase_history_count, 2);
    assert_eq!(result.total_recommendations, 1);
    let first = &result.recommendations[0];
    assert_eq!(first.rank, 1);
    assert_eq!(first.product_code, "B");
    assert_eq!(first.confidence, 0.75);
    assert_eq!(first.lift, 1.25);

    let plain = kitchen();
    let plain_refs = plain.iter().collect::<Vec<_>>();
    let saturated = customer_recommendations(&plain_refs, "12345", 5, &params()).unwrap();
    assert_eq!(saturated.purchase_history_count, 2);
    assert!(saturated.recommendations.is_empty());

    assert!(matches!(
        customer_recommendations(&refs, "99999", 5, &params()),
        Err(AnalysisError::NotFound(_))
    ));
}

#[test]
fn test_top_bundles_ranked_by_score() {
    let rows = kitchen();
    let refs = rows.iter().collect::<Vec<_>>();
    let bundles = top_bundles(&refs, &params()).unwrap();
    assert_eq!(bundles.len(), 2);
    let first = &bundles[0];
    assert_eq!(first.rank, 1);
    assert_eq!(first.antecedent_codes, vec!["A"]);
    assert_eq!(first.consequent_codes, vec!["B"]);
    assert_eq!(first.antecedent_names, vec!["MUG"]);
    assert_eq!(first.consequent_names, vec!["TEA"]);
    assert_eq!(first.support, 0.75);
    assert_eq!(first.score, 1.3333);
    assert_eq!(bundles[1].rank, 2);
    assert_eq!(bundles[1].antecedent_codes, vec!["B"]);

    let one = RecommendParams {
        top_n: 1,
        ..params()
    };
    assert_eq!(top_bundles(&refs, &one).unwrap().len(), 1);
    assert!(matches!(
        top_bundles(&[], &params()),
        Err(AnalysisError::NotFound(_))
    ));
}
