use super::*;

fn baskets(transactions: Vec<Vec<u32>>) -> Baskets {
    Baskets {
        items: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        transactions,
    }
}

fn sample() -> Baskets {
    baskets(vec![
        vec![0, 1],
        vec![0, 1, 2],
        vec![0, 2],
        vec![1, 2],
        vec![0, 1, 2],
    ])
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_intersect_sorted() {
    assert_eq!(intersect_sorted(&[1, 3, 5, 7], &[2, 3, 7, 9]), vec![3, 7]);
    assert!(intersect_sorted(&[], &[1]).is_empty());
}

#[test]
fn test_apriori_levels_and_support() {
    let sets = apriori(&sample(), 0.5, None);
    let items = sets.iter().map(|s| s.items.clone()).collect::<Vec<_>>();
    assert_eq!(
        items,
        vec![
            vec![0],
            vec![1],
            vec![2],
            vec![0, 1],
            vec![0, 2],
            vec![1, 2],
        ]
    );
    assert!(sets.iter().all(|s| s.support >= 0.5));
    assert!(approx(sets[3].support, 0.6));
    assert_eq!(sets[3].count, 3);

    let with_triple = apriori(&sample(), 0.4, None);
    let triple = with_triple.last().unwrap();
    assert_eq!(triple.items, vec![0, 1, 2]);
    assert!(approx(triple.support, 0.4));
}

#[test]
fn test_apriori_respects_max_len_and_empty_input() {
    assert_eq!(apriori(&sample(), 0.4, Some(1)).len(), 3);
    assert!(apriori(&Baskets::default(), 0.1, None).is_empty());
    assert!(apriori(&sample(), 0.9, None).is_empty());
}

#[test]
fn test_association_rules_metrics() {
    let sets = apriori(&sample(), 0.5, None);
    let rules = association_rules(&sets, 0.7);
    assert_eq!(rules.len(), 6);
    for rule in &rules {
        assert!(!rule.antecedent.is_empty() && !rule.consequent.is_empty());
        assert!(rule.antecedent.iter().all(|a| !rule.consequent.contains(a)));
        assert!(approx(rule.support, 0.6));
        assert!(approx(rule.confidence, 0.75));
        assert!(approx(rule.lift, 0.9375));
        assert!(approx(rule.leverage, -0.04));
        assert!(approx(rule.conviction.unwrap(), 0.8));
    }
    assert!(association_rules(&sets, 0.8).is_empty());
}

#[test]
fn test_rules_from_triples_and_infinite_conviction() {
    let sets = apriori(&sample(), 0.4, None);
    let rules = association_rules(&sets, 0.1);
    // 3 pairs x 2 directions + 6 splits of the triple
    assert_eq!(rules.len(), 12);

    let certain = baskets(vec![vec![0, 1], vec![0, 1], vec![0]]);
    let sets = apriori(&certain, 0.5, None);
    let rules = association_rules(&sets, 0.5);
    let b_to_a = rules
        .iter()
        .find(|r| r.antecedent == vec![1] && r.consequent == vec![0])
        .unwrap();
    assert!(approx(b_to_a.confidence, 1.0));
    assert_eq!(b_to_a.conviction, None);
}

#[test]
fn test_labels() {
    let b = sample();
    assert_eq!(b.label(2), "c");
    assert_eq!(b.label(99), "");
    assert_eq!(b.labels(&[0, 3]), vec!["a".to_string(), "d".to_string()]);
}
