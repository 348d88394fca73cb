use chrono::NaiveDate;

use super::*;

fn tx(invoice: &str, country: &str, code: &str, qty: i64, price: f64, ymd: (i32, u32, u32)) -> Transaction {
    Transaction {
        invoice_no: invoice.to_string(),
        stock_code: code.to_string(),
        description: format!("ITEM {}", code),
        quantity: qty,
        invoice_date: NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2)
            .unwrap()
            .and_hms_opt(11, 30, 0)
            .unwrap(),
        unit_price: price,
        customer_id: None,
        country: country.to_string(),
    }
}

fn dataset() -> Dataset {
    Dataset {
        sales: vec![
            tx("1", "United Kingdom", "A", 10, 1.0, (2011, 1, 10)),
            tx("1", "United Kingdom", "B", 5, 2.0, (2011, 1, 10)),
            tx("2", "France", "A", 10, 1.0, (2011, 2, 15)),
            tx("3", "United Kingdom", "C", 1, 30.0, (2011, 2, 20)),
            tx("4", "Germany", "B", 5, 2.0, (2011, 12, 1)),
        ],
        cancellations: vec![tx("C9", "United Kingdom", "A", -5, 1.0, (2011, 2, 16))],
        ..Dataset::default()
    }
}

fn filter() -> OverviewFilter {
    OverviewFilter::from_params(&OverviewParams::default())
}

#[test]
fn test_select_rows_respects_filters() {
    let data = dataset();
    assert_eq!(select_rows(&data, &filter()).len(), 5);

    let with_cancelled = OverviewFilter {
        exclude_cancelled: false,
        ..filter()
    };
    let rows = select_rows(&data, &with_cancelled);
    assert_eq!(rows.len(), 6);
    assert!(rows.windows(2).all(|w| w[0].invoice_date <= w[1].invoice_date));

    let uk_feb = OverviewFilter {
        start_date: NaiveDate::from_ymd_opt(2011, 2, 1),
        end_date: NaiveDate::from_ymd_opt(2011, 2, 28),
        countries: vec!["united kingdom".to_string()],
        ..filter()
    };
    let rows = select_rows(&data, &uk_feb);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].invoice_no, "3");
}

#[test]
fn test_kpis() {
    let data = dataset();
    let rows = select_rows(&data, &filter());
    let k = kpis(&rows, 1).unwrap();
    assert_eq!(k.total_revenue, 70.0);
    assert_eq!(k.total_transactions, 4);
    assert_eq!(k.countries_active, 3);
    assert_eq!(k.top_n_revenue_share, 71.43);
    assert_eq!(k.avg_order_value, 17.5);
    assert!(matches!(kpis(&[], 5), Err(AnalysisError::NotFound(_))));
}

#[test]
fn test_monthly_trend_growth() {
    let data = dataset();
    let rows = select_rows(&data, &filter());
    let trend = monthly_trend(&rows).unwrap();
    let months = trend.iter().map(|m| m.year_month.as_str()).collect::<Vec<_>>();
    assert_eq!(months, vec!["2011-01", "2011-02", "2011-12"]);
    assert_eq!(trend[0].mom_growth, None);
    assert_eq!(trend[1].revenue, 40.0);
    assert_eq!(trend[1].transactions, 2);
    assert_eq!(trend[1].mom_growth, Some(100.0));
    assert_eq!(trend[2].mom_growth, Some(-75.0));

    let all = select_rows(
        &data,
        &OverviewFilter {
            exclude_cancelled: false,
            ..filter()
        },
    );
    let trend = monthly_trend(&all).unwrap();
    assert_eq!(trend[1].revenue, 35.0);
    assert_eq!(trend[1].transactions, 3);
}

#[test]
fn test_top_lists_rank_with_name_ties() {
    let data = dataset();
    let rows = select_rows(&data, &filter());
    let countries = top_countries(&rows, 2).unwrap();
    assert_eq!(countries.len(), 2);
    assert_eq!(countries[0].item, "United Kingdom");
    assert_eq!(countries[0].revenue, 50.0);
    assert_eq!(countries[0].share_pct, 71.43);
    assert_eq!(countries[0].transactions, 2);
    assert_eq!(countries[1].item, "France");
    assert_eq!(countries[1].rank, 2);

    let products = top_products(&rows, 5).unwrap();
    let names = products.iter().map(|p| p.item.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["C - ITEM C", "A - ITEM A", "B - ITEM B"]);
}

#[test]
fn test_revenue_summary() {
    let data = dataset();
    let summary = revenue_summary(&data, &filter()).unwrap();
    assert_eq!(summary.kpis.total_revenue, 70.0);
    assert_eq!(summary.monthly_trend.len(), 3);
    assert_eq!(summary.top_countries.len(), 3);
    assert_eq!(summary.filters_applied, filter());

    let nothing = OverviewFilter {
        start_date: NaiveDate::from_ymd_opt(2020, 1, 1),
        ..filter()
    };
    assert!(matches!(
        revenue_summary(&data, &nothing),
        Err(AnalysisError::NotFound(_))
    ));
    let bad = OverviewFilter {
        top_n: 0,
        ..filter()
    };
    assert!(matches!(
        revenue_summary(&data, &bad),
        Err(AnalysisError::Params(_))
    ));
}

#[test]
fn test_linear_fit() {
    assert_eq!(linear_fit(&[1.0, 2.0, 3.0]), (1.0, 1.0));
    assert_eq!(linear_fit(&[5.0]), (0.0, 5.0));
    assert_eq!(linear_fit(&[]), (0.0, 0.0));
}

#[test]
fn test_revenue_forecast() {
    let data = dataset();
    let rows = select_rows(&data, &filter());
    let forecast = revenue_forecast(&rows, 2).unwrap();
    assert_eq!(forecast.monthly_trend.len(), 3);
    assert_eq!(forecast.quarterly_revenue.get(&1), Some(&60.0));
    assert_eq!(forecast.quarterly_revenue.get(&4), Some(&10.0));
    assert_eq!(forecast.top_revenue_products[0].stock_code, "C");
    assert_eq!(forecast.total_revenue, 70.0);
    assert_eq!(forecast.avg_basket_size, 17.5);
    assert_eq!(forecast.projection.len(), 2);
    assert_eq!(forecast.projection[0].year_month, "2012-01");
    assert_eq!(forecast.projection[0].revenue, 13.33);
    assert_eq!(forecast.projection[1].year_month, "2012-02");
    assert_eq!(forecast.projection[1].revenue, 8.33);
    assert!(matches!(
        revenue_forecast(&[], 3),
        Err(AnalysisError::NotFound(_))
    ));
}
