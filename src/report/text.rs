use crate::report::{ReportContext, SegmentStat, format_f64_6, percent};

pub fn render_report_text(ctx: &ReportContext) -> String {
    let mut out = String::new();

    out.push_str("Retail Decision Support Report\n");
    out.push_str("==============================\n\n");

    out.push_str("1. Dataset\n");
    out.push_str(&format!("Source: {}\n", ctx.source));
    out.push_str(&format!(
        "Rows read: {}\nSales rows: {}\nCancelled rows: {}\n",
        ctx.raw_rows, ctx.sales_rows, ctx.cancelled_rows
    ));
    match (&ctx.date_min, &ctx.date_max) {
        (Some(min), Some(max)) => out.push_str(&format!("Date range: {} .. {}\n", min, max)),
        _ => out.push_str("Date range: n/a\n"),
    }
    out.push_str(&format!("Customers: {}\n\n", ctx.customers));

    out.push_str("2. Customer segments\n");
    if ctx.segments.is_empty() {
        out.push_str("No customers with an id; segmentation skipped.\n");
    }
    for s in &ctx.segments {
        out.push_str(&format!(
            "{}: {} customers ({}%), value {}\n",
            s.name,
            s.customers,
            format_f64_6(s.share_pct),
            format_f64_6(s.total_value)
        ));
    }
    out.push_str(&format!("{}\n\n", segment_statement(&ctx.segments)));

    out.push_str("3. Market basket\n");
    out.push_str(&format!(
        "Baskets: {}\nItems: {}\nFrequent itemsets: {}\nRules: {}\n",
        ctx.basket.transactions,
        ctx.basket.items,
        ctx.basket.frequent_itemsets,
        ctx.basket.total_rules
    ));
    if let Some(message) = &ctx.basket.message {
        out.push_str(&format!("Note: {}\n", message));
    }
    for (i, b) in ctx.top_bundles.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} -> {} (confidence {}, lift {}, {})\n",
            i + 1,
            b.antecedents_display,
            b.consequents_display,
            format_f64_6(b.confidence),
            format_f64_6(b.lift),
            b.strength.label()
        ));
    }
    out.push('\n');

    out.push_str("4. Sales overview\n");
    match &ctx.kpis {
        Some(k) => {
            out.push_str(&format!(
                "Total revenue: {}\nInvoices: {}\nCountries: {}\nAverage order value: {}\n",
                format_f64_6(k.total_revenue),
                k.total_transactions,
                k.countries_active,
                format_f64_6(k.avg_order_value)
            ));
            out.push_str(&format!(
                "Top countries revenue share: {}%\n",
                format_f64_6(k.top_n_revenue_share)
            ));
        }
        None => out.push_str("No sales in range.\n"),
    }
    out.push_str(&format!("Months covered: {}\n", ctx.months));
    if let Some(m) = &ctx.best_month {
        out.push_str(&format!(
            "Best month: {} ({})\n",
            m.year_month,
            format_f64_6(m.revenue)
        ));
    }
    if let Some(m) = &ctx.worst_month {
        out.push_str(&format!(
            "Weakest month: {} ({})\n",
            m.year_month,
            format_f64_6(m.revenue)
        ));
    }
    out.push('\n');

    out.push_str("5. Quality and caveats\n");
    let cancelled_share = percent(
        ctx.cancelled_rows as f64,
        (ctx.sales_rows + ctx.cancelled_rows) as f64,
    );
    let missing_share = percent(ctx.missing_customer_rows as f64, ctx.sales_rows as f64);
    out.push_str(&format!(
        "Cancelled share: {}%\n",
        format_f64_6(cancelled_share)
    ));
    out.push_str(&format!(
        "Sales rows without customer id: {} ({}%)\n",
        ctx.missing_customer_rows,
        format_f64_6(missing_share)
    ));
    out.push_str(&format!("{}\n", cancellation_statement(cancelled_share)));
    if missing_share > 20.0 {
        out.push_str(
            "Many rows lack a customer id; RFM and segments cover only identified customers.\n",
        );
    }
    out.push_str(&format!("\nGenerated by {} {}\n", ctx.tool, ctx.version));

    out
}

fn segment_statement(segments: &[SegmentStat]) -> String {
    let largest = segments.iter().max_by(|a, b| {
        a.customers
            .cmp(&b.customers)
            .then_with(|| b.name.cmp(&a.name))
    });
    match largest {
        Some(s) => format!("Largest segment: {}", s.name),
        None => "Largest segment: n/a".to_string(),
    }
}

fn cancellation_statement(cancelled_share: f64) -> &'static str {
    if cancelled_share > 10.0 {
        "High cancellation share; review return handling before acting on revenue figures."
    } else if cancelled_share > 2.0 {
        "Moderate cancellation share."
    } else {
        "Cancellations are negligible."
    }
}
