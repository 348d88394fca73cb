mod api;
mod error;
mod input;
mod logging;
mod model;
mod pipeline;
mod report;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::input::clean::{clean_dataset, summary_path_for};
use crate::input::dates::parse_date_arg;
use crate::input::{Dataset, DateRange, LoadOptions, load_dataset};
use crate::model::params::AnalysisParams;
use crate::model::segment::Segment;
use crate::pipeline::stage1_rfm::compute_rfm;
use crate::pipeline::stage2_segments::{assign_segments, segment_customers};
use crate::pipeline::stage3_basket::{mine_bundles, segment_bundles};
use crate::pipeline::stage4_recommend::{RecommendRequest, recommend};
use crate::pipeline::stage5_risk::{
    OrderInput, RiskModel, find_optimal_threshold, risk_distribution, simulate_policy,
};
use crate::pipeline::stage6_overview::{
    OverviewFilter, kpis, monthly_trend, revenue_forecast, revenue_summary, select_rows,
};
use crate::pipeline::stage7_report::{Stage7Input, write_reports};

#[derive(Debug, Parser)]
#[command(name = "retail-dss", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Flags shared by every subcommand that reads transactions.
#[derive(Debug, Clone, Args)]
struct DataArgs {
    /// Transactions CSV (optionally .gz).
    #[arg(long, env = "DSS_INPUT")]
    input: PathBuf,
    /// TOML profile overriding analysis defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_parser = parse_date_arg)]
    start_date: Option<NaiveDate>,
    #[arg(long, value_parser = parse_date_arg)]
    end_date: Option<NaiveDate>,
    /// Read and write `<input>.dsscache`.
    #[arg(long)]
    cache: bool,
    /// Keep only the most recent N sales rows.
    #[arg(long)]
    max_rows: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Full analysis; writes TSV, JSON and text reports.
    Run {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long)]
        out: PathBuf,
    },
    /// Market-basket mining.
    Basket {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long)]
        min_support: Option<f64>,
        #[arg(long)]
        min_confidence: Option<f64>,
        #[arg(long)]
        top_n: Option<usize>,
        #[arg(long)]
        max_len: Option<usize>,
        /// Restrict mining to one RFM segment.
        #[arg(long)]
        segment: Option<String>,
    },
    /// Cross-sell recommendations for one product.
    Recommend {
        #[command(flatten)]
        data: DataArgs,
        /// Stock code or description fragment.
        #[arg(long)]
        product: String,
        #[arg(long)]
        customer_id: Option<String>,
        #[arg(long)]
        confidence_threshold: Option<f64>,
        #[arg(long)]
        min_support: Option<f64>,
        #[arg(long)]
        top_n: Option<usize>,
    },
    /// Return-risk score for a single order.
    Risk {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long)]
        stock_code: String,
        #[arg(long)]
        quantity: i64,
        #[arg(long)]
        unit_price: f64,
        #[arg(long)]
        customer_id: Option<String>,
    },
    /// Blocking-policy simulation.
    Policy {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long)]
        tau: Option<f64>,
        #[arg(long)]
        return_cost: Option<f64>,
        #[arg(long)]
        conversion_impact: Option<f64>,
        #[arg(long)]
        sample_size: Option<usize>,
        /// Grid-search the threshold instead of simulating one.
        #[arg(long)]
        optimize: bool,
        /// Print the risk score distribution instead.
        #[arg(long, conflicts_with = "optimize")]
        distribution: bool,
    },
    /// Revenue KPIs, trend and top-N lists.
    Overview {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long = "country")]
        countries: Vec<String>,
        #[arg(long)]
        top_n: Option<usize>,
        #[arg(long)]
        include_cancelled: bool,
        /// Print the revenue forecast instead.
        #[arg(long)]
        forecast: bool,
        #[arg(long)]
        horizon: Option<usize>,
    },
    /// Writes a cleaned CSV plus a summary JSON.
    Clean {
        #[arg(long, env = "DSS_INPUT")]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// JSON HTTP API.
    Serve {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long, env = "DSS_BIND", default_value = "127.0.0.1:8000")]
        bind: String,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Command::Run { data, out } => run_reports(&data, &out),
        Command::Basket {
            data,
            min_support,
            min_confidence,
            top_n,
            max_len,
            segment,
        } => {
            let mut params = load_params(data.config.as_deref())?;
            override_opt(&mut params.basket.min_support, min_support);
            override_opt(&mut params.basket.min_confidence, min_confidence);
            override_opt(&mut params.basket.top_n, top_n);
            if max_len.is_some() {
                params.basket.max_len = max_len;
            }
            params.basket.validate()?;
            let dataset = load(&data)?;
            match segment {
                Some(name) => {
                    let segment = Segment::from_name(&name)
                        .ok_or_else(|| AppError::Usage(format!("unknown segment: {name}")))?;
                    let rfm = compute_rfm(&dataset.sales_refs());
                    print_json(&segment_bundles(&dataset, &rfm, segment, &params.basket)?)
                }
                None => print_json(&mine_bundles(&dataset.sales_refs(), &params.basket)?),
            }
        }
        Command::Recommend {
            data,
            product,
            customer_id,
            confidence_threshold,
            min_support,
            top_n,
        } => {
            let mut params = load_params(data.config.as_deref())?;
            override_opt(
                &mut params.recommend.confidence_threshold,
                confidence_threshold,
            );
            override_opt(&mut params.recommend.min_support, min_support);
            override_opt(&mut params.recommend.top_n, top_n);
            let dataset = load(&data)?;
            let request = RecommendRequest {
                product,
                customer_id,
            };
            print_json(&recommend(
                &dataset.sales_refs(),
                &request,
                &params.recommend,
            )?)
        }
        Command::Risk {
            data,
            stock_code,
            quantity,
            unit_price,
            customer_id,
        } => {
            if quantity <= 0 || unit_price.is_nan() || unit_price <= 0.0 {
                return Err(AppError::Usage(
                    "quantity and unit price must be positive".to_string(),
                ));
            }
            let dataset = load(&data)?;
            let model = RiskModel::build(&dataset);
            let order = OrderInput {
                customer_id: customer_id
                    .as_deref()
                    .and_then(input::csv::normalize_customer_id),
                stock_code: stock_code.trim().to_ascii_uppercase(),
                quantity,
                unit_price,
            };
            print_json(&model.score(&order))
        }
        Command::Policy {
            data,
            tau,
            return_cost,
            conversion_impact,
            sample_size,
            optimize,
            distribution,
        } => {
            let mut params = load_params(data.config.as_deref())?;
            override_opt(&mut params.risk.threshold_tau, tau);
            override_opt(&mut params.risk.return_processing_cost, return_cost);
            override_opt(&mut params.risk.conversion_impact, conversion_impact);
            override_opt(&mut params.risk.sample_size, sample_size);
            params.risk.validate()?;
            let dataset = load(&data)?;
            let model = RiskModel::build(&dataset);
            if distribution {
                print_json(&risk_distribution(
                    &dataset,
                    &model,
                    params.risk.sample_size,
                )?)
            } else if optimize {
                print_json(&find_optimal_threshold(&dataset, &model, &params.risk)?)
            } else {
                print_json(&simulate_policy(&dataset, &model, &params.risk)?)
            }
        }
        Command::Overview {
            data,
            countries,
            top_n,
            include_cancelled,
            forecast,
            horizon,
        } => {
            let mut params = load_params(data.config.as_deref())?;
            override_opt(&mut params.overview.top_n, top_n);
            override_opt(&mut params.overview.forecast_horizon, horizon);
            if include_cancelled {
                params.overview.exclude_cancelled = false;
            }
            params.overview.validate()?;
            let dataset = load(&data)?;
            let filter = OverviewFilter {
                countries,
                ..OverviewFilter::from_params(&params.overview)
            };
            if forecast {
                let rows = select_rows(&dataset, &filter);
                print_json(&revenue_forecast(
                    &rows,
                    params.overview.forecast_horizon,
                )?)
            } else {
                print_json(&revenue_summary(&dataset, &filter)?)
            }
        }
        Command::Clean { input, output } => {
            let summary = clean_dataset(&input, &output)?;
            info!(
                "cleaned {} -> {} rows, summary at {}",
                summary.raw_rows,
                summary.cleaned_rows,
                summary_path_for(&output).display()
            );
            print_json(&summary)
        }
        Command::Serve { data, bind } => {
            let params = load_params(data.config.as_deref())?;
            let dataset = load(&data)?;
            let state = api::AppState::new(dataset, params);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(api::serve(state, &bind))?;
            Ok(())
        }
    }
}

fn override_opt<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn load_params(config: Option<&Path>) -> Result<AnalysisParams, AppError> {
    let params = match config {
        Some(path) => {
            info!("loading analysis profile {}", path.display());
            AnalysisParams::load(path)?
        }
        None => AnalysisParams::default(),
    };
    Ok(params)
}

fn load_options(data: &DataArgs) -> Result<LoadOptions, AppError> {
    if let (Some(start), Some(end)) = (data.start_date, data.end_date) {
        if start > end {
            return Err(AppError::Usage(format!(
                "--start-date {start} is after --end-date {end}"
            )));
        }
    }
    Ok(LoadOptions {
        use_cache: data.cache,
        date_range: Some(DateRange::new(data.start_date, data.end_date)),
        max_rows: data.max_rows,
    })
}

fn load(data: &DataArgs) -> Result<Dataset, AppError> {
    let options = load_options(data)?;
    let dataset = load_dataset(&data.input, &options)?;
    info!(
        "loaded {}: sales={}, cancellations={}, dropped_invalid={}, dropped_unparsable={}",
        data.input.display(),
        dataset.sales.len(),
        dataset.cancellations.len(),
        dataset.stats.dropped_invalid,
        dataset.stats.dropped_unparsable
    );
    Ok(dataset)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_reports(data: &DataArgs, out: &Path) -> Result<(), AppError> {
    let params = load_params(data.config.as_deref())?;
    let dataset = load(data)?;
    let sales = dataset.sales_refs();

    let rfm = compute_rfm(&sales);
    let segments = assign_segments(&rfm);
    let summaries = segment_customers(&rfm);
    info!("rfm: customers={}, segments={}", rfm.len(), summaries.len());

    let basket = mine_bundles(&sales, &params.basket)?;

    let filter = OverviewFilter::from_params(&params.overview);
    let overview_rows = select_rows(&dataset, &filter);
    let kpi = kpis(&overview_rows, filter.top_n).ok();
    let monthly = monthly_trend(&overview_rows).unwrap_or_default();

    let input = Stage7Input {
        dataset: &dataset,
        rfm: &rfm,
        segments: &segments,
        segment_summaries: &summaries,
        basket: &basket,
        kpis: kpi.as_ref(),
        monthly: &monthly,
        params: &params,
        tool_name: env!("CARGO_PKG_NAME").to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    write_reports(&input, out)?;
    info!("reports written to {}", out.display());
    Ok(())
}

#[cfg(test)]
#[path = "../tests/src_inline/main_inline.rs"]
mod tests;
