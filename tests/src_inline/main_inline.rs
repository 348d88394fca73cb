use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("retail_main_test_{}_{}", std::process::id(), id));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn data_args(extra: &[&str]) -> DataArgs {
    let mut args = vec!["retail-dss", "run", "--input", "data.csv", "--out", "out"];
    args.extend_from_slice(extra);
    match Cli::try_parse_from(args).unwrap().command {
        Command::Run { data, .. } => data,
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn test_parse_run_command() {
    let cli = Cli::try_parse_from([
        "retail-dss",
        "run",
        "--input",
        "data.csv",
        "--out",
        "reports",
        "--start-date",
        "2011-01-01",
        "--cache",
    ])
    .unwrap();
    match cli.command {
        Command::Run { data, out } => {
            assert_eq!(data.input, PathBuf::from("data.csv"));
            assert_eq!(out, PathBuf::from("reports"));
            assert_eq!(data.start_date, NaiveDate::from_ymd_opt(2011, 1, 1));
            assert!(data.cache);
            assert!(data.end_date.is_none());
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn test_parse_rejects_bad_date() {
    let err = Cli::try_parse_from([
        "retail-dss",
        "run",
        "--input",
        "data.csv",
        "--out",
        "reports",
        "--end-date",
        "31/12/2011",
    ]);
    assert!(err.is_err());
}

#[test]
fn test_parse_policy_flags_conflict() {
    let err = Cli::try_parse_from([
        "retail-dss",
        "policy",
        "--input",
        "data.csv",
        "--optimize",
        "--distribution",
    ]);
    assert!(err.is_err());
}

#[test]
fn test_parse_overview_repeats_country() {
    let cli = Cli::try_parse_from([
        "retail-dss",
        "overview",
        "--input",
        "data.csv",
        "--country",
        "France",
        "--country",
        "Germany",
        "--forecast",
    ])
    .unwrap();
    match cli.command {
        Command::Overview {
            countries,
            forecast,
            include_cancelled,
            ..
        } => {
            assert_eq!(countries, vec!["France", "Germany"]);
            assert!(forecast);
            assert!(!include_cancelled);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn test_parse_serve_default_bind() {
    let cli = Cli::try_parse_from(["retail-dss", "serve", "--input", "data.csv"]).unwrap();
    match cli.command {
        Command::Serve { bind, .. } => {
            if std::env::var("DSS_BIND").is_err() {
                assert_eq!(bind, "127.0.0.1:8000");
            }
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn test_override_opt() {
    let mut v = 0.3;
    override_opt(&mut v, None);
    assert_eq!(v, 0.3);
    override_opt(&mut v, Some(0.5));
    assert_eq!(v, 0.5);
}

#[test]
fn test_load_options_checks_range_order() {
    let ok = load_options(&data_args(&["--start-date", "2011-01-01", "--max-rows", "10"])).unwrap();
    assert_eq!(ok.max_rows, Some(10));
    assert_eq!(
        ok.date_range,
        Some(DateRange::new(NaiveDate::from_ymd_opt(2011, 1, 1), None))
    );

    let bad = data_args(&["--start-date", "2011-06-01", "--end-date", "2011-01-01"]);
    assert!(matches!(load_options(&bad), Err(AppError::Usage(_))));
}

#[test]
fn test_load_params_defaults_without_config() {
    assert_eq!(load_params(None).unwrap(), AnalysisParams::default());
}

#[test]
fn test_run_writes_reports() {
    let dir = make_temp_dir();
    let csv = dir.join("retail.csv");
    std::fs::write(
        &csv,
        "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country\n\
         536365,85123A,WHITE HANGING HEART,6,12/1/2010 8:26,2.55,17850.0,United Kingdom\n\
         536365,71053,WHITE METAL LANTERN,6,12/1/2010 8:26,3.39,17850.0,United Kingdom\n\
         536366,85123A,WHITE HANGING HEART,2,12/2/2010 9:00,2.55,13047,France\n\
         536366,71053,WHITE METAL LANTERN,1,12/2/2010 9:00,3.39,13047,France\n\
         C536367,71053,WHITE METAL LANTERN,-1,12/3/2010 9:00,3.39,13047,France\n",
    )
    .unwrap();
    let out = dir.join("reports");
    let cli = Cli::try_parse_from([
        "retail-dss".to_string(),
        "run".to_string(),
        "--input".to_string(),
        csv.display().to_string(),
        "--out".to_string(),
        out.display().to_string(),
    ])
    .unwrap();
    run(cli).unwrap();
    assert!(out.join("summary.json").exists());
    let report = std::fs::read_to_string(out.join("report.txt")).unwrap();
    assert!(report.contains("Customers: 2"));
}

#[test]
fn test_run_rejects_unknown_segment() {
    let dir = make_temp_dir();
    let csv = dir.join("retail.csv");
    std::fs::write(
        &csv,
        "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country\n\
         536365,85123A,WHITE HANGING HEART,6,12/1/2010 8:26,2.55,17850.0,United Kingdom\n",
    )
    .unwrap();
    let cli = Cli::try_parse_from([
        "retail-dss".to_string(),
        "basket".to_string(),
        "--input".to_string(),
        csv.display().to_string(),
        "--segment".to_string(),
        "Whales".to_string(),
    ])
    .unwrap();
    assert!(matches!(run(cli), Err(AppError::Usage(_))));
}
