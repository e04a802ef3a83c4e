#![forbid(unsafe_code)]

use fkc_conformance::report::write_run_report;
use fkc_conformance::{
    CancellationToken, HarnessConfig, RunMode, RunReport, TestRegistry, default_registry,
    init_tracing, run_registered_test, run_registry, set_case_log_path,
};
use fkc_engine::{CpuEngine, TensorEngine};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize)]
struct TestSummary {
    test: String,
    total: usize,
    successes: usize,
    failures: usize,
    planned: usize,
    interrupted: bool,
    report: String,
}

#[derive(Debug, Serialize)]
struct GateSummary {
    status: &'static str,
    engine: &'static str,
    mode: &'static str,
    seed: u64,
    case_log: String,
    tests: Vec<TestSummary>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("run_registered_suite failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut cfg = HarnessConfig::from_env();
    let mut selected: Option<String> = None;
    let mut log_path: Option<PathBuf> = None;
    let mut list_only = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--test" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--test requires a value".to_string())?;
                selected = Some(value);
            }
            "--seed" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--seed requires a value".to_string())?;
                cfg.seed = value
                    .parse()
                    .map_err(|err| format!("invalid --seed {value}: {err}"))?;
            }
            "--workers" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--workers requires a value".to_string())?;
                let workers = value
                    .parse()
                    .map_err(|err| format!("invalid --workers {value}: {err}"))?;
                cfg.mode = RunMode::with_workers(workers);
            }
            "--repeat" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--repeat requires a value".to_string())?;
                let repeat = value
                    .parse::<usize>()
                    .map_err(|err| format!("invalid --repeat {value}: {err}"))?;
                if repeat == 0 {
                    return Err("--repeat must be > 0".to_string());
                }
                cfg.repeat_override = Some(repeat);
            }
            "--log-path" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--log-path requires a value".to_string())?;
                log_path = Some(PathBuf::from(value));
            }
            "--report-root" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--report-root requires a value".to_string())?;
                cfg.report_root = PathBuf::from(value);
            }
            "--list" => list_only = true,
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p fkc-conformance --bin run_registered_suite -- [--test <name>] [--list] [--seed <u64>] [--workers <n>] [--repeat <n>] [--log-path <path>] [--report-root <dir>]"
                );
                return Ok(());
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    let engine: Arc<dyn TensorEngine> = Arc::new(CpuEngine::new());
    let engine_name = engine.name();
    let registry = default_registry(engine).map_err(|err| err.to_string())?;

    if list_only {
        for test in registry.iter() {
            println!(
                "{}\trepeat={}\t{}",
                test.name(),
                test.repeat(),
                test.metadata().description()
            );
        }
        return Ok(());
    }

    init_tracing()?;

    let ts_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis());
    let log_path = log_path.unwrap_or_else(|| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../artifacts/logs")
            .join(format!("registered_suite_{ts_millis}.jsonl"))
    });
    set_case_log_path(Some(log_path.clone()));

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .map_err(|err| format!("failed installing interrupt handler: {err}"))?;

    let reports = run_selected(&registry, selected.as_deref(), &cfg, &cancel)?;

    let mut tests = Vec::with_capacity(reports.len());
    for report in &reports {
        let path = cfg.report_path(&report.test_name);
        write_run_report(&path, report).map_err(|err| err.to_string())?;
        tests.push(summarize_report(report, &path));
    }

    let status = if reports.iter().all(RunReport::all_passed) {
        "pass"
    } else {
        "fail"
    };

    let summary = GateSummary {
        status,
        engine: engine_name,
        mode: cfg.mode.as_str(),
        seed: cfg.seed,
        case_log: log_path.display().to_string(),
        tests,
    };

    let summary_json = serde_json::to_string_pretty(&summary)
        .map_err(|err| format!("failed serializing summary: {err}"))?;
    println!("{summary_json}");

    if status == "fail" {
        std::process::exit(2);
    }
    Ok(())
}

fn run_selected(
    registry: &TestRegistry,
    selected: Option<&str>,
    cfg: &HarnessConfig,
    cancel: &CancellationToken,
) -> Result<Vec<RunReport>, String> {
    match selected {
        Some(name) => {
            let test = registry.require(name).map_err(|err| err.to_string())?;
            let report = run_registered_test(test, cfg, cancel).map_err(|err| err.to_string())?;
            Ok(vec![report])
        }
        None => run_registry(registry, cfg, cancel).map_err(|err| err.to_string()),
    }
}

fn summarize_report(report: &RunReport, path: &std::path::Path) -> TestSummary {
    TestSummary {
        test: report.test_name.clone(),
        total: report.total,
        successes: report.successes,
        failures: report.failures,
        planned: report.planned,
        interrupted: report.interrupted,
        report: path.display().to_string(),
    }
}
