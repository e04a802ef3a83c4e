#![forbid(unsafe_code)]

use fkc_conformance::matmul_differential::matmul_benchmark_definition;
use fkc_conformance::report::{enforce, write_run_report};
use fkc_conformance::{
    CancellationToken, HarnessConfig, RunMode, init_tracing, run_registered_test,
    set_case_log_path,
};
use fkc_engine::{CpuEngine, TensorEngine};
use std::path::PathBuf;
use std::sync::Arc;

fn main() {
    if let Err(err) = run() {
        eprintln!("run_matmul_benchmark failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut cfg = HarnessConfig::from_env();
    let mut report_path: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
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
            "--log-path" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--log-path requires a value".to_string())?;
                set_case_log_path(Some(PathBuf::from(value)));
            }
            "--report-path" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--report-path requires a value".to_string())?;
                report_path = Some(PathBuf::from(value));
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p fkc-conformance --bin run_matmul_benchmark -- [--seed <u64>] [--workers <n>] [--log-path <path>] [--report-path <path>]"
                );
                return Ok(());
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    init_tracing()?;

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .map_err(|err| format!("failed installing interrupt handler: {err}"))?;

    let engine: Arc<dyn TensorEngine> = Arc::new(CpuEngine::new());
    let benchmark = matmul_benchmark_definition(engine).map_err(|err| err.to_string())?;
    let report = run_registered_test(&benchmark, &cfg, &cancel).map_err(|err| err.to_string())?;

    if let Some(path) = report_path {
        write_run_report(&path, &report).map_err(|err| err.to_string())?;
        println!("wrote {}", path.display());
    }

    enforce(report).map(|_| ()).map_err(|err| err.to_string())
}
