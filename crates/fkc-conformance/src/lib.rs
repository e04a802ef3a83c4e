#![forbid(unsafe_code)]

pub mod case_gen;
pub mod compare;
pub mod engine_adapter;
pub mod error;
pub mod matmul_differential;
pub mod oracle;
pub mod orchestrator;
pub mod registry;
pub mod report;

pub use crate::error::HarnessError;
pub use crate::orchestrator::{CancellationToken, RunMode};
pub use crate::registry::{CaseContext, TestDefinition, TestMetadata, TestRegistry};
pub use crate::report::RunReport;

use crate::orchestrator::run_test;
use crate::report::aggregate;
use fkc_engine::TensorEngine;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

pub const DEFAULT_RUN_SEED: u64 = 0x5EED_CA5E;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub report_root: PathBuf,
    pub seed: u64,
    pub mode: RunMode,
    /// Replaces every test's registered repeat count when set.
    pub repeat_override: Option<usize>,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        let repo_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
        Self {
            report_root: repo_root.join("artifacts/reports"),
            seed: DEFAULT_RUN_SEED,
            mode: RunMode::Sequential,
            repeat_override: None,
        }
    }

    /// `default_paths` with `FKC_SEED`, `FKC_WORKERS`, `FKC_REPEAT` and
    /// `FKC_REPORT_ROOT` applied. Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default_paths();
        if let Some(seed) = env_value("FKC_SEED").and_then(|raw| raw.parse().ok()) {
            cfg.seed = seed;
        }
        if let Some(workers) = env_value("FKC_WORKERS").and_then(|raw| raw.parse().ok()) {
            cfg.mode = RunMode::with_workers(workers);
        }
        if let Some(repeat) = env_value("FKC_REPEAT")
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|&repeat| repeat > 0)
        {
            cfg.repeat_override = Some(repeat);
        }
        if let Some(root) = env_value("FKC_REPORT_ROOT") {
            cfg.report_root = PathBuf::from(root);
        }
        cfg
    }

    #[must_use]
    pub fn report_path(&self, test_name: &str) -> PathBuf {
        let slug = test_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect::<String>();
        self.report_root.join(format!("{slug}_report.json"))
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Serialize)]
pub(crate) struct CaseLogEntry {
    pub(crate) suite: &'static str,
    pub(crate) test_name: String,
    pub(crate) case_index: usize,
    pub(crate) seed: u64,
    pub(crate) passed: bool,
    pub(crate) reason_code: String,
    pub(crate) elapsed_ms: f64,
}

static CASE_LOG_PATH: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();

pub fn set_case_log_path(path: Option<PathBuf>) {
    let cell = CASE_LOG_PATH.get_or_init(|| Mutex::new(None));
    if let Ok(mut slot) = cell.lock() {
        *slot = path;
    }
}

/// Appends one JSONL line when a log path is configured (explicitly or via
/// `FKC_CASE_LOG_PATH`). The slot lock also serializes concurrent writers.
pub(crate) fn maybe_append_case_log(entry: &CaseLogEntry) -> Result<(), HarnessError> {
    let cell = CASE_LOG_PATH.get_or_init(|| Mutex::new(None));
    let slot = cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let from_env = std::env::var_os("FKC_CASE_LOG_PATH").map(PathBuf::from);
    let Some(path) = slot.clone().or(from_env) else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| HarnessError::io(parent, err))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| HarnessError::io(&path, err))?;
    let mut payload = serde_json::to_string(entry)?.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)
        .map_err(|err| HarnessError::io(&path, err))
}

/// Registry holding every check this crate ships, wired to `engine`.
pub fn default_registry(engine: Arc<dyn TensorEngine>) -> Result<TestRegistry, HarnessError> {
    let mut registry = TestRegistry::new();
    matmul_differential::register_matmul_suite(&mut registry, engine)?;
    Ok(registry)
}

/// Runs one test for its repeat count and reports the (possibly partial) result.
pub fn run_registered_test(
    test: &TestDefinition,
    config: &HarnessConfig,
    cancel: &CancellationToken,
) -> Result<RunReport, HarnessError> {
    let repeat = config.repeat_override.unwrap_or_else(|| test.repeat());
    let outcomes = run_test(test, repeat, config.mode, config.seed, cancel)?;
    let report = aggregate(test.name(), &outcomes);
    report.emit();
    Ok(report)
}

/// Runs every registered test in registration order. Tests not yet started
/// when `cancel` fires are skipped; a fatal test error stops the suite.
pub fn run_registry(
    registry: &TestRegistry,
    config: &HarnessConfig,
    cancel: &CancellationToken,
) -> Result<Vec<RunReport>, HarnessError> {
    let mut reports = Vec::with_capacity(registry.len());
    for test in registry.iter() {
        if cancel.is_cancelled() {
            tracing::warn!(test = test.name(), "skipping test after interrupt");
            break;
        }
        reports.push(run_registered_test(test, config, cancel)?);
    }
    Ok(reports)
}

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() -> Result<(), String> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| format!("failed installing tracing subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::{
        CaseLogEntry, HarnessConfig, RunMode, default_registry, maybe_append_case_log,
        set_case_log_path,
    };
    use crate::matmul_differential::MATMUL_TEST_NAME;
    use fkc_engine::CpuEngine;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn temp_file(name: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        std::env::temp_dir().join(format!("fkc_{name}_{ts}.jsonl"))
    }

    #[test]
    fn default_config_is_sequential() {
        let cfg = HarnessConfig::default_paths();
        assert_eq!(cfg.mode, RunMode::Sequential);
        assert!(cfg.repeat_override.is_none());
        assert!(
            cfg.report_path("matmul test")
                .ends_with("matmul_test_report.json")
        );
    }

    #[test]
    fn default_registry_exposes_matmul_test() {
        let registry = default_registry(Arc::new(CpuEngine::new())).expect("registry");
        assert_eq!(registry.names(), vec![MATMUL_TEST_NAME]);
    }

    #[test]
    fn case_log_appends_json_lines() {
        let path = temp_file("case_log");
        set_case_log_path(Some(path.clone()));
        for case_index in 0..2 {
            maybe_append_case_log(&CaseLogEntry {
                suite: "randomized_differential",
                test_name: "log fixture".to_string(),
                case_index,
                seed: 9,
                passed: case_index == 0,
                reason_code: "case_passed".to_string(),
                elapsed_ms: 0.5,
            })
            .expect("append");
        }
        set_case_log_path(None);

        let raw = fs::read_to_string(&path).expect("log readable");
        let lines = raw
            .lines()
            .filter(|line| line.contains("\"log fixture\""))
            .collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json line");
        assert_eq!(first["case_index"], 0);
        assert_eq!(first["passed"], true);
        let _ = fs::remove_file(path);
    }
}
