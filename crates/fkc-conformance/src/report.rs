#![forbid(unsafe_code)]

use crate::HarnessError;
use crate::orchestrator::RunOutcomes;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const REPORT_SCHEMA_VERSION: u8 = 1;
pub const MAX_FAILURE_RECORDS: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub case_index: usize,
    pub seed: u64,
    pub reason_code: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: u8,
    pub test_name: String,
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub planned: usize,
    pub interrupted: bool,
    pub latency: LatencySummary,
    pub failure_records: Vec<FailureRecord>,
}

impl RunReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures == 0
    }

    /// The two operator-facing summary lines.
    #[must_use]
    pub fn summary_lines(&self) -> [String; 2] {
        [
            format!("Success: {}/{}", self.successes, self.total),
            format!("Fails: {}/{}", self.failures, self.total),
        ]
    }

    /// Console output for a finished run; an interrupted run is announced
    /// before its counts.
    #[must_use]
    pub fn operator_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(3);
        if self.interrupted {
            lines.push("Interrupted".to_string());
        }
        lines.extend(self.summary_lines());
        lines
    }

    pub fn emit(&self) {
        for line in self.operator_lines() {
            println!("{line}");
        }
        tracing::info!(
            test = %self.test_name,
            total = self.total,
            successes = self.successes,
            failures = self.failures,
            interrupted = self.interrupted,
            p50_ms = self.latency.p50_ms,
            "run report"
        );
    }
}

/// Counts a plain outcome sequence.
#[must_use]
pub fn aggregate_outcomes(test_name: &str, outcomes: &[bool]) -> RunReport {
    let total = outcomes.len();
    let failures = outcomes.iter().filter(|passed| !**passed).count();
    RunReport {
        schema_version: REPORT_SCHEMA_VERSION,
        test_name: test_name.to_string(),
        total,
        successes: total - failures,
        failures,
        planned: total,
        interrupted: false,
        latency: LatencySummary::default(),
        failure_records: Vec::new(),
    }
}

/// Folds an orchestrated run, partial or complete, into its report.
#[must_use]
pub fn aggregate(test_name: &str, run: &RunOutcomes) -> RunReport {
    let outcomes = run.outcomes();
    let mut report = aggregate_outcomes(test_name, &outcomes);
    report.planned = run.planned();
    report.interrupted = run.interrupted();

    let samples = run
        .records()
        .iter()
        .map(|record| record.elapsed_ms)
        .collect::<Vec<_>>();
    report.latency = summarize_samples(&samples);

    let mut failed = run
        .records()
        .iter()
        .filter(|record| !record.passed)
        .collect::<Vec<_>>();
    failed.sort_by_key(|record| record.case_index);
    report.failure_records = failed
        .into_iter()
        .take(MAX_FAILURE_RECORDS)
        .map(|record| FailureRecord {
            case_index: record.case_index,
            seed: record.seed,
            reason_code: record.reason_code.to_string(),
            reason: record.reason.clone(),
        })
        .collect();
    report
}

/// Turns any failing case into a process-level error carrying the report.
pub fn enforce(report: RunReport) -> Result<RunReport, HarnessError> {
    if report.failures > 0 {
        return Err(HarnessError::TestSuiteFailed(Box::new(report)));
    }
    Ok(report)
}

pub fn write_run_report(path: &Path, report: &RunReport) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| HarnessError::io(parent, err))?;
    }
    let raw = serde_json::to_string_pretty(report)?;
    fs::write(path, raw).map_err(|err| HarnessError::io(path, err))
}

pub fn load_run_report(path: &Path) -> Result<RunReport, HarnessError> {
    let raw = fs::read_to_string(path).map_err(|err| HarnessError::io(path, err))?;
    Ok(serde_json::from_str(&raw)?)
}

fn percentile_index(len: usize, percentile_num: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let last = len - 1;
    (last * percentile_num + 50) / 100
}

fn summarize_samples(samples: &[f64]) -> LatencySummary {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let at = |percentile: usize| {
        sorted
            .get(percentile_index(sorted.len(), percentile))
            .copied()
            .unwrap_or(0.0)
    };

    LatencySummary {
        p50_ms: at(50),
        p95_ms: at(95),
        p99_ms: at(99),
        min_ms: sorted.first().copied().unwrap_or(0.0),
        max_ms: sorted.last().copied().unwrap_or(0.0),
    }
}
