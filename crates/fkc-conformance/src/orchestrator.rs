#![forbid(unsafe_code)]

use crate::registry::{CaseContext, TestDefinition};
use crate::{CaseLogEntry, HarnessError, maybe_append_case_log};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Cooperative stop flag, checked before each case starts.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Sequential,
    Parallel { workers: usize },
}

impl RunMode {
    /// `workers <= 1` degrades to sequential execution.
    #[must_use]
    pub fn with_workers(workers: usize) -> Self {
        if workers <= 1 {
            Self::Sequential
        } else {
            Self::Parallel { workers }
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel { .. } => "parallel",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub case_index: usize,
    pub seed: u64,
    pub passed: bool,
    pub elapsed_ms: f64,
    pub reason_code: &'static str,
    pub reason: Option<String>,
}

/// Outcomes collected by one run; shorter than `planned` when cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcomes {
    records: Vec<CaseRecord>,
    planned: usize,
    interrupted: bool,
}

impl RunOutcomes {
    #[must_use]
    pub fn records(&self) -> &[CaseRecord] {
        &self.records
    }

    #[must_use]
    pub fn outcomes(&self) -> Vec<bool> {
        self.records.iter().map(|record| record.passed).collect()
    }

    #[must_use]
    pub fn planned(&self) -> usize {
        self.planned
    }

    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }
}

/// Per-case seed, independent of execution order so sequential and parallel
/// runs with the same run seed draw the same cases.
#[must_use]
pub fn case_seed(run_seed: u64, case_index: usize) -> u64 {
    let mut z = run_seed ^ (case_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub fn run_test(
    test: &TestDefinition,
    repeat: usize,
    mode: RunMode,
    run_seed: u64,
    cancel: &CancellationToken,
) -> Result<RunOutcomes, HarnessError> {
    tracing::info!(
        test = test.name(),
        repeat,
        mode = mode.as_str(),
        run_seed,
        "starting run"
    );

    let records = match mode {
        RunMode::Sequential => run_sequential(test, repeat, run_seed, cancel),
        RunMode::Parallel { workers } => run_parallel(test, repeat, workers, run_seed, cancel),
    }
    .map_err(|err| HarnessError::TestFailed {
        name: test.name().to_string(),
        source: Box::new(err),
    })?;

    let interrupted = records.len() < repeat;
    if interrupted {
        tracing::warn!(
            test = test.name(),
            completed = records.len(),
            planned = repeat,
            "run interrupted; aggregating partial outcomes"
        );
    }
    Ok(RunOutcomes {
        records,
        planned: repeat,
        interrupted,
    })
}

fn run_sequential(
    test: &TestDefinition,
    repeat: usize,
    run_seed: u64,
    cancel: &CancellationToken,
) -> Result<Vec<CaseRecord>, HarnessError> {
    let mut records = Vec::with_capacity(repeat);
    for case_index in 0..repeat {
        if cancel.is_cancelled() {
            break;
        }
        records.push(run_case(test, case_index, run_seed)?);
    }
    Ok(records)
}

fn run_parallel(
    test: &TestDefinition,
    repeat: usize,
    workers: usize,
    run_seed: u64,
    cancel: &CancellationToken,
) -> Result<Vec<CaseRecord>, HarnessError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|idx| format!("fkc-case-{idx}"))
        .build()
        .map_err(|err| HarnessError::WorkerPool(err.to_string()))?;

    // Set by the first fatal case so the remaining workers stop picking up work.
    let aborted = AtomicBool::new(false);
    let results = pool.install(|| {
        (0..repeat)
            .into_par_iter()
            .filter_map(|case_index| {
                if cancel.is_cancelled() || aborted.load(Ordering::SeqCst) {
                    return None;
                }
                let result = run_case(test, case_index, run_seed);
                if result.is_err() {
                    aborted.store(true, Ordering::SeqCst);
                }
                Some(result)
            })
            .collect::<Vec<_>>()
    });

    let mut records = Vec::with_capacity(results.len());
    for result in results {
        records.push(result?);
    }
    Ok(records)
}

fn run_case(
    test: &TestDefinition,
    case_index: usize,
    run_seed: u64,
) -> Result<CaseRecord, HarnessError> {
    let ctx = CaseContext {
        case_index,
        seed: case_seed(run_seed, case_index),
    };
    let start = Instant::now();
    let result = test.invoke(&ctx);
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let record = match result {
        Ok(passed) => CaseRecord {
            case_index,
            seed: ctx.seed,
            passed,
            elapsed_ms,
            reason_code: if passed {
                "case_passed"
            } else {
                "case_tolerance_exceeded"
            },
            reason: None,
        },
        Err(err) if err.is_case_local() => {
            tracing::warn!(
                test = test.name(),
                case_index,
                seed = ctx.seed,
                error = %err,
                "case error recorded as failure"
            );
            CaseRecord {
                case_index,
                seed: ctx.seed,
                passed: false,
                elapsed_ms,
                reason_code: err.reason_code(),
                reason: Some(err.to_string()),
            }
        }
        Err(err) => return Err(err),
    };

    tracing::debug!(
        test = test.name(),
        case_index,
        seed = record.seed,
        passed = record.passed,
        elapsed_ms,
        "case finished"
    );
    maybe_append_case_log(&CaseLogEntry {
        suite: "randomized_differential",
        test_name: test.name().to_string(),
        case_index,
        seed: record.seed,
        passed: record.passed,
        reason_code: record.reason_code.to_string(),
        elapsed_ms,
    })?;
    Ok(record)
}
