#![forbid(unsafe_code)]

use crate::report::RunReport;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("result length mismatch: actual={actual} expected={expected}")]
    ShapeMismatch { actual: usize, expected: usize },

    #[error("engine execution failed: {0}")]
    EngineExecution(String),

    #[error("reference oracle rejected case: {0}")]
    Oracle(String),

    #[error("duplicate test name: {0}")]
    DuplicateTestName(String),

    #[error("unknown test: {0}")]
    UnknownTest(String),

    #[error("invalid test metadata for '{name}': {detail}")]
    InvalidMetadata { name: String, detail: String },

    #[error("invalid shape bounds: {0}")]
    InvalidBounds(String),

    #[error("invalid case: {0}")]
    InvalidCase(String),

    #[error("worker pool setup failed: {0}")]
    WorkerPool(String),

    #[error(
        "test '{}' failed: {} of {} cases failed",
        .0.test_name,
        .0.failures,
        .0.total
    )]
    TestSuiteFailed(Box<RunReport>),

    #[error("test '{name}' aborted: {source}")]
    TestFailed {
        name: String,
        #[source]
        source: Box<HarnessError>,
    },

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HarnessError {
    /// Per-case failures the orchestrator folds into a failing outcome
    /// instead of aborting the run.
    #[must_use]
    pub fn is_case_local(&self) -> bool {
        matches!(self, Self::ShapeMismatch { .. } | Self::EngineExecution(_))
    }

    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ShapeMismatch { .. } => "harness_shape_mismatch",
            Self::EngineExecution(_) => "harness_engine_execution_failed",
            Self::Oracle(_) => "harness_oracle_rejected_case",
            Self::DuplicateTestName(_) => "harness_duplicate_test_name",
            Self::UnknownTest(_) => "harness_unknown_test",
            Self::InvalidMetadata { .. } => "harness_invalid_metadata",
            Self::InvalidBounds(_) => "harness_invalid_bounds",
            Self::InvalidCase(_) => "harness_invalid_case",
            Self::WorkerPool(_) => "harness_worker_pool_failed",
            Self::TestSuiteFailed(_) => "harness_test_suite_failed",
            Self::TestFailed { .. } => "harness_test_aborted",
            Self::Io { .. } => "harness_io_failed",
            Self::Serialization(_) => "harness_serialization_failed",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
