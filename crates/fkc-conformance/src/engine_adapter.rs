#![forbid(unsafe_code)]

use crate::HarnessError;
use crate::case_gen::MatmulCase;
use fkc_engine::{ExecuteOptions, TensorEngine};
use fkc_tensor::Operation;
use std::sync::Arc;

/// Source of the result under test for a case.
pub trait ExecutionAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Flat row-major output produced by the system under test.
    fn actual(&self, case: &MatmulCase) -> Result<Vec<f64>, HarnessError>;
}

/// Drives an engine's dispatch entry point with `Operation::Matmul`.
#[derive(Clone)]
pub struct EngineAdapter {
    engine: Arc<dyn TensorEngine>,
    options: ExecuteOptions,
}

impl std::fmt::Debug for EngineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineAdapter")
            .field("engine", &self.engine.name())
            .field("options", &self.options)
            .finish()
    }
}

impl EngineAdapter {
    #[must_use]
    pub fn new(engine: Arc<dyn TensorEngine>) -> Self {
        Self {
            engine,
            options: ExecuteOptions::default(),
        }
    }
}

impl ExecutionAdapter for EngineAdapter {
    fn name(&self) -> &str {
        self.engine.name()
    }

    fn actual(&self, case: &MatmulCase) -> Result<Vec<f64>, HarnessError> {
        let op = Operation::Matmul;
        let out = self
            .engine
            .execute(op, &self.options, case.operands())
            .map_err(|err| {
                HarnessError::EngineExecution(format!(
                    "{} {op} dispatch failed: {err} ({})",
                    self.engine.name(),
                    err.reason_code()
                ))
            })?;

        let expected_shape = case.output_shape();
        if out.shape() != expected_shape || out.len() != case.output_len() {
            return Err(HarnessError::EngineExecution(format!(
                "{} {op} returned shape {:?} with {} elements, expected {expected_shape:?}",
                self.engine.name(),
                out.shape(),
                out.len()
            )));
        }
        Ok(out.into_data())
    }
}
