#![forbid(unsafe_code)]

use fkc_tensor::{Operation, ShapeError, TensorSpec, matmul_output_shape, validate_shape};
use rand::{Rng, RngCore};

/// Per-dispatch settings. Empty for matmul.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Shape(ShapeError),
    ArityMismatch {
        op: Operation,
        expected: usize,
        actual: usize,
    },
    NonFiniteOutput {
        op: Operation,
        index: usize,
    },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shape(err) => write!(f, "shape error: {err}"),
            Self::ArityMismatch {
                op,
                expected,
                actual,
            } => write!(
                f,
                "{op} expects {expected} operands, received {actual}"
            ),
            Self::NonFiniteOutput { op, index } => {
                write!(f, "{op} produced a non-finite value at flat index {index}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ShapeError> for EngineError {
    fn from(err: ShapeError) -> Self {
        Self::Shape(err)
    }
}

impl EngineError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Shape(_) => "engine_shape_contract_violation",
            Self::ArityMismatch { .. } => "engine_arity_mismatch",
            Self::NonFiniteOutput { .. } => "engine_non_finite_output",
        }
    }
}

/// Black-box surface a differential harness needs from an engine: build a
/// random operand and dispatch a named kernel over operands.
///
/// Implementations must be shareable across worker threads.
pub trait TensorEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn random_tensor(
        &self,
        shape: &[usize],
        rng: &mut dyn RngCore,
    ) -> Result<TensorSpec, EngineError>;

    fn execute(
        &self,
        op: Operation,
        options: &ExecuteOptions,
        operands: &[TensorSpec],
    ) -> Result<TensorSpec, EngineError>;
}

/// Straightforward single-threaded CPU kernels.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuEngine;

impl CpuEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TensorEngine for CpuEngine {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn random_tensor(
        &self,
        shape: &[usize],
        rng: &mut dyn RngCore,
    ) -> Result<TensorSpec, EngineError> {
        let count = validate_shape(shape)?;
        let data = (0..count).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Ok(TensorSpec::new(shape.to_vec(), data)?)
    }

    fn execute(
        &self,
        op: Operation,
        _options: &ExecuteOptions,
        operands: &[TensorSpec],
    ) -> Result<TensorSpec, EngineError> {
        if operands.len() != op.arity() {
            return Err(EngineError::ArityMismatch {
                op,
                expected: op.arity(),
                actual: operands.len(),
            });
        }
        match op {
            Operation::Matmul => {
                let out = matmul(&operands[0], &operands[1])?;
                ensure_finite(op, &out)?;
                Ok(out)
            }
        }
    }
}

/// Row-major `[m, k] x [k, n]` product using the i-k-j loop order so the
/// inner loop walks both `rhs` and the output contiguously.
pub fn matmul(lhs: &TensorSpec, rhs: &TensorSpec) -> Result<TensorSpec, EngineError> {
    let out_shape = matmul_output_shape(lhs.shape(), rhs.shape())?;
    let (m, k) = lhs.matrix_dims()?;
    let n = out_shape[1];

    let a = lhs.data();
    let b = rhs.data();
    let mut out = vec![0.0_f64; m * n];

    for i in 0..m {
        let out_row = &mut out[i * n..(i + 1) * n];
        for p in 0..k {
            let scale = a[i * k + p];
            if scale == 0.0 {
                continue;
            }
            let b_row = &b[p * n..(p + 1) * n];
            for (slot, &value) in out_row.iter_mut().zip(b_row) {
                *slot += scale * value;
            }
        }
    }

    Ok(TensorSpec::new(out_shape, out)?)
}

fn ensure_finite(op: Operation, tensor: &TensorSpec) -> Result<(), EngineError> {
    match tensor.data().iter().position(|v| !v.is_finite()) {
        Some(index) => Err(EngineError::NonFiniteOutput { op, index }),
        None => Ok(()),
    }
}
