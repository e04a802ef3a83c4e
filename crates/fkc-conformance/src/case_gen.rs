#![forbid(unsafe_code)]

use crate::HarnessError;
use fkc_engine::TensorEngine;
use fkc_tensor::TensorSpec;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Bound used by the registered correctness suite.
pub const REGISTERED_SUITE_MAX_DIM: usize = 256;
/// Bound used by the standalone benchmark run.
pub const BENCHMARK_MAX_DIM: usize = 1000;

/// Inclusive upper bound for every drawn matrix dimension; the lower bound is 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeBounds {
    max_dim: usize,
}

impl ShapeBounds {
    pub fn new(max_dim: usize) -> Result<Self, HarnessError> {
        if max_dim == 0 {
            return Err(HarnessError::InvalidBounds(
                "max_dim must be >= 1".to_string(),
            ));
        }
        Ok(Self { max_dim })
    }

    #[must_use]
    pub fn registered_suite() -> Self {
        Self {
            max_dim: REGISTERED_SUITE_MAX_DIM,
        }
    }

    #[must_use]
    pub fn benchmark() -> Self {
        Self {
            max_dim: BENCHMARK_MAX_DIM,
        }
    }

    #[must_use]
    pub const fn max_dim(self) -> usize {
        self.max_dim
    }
}

/// Operands for one matmul comparison: `[h1, w1] x [w1, w2]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatmulCase {
    seed: u64,
    operands: [TensorSpec; 2],
}

impl MatmulCase {
    /// Builds a case from explicit operands; the inner dimensions must agree.
    pub fn new(seed: u64, lhs: TensorSpec, rhs: TensorSpec) -> Result<Self, HarnessError> {
        fkc_tensor::matmul_output_shape(lhs.shape(), rhs.shape())
            .map_err(|err| HarnessError::InvalidCase(format!("incompatible operands: {err}")))?;
        Ok(Self {
            seed,
            operands: [lhs, rhs],
        })
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn lhs(&self) -> &TensorSpec {
        &self.operands[0]
    }

    #[must_use]
    pub fn rhs(&self) -> &TensorSpec {
        &self.operands[1]
    }

    #[must_use]
    pub fn operands(&self) -> &[TensorSpec] {
        &self.operands
    }

    /// `(h1, w1, w2)`.
    #[must_use]
    pub fn dims(&self) -> (usize, usize, usize) {
        let lhs = self.lhs().shape();
        let rhs = self.rhs().shape();
        (lhs[0], lhs[1], rhs[1])
    }

    #[must_use]
    pub fn output_shape(&self) -> [usize; 2] {
        let (h1, _, w2) = self.dims();
        [h1, w2]
    }

    #[must_use]
    pub fn output_len(&self) -> usize {
        let (h1, _, w2) = self.dims();
        h1 * w2
    }
}

#[must_use]
pub fn draw_dims(bounds: ShapeBounds, rng: &mut dyn RngCore) -> (usize, usize, usize) {
    let max = bounds.max_dim();
    (
        rng.gen_range(1..=max),
        rng.gen_range(1..=max),
        rng.gen_range(1..=max),
    )
}

#[derive(Clone)]
pub struct CaseGenerator {
    engine: Arc<dyn TensorEngine>,
    bounds: ShapeBounds,
}

impl std::fmt::Debug for CaseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseGenerator")
            .field("engine", &self.engine.name())
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl CaseGenerator {
    #[must_use]
    pub fn new(engine: Arc<dyn TensorEngine>, bounds: ShapeBounds) -> Self {
        Self { engine, bounds }
    }

    #[must_use]
    pub fn bounds(&self) -> ShapeBounds {
        self.bounds
    }

    /// Same seed and bounds always reproduce the same case.
    pub fn generate_seeded(&self, seed: u64) -> Result<MatmulCase, HarnessError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.generate_with(seed, &mut rng)
    }

    pub fn generate_with(
        &self,
        seed: u64,
        rng: &mut dyn RngCore,
    ) -> Result<MatmulCase, HarnessError> {
        let (h1, w1, w2) = draw_dims(self.bounds, rng);
        let lhs = self.random_operand(&[h1, w1], rng)?;
        let rhs = self.random_operand(&[w1, w2], rng)?;
        Ok(MatmulCase {
            seed,
            operands: [lhs, rhs],
        })
    }

    fn random_operand(
        &self,
        shape: &[usize],
        rng: &mut dyn RngCore,
    ) -> Result<TensorSpec, HarnessError> {
        self.engine.random_tensor(shape, rng).map_err(|err| {
            HarnessError::EngineExecution(format!(
                "{} random_tensor{shape:?} failed: {err} ({})",
                self.engine.name(),
                err.reason_code()
            ))
        })
    }
}
