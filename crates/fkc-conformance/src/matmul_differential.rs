#![forbid(unsafe_code)]

use crate::HarnessError;
use crate::case_gen::{CaseGenerator, MatmulCase, ShapeBounds};
use crate::compare::mean_discrepancy;
use crate::engine_adapter::{EngineAdapter, ExecutionAdapter};
use crate::oracle::{NdarrayOracle, ReferenceOracle};
use crate::registry::{CaseContext, TestDefinition, TestMetadata, TestRegistry};
use fkc_engine::TensorEngine;
use std::sync::Arc;

pub const MATMUL_TEST_NAME: &str = "matmul test";
pub const MATMUL_TEST_REPEAT: usize = 1000;
pub const MATMUL_TEST_DESCRIPTION: &str = "Test matmul operation";
pub const MATMUL_ACCEPTED_ERROR: f64 = 1e-4;
pub const BENCHMARK_CASES: usize = 10;

/// Generator, oracle and engine wired together for one matmul comparison.
#[derive(Clone)]
pub struct MatmulCheck {
    generator: CaseGenerator,
    oracle: Arc<dyn ReferenceOracle>,
    adapter: Arc<dyn ExecutionAdapter>,
    threshold: f64,
}

impl std::fmt::Debug for MatmulCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatmulCheck")
            .field("generator", &self.generator)
            .field("oracle", &self.oracle.name())
            .field("adapter", &self.adapter.name())
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl MatmulCheck {
    /// `ndarray` as the oracle, `engine` as both operand source and system under test.
    #[must_use]
    pub fn new(engine: Arc<dyn TensorEngine>, bounds: ShapeBounds, threshold: f64) -> Self {
        Self {
            generator: CaseGenerator::new(Arc::clone(&engine), bounds),
            oracle: Arc::new(NdarrayOracle::new()),
            adapter: Arc::new(EngineAdapter::new(engine)),
            threshold,
        }
    }

    #[must_use]
    pub fn with_parts(
        generator: CaseGenerator,
        oracle: Arc<dyn ReferenceOracle>,
        adapter: Arc<dyn ExecutionAdapter>,
        threshold: f64,
    ) -> Self {
        Self {
            generator,
            oracle,
            adapter,
            threshold,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    #[must_use]
    pub fn bounds(&self) -> ShapeBounds {
        self.generator.bounds()
    }

    pub fn run_case(&self, ctx: &CaseContext) -> Result<bool, HarnessError> {
        let case = self.generator.generate_seeded(ctx.seed)?;
        check_case(&case, self.oracle.as_ref(), self.adapter.as_ref(), self.threshold)
    }
}

/// Expected vs actual for one case. Length disagreement is an error, not a fail.
pub fn check_case(
    case: &MatmulCase,
    oracle: &dyn ReferenceOracle,
    adapter: &dyn ExecutionAdapter,
    threshold: f64,
) -> Result<bool, HarnessError> {
    let expected = oracle.expected(case)?;
    if expected.len() != case.output_len() {
        return Err(HarnessError::Oracle(format!(
            "{} produced {} elements for output shape {:?}",
            oracle.name(),
            expected.len(),
            case.output_shape()
        )));
    }
    let actual = adapter.actual(case)?;
    let mean_error = mean_discrepancy(&actual, &expected)?;
    let passed = mean_error < threshold;

    let (h1, w1, w2) = case.dims();
    tracing::debug!(
        seed = case.seed(),
        h1,
        w1,
        w2,
        mean_error,
        threshold,
        passed,
        "matmul case compared"
    );
    Ok(passed)
}

pub fn matmul_test_definition(
    name: &str,
    repeat: usize,
    bounds: ShapeBounds,
    accepted_error: f64,
    engine: Arc<dyn TensorEngine>,
) -> Result<TestDefinition, HarnessError> {
    let metadata = TestMetadata::new(name, repeat, MATMUL_TEST_DESCRIPTION, accepted_error)?;
    let check = MatmulCheck::new(engine, bounds, metadata.accepted_error());
    Ok(TestDefinition::new(metadata, move |ctx| check.run_case(ctx)))
}

/// Registers the correctness suite entry: 1000 repeats over dims in `[1, 256]`.
pub fn register_matmul_suite(
    registry: &mut TestRegistry,
    engine: Arc<dyn TensorEngine>,
) -> Result<(), HarnessError> {
    registry.register(matmul_test_definition(
        MATMUL_TEST_NAME,
        MATMUL_TEST_REPEAT,
        ShapeBounds::registered_suite(),
        MATMUL_ACCEPTED_ERROR,
        engine,
    )?)
}

/// Standalone benchmark: 10 cases over dims in `[1, 1000]`.
pub fn matmul_benchmark_definition(
    engine: Arc<dyn TensorEngine>,
) -> Result<TestDefinition, HarnessError> {
    matmul_test_definition(
        "matmul benchmark",
        BENCHMARK_CASES,
        ShapeBounds::benchmark(),
        MATMUL_ACCEPTED_ERROR,
        engine,
    )
}

#[cfg(test)]
mod tests {
    use super::{
        MATMUL_ACCEPTED_ERROR, MATMUL_TEST_DESCRIPTION, MATMUL_TEST_NAME, MATMUL_TEST_REPEAT,
        MatmulCheck, check_case, matmul_benchmark_definition, register_matmul_suite,
    };
    use crate::HarnessError;
    use crate::case_gen::{BENCHMARK_MAX_DIM, MatmulCase, REGISTERED_SUITE_MAX_DIM, ShapeBounds};
    use crate::engine_adapter::ExecutionAdapter;
    use crate::oracle::{NdarrayOracle, ReferenceOracle};
    use crate::registry::{CaseContext, TestDefinition, TestRegistry};
    use fkc_engine::{CpuEngine, EngineError, ExecuteOptions, TensorEngine};
    use fkc_tensor::{Operation, ShapeError, TensorSpec};
    use rand::RngCore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records the largest requested dimension and refuses to allocate.
    #[derive(Default)]
    struct DimRecorder {
        largest: AtomicUsize,
    }

    impl TensorEngine for DimRecorder {
        fn name(&self) -> &'static str {
            "dim_recorder"
        }

        fn random_tensor(
            &self,
            shape: &[usize],
            _rng: &mut dyn RngCore,
        ) -> Result<TensorSpec, EngineError> {
            for &dim in shape {
                self.largest.fetch_max(dim, Ordering::SeqCst);
            }
            Err(EngineError::Shape(ShapeError::Overflow))
        }

        fn execute(
            &self,
            op: Operation,
            options: &ExecuteOptions,
            operands: &[TensorSpec],
        ) -> Result<TensorSpec, EngineError> {
            CpuEngine::new().execute(op, options, operands)
        }
    }

    fn largest_drawn_dim(def: &TestDefinition, recorder: &DimRecorder) -> usize {
        for case_index in 0..500 {
            let err = def
                .invoke(&CaseContext {
                    case_index,
                    seed: case_index as u64,
                })
                .expect_err("recorder refuses operands");
            assert!(err.is_case_local(), "got {err:?}");
        }
        recorder.largest.load(Ordering::SeqCst)
    }

    /// Doubles the expected output so every non-zero element misses.
    struct ScaledAdapter;

    impl ExecutionAdapter for ScaledAdapter {
        fn name(&self) -> &str {
            "scaled"
        }

        fn actual(&self, case: &MatmulCase) -> Result<Vec<f64>, HarnessError> {
            Ok(NdarrayOracle::new()
                .expected(case)?
                .into_iter()
                .map(|v| v * 2.0)
                .collect())
        }
    }

    #[test]
    fn registered_suite_carries_metadata() {
        let mut registry = TestRegistry::new();
        register_matmul_suite(&mut registry, Arc::new(CpuEngine::new())).expect("register");
        let def = registry.get(MATMUL_TEST_NAME).expect("registered");
        assert_eq!(def.repeat(), MATMUL_TEST_REPEAT);
        assert_eq!(def.metadata().description(), MATMUL_TEST_DESCRIPTION);
        assert_eq!(def.metadata().accepted_error(), MATMUL_ACCEPTED_ERROR);

        let err = register_matmul_suite(&mut registry, Arc::new(CpuEngine::new()))
            .expect_err("second registration");
        assert!(matches!(err, HarnessError::DuplicateTestName(_)));
    }

    #[test]
    fn cpu_engine_passes_small_cases() {
        let check = MatmulCheck::new(
            Arc::new(CpuEngine::new()),
            ShapeBounds::new(24).expect("bounds"),
            MATMUL_ACCEPTED_ERROR,
        );
        for case_index in 0..8 {
            let ctx = CaseContext {
                case_index,
                seed: 1_000 + case_index as u64,
            };
            assert!(check.run_case(&ctx).expect("case"), "case {case_index} failed");
        }
    }

    #[test]
    fn scaled_output_fails_tolerance() {
        let case = MatmulCase::new(
            0,
            TensorSpec::filled(vec![2, 2], 1.0).expect("lhs"),
            TensorSpec::filled(vec![2, 2], 1.0).expect("rhs"),
        )
        .expect("case");
        let passed = check_case(&case, &NdarrayOracle::new(), &ScaledAdapter, 1e-4)
            .expect("comparable");
        assert!(!passed);
    }

    #[test]
    fn check_exposes_its_bounds() {
        let check = MatmulCheck::new(
            Arc::new(CpuEngine::new()),
            ShapeBounds::registered_suite(),
            MATMUL_ACCEPTED_ERROR,
        );
        assert_eq!(check.bounds().max_dim(), REGISTERED_SUITE_MAX_DIM);
        assert_eq!(check.threshold(), MATMUL_ACCEPTED_ERROR);
    }

    #[test]
    fn registered_suite_draws_dims_up_to_256() {
        let recorder = Arc::new(DimRecorder::default());
        let mut registry = TestRegistry::new();
        register_matmul_suite(&mut registry, Arc::clone(&recorder) as Arc<dyn TensorEngine>)
            .expect("register");
        let def = registry.require(MATMUL_TEST_NAME).expect("registered");

        let largest = largest_drawn_dim(def, &recorder);
        assert!(largest <= REGISTERED_SUITE_MAX_DIM, "largest={largest}");
        assert!(largest > REGISTERED_SUITE_MAX_DIM * 9 / 10, "largest={largest}");
    }

    #[test]
    fn benchmark_definition_draws_dims_up_to_1000() {
        let recorder = Arc::new(DimRecorder::default());
        let def = matmul_benchmark_definition(Arc::clone(&recorder) as Arc<dyn TensorEngine>)
            .expect("definition");
        assert_eq!(def.repeat(), 10);

        let largest = largest_drawn_dim(&def, &recorder);
        assert!(largest <= BENCHMARK_MAX_DIM, "largest={largest}");
        assert!(largest > REGISTERED_SUITE_MAX_DIM, "largest={largest}");
        assert!(largest > BENCHMARK_MAX_DIM * 9 / 10, "largest={largest}");
    }
}
