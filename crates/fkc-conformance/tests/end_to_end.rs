use std::sync::Arc;

use fkc_conformance::case_gen::{MatmulCase, ShapeBounds};
use fkc_conformance::engine_adapter::{EngineAdapter, ExecutionAdapter};
use fkc_conformance::matmul_differential::{
    MATMUL_ACCEPTED_ERROR, MATMUL_TEST_NAME, MatmulCheck, check_case,
};
use fkc_conformance::oracle::{NdarrayOracle, ReferenceOracle};
use fkc_conformance::report::enforce;
use fkc_conformance::{
    CancellationToken, HarnessConfig, HarnessError, RunMode, TestDefinition, TestMetadata,
    default_registry, run_registered_test, run_registry,
};
use fkc_engine::{CpuEngine, TensorEngine};
use fkc_tensor::TensorSpec;

/// Returns the engine's result with its last element dropped.
struct TruncatingAdapter {
    inner: EngineAdapter,
}

impl ExecutionAdapter for TruncatingAdapter {
    fn name(&self) -> &str {
        "truncating"
    }

    fn actual(&self, case: &MatmulCase) -> Result<Vec<f64>, HarnessError> {
        let mut out = self.inner.actual(case)?;
        out.pop();
        Ok(out)
    }
}

fn cpu_engine() -> Arc<dyn TensorEngine> {
    Arc::new(CpuEngine::new())
}

fn ones_case() -> MatmulCase {
    MatmulCase::new(
        0,
        TensorSpec::filled(vec![2, 3], 1.0).expect("lhs"),
        TensorSpec::filled(vec![3, 2], 1.0).expect("rhs"),
    )
    .expect("case")
}

fn sequential_config() -> HarnessConfig {
    let mut cfg = HarnessConfig::default_paths();
    cfg.mode = RunMode::Sequential;
    cfg.seed = 20_240_101;
    cfg
}

fn fixture(
    name: &str,
    repeat: usize,
    body: impl Fn(usize) -> bool + Send + Sync + 'static,
) -> TestDefinition {
    TestDefinition::new(
        TestMetadata::new(name, repeat, "end-to-end fixture", MATMUL_ACCEPTED_ERROR)
            .expect("metadata"),
        move |ctx| Ok(body(ctx.case_index)),
    )
}

#[test]
fn ones_product_matches_reference() {
    let case = ones_case();
    let expected = NdarrayOracle::new().expected(&case).expect("oracle");
    assert_eq!(expected, vec![3.0; 4]);

    let adapter = EngineAdapter::new(cpu_engine());
    let passed = check_case(&case, &NdarrayOracle::new(), &adapter, MATMUL_ACCEPTED_ERROR)
        .expect("comparable");
    assert!(passed);
}

#[test]
fn truncated_engine_result_is_a_shape_mismatch() {
    let adapter = TruncatingAdapter {
        inner: EngineAdapter::new(cpu_engine()),
    };
    let err = check_case(&ones_case(), &NdarrayOracle::new(), &adapter, MATMUL_ACCEPTED_ERROR)
        .expect_err("short result must not pass");
    assert!(matches!(
        err,
        HarnessError::ShapeMismatch {
            actual: 3,
            expected: 4
        }
    ));
}

#[test]
fn hundred_passing_cases_report_clean() {
    let check = MatmulCheck::new(
        cpu_engine(),
        ShapeBounds::new(16).expect("bounds"),
        MATMUL_ACCEPTED_ERROR,
    );
    let def = TestDefinition::new(
        TestMetadata::new("small matmul", 100, "bounded matmul", MATMUL_ACCEPTED_ERROR)
            .expect("metadata"),
        move |ctx| check.run_case(ctx),
    );

    let report = run_registered_test(&def, &sequential_config(), &CancellationToken::new())
        .expect("run");
    assert_eq!(
        (report.total, report.successes, report.failures),
        (100, 100, 0)
    );
    assert!(!report.interrupted);
    assert!(enforce(report).is_ok());
}

#[test]
fn two_failing_cases_fail_the_suite() {
    let def = fixture("two failures", 10, |idx| idx != 3 && idx != 7);
    let report = run_registered_test(&def, &sequential_config(), &CancellationToken::new())
        .expect("run");
    assert_eq!((report.total, report.successes, report.failures), (10, 8, 2));
    let failed = report
        .failure_records
        .iter()
        .map(|record| record.case_index)
        .collect::<Vec<_>>();
    assert_eq!(failed, vec![3, 7]);

    match enforce(report) {
        Err(HarnessError::TestSuiteFailed(carried)) => {
            assert_eq!(carried.test_name, "two failures");
            assert_eq!(
                (carried.total, carried.successes, carried.failures),
                (10, 8, 2)
            );
        }
        other => panic!("expected TestSuiteFailed, got {other:?}"),
    }
}

#[test]
fn interrupt_after_five_cases_aggregates_partial_run() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let def = TestDefinition::new(
        TestMetadata::new("interrupted", 100, "cancels itself", MATMUL_ACCEPTED_ERROR)
            .expect("metadata"),
        move |ctx| {
            if ctx.case_index == 4 {
                trigger.cancel();
            }
            Ok(true)
        },
    );

    let report = run_registered_test(&def, &sequential_config(), &cancel).expect("partial run");
    assert_eq!(report.total, 5);
    assert_eq!(report.successes, 5);
    assert_eq!(report.planned, 100);
    assert!(report.interrupted);
}

#[test]
fn parallel_run_counts_match_sequential() {
    let body = |idx: usize| idx % 5 != 0;
    let seq = run_registered_test(
        &fixture("parity", 40, body),
        &sequential_config(),
        &CancellationToken::new(),
    )
    .expect("sequential");

    let mut cfg = sequential_config();
    cfg.mode = RunMode::with_workers(4);
    let par = run_registered_test(&fixture("parity", 40, body), &cfg, &CancellationToken::new())
        .expect("parallel");

    assert_eq!(
        (seq.total, seq.successes, seq.failures),
        (par.total, par.successes, par.failures)
    );
    assert_eq!(par.failures, 8);
}

#[test]
fn default_registry_passes_against_cpu_engine() {
    let registry = default_registry(cpu_engine()).expect("registry");
    let mut cfg = sequential_config();
    cfg.repeat_override = Some(4);
    cfg.mode = RunMode::with_workers(2);

    let reports = run_registry(&registry, &cfg, &CancellationToken::new()).expect("suite");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].test_name, MATMUL_TEST_NAME);
    assert_eq!(reports[0].total, 4);
    assert!(reports[0].all_passed(), "{:?}", reports[0].failure_records);
}

#[test]
fn cancelled_registry_run_skips_remaining_tests() {
    let registry = default_registry(cpu_engine()).expect("registry");
    let cancel = CancellationToken::new();
    cancel.cancel();
    let reports = run_registry(&registry, &sequential_config(), &cancel).expect("suite");
    assert!(reports.is_empty());
}
