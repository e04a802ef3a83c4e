#![forbid(unsafe_code)]

use crate::HarnessError;

/// References with magnitude below this are compared by absolute difference.
pub const ABS_SCALE: f64 = 1e-6;
pub const DEFAULT_THRESHOLD: f64 = 1e-4;

/// Absolute difference for near-zero references, relative difference otherwise.
/// Identical values (including matching infinities and NaN against NaN) score 0;
/// any other non-finite discrepancy scores `+inf`.
#[must_use]
pub fn element_error(actual: f64, expected: f64) -> f64 {
    if actual == expected || (actual.is_nan() && expected.is_nan()) {
        return 0.0;
    }
    let abs_err = (actual - expected).abs();
    let err = if expected.abs() < ABS_SCALE {
        abs_err
    } else {
        abs_err / expected.abs()
    };
    if err.is_finite() { err } else { f64::INFINITY }
}

pub fn absolute_or_relative_error(
    actual: &[f64],
    expected: &[f64],
) -> Result<Vec<f64>, HarnessError> {
    ensure_same_len(actual, expected)?;
    Ok(actual
        .iter()
        .zip(expected)
        .map(|(&a, &e)| element_error(a, e))
        .collect())
}

/// Arithmetic mean of the per-element errors; `0.0` for empty inputs.
pub fn mean_discrepancy(actual: &[f64], expected: &[f64]) -> Result<f64, HarnessError> {
    ensure_same_len(actual, expected)?;
    if expected.is_empty() {
        return Ok(0.0);
    }
    let total: f64 = actual
        .iter()
        .zip(expected)
        .map(|(&a, &e)| element_error(a, e))
        .sum();
    Ok(total / expected.len() as f64)
}

/// Passes iff the mean discrepancy is strictly below `threshold`.
pub fn compare(actual: &[f64], expected: &[f64], threshold: f64) -> Result<bool, HarnessError> {
    Ok(mean_discrepancy(actual, expected)? < threshold)
}

fn ensure_same_len(actual: &[f64], expected: &[f64]) -> Result<(), HarnessError> {
    if actual.len() != expected.len() {
        return Err(HarnessError::ShapeMismatch {
            actual: actual.len(),
            expected: expected.len(),
        });
    }
    Ok(())
}
