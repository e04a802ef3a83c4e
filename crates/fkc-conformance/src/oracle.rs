#![forbid(unsafe_code)]

use crate::HarnessError;
use crate::case_gen::MatmulCase;
use fkc_tensor::TensorSpec;
use ndarray::Array2;

/// Ground truth for a case. Implementations are trusted, not tested.
pub trait ReferenceOracle: Send + Sync {
    fn name(&self) -> &'static str;

    /// Flat row-major expected output.
    fn expected(&self, case: &MatmulCase) -> Result<Vec<f64>, HarnessError>;
}

/// Matrix product computed by `ndarray`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdarrayOracle;

impl NdarrayOracle {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ReferenceOracle for NdarrayOracle {
    fn name(&self) -> &'static str {
        "ndarray"
    }

    fn expected(&self, case: &MatmulCase) -> Result<Vec<f64>, HarnessError> {
        let lhs = to_matrix("lhs", case.lhs())?;
        let rhs = to_matrix("rhs", case.rhs())?;
        if lhs.ncols() != rhs.nrows() {
            return Err(HarnessError::Oracle(format!(
                "inner dimension mismatch lhs={:?} rhs={:?}",
                lhs.dim(),
                rhs.dim()
            )));
        }
        // `iter` walks logical order, which is row-major for a 2-D array.
        Ok(lhs.dot(&rhs).iter().copied().collect())
    }
}

fn to_matrix(label: &str, tensor: &TensorSpec) -> Result<Array2<f64>, HarnessError> {
    let (rows, cols) = tensor
        .matrix_dims()
        .map_err(|err| HarnessError::Oracle(format!("{label}: {err}")))?;
    Array2::from_shape_vec((rows, cols), tensor.data().to_vec())
        .map_err(|err| HarnessError::Oracle(format!("{label} reshape to ({rows}, {cols}): {err}")))
}
