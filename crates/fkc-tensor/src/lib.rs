#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    ZeroDimension { axis: usize },
    Overflow,
    LengthMismatch { shape: Vec<usize>, expected: usize, actual: usize },
    RankMismatch { expected: usize, actual: usize },
    InnerDimensionMismatch { lhs: Vec<usize>, rhs: Vec<usize> },
}

impl std::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroDimension { axis } => write!(f, "dimension at axis {axis} must be > 0"),
            Self::Overflow => write!(f, "size arithmetic overflow"),
            Self::LengthMismatch {
                shape,
                expected,
                actual,
            } => write!(
                f,
                "data length mismatch for shape {shape:?}: expected={expected} actual={actual}"
            ),
            Self::RankMismatch { expected, actual } => {
                write!(f, "rank mismatch expected={expected} actual={actual}")
            }
            Self::InnerDimensionMismatch { lhs, rhs } => {
                write!(f, "inner dimension mismatch lhs={lhs:?} rhs={rhs:?}")
            }
        }
    }
}

impl std::error::Error for ShapeError {}

impl ShapeError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ZeroDimension { .. } => "tensor_zero_dimension",
            Self::Overflow => "tensor_size_overflow",
            Self::LengthMismatch { .. } => "tensor_length_mismatch",
            Self::RankMismatch { .. } => "tensor_rank_mismatch",
            Self::InnerDimensionMismatch { .. } => "tensor_inner_dimension_mismatch",
        }
    }
}

pub fn element_count(shape: &[usize]) -> Result<usize, ShapeError> {
    shape.iter().try_fold(1usize, |acc, &dim| {
        acc.checked_mul(dim).ok_or(ShapeError::Overflow)
    })
}

/// Rejects empty axes; every shape the harness produces is strictly positive.
pub fn validate_shape(shape: &[usize]) -> Result<usize, ShapeError> {
    if let Some(axis) = shape.iter().position(|&dim| dim == 0) {
        return Err(ShapeError::ZeroDimension { axis });
    }
    element_count(shape)
}

/// Output shape of a 2-D matrix product `[m, k] x [k, n] -> [m, n]`.
pub fn matmul_output_shape(lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>, ShapeError> {
    if lhs.len() != 2 {
        return Err(ShapeError::RankMismatch {
            expected: 2,
            actual: lhs.len(),
        });
    }
    if rhs.len() != 2 {
        return Err(ShapeError::RankMismatch {
            expected: 2,
            actual: rhs.len(),
        });
    }
    if lhs[1] != rhs[0] {
        return Err(ShapeError::InnerDimensionMismatch {
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        });
    }
    Ok(vec![lhs[0], rhs[1]])
}

/// Kernel selector understood by an engine's dispatch entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Matmul,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Matmul => "matmul",
        }
    }

    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Matmul => 2,
        }
    }

}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dense row-major tensor: a shape plus a flat `f64` buffer of matching length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensorSpec")]
pub struct TensorSpec {
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// Unchecked wire form; only reaches callers through `TensorSpec::new`.
#[derive(Deserialize)]
struct RawTensorSpec {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl TryFrom<RawTensorSpec> for TensorSpec {
    type Error = ShapeError;

    fn try_from(raw: RawTensorSpec) -> Result<Self, Self::Error> {
        Self::new(raw.shape, raw.data)
    }
}

impl TensorSpec {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, ShapeError> {
        let expected = validate_shape(&shape)?;
        if data.len() != expected {
            return Err(ShapeError::LengthMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn filled(shape: Vec<usize>, value: f64) -> Result<Self, ShapeError> {
        let count = validate_shape(&shape)?;
        Ok(Self {
            shape,
            data: vec![value; count],
        })
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// `(rows, cols)` for rank-2 tensors.
    pub fn matrix_dims(&self) -> Result<(usize, usize), ShapeError> {
        match self.shape.as_slice() {
            [rows, cols] => Ok((*rows, *cols)),
            other => Err(ShapeError::RankMismatch {
                expected: 2,
                actual: other.len(),
            }),
        }
    }
}
