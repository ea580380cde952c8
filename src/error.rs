//! Error type and result alias for the visibility engine.
//!
//! Only configuration problems surface as errors. Per-line conditions
//! (nodata occlusion, out-of-bounds samples) are folded into the output grid.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VisibilityError>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum VisibilityError {
    #[error("target ({x}, {y}) lies outside the elevation grid")]
    TargetOutsideGrid { x: f64, y: f64 },

    #[error("target cell ({row}, {col}) is nodata")]
    TargetOnNodata { row: usize, col: usize },

    #[error("invalid parameter '{name}': {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("rotated or skewed grids are not supported")]
    RotatedGrid,

    #[error("degenerate grid: {0}")]
    DegenerateGrid(String),

    #[error("ray mask has {actual} entries, expected {expected}")]
    RayMaskLength { expected: usize, actual: usize },

    #[error("bounding box does not intersect the grid")]
    EmptyRegion,

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("visibility computation cancelled")]
    Cancelled,
}

impl VisibilityError {
    /// Shorthand for rejecting a numeric argument.
    pub(crate) fn invalid(name: &'static str, value: f64) -> Self {
        VisibilityError::InvalidParameter { name, value }
    }

    /// True for errors caused by the caller's inputs rather than the runtime.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            VisibilityError::TargetOutsideGrid { .. }
                | VisibilityError::TargetOnNodata { .. }
                | VisibilityError::InvalidParameter { .. }
                | VisibilityError::RotatedGrid
                | VisibilityError::DegenerateGrid(_)
                | VisibilityError::RayMaskLength { .. }
                | VisibilityError::EmptyRegion
        )
    }
}

#[cfg(feature = "python")]
impl From<VisibilityError> for pyo3::PyErr {
    fn from(err: VisibilityError) -> Self {
        match err {
            VisibilityError::Cancelled => {
                pyo3::exceptions::PyInterruptedError::new_err(err.to_string())
            }
            ref e if e.is_config() => pyo3::exceptions::PyValueError::new_err(err.to_string()),
            _ => pyo3::exceptions::PyRuntimeError::new_err(err.to_string()),
        }
    }
}
