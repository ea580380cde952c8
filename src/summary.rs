//! Summary statistics over a visible-height grid.

use ndarray::{Array1, ArrayView2};
use ndarray_stats::{QuantileExt, SummaryStatisticsExt};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::OUTPUT_NODATA;

// Cells within this of the target height count as fully visible.
const FULL_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VisibilitySummary {
    /// Cells holding a value rather than the nodata sentinel.
    pub valid_cells: usize,
    /// Cells seeing some part of the target.
    pub visible_cells: usize,
    /// Cells seeing the whole target.
    pub fully_visible_cells: usize,
    pub max_visible: f32,
    /// Mean over valid cells.
    pub mean_visible: f32,
}

/// Summarise an output grid for a target of the given height.
pub fn summarize(values: ArrayView2<'_, f32>, height: f64) -> VisibilitySummary {
    let valid: Array1<f32> = values.iter().copied().filter(|&v| v != OUTPUT_NODATA).collect();
    if valid.is_empty() {
        return VisibilitySummary::default();
    }
    let full = height as f32 - FULL_TOLERANCE;
    VisibilitySummary {
        valid_cells: valid.len(),
        visible_cells: valid.iter().filter(|&&v| v > 0.0).count(),
        fully_visible_cells: valid.iter().filter(|&&v| v >= full).count(),
        max_visible: valid.max().copied().unwrap_or(0.0),
        mean_visible: SummaryStatisticsExt::mean(&valid).unwrap_or(0.0),
    }
}
