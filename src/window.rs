//! Grid-aligned sub-windows covering a world-space bounding box.

use ndarray::{s, Array2, ArrayView2};

use crate::config::BBox;
use crate::grid::GeoTransform;

/// Rectangular block of cells: `rows x cols` starting at `(row_off, col_off)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

impl GridWindow {
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn view<'a, T>(&self, values: &'a Array2<T>) -> ArrayView2<'a, T> {
        values.slice(s![
            self.row_off..self.row_off + self.rows,
            self.col_off..self.col_off + self.cols
        ])
    }

    /// Owned copy of the window's cells.
    pub fn extract<T: Clone>(&self, values: &Array2<T>) -> Array2<T> {
        self.view(values).to_owned()
    }

    /// Transform placing the window's top-left cell correctly in world space.
    pub fn transform(&self, parent: &GeoTransform) -> GeoTransform {
        parent.offset(self.row_off, self.col_off)
    }
}

fn clamp_index(v: f64, max: usize) -> usize {
    if v <= 0.0 {
        0
    } else {
        (v as usize).min(max)
    }
}

/// Smallest window of whole cells touching `bbox`, clamped to the grid.
///
/// Works for either sign of the pixel height; an empty window means the box
/// misses the grid.
pub fn aligned_bbox_window(transform: &GeoTransform, rows: usize, cols: usize, bbox: &BBox) -> GridWindow {
    let c0 = (bbox.min_x - transform.c) / transform.a;
    let c1 = (bbox.max_x - transform.c) / transform.a;
    let r0 = (bbox.min_y - transform.f) / transform.e;
    let r1 = (bbox.max_y - transform.f) / transform.e;

    let col_off = clamp_index(c0.min(c1).floor(), cols);
    let col_end = clamp_index(c0.max(c1).ceil(), cols);
    let row_off = clamp_index(r0.min(r1).floor(), rows);
    let row_end = clamp_index(r0.max(r1).ceil(), rows);

    GridWindow {
        row_off,
        col_off,
        rows: row_end.saturating_sub(row_off),
        cols: col_end.saturating_sub(col_off),
    }
}
