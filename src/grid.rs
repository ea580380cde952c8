//! Read-only elevation grid with axis-aligned cell geometry.

use ndarray::{Array2, ArrayView2};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisibilityError};

/// Absolute tolerance used when matching a declared nodata sentinel.
pub const NODATA_TOLERANCE: f64 = 1e-6;

// Rotation/shear terms below this are treated as zero.
const ROTATION_EPSILON: f64 = 1e-9;

/// Affine cell-to-world transform in rasterio coefficient order:
/// `x = a * col + b * row + c`, `y = d * col + e * row + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    /// North-up transform with the top-left corner at `(origin_x, origin_y)`.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            a: pixel_width,
            b: 0.0,
            c: origin_x,
            d: 0.0,
            e: -pixel_height,
            f: origin_y,
        }
    }

    /// Build from a GDAL geotransform `[c, a, b, f, d, e]`.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            a: gt[1],
            b: gt[2],
            c: gt[0],
            d: gt[4],
            e: gt[5],
            f: gt[3],
        }
    }

    pub fn is_axis_aligned(&self) -> bool {
        self.b.abs() <= ROTATION_EPSILON && self.d.abs() <= ROTATION_EPSILON
    }

    /// World coordinates of a cell centre.
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.c + (col as f64 + 0.5) * self.a,
            self.f + (row as f64 + 0.5) * self.e,
        )
    }

    /// Nearest cell to a world point; may fall outside the grid.
    #[inline]
    pub fn world_to_cell(&self, x: f64, y: f64) -> (isize, isize) {
        let col = ((x - (self.c + 0.5 * self.a)) / self.a).round() as isize;
        let row = ((y - (self.f + 0.5 * self.e)) / self.e).round() as isize;
        (row, col)
    }

    /// The smaller of the two cell dimensions.
    pub fn pixel_size(&self) -> f64 {
        self.a.abs().min(self.e.abs())
    }

    /// Transform of a sub-window whose top-left cell is `(row_off, col_off)`.
    pub fn offset(&self, row_off: usize, col_off: usize) -> Self {
        Self {
            c: self.c + col_off as f64 * self.a,
            f: self.f + row_off as f64 * self.e,
            ..*self
        }
    }
}

/// How missing elevations are marked in the input grid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Nodata {
    /// Only NaN marks missing data.
    #[default]
    Nan,
    /// A sentinel value; NaN is still treated as missing.
    Value(f64),
}

impl Nodata {
    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            Some(v) if !v.is_nan() => Nodata::Value(v),
            _ => Nodata::Nan,
        }
    }

    #[inline]
    pub fn matches(&self, z: f64) -> bool {
        if z.is_nan() {
            return true;
        }
        match *self {
            Nodata::Nan => false,
            Nodata::Value(v) => (z - v).abs() <= NODATA_TOLERANCE,
        }
    }
}

/// Read-only view over an elevation grid.
///
/// The view borrows the samples, so one grid can be shared by every worker
/// of a scan without copying.
#[derive(Debug, Clone, Copy)]
pub struct ElevationGrid<'a> {
    values: ArrayView2<'a, f64>,
    transform: GeoTransform,
    nodata: Nodata,
}

impl<'a> ElevationGrid<'a> {
    pub fn new(values: ArrayView2<'a, f64>, transform: GeoTransform, nodata: Nodata) -> Result<Self> {
        if !transform.is_axis_aligned() {
            return Err(VisibilityError::RotatedGrid);
        }
        if !(transform.a.is_finite() && transform.e.is_finite())
            || transform.a == 0.0
            || transform.e == 0.0
        {
            return Err(VisibilityError::DegenerateGrid(format!(
                "pixel size ({}, {}) must be non-zero",
                transform.a, transform.e
            )));
        }
        if values.is_empty() {
            return Err(VisibilityError::DegenerateGrid(
                "grid has no cells".to_string(),
            ));
        }
        Ok(Self {
            values,
            transform,
            nodata,
        })
    }

    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn cols(&self) -> usize {
        self.values.ncols()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn nodata(&self) -> Nodata {
        self.nodata
    }

    pub fn values(&self) -> ArrayView2<'a, f64> {
        self.values
    }

    pub fn pixel_size(&self) -> f64 {
        self.transform.pixel_size()
    }

    #[inline]
    pub fn contains(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.rows() && (col as usize) < self.cols()
    }

    /// Elevation of a cell, `None` when it is nodata.
    #[inline]
    pub fn elevation(&self, row: usize, col: usize) -> Option<f64> {
        let z = self.values[[row, col]];
        if self.nodata.matches(z) {
            None
        } else {
            Some(z)
        }
    }

    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.cell_center(row, col)
    }

    /// In-grid cell nearest to a world point.
    #[inline]
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (row, col) = self.transform.world_to_cell(x, y);
        self.contains(row, col).then_some((row as usize, col as usize))
    }

    /// World distance between two cell centres.
    #[inline]
    pub fn center_distance(&self, from: (usize, usize), to: (usize, usize)) -> f64 {
        let (x0, y0) = self.cell_center(from.0, from.1);
        let (x1, y1) = self.cell_center(to.0, to.1);
        (x1 - x0).hypot(y1 - y0)
    }

    /// Resolve a target position to its cell and base elevation.
    pub fn locate_target(&self, x: f64, y: f64) -> Result<((usize, usize), f64)> {
        if !(x.is_finite() && y.is_finite()) {
            return Err(VisibilityError::TargetOutsideGrid { x, y });
        }
        let (row, col) = self
            .cell_at(x, y)
            .ok_or(VisibilityError::TargetOutsideGrid { x, y })?;
        let z_base = self
            .elevation(row, col)
            .ok_or(VisibilityError::TargetOnNodata { row, col })?;
        Ok(((row, col), z_base))
    }

    /// `true` where the input cell is nodata.
    pub fn nodata_mask(&self) -> Array2<bool> {
        let nodata = self.nodata;
        self.values.mapv(|z| nodata.matches(z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn transform() -> GeoTransform {
        GeoTransform::north_up(1000.0, 2000.0, 10.0, 10.0)
    }

    #[test]
    fn cell_center_round_trips_to_nearest_cell() {
        let t = transform();
        let (x, y) = t.cell_center(3, 7);
        assert_eq!((x, y), (1075.0, 1965.0));
        assert_eq!(t.world_to_cell(x, y), (3, 7));
        assert_eq!(t.world_to_cell(x + 4.9, y - 4.9), (3, 7));
        assert_eq!(t.world_to_cell(x + 5.1, y), (3, 8));
    }

    #[test]
    fn gdal_order_is_reordered() {
        let t = GeoTransform::from_gdal([1000.0, 10.0, 0.0, 2000.0, 0.0, -10.0]);
        assert_eq!(t, transform());
    }

    #[test]
    fn rotated_grid_is_rejected() {
        let dem = Array2::<f64>::zeros((3, 3));
        let t = GeoTransform { b: 0.5, ..transform() };
        let err = ElevationGrid::new(dem.view(), t, Nodata::Nan).unwrap_err();
        assert!(matches!(err, VisibilityError::RotatedGrid));
    }

    #[test]
    fn zero_pixel_size_is_rejected() {
        let dem = Array2::<f64>::zeros((3, 3));
        let t = GeoTransform { a: 0.0, ..transform() };
        assert!(ElevationGrid::new(dem.view(), t, Nodata::Nan).is_err());
    }

    #[test]
    fn sentinel_and_nan_are_both_nodata() {
        let nodata = Nodata::Value(-9999.0);
        assert!(nodata.matches(f64::NAN));
        assert!(nodata.matches(-9999.0000001));
        assert!(!nodata.matches(-9998.0));
        assert!(!Nodata::Nan.matches(-9999.0));
        assert_eq!(Nodata::from_option(Some(f64::NAN)), Nodata::Nan);
    }

    #[test]
    fn target_on_nodata_is_rejected() {
        let mut dem = Array2::<f64>::from_elem((3, 3), 5.0);
        dem[[1, 1]] = f64::NAN;
        let grid = ElevationGrid::new(dem.view(), transform(), Nodata::Nan).unwrap();
        let (x, y) = grid.cell_center(1, 1);
        assert!(matches!(
            grid.locate_target(x, y),
            Err(VisibilityError::TargetOnNodata { row: 1, col: 1 })
        ));
        assert!(matches!(
            grid.locate_target(0.0, 0.0),
            Err(VisibilityError::TargetOutsideGrid { .. })
        ));
        let (x, y) = grid.cell_center(0, 2);
        assert_eq!(grid.locate_target(x, y).unwrap(), ((0, 2), 5.0));
    }

    #[test]
    fn window_offset_moves_origin() {
        let t = transform().offset(2, 3);
        assert_eq!(t.cell_center(0, 0), transform().cell_center(2, 3));
    }
}
