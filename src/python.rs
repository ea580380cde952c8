//! Python bindings.
//!
//! Arrays are copied into owned buffers so the scans can run with the GIL
//! released. Affine transforms are passed as `(a, b, c, d, e, f)` tuples in
//! rasterio order; bounding boxes as `(min_x, min_y, max_x, max_y)`.

use std::sync::Arc;

use ndarray::Array2;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::prelude::*;

use crate::config::{
    self, BBox, Dispatch, FineConfig, FullScanConfig, LineStrategy, NodataPolicy, RadialConfig, Target,
};
use crate::dispatch::ScanProgress;
use crate::error::Result;
use crate::fullscan::compute_full_scan_visibility;
use crate::grid::{ElevationGrid, GeoTransform, Nodata};
use crate::mask;
use crate::radial::{compute_fine_visibility, compute_radial_visibility};
use crate::window;

type TransformTuple = (f64, f64, f64, f64, f64, f64);
type BBoxTuple = (f64, f64, f64, f64);
type WindowTuple = (usize, usize, usize, usize);

fn to_transform(t: TransformTuple) -> GeoTransform {
    GeoTransform {
        a: t.0,
        b: t.1,
        c: t.2,
        d: t.3,
        e: t.4,
        f: t.5,
    }
}

fn from_transform(t: &GeoTransform) -> TransformTuple {
    (t.a, t.b, t.c, t.d, t.e, t.f)
}

fn to_bbox(b: BBoxTuple) -> BBox {
    BBox::new(b.0, b.1, b.2, b.3)
}

fn dispatch(workers: Option<usize>, chunk: Option<usize>) -> Dispatch {
    Dispatch { workers, chunk }
}

/// Radial scan parameters as received from Python.
struct RadialArgs {
    target: Target,
    config: RadialConfig,
    ray_mask: Option<Vec<bool>>,
}

/// Full-scan parameters as received from Python.
struct FullScanArgs {
    target: Target,
    config: FullScanConfig,
}

fn run_radial(
    dem: Array2<f64>,
    transform: TransformTuple,
    nodata: Option<f64>,
    args: RadialArgs,
    progress: Option<&ScanProgress>,
) -> Result<Array2<f32>> {
    let grid = ElevationGrid::new(dem.view(), to_transform(transform), Nodata::from_option(nodata))?;
    compute_radial_visibility(&grid, &args.target, &args.config, args.ray_mask.as_deref(), progress)
}

fn run_full_scan(
    dem: Array2<f64>,
    transform: TransformTuple,
    nodata: Option<f64>,
    args: FullScanArgs,
    progress: Option<&ScanProgress>,
) -> Result<Array2<f32>> {
    let grid = ElevationGrid::new(dem.view(), to_transform(transform), Nodata::from_option(nodata))?;
    compute_full_scan_visibility(&grid, &args.target, &args.config, progress)
}

#[allow(clippy::too_many_arguments)]
fn radial_args(
    target_x: f64,
    target_y: f64,
    target_height: f64,
    observer_height: f64,
    radius: f64,
    step: f64,
    rays: usize,
    strict_nodata: bool,
    max_distance: Option<f64>,
    clip: Option<BBoxTuple>,
    ray_mask: Option<Vec<bool>>,
    workers: Option<usize>,
) -> RadialArgs {
    let mut config = RadialConfig::new(radius)
        .with_step(step)
        .with_rays(rays)
        .with_nodata(NodataPolicy::from_strict(strict_nodata))
        .with_dispatch(dispatch(workers, None));
    config.max_distance = max_distance;
    config.clip = clip.map(to_bbox);
    RadialArgs {
        target: Target::new(target_x, target_y, target_height).with_observer_height(observer_height),
        config,
        ray_mask,
    }
}

#[allow(clippy::too_many_arguments)]
fn full_scan_args(
    target_x: f64,
    target_y: f64,
    target_height: f64,
    observer_height: f64,
    strict_nodata: bool,
    sample_step: Option<f64>,
    max_distance: Option<f64>,
    clip: Option<BBoxTuple>,
    workers: Option<usize>,
    chunk: Option<usize>,
) -> FullScanArgs {
    let line = match sample_step {
        Some(step) => LineStrategy::Stepped { step },
        None => LineStrategy::GridLine,
    };
    let mut config = FullScanConfig::new()
        .with_line(line)
        .with_nodata(NodataPolicy::from_strict(strict_nodata))
        .with_dispatch(dispatch(workers, chunk));
    config.max_distance = max_distance;
    config.clip = clip.map(to_bbox);
    FullScanArgs {
        target: Target::new(target_x, target_y, target_height).with_observer_height(observer_height),
        config,
    }
}

/// Radial visible-height scan around a target.
#[pyfunction]
#[pyo3(signature = (
    dem, transform, nodata, target_x, target_y, target_height,
    observer_height=0.0, radius=10_000.0, step=config::DEFAULT_RADIAL_STEP,
    rays=config::DEFAULT_RAY_COUNT, strict_nodata=true, max_distance=None,
    clip=None, ray_mask=None, workers=None
))]
#[allow(clippy::too_many_arguments)]
pub fn compute_radial(
    py: Python<'_>,
    dem: PyReadonlyArray2<f64>,
    transform: TransformTuple,
    nodata: Option<f64>,
    target_x: f64,
    target_y: f64,
    target_height: f64,
    observer_height: f64,
    radius: f64,
    step: f64,
    rays: usize,
    strict_nodata: bool,
    max_distance: Option<f64>,
    clip: Option<BBoxTuple>,
    ray_mask: Option<Vec<bool>>,
    workers: Option<usize>,
) -> PyResult<Py<PyArray2<f32>>> {
    let args = radial_args(
        target_x,
        target_y,
        target_height,
        observer_height,
        radius,
        step,
        rays,
        strict_nodata,
        max_distance,
        clip,
        ray_mask,
        workers,
    );
    let dem_owned = dem.as_array().to_owned();
    let out = py.allow_threads(|| run_radial(dem_owned, transform, nodata, args, None))?;
    Ok(out.into_pyarray(py).unbind())
}

/// Radial scan restricted to a bounding box.
///
/// Returns `(values, transform, window)`; `window` is `None` when
/// `full_extent` is set.
#[pyfunction]
#[pyo3(signature = (
    dem, transform, nodata, target_x, target_y, target_height, bbox,
    observer_height=0.0, step=config::DEFAULT_RADIAL_STEP,
    rays=config::DEFAULT_RAY_COUNT, strict_nodata=true, full_extent=false, workers=None
))]
#[allow(clippy::too_many_arguments)]
pub fn compute_fine(
    py: Python<'_>,
    dem: PyReadonlyArray2<f64>,
    transform: TransformTuple,
    nodata: Option<f64>,
    target_x: f64,
    target_y: f64,
    target_height: f64,
    bbox: BBoxTuple,
    observer_height: f64,
    step: f64,
    rays: usize,
    strict_nodata: bool,
    full_extent: bool,
    workers: Option<usize>,
) -> PyResult<(Py<PyArray2<f32>>, TransformTuple, Option<WindowTuple>)> {
    let target = Target::new(target_x, target_y, target_height).with_observer_height(observer_height);
    let fine = FineConfig::new(to_bbox(bbox), step, rays)
        .with_full_extent(full_extent)
        .with_nodata(NodataPolicy::from_strict(strict_nodata))
        .with_dispatch(dispatch(workers, None));
    let dem_owned = dem.as_array().to_owned();
    let result = py.allow_threads(|| {
        let grid = ElevationGrid::new(dem_owned.view(), to_transform(transform), Nodata::from_option(nodata))?;
        compute_fine_visibility(&grid, &target, &fine, None)
    })?;
    let window = result.window.map(|w| (w.row_off, w.col_off, w.rows, w.cols));
    Ok((
        result.values.into_pyarray(py).unbind(),
        from_transform(&result.transform),
        window,
    ))
}

#[pyfunction]
pub fn suggest_ray_count(radius: f64, pixel_size: f64) -> PyResult<usize> {
    Ok(config::suggest_ray_count(radius, pixel_size)?)
}

#[pyfunction]
pub fn default_step_from_pixel(pixel_size: f64) -> PyResult<f64> {
    Ok(config::default_step_from_pixel(pixel_size)?)
}

/// Visible height of the target from every grid cell.
///
/// `sample_step=None` walks the grid cells crossed by each line; a value
/// samples the line at that spacing instead.
#[pyfunction]
#[pyo3(signature = (
    dem, transform, nodata, target_x, target_y, target_height,
    observer_height=0.0, strict_nodata=true, sample_step=None,
    max_distance=None, clip=None, workers=None, chunk=None
))]
#[allow(clippy::too_many_arguments)]
pub fn compute_full_scan(
    py: Python<'_>,
    dem: PyReadonlyArray2<f64>,
    transform: TransformTuple,
    nodata: Option<f64>,
    target_x: f64,
    target_y: f64,
    target_height: f64,
    observer_height: f64,
    strict_nodata: bool,
    sample_step: Option<f64>,
    max_distance: Option<f64>,
    clip: Option<BBoxTuple>,
    workers: Option<usize>,
    chunk: Option<usize>,
) -> PyResult<Py<PyArray2<f32>>> {
    let args = full_scan_args(
        target_x,
        target_y,
        target_height,
        observer_height,
        strict_nodata,
        sample_step,
        max_distance,
        clip,
        workers,
        chunk,
    );
    let dem_owned = dem.as_array().to_owned();
    let out = py.allow_threads(|| run_full_scan(dem_owned, transform, nodata, args, None))?;
    Ok(out.into_pyarray(py).unbind())
}

/// Per-ray inclusion flags for rays from `(origin_x, origin_y)` that can
/// reach `bbox`.
#[pyfunction]
pub fn ray_mask_for_bbox(origin_x: f64, origin_y: f64, bbox: BBoxTuple, rays: usize) -> PyResult<Vec<bool>> {
    Ok(mask::ray_mask_for_bbox((origin_x, origin_y), &to_bbox(bbox), rays)?)
}

/// `(row_off, col_off, rows, cols)` of the cells touching `bbox`.
#[pyfunction]
pub fn aligned_bbox_window(transform: TransformTuple, rows: usize, cols: usize, bbox: BBoxTuple) -> WindowTuple {
    let w = window::aligned_bbox_window(&to_transform(transform), rows, cols, &to_bbox(bbox));
    (w.row_off, w.col_off, w.rows, w.cols)
}

/// Runner exposing pollable `progress()` and `cancel()` while a scan runs on
/// another Python thread.
#[pyclass]
pub struct VisibilityRunner {
    progress: Arc<ScanProgress>,
}

impl Default for VisibilityRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[pymethods]
impl VisibilityRunner {
    #[new]
    pub fn new() -> Self {
        Self {
            progress: Arc::new(ScanProgress::new()),
        }
    }

    /// Completed fraction of the current or last scan.
    pub fn progress(&self) -> f64 {
        self.progress.fraction()
    }

    pub fn cancel(&self) {
        self.progress.cancel();
    }

    #[pyo3(signature = (
        dem, transform, nodata, target_x, target_y, target_height,
        observer_height=0.0, radius=10_000.0, step=config::DEFAULT_RADIAL_STEP,
        rays=config::DEFAULT_RAY_COUNT, strict_nodata=true, max_distance=None,
        clip=None, ray_mask=None, workers=None
    ))]
    #[allow(clippy::too_many_arguments)]
    pub fn radial(
        &self,
        py: Python<'_>,
        dem: PyReadonlyArray2<f64>,
        transform: TransformTuple,
        nodata: Option<f64>,
        target_x: f64,
        target_y: f64,
        target_height: f64,
        observer_height: f64,
        radius: f64,
        step: f64,
        rays: usize,
        strict_nodata: bool,
        max_distance: Option<f64>,
        clip: Option<BBoxTuple>,
        ray_mask: Option<Vec<bool>>,
        workers: Option<usize>,
    ) -> PyResult<Py<PyArray2<f32>>> {
        let args = radial_args(
            target_x,
            target_y,
            target_height,
            observer_height,
            radius,
            step,
            rays,
            strict_nodata,
            max_distance,
            clip,
            ray_mask,
            workers,
        );
        self.progress.reset();
        let dem_owned = dem.as_array().to_owned();
        let progress = self.progress.clone();
        let out = py.allow_threads(|| run_radial(dem_owned, transform, nodata, args, Some(&progress)))?;
        Ok(out.into_pyarray(py).unbind())
    }

    #[pyo3(signature = (
        dem, transform, nodata, target_x, target_y, target_height,
        observer_height=0.0, strict_nodata=true, sample_step=None,
        max_distance=None, clip=None, workers=None, chunk=None
    ))]
    #[allow(clippy::too_many_arguments)]
    pub fn full_scan(
        &self,
        py: Python<'_>,
        dem: PyReadonlyArray2<f64>,
        transform: TransformTuple,
        nodata: Option<f64>,
        target_x: f64,
        target_y: f64,
        target_height: f64,
        observer_height: f64,
        strict_nodata: bool,
        sample_step: Option<f64>,
        max_distance: Option<f64>,
        clip: Option<BBoxTuple>,
        workers: Option<usize>,
        chunk: Option<usize>,
    ) -> PyResult<Py<PyArray2<f32>>> {
        let args = full_scan_args(
            target_x,
            target_y,
            target_height,
            observer_height,
            strict_nodata,
            sample_step,
            max_distance,
            clip,
            workers,
            chunk,
        );
        self.progress.reset();
        let dem_owned = dem.as_array().to_owned();
        let progress = self.progress.clone();
        let out = py.allow_threads(|| run_full_scan(dem_owned, transform, nodata, args, Some(&progress)))?;
        Ok(out.into_pyarray(py).unbind())
    }
}
