//! Visible-height analysis over elevation grids.
//!
//! For a vertically extended target (a tower, a turbine) standing on a grid
//! cell, computes for every observer cell how many metres of the target rise
//! above the terrain horizon. Two scan modes are provided: a target-centred
//! radial scan ([`compute_radial_visibility`]) and an observer-centred full
//! scan ([`compute_full_scan_visibility`]).

#[cfg(feature = "python")]
use pyo3::prelude::*;

pub mod config;
pub mod dispatch;
pub mod error;
pub mod fullscan;
pub mod grid;
pub mod horizon;
pub mod mask;
#[cfg(feature = "python")]
mod python;
pub mod radial;
pub mod sampler;
pub mod summary;
pub mod visibility;
pub mod window;

pub use config::{
    default_step_from_pixel, suggest_ray_count, BBox, Dispatch, FineConfig, FullScanConfig, LineStrategy,
    NodataPolicy, RadialConfig, Target, OUTPUT_NODATA,
};
pub use dispatch::ScanProgress;
pub use error::{Result, VisibilityError};
pub use fullscan::compute_full_scan_visibility;
pub use grid::{ElevationGrid, GeoTransform, Nodata};
pub use mask::{minimal_covering_arc, normalize_angle, ray_mask_for_bbox, CoveringArc};
pub use radial::{compute_fine_visibility, compute_radial_visibility, FineOutput};
pub use summary::{summarize, VisibilitySummary};
pub use window::{aligned_bbox_window, GridWindow};

#[cfg(feature = "python")]
#[pymodule]
fn visheight(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    register_radial_module(py_module)?;
    register_fullscan_module(py_module)?;
    register_mask_module(py_module)?;
    py_module.add_class::<python::VisibilityRunner>()?;
    py_module.add("OUTPUT_NODATA", OUTPUT_NODATA)?;
    py_module.add("__doc__", "Visible-height viewshed analysis implemented in Rust.")?;
    Ok(())
}

#[cfg(feature = "python")]
fn register_radial_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "radial")?;
    submodule.add("__doc__", "Target-centred radial scans.")?;
    submodule.add_function(wrap_pyfunction!(python::compute_radial, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(python::compute_fine, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(python::suggest_ray_count, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(python::default_step_from_pixel, &submodule)?)?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}

#[cfg(feature = "python")]
fn register_fullscan_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "fullscan")?;
    submodule.add("__doc__", "Observer-centred full-grid scans.")?;
    submodule.add_function(wrap_pyfunction!(python::compute_full_scan, &submodule)?)?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}

#[cfg(feature = "python")]
fn register_mask_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "mask")?;
    submodule.add("__doc__", "Angular ray masks and bbox-aligned windows.")?;
    submodule.add_function(wrap_pyfunction!(python::ray_mask_for_bbox, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(python::aligned_bbox_window, &submodule)?)?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}
