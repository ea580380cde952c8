//! Targets and run configuration for both scan modes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisibilityError};
use crate::sampler::{GridLineSampler, SteppedLineSampler};

/// Sentinel written to output cells without a visible-height value.
pub const OUTPUT_NODATA: f32 = -9999.0;

/// Ray counts offered as quality levels for radial scans.
pub const RAY_QUALITY_PRESETS: [usize; 4] = [4096, 8192, 12288, 16384];

pub const DEFAULT_RADIAL_STEP: f64 = 24.0;
pub const DEFAULT_RAY_COUNT: usize = 8192;

/// What to do with nodata cells met along a line of sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NodataPolicy {
    /// Any nodata sample blocks the line; its result is nodata.
    #[default]
    Strict,
    /// Nodata samples are ignored.
    Lenient,
}

impl NodataPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            NodataPolicy::Strict
        } else {
            NodataPolicy::Lenient
        }
    }
}

/// Axis-aligned world-space rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_x, self.min_y),
            (self.min_x, self.max_y),
            (self.max_x, self.min_y),
            (self.max_x, self.max_y),
        ]
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.min_x > self.max_x {
            return Err(VisibilityError::invalid("bbox.min_x", self.min_x));
        }
        if self.min_y > self.max_y {
            return Err(VisibilityError::invalid("bbox.min_y", self.min_y));
        }
        Ok(())
    }
}

/// A vertically extended point structure and the observers looking at it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Target {
    pub x: f64,
    pub y: f64,
    /// Extent above the base cell's elevation.
    pub height: f64,
    /// Eye height added to every observer's ground elevation.
    pub observer_height: f64,
}

impl Target {
    pub fn new(x: f64, y: f64, height: f64) -> Self {
        Self {
            x,
            y,
            height,
            observer_height: 0.0,
        }
    }

    pub fn with_observer_height(mut self, observer_height: f64) -> Self {
        self.observer_height = observer_height;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err(VisibilityError::invalid("height", self.height));
        }
        if !(self.observer_height.is_finite() && self.observer_height >= 0.0) {
            return Err(VisibilityError::invalid(
                "observer_height",
                self.observer_height,
            ));
        }
        Ok(())
    }
}

/// How a scan is split across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dispatch {
    /// `None` uses the global rayon pool, `Some(1)` runs on the calling
    /// thread, `Some(n)` uses a dedicated pool of `n` threads.
    pub workers: Option<usize>,
    /// Partition size override: rows for full scans, rays for radial scans.
    pub chunk: Option<usize>,
}

impl Dispatch {
    pub fn sequential() -> Self {
        Self {
            workers: Some(1),
            chunk: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = Some(chunk);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(VisibilityError::invalid("workers", 0.0));
        }
        if self.chunk == Some(0) {
            return Err(VisibilityError::invalid("chunk", 0.0));
        }
        Ok(())
    }
}

/// Target-centred scan along a fan of rays.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RadialConfig {
    /// Maximum ray length in world units.
    pub radius: f64,
    /// Distance between consecutive samples on a ray.
    pub step: f64,
    /// Number of evenly spaced ray directions over the full circle.
    pub rays: usize,
    pub nodata: NodataPolicy,
    /// Observers farther than this see nothing. `None` or `<= 0` disables.
    pub max_distance: Option<f64>,
    /// Only cells whose centre lies inside this box receive values.
    pub clip: Option<BBox>,
    pub dispatch: Dispatch,
}

impl RadialConfig {
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            step: DEFAULT_RADIAL_STEP,
            rays: DEFAULT_RAY_COUNT,
            nodata: NodataPolicy::Strict,
            max_distance: None,
            clip: None,
            dispatch: Dispatch::default(),
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn with_rays(mut self, rays: usize) -> Self {
        self.rays = rays;
        self
    }

    pub fn with_nodata(mut self, nodata: NodataPolicy) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    pub fn with_clip(mut self, clip: BBox) -> Self {
        self.clip = Some(clip);
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Validate against a grid's pixel size and return the effective step.
    pub(crate) fn validate(&self, pixel_size: f64) -> Result<f64> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(VisibilityError::invalid("radius", self.radius));
        }
        if self.rays == 0 {
            return Err(VisibilityError::invalid("rays", 0.0));
        }
        if let Some(clip) = &self.clip {
            clip.validate()?;
        }
        self.dispatch.validate()?;
        validate_max_distance(self.max_distance)?;
        effective_step(self.step, pixel_size)
    }
}

/// Sampling used for each observer's line to the target in a full scan.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LineStrategy {
    /// Every grid cell crossed by the line (Bresenham).
    #[default]
    GridLine,
    /// Fixed-distance samples along the line.
    Stepped { step: f64 },
}

/// Observer-centred scan: one line per grid cell.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FullScanConfig {
    pub line: LineStrategy,
    pub nodata: NodataPolicy,
    /// Observers farther than this see nothing. `None` or `<= 0` disables.
    pub max_distance: Option<f64>,
    /// Observer cells whose centre lies outside this box are left nodata.
    pub clip: Option<BBox>,
    pub dispatch: Dispatch,
}

impl FullScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line(mut self, line: LineStrategy) -> Self {
        self.line = line;
        self
    }

    pub fn with_nodata(mut self, nodata: NodataPolicy) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    pub fn with_clip(mut self, clip: BBox) -> Self {
        self.clip = Some(clip);
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub(crate) fn validate(&self, pixel_size: f64) -> Result<ResolvedLine> {
        if let Some(clip) = &self.clip {
            clip.validate()?;
        }
        self.dispatch.validate()?;
        validate_max_distance(self.max_distance)?;
        Ok(match self.line {
            LineStrategy::GridLine => ResolvedLine::Grid(GridLineSampler),
            LineStrategy::Stepped { step } => ResolvedLine::Stepped(SteppedLineSampler {
                step: effective_step(step, pixel_size)?,
            }),
        })
    }
}

/// Line sampler chosen once per run.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ResolvedLine {
    Grid(GridLineSampler),
    Stepped(SteppedLineSampler),
}

/// Bbox-restricted radial scan at a finer resolution.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FineConfig {
    pub bbox: BBox,
    pub step: f64,
    pub rays: usize,
    /// Return the whole grid instead of the bbox-aligned window.
    pub full_extent: bool,
    pub nodata: NodataPolicy,
    pub dispatch: Dispatch,
}

impl FineConfig {
    pub fn new(bbox: BBox, step: f64, rays: usize) -> Self {
        Self {
            bbox,
            step,
            rays,
            full_extent: false,
            nodata: NodataPolicy::Strict,
            dispatch: Dispatch::default(),
        }
    }

    pub fn with_full_extent(mut self, full_extent: bool) -> Self {
        self.full_extent = full_extent;
        self
    }

    pub fn with_nodata(mut self, nodata: NodataPolicy) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }
}

fn validate_max_distance(max_distance: Option<f64>) -> Result<()> {
    match max_distance {
        Some(d) if d.is_nan() => Err(VisibilityError::invalid("max_distance", d)),
        _ => Ok(()),
    }
}

/// Positive cutoff distance, if one is active.
pub(crate) fn active_cutoff(max_distance: Option<f64>) -> Option<f64> {
    max_distance.filter(|d| *d > 0.0)
}

/// Reject non-positive steps and raise sub-pixel steps to one pixel.
pub(crate) fn effective_step(step: f64, pixel_size: f64) -> Result<f64> {
    if !(step.is_finite() && step > 0.0) {
        return Err(VisibilityError::invalid("step", step));
    }
    if step < pixel_size {
        log::warn!(
            "sample step {:.3} is below the pixel size, raised to {:.3}",
            step,
            pixel_size
        );
        return Ok(pixel_size);
    }
    Ok(step)
}

/// Ray count keeping adjacent rays at most one pixel apart at `radius`:
/// `ceil(2 * pi * radius / pixel_size)` snapped up to a quality preset.
pub fn suggest_ray_count(radius: f64, pixel_size: f64) -> Result<usize> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(VisibilityError::invalid("radius", radius));
    }
    if !(pixel_size.is_finite() && pixel_size > 0.0) {
        return Err(VisibilityError::invalid("pixel_size", pixel_size));
    }
    let raw = (std::f64::consts::TAU * radius / pixel_size).ceil() as usize;
    if let Some(&preset) = RAY_QUALITY_PRESETS.iter().find(|&&p| p >= raw) {
        return Ok(preset);
    }
    let largest = RAY_QUALITY_PRESETS[RAY_QUALITY_PRESETS.len() - 1];
    Ok(largest * raw.div_ceil(largest))
}

/// Default radial step: three pixels.
pub fn default_step_from_pixel(pixel_size: f64) -> Result<f64> {
    if !(pixel_size.is_finite() && pixel_size > 0.0) {
        return Err(VisibilityError::invalid("pixel_size", pixel_size));
    }
    Ok(3.0 * pixel_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_count_snaps_to_presets() {
        // 2 * pi * 5000 / 10 = 3141.6
        assert_eq!(suggest_ray_count(5_000.0, 10.0).unwrap(), 4096);
        // 2 * pi * 10000 / 8 = 7854
        assert_eq!(suggest_ray_count(10_000.0, 8.0).unwrap(), 8192);
        // 2 * pi * 20000 / 8 = 15708
        assert_eq!(suggest_ray_count(20_000.0, 8.0).unwrap(), 16384);
        // 2 * pi * 30000 / 8 = 23562 -> two blocks of 16384
        assert_eq!(suggest_ray_count(30_000.0, 8.0).unwrap(), 32768);
        assert!(suggest_ray_count(0.0, 8.0).is_err());
        assert!(suggest_ray_count(100.0, -1.0).is_err());
    }

    #[test]
    fn default_step_is_three_pixels() {
        assert_eq!(default_step_from_pixel(8.0).unwrap(), 24.0);
        assert!(default_step_from_pixel(0.0).is_err());
    }

    #[test]
    fn step_is_clamped_to_pixel_size() {
        assert_eq!(effective_step(2.0, 10.0).unwrap(), 10.0);
        assert_eq!(effective_step(25.0, 10.0).unwrap(), 25.0);
        assert!(effective_step(0.0, 10.0).is_err());
        assert!(effective_step(f64::NAN, 10.0).is_err());
    }

    #[test]
    fn target_rejects_bad_heights() {
        assert!(Target::new(0.0, 0.0, 0.0).validate().is_err());
        assert!(Target::new(0.0, 0.0, 50.0)
            .with_observer_height(-1.0)
            .validate()
            .is_err());
        assert!(Target::new(0.0, 0.0, 50.0)
            .with_observer_height(1.6)
            .validate()
            .is_ok());
    }

    #[test]
    fn radial_config_rejects_bad_values() {
        assert!(RadialConfig::new(0.0).validate(10.0).is_err());
        assert!(RadialConfig::new(100.0).with_rays(0).validate(10.0).is_err());
        assert!(RadialConfig::new(100.0).with_step(-5.0).validate(10.0).is_err());
        assert!(RadialConfig::new(100.0)
            .with_dispatch(Dispatch::default().with_workers(0))
            .validate(10.0)
            .is_err());
        assert_eq!(RadialConfig::new(100.0).with_step(5.0).validate(10.0).unwrap(), 10.0);
    }

    #[test]
    fn bbox_contains_its_edges() {
        let b = BBox::new(0.0, 0.0, 10.0, 5.0);
        assert!(b.contains(0.0, 5.0));
        assert!(!b.contains(10.1, 1.0));
        assert!(BBox::new(5.0, 0.0, 1.0, 1.0).validate().is_err());
    }

    #[test]
    fn cutoff_ignores_non_positive_values() {
        assert_eq!(active_cutoff(Some(0.0)), None);
        assert_eq!(active_cutoff(Some(150.0)), Some(150.0));
        assert_eq!(active_cutoff(None), None);
    }
}
