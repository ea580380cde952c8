//! Target-centred radial scan and the bbox-restricted fine workflow.
//!
//! Rays leave the target cell at `K` evenly spaced directions. Every valid
//! sample on a ray acts as an observer looking back at the target; the
//! samples between it and the target are the terrain in the way.

use std::time::Instant;

use ndarray::Array2;

use crate::config::{active_cutoff, BBox, FineConfig, NodataPolicy, RadialConfig, Target, OUTPUT_NODATA};
use crate::dispatch::{check_cancelled, fold_partitions, merge_max, ray_partitions, ScanProgress};
use crate::error::{Result, VisibilityError};
use crate::grid::{ElevationGrid, GeoTransform};
use crate::horizon::HorizonTracker;
use crate::mask::{ray_angle, ray_mask_for_bbox};
use crate::sampler::PolarRay;
use crate::summary::summarize;
use crate::visibility::TargetBand;
use crate::window::{aligned_bbox_window, GridWindow};

// A valid sample on a ray.
#[derive(Debug, Clone, Copy)]
struct RaySample {
    row: usize,
    col: usize,
    distance: f64,
    elevation: f64,
}

struct RayContext<'g, 'a> {
    grid: &'g ElevationGrid<'a>,
    origin: (usize, usize),
    band: TargetBand,
    observer_height: f64,
    radius: f64,
    step: f64,
    rays: usize,
    nodata: NodataPolicy,
    cutoff: Option<f64>,
    clip: Option<BBox>,
}

impl RayContext<'_, '_> {
    /// Walk ray `k` and write every observer's visible height into `out`.
    fn trace(&self, k: usize, samples: &mut Vec<RaySample>, out: &mut Array2<f32>) {
        samples.clear();
        let theta = ray_angle(k, self.rays);
        for s in PolarRay::new(self.grid, self.origin, theta, self.radius, self.step) {
            match self.grid.elevation(s.row, s.col) {
                Some(elevation) => samples.push(RaySample {
                    row: s.row,
                    col: s.col,
                    distance: s.distance,
                    elevation,
                }),
                // Everything past a gap stays nodata.
                None if self.nodata == NodataPolicy::Strict => break,
                None => {}
            }
        }

        for (j, obs) in samples.iter().enumerate() {
            if let Some(clip) = &self.clip {
                let (x, y) = self.grid.cell_center(obs.row, obs.col);
                if !clip.contains(x, y) {
                    continue;
                }
            }
            let visible = match self.cutoff {
                Some(cutoff) if obs.distance > cutoff => 0.0,
                _ => {
                    let eye = obs.elevation + self.observer_height;
                    let mut tracker = HorizonTracker::new(eye, self.nodata);
                    for between in samples[..j].iter().rev() {
                        tracker.observe(Some(between.elevation), obs.distance - between.distance);
                    }
                    match self.band.visible_height(tracker.horizon(), eye, obs.distance) {
                        Some(v) => v,
                        None => continue,
                    }
                }
            };
            let cell = &mut out[[obs.row, obs.col]];
            let visible = visible as f32;
            if visible > *cell {
                *cell = visible;
            }
        }
    }
}

/// Visible height of the target from every cell reached by the ray fan.
///
/// `ray_mask`, when given, must hold one flag per ray; rays marked `false`
/// are skipped. Cells never reached, and nodata cells, hold
/// [`OUTPUT_NODATA`]. The target cell holds the full target height.
pub fn compute_radial_visibility(
    grid: &ElevationGrid<'_>,
    target: &Target,
    config: &RadialConfig,
    ray_mask: Option<&[bool]>,
    progress: Option<&ScanProgress>,
) -> Result<Array2<f32>> {
    target.validate()?;
    let step = config.validate(grid.pixel_size())?;
    if let Some(mask) = ray_mask {
        if mask.len() != config.rays {
            return Err(VisibilityError::RayMaskLength {
                expected: config.rays,
                actual: mask.len(),
            });
        }
    }
    let (origin, z_base) = grid.locate_target(target.x, target.y)?;

    let active: Vec<usize> = match ray_mask {
        Some(mask) => (0..config.rays).filter(|&k| mask[k]).collect(),
        None => (0..config.rays).collect(),
    };
    let ctx = RayContext {
        grid,
        origin,
        band: TargetBand::new(z_base, target.height),
        observer_height: target.observer_height,
        radius: config.radius,
        step,
        rays: config.rays,
        nodata: config.nodata,
        cutoff: active_cutoff(config.max_distance),
        clip: config.clip,
    };

    let partitions = ray_partitions(active.len(), &config.dispatch);
    log::info!(
        "radial scan: {}x{} grid, {} of {} rays, radius {:.1}, step {:.2}",
        grid.rows(),
        grid.cols(),
        active.len(),
        config.rays,
        config.radius,
        step
    );
    log::debug!(
        "radial scan: {} ray partitions of up to {} rays",
        partitions.len(),
        partitions.first().map_or(0, |r| r.len())
    );
    if let Some(p) = progress {
        p.start(active.len());
    }
    let start = Instant::now();

    let mut out = fold_partitions(
        &partitions,
        &config.dispatch,
        || -> Result<Array2<f32>> { Ok(Array2::from_elem(grid.dim(), OUTPUT_NODATA)) },
        |acc, range| {
            let mut out = acc?;
            let mut samples = Vec::new();
            for &k in &active[range] {
                check_cancelled(progress)?;
                ctx.trace(k, &mut samples, &mut out);
                if let Some(p) = progress {
                    p.advance(1);
                }
            }
            Ok(out)
        },
        |left, right| {
            let mut left = left?;
            merge_max(left.view_mut(), right?.view());
            Ok(left)
        },
    )??;
    out[origin] = target.height as f32;

    if log::log_enabled!(log::Level::Info) {
        let summary = summarize(out.view(), target.height);
        log::info!(
            "radial scan finished in {:.2?}: {} cells valid, {} see the target, max {:.2}",
            start.elapsed(),
            summary.valid_cells,
            summary.visible_cells,
            summary.max_visible
        );
    }
    Ok(out)
}

/// Result of [`compute_fine_visibility`].
#[derive(Debug, Clone)]
pub struct FineOutput {
    pub values: Array2<f32>,
    /// Window of the input grid the values cover; `None` for full extent.
    pub window: Option<GridWindow>,
    /// Transform matching `values`.
    pub transform: GeoTransform,
}

/// Radial scan limited to a region of interest.
///
/// Only rays that can reach the box are cast, the radius reaches the box's
/// farthest corner, and only cells inside the box receive values.
pub fn compute_fine_visibility(
    grid: &ElevationGrid<'_>,
    target: &Target,
    config: &FineConfig,
    progress: Option<&ScanProgress>,
) -> Result<FineOutput> {
    config.bbox.validate()?;
    let window = aligned_bbox_window(grid.transform(), grid.rows(), grid.cols(), &config.bbox);
    if window.is_empty() {
        return Err(VisibilityError::EmptyRegion);
    }
    let (origin, _) = grid.locate_target(target.x, target.y)?;
    let center = grid.cell_center(origin.0, origin.1);

    let radius = config
        .bbox
        .corners()
        .iter()
        .map(|&(x, y)| (x - center.0).hypot(y - center.1))
        .fold(grid.pixel_size(), f64::max);
    let mask = ray_mask_for_bbox(center, &config.bbox, config.rays)?;
    log::debug!(
        "fine scan: window {:?}, radius {:.1}, {} rays active",
        window,
        radius,
        mask.iter().filter(|&&m| m).count()
    );

    let radial = RadialConfig::new(radius)
        .with_step(config.step)
        .with_rays(config.rays)
        .with_nodata(config.nodata)
        .with_clip(config.bbox)
        .with_dispatch(config.dispatch);
    let values = compute_radial_visibility(grid, target, &radial, Some(mask.as_slice()), progress)?;

    if config.full_extent {
        return Ok(FineOutput {
            values,
            window: None,
            transform: *grid.transform(),
        });
    }
    Ok(FineOutput {
        values: window.extract(&values),
        window: Some(window),
        transform: window.transform(grid.transform()),
    })
}
