//! Observer-centred full scan: one line of sight from every grid cell to the
//! target.

use std::ops::Range;
use std::time::Instant;

use ndarray::{s, Array2};

use crate::config::{active_cutoff, BBox, FullScanConfig, NodataPolicy, ResolvedLine, Target, OUTPUT_NODATA};
use crate::dispatch::{check_cancelled, row_partitions, run_partitions, ScanProgress};
use crate::error::Result;
use crate::grid::ElevationGrid;
use crate::horizon::HorizonTracker;
use crate::sampler::{LineSample, LineSampler};
use crate::summary::summarize;
use crate::visibility::TargetBand;

struct CellScan<'g, 'a, S> {
    grid: &'g ElevationGrid<'a>,
    sampler: S,
    target: (usize, usize),
    band: TargetBand,
    observer_height: f64,
    nodata: NodataPolicy,
    cutoff: Option<f64>,
    clip: Option<BBox>,
}

impl<S: LineSampler> CellScan<'_, '_, S> {
    fn visible_from(&self, row: usize, col: usize, samples: &mut Vec<LineSample>) -> f32 {
        if (row, col) == self.target {
            return self.band.height as f32;
        }
        let Some(z) = self.grid.elevation(row, col) else {
            return OUTPUT_NODATA;
        };
        if let Some(clip) = &self.clip {
            let (x, y) = self.grid.cell_center(row, col);
            if !clip.contains(x, y) {
                return OUTPUT_NODATA;
            }
        }
        let distance = self.grid.center_distance((row, col), self.target);
        if matches!(self.cutoff, Some(cutoff) if distance > cutoff) {
            return 0.0;
        }

        let eye = z + self.observer_height;
        self.sampler.sample_into(self.grid, (row, col), self.target, samples);
        let mut tracker = HorizonTracker::new(eye, self.nodata);
        for sample in samples.iter() {
            if !tracker.observe(self.grid.elevation(sample.row, sample.col), sample.distance) {
                break;
            }
        }
        self.band
            .visible_height(tracker.horizon(), eye, distance)
            .map_or(OUTPUT_NODATA, |v| v as f32)
    }

    fn scan_rows(&self, rows: Range<usize>, progress: Option<&ScanProgress>) -> Result<Array2<f32>> {
        let cols = self.grid.cols();
        let mut chunk = Array2::from_elem((rows.len(), cols), OUTPUT_NODATA);
        let mut samples = Vec::new();
        for (local, row) in rows.enumerate() {
            check_cancelled(progress)?;
            for col in 0..cols {
                chunk[[local, col]] = self.visible_from(row, col, &mut samples);
            }
            if let Some(p) = progress {
                p.advance(1);
            }
        }
        Ok(chunk)
    }
}

/// Visible height of the target from every cell of the grid.
///
/// Nodata cells, cells outside the configured clip and cells whose line is
/// blocked by strict nodata hold [`OUTPUT_NODATA`].
pub fn compute_full_scan_visibility(
    grid: &ElevationGrid<'_>,
    target: &Target,
    config: &FullScanConfig,
    progress: Option<&ScanProgress>,
) -> Result<Array2<f32>> {
    target.validate()?;
    let line = config.validate(grid.pixel_size())?;
    let (cell, z_base) = grid.locate_target(target.x, target.y)?;
    let band = TargetBand::new(z_base, target.height);

    match line {
        ResolvedLine::Grid(sampler) => run(grid, cell, band, target, config, sampler, progress),
        ResolvedLine::Stepped(sampler) => run(grid, cell, band, target, config, sampler, progress),
    }
}

fn run<S: LineSampler>(
    grid: &ElevationGrid<'_>,
    cell: (usize, usize),
    band: TargetBand,
    target: &Target,
    config: &FullScanConfig,
    sampler: S,
    progress: Option<&ScanProgress>,
) -> Result<Array2<f32>> {
    let scan = CellScan {
        grid,
        sampler,
        target: cell,
        band,
        observer_height: target.observer_height,
        nodata: config.nodata,
        cutoff: active_cutoff(config.max_distance),
        clip: config.clip,
    };

    let partitions = row_partitions(grid.rows(), &config.dispatch);
    log::info!("full scan: {}x{} grid, {:?} lines", grid.rows(), grid.cols(), config.line);
    log::debug!(
        "full scan: {} row partitions of up to {} rows",
        partitions.len(),
        partitions.first().map_or(0, |r| r.len())
    );
    if let Some(p) = progress {
        p.start(grid.rows());
    }
    let start = Instant::now();

    let chunks = run_partitions(&partitions, &config.dispatch, |rows| {
        scan.scan_rows(rows, progress)
    })?;

    let mut out = Array2::from_elem(grid.dim(), OUTPUT_NODATA);
    for (rows, chunk) in partitions.into_iter().zip(chunks) {
        out.slice_mut(s![rows, ..]).assign(&chunk?);
    }

    if log::log_enabled!(log::Level::Info) {
        let summary = summarize(out.view(), target.height);
        log::info!(
            "full scan finished in {:.2?}: {} cells valid, {} see the target, max {:.2}",
            start.elapsed(),
            summary.valid_cells,
            summary.visible_cells,
            summary.max_visible
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Dispatch, LineStrategy};
    use crate::error::VisibilityError;
    use crate::grid::{GeoTransform, Nodata};

    fn transform() -> GeoTransform {
        GeoTransform::north_up(0.0, 50.0, 10.0, 10.0)
    }

    fn target() -> Target {
        Target::new(25.0, 25.0, 50.0)
    }

    #[test]
    fn flat_terrain_sees_full_height() {
        let dem = Array2::from_elem((5, 5), 100.0);
        let grid = ElevationGrid::new(dem.view(), transform(), Nodata::Nan).unwrap();
        for line in [LineStrategy::GridLine, LineStrategy::Stepped { step: 10.0 }] {
            let cfg = FullScanConfig::new().with_line(line);
            let out = compute_full_scan_visibility(&grid, &target(), &cfg, None).unwrap();
            assert!(out.iter().all(|&v| v == 50.0), "{line:?}: {out:?}");
        }
    }

    #[test]
    fn ridge_and_bump_occlude_the_far_cell() {
        let mut dem = Array2::from_elem((5, 5), 100.0);
        dem[[2, 3]] = 200.0;
        let grid = ElevationGrid::new(dem.view(), transform(), Nodata::Nan).unwrap();
        let out = compute_full_scan_visibility(&grid, &target(), &FullScanConfig::new(), None).unwrap();
        assert_eq!(out[[2, 4]], 0.0);
        assert_eq!(out[[0, 4]], 50.0);

        dem[[2, 3]] = 110.0;
        let grid = ElevationGrid::new(dem.view(), transform(), Nodata::Nan).unwrap();
        let out = compute_full_scan_visibility(&grid, &target(), &FullScanConfig::new(), None).unwrap();
        assert!((out[[2, 4]] - 30.0).abs() < 1e-4);
    }

    #[test]
    fn nodata_on_the_line_follows_policy() {
        let mut dem = Array2::from_elem((5, 5), 100.0);
        dem[[2, 3]] = -32768.0;
        let grid = ElevationGrid::new(dem.view(), transform(), Nodata::Value(-32768.0)).unwrap();

        let strict = compute_full_scan_visibility(&grid, &target(), &FullScanConfig::new(), None).unwrap();
        assert_eq!(strict[[2, 3]], OUTPUT_NODATA);
        assert_eq!(strict[[2, 4]], OUTPUT_NODATA);

        let cfg = FullScanConfig::new().with_nodata(NodataPolicy::Lenient);
        let lenient = compute_full_scan_visibility(&grid, &target(), &cfg, None).unwrap();
        assert_eq!(lenient[[2, 3]], OUTPUT_NODATA);
        assert_eq!(lenient[[2, 4]], 50.0);
    }

    #[test]
    fn clip_and_cutoff() {
        let dem = Array2::from_elem((5, 5), 100.0);
        let grid = ElevationGrid::new(dem.view(), transform(), Nodata::Nan).unwrap();
        let cfg = FullScanConfig::new()
            .with_clip(BBox::new(0.0, 0.0, 30.0, 50.0))
            .with_max_distance(15.0);
        let out = compute_full_scan_visibility(&grid, &target(), &cfg, None).unwrap();
        assert_eq!(out[[2, 4]], OUTPUT_NODATA);
        assert_eq!(out[[2, 3]], OUTPUT_NODATA);
        assert_eq!(out[[2, 1]], 50.0);
        assert_eq!(out[[2, 0]], 0.0);
        assert_eq!(out[[2, 2]], 50.0);

        let outside = FullScanConfig::new().with_clip(BBox::new(40.0, 0.0, 50.0, 50.0));
        let out = compute_full_scan_visibility(&grid, &target(), &outside, None).unwrap();
        assert_eq!(out[[2, 2]], 50.0);
        assert_eq!(out[[2, 1]], OUTPUT_NODATA);
    }

    #[test]
    fn row_partitioning_does_not_change_output() {
        let dem = Array2::from_shape_fn((9, 7), |(r, c)| 100.0 + ((r * 7 + c * 3) % 11) as f64 * 4.0);
        let t = GeoTransform::north_up(0.0, 90.0, 10.0, 10.0);
        let grid = ElevationGrid::new(dem.view(), t, Nodata::Nan).unwrap();
        let target = Target::new(35.0, 45.0, 30.0).with_observer_height(1.5);

        let sequential = FullScanConfig::new().with_dispatch(Dispatch::sequential());
        let reference = compute_full_scan_visibility(&grid, &target, &sequential, None).unwrap();
        for dispatch in [
            Dispatch::default().with_workers(3).with_chunk(1),
            Dispatch::default().with_chunk(4),
            Dispatch::default(),
        ] {
            let cfg = FullScanConfig::new().with_dispatch(dispatch);
            let out = compute_full_scan_visibility(&grid, &target, &cfg, None).unwrap();
            assert_eq!(out, reference);
        }
    }

    #[test]
    fn progress_counts_rows() {
        let dem = Array2::from_elem((5, 5), 100.0);
        let grid = ElevationGrid::new(dem.view(), transform(), Nodata::Nan).unwrap();
        let progress = ScanProgress::new();
        compute_full_scan_visibility(&grid, &target(), &FullScanConfig::new(), Some(&progress)).unwrap();
        assert_eq!(progress.completed(), 5);
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn target_outside_grid_is_rejected() {
        let dem = Array2::from_elem((5, 5), 100.0);
        let grid = ElevationGrid::new(dem.view(), transform(), Nodata::Nan).unwrap();
        let err = compute_full_scan_visibility(&grid, &Target::new(500.0, 25.0, 50.0), &FullScanConfig::new(), None)
            .unwrap_err();
        assert!(matches!(err, VisibilityError::TargetOutsideGrid { .. }));
    }
}
