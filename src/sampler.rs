//! Line sampling between an origin cell and a destination.
//!
//! Every sampler yields cells in strictly increasing distance from the line's
//! origin and never yields the same cell twice. Grid cells are convex, so a
//! straight line that leaves a cell never re-enters it; comparing against the
//! last emitted cell is enough to deduplicate.

use crate::grid::ElevationGrid;

/// One sampled cell and its distance from the line's origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSample {
    pub row: usize,
    pub col: usize,
    pub distance: f64,
}

// Slack on the radius comparison so `radius` itself is sampled despite
// accumulated rounding in `k * step`.
const RADIUS_SLACK: f64 = 1e-9;

/// Fixed-step samples along direction `theta` (radians, counter-clockwise
/// from world +x) starting one step away from `origin`.
///
/// Stops at the first point that falls outside the grid.
pub struct PolarRay<'g, 'a> {
    grid: &'g ElevationGrid<'a>,
    origin: (usize, usize),
    x0: f64,
    y0: f64,
    cos_t: f64,
    sin_t: f64,
    step: f64,
    radius: f64,
    k: u64,
    last: Option<(usize, usize)>,
    done: bool,
}

impl<'g, 'a> PolarRay<'g, 'a> {
    pub fn new(
        grid: &'g ElevationGrid<'a>,
        origin: (usize, usize),
        theta: f64,
        radius: f64,
        step: f64,
    ) -> Self {
        let (x0, y0) = grid.cell_center(origin.0, origin.1);
        Self {
            grid,
            origin,
            x0,
            y0,
            cos_t: theta.cos(),
            sin_t: theta.sin(),
            step,
            radius,
            k: 0,
            last: None,
            done: false,
        }
    }
}

impl Iterator for PolarRay<'_, '_> {
    type Item = LineSample;

    fn next(&mut self) -> Option<LineSample> {
        while !self.done {
            self.k += 1;
            // Multiply rather than accumulate so long rays do not drift.
            let d = self.k as f64 * self.step;
            if d > self.radius + RADIUS_SLACK {
                self.done = true;
                break;
            }
            let x = self.x0 + d * self.cos_t;
            let y = self.y0 + d * self.sin_t;
            let Some(cell) = self.grid.cell_at(x, y) else {
                self.done = true;
                break;
            };
            if cell == self.origin || Some(cell) == self.last {
                continue;
            }
            self.last = Some(cell);
            return Some(LineSample {
                row: cell.0,
                col: cell.1,
                distance: d,
            });
        }
        None
    }
}

/// Integer cells on the segment between two cells, both endpoints included
/// (Bresenham's incremental-error traversal).
#[derive(Debug, Clone)]
pub struct GridLine {
    r: isize,
    c: isize,
    r1: isize,
    c1: isize,
    dr: isize,
    dc: isize,
    sr: isize,
    sc: isize,
    err: isize,
    col_major: bool,
    finished: bool,
}

impl GridLine {
    pub fn new(from: (usize, usize), to: (usize, usize)) -> Self {
        let (r0, c0) = (from.0 as isize, from.1 as isize);
        let (r1, c1) = (to.0 as isize, to.1 as isize);
        let dr = (r1 - r0).abs();
        let dc = (c1 - c0).abs();
        let col_major = dc > dr;
        Self {
            r: r0,
            c: c0,
            r1,
            c1,
            dr,
            dc,
            sr: if r0 < r1 { 1 } else { -1 },
            sc: if c0 < c1 { 1 } else { -1 },
            err: if col_major { dc / 2 } else { dr / 2 },
            col_major,
            finished: false,
        }
    }
}

impl Iterator for GridLine {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        if self.finished {
            return None;
        }
        let current = (self.r as usize, self.c as usize);
        if self.col_major {
            if self.c == self.c1 {
                self.finished = true;
                return Some((self.r1 as usize, self.c1 as usize));
            }
            self.err -= self.dr;
            if self.err < 0 {
                self.r += self.sr;
                self.err += self.dc;
            }
            self.c += self.sc;
        } else {
            if self.r == self.r1 {
                self.finished = true;
                return Some((self.r1 as usize, self.c1 as usize));
            }
            self.err -= self.dc;
            if self.err < 0 {
                self.c += self.sc;
                self.err += self.dr;
            }
            self.r += self.sr;
        }
        Some(current)
    }
}

/// Strategy for sampling the cells between an observer and the target.
pub trait LineSampler: Sync {
    /// Replace `out` with the intermediate samples between `observer` and
    /// `target`, ordered by distance from `observer`. Endpoints are excluded.
    fn sample_into(
        &self,
        grid: &ElevationGrid<'_>,
        observer: (usize, usize),
        target: (usize, usize),
        out: &mut Vec<LineSample>,
    );
}

/// Bresenham traversal; distances are measured between cell centres.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridLineSampler;

impl LineSampler for GridLineSampler {
    fn sample_into(
        &self,
        grid: &ElevationGrid<'_>,
        observer: (usize, usize),
        target: (usize, usize),
        out: &mut Vec<LineSample>,
    ) {
        out.clear();
        for cell in GridLine::new(observer, target) {
            if cell == observer || cell == target {
                continue;
            }
            out.push(LineSample {
                row: cell.0,
                col: cell.1,
                distance: grid.center_distance(observer, cell),
            });
        }
    }
}

/// Fixed-distance samples along the observer-to-target segment, each mapped
/// to its nearest cell. Samples falling outside the grid are skipped.
#[derive(Debug, Clone, Copy)]
pub struct SteppedLineSampler {
    pub step: f64,
}

impl LineSampler for SteppedLineSampler {
    fn sample_into(
        &self,
        grid: &ElevationGrid<'_>,
        observer: (usize, usize),
        target: (usize, usize),
        out: &mut Vec<LineSample>,
    ) {
        out.clear();
        let (xo, yo) = grid.cell_center(observer.0, observer.1);
        let (xt, yt) = grid.cell_center(target.0, target.1);
        let (dx, dy) = (xt - xo, yt - yo);
        let total = dx.hypot(dy);
        if total <= 0.0 {
            return;
        }
        let n_steps = (total / self.step) as usize;
        let mut last = None;
        for s in 1..=n_steps {
            let t = s as f64 * self.step;
            if t >= total {
                break;
            }
            let ratio = t / total;
            let Some(cell) = grid.cell_at(xo + dx * ratio, yo + dy * ratio) else {
                continue;
            };
            if cell == observer || cell == target || Some(cell) == last {
                continue;
            }
            last = Some(cell);
            out.push(LineSample {
                row: cell.0,
                col: cell.1,
                distance: t,
            });
        }
    }
}
