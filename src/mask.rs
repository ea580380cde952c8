//! Angular masks restricting a radial scan to the rays that can reach a
//! region of interest.
//!
//! Angles are radians in `[0, 2*pi)`, counter-clockwise from world +x, the
//! same convention used to cast rays.

use std::f64::consts::TAU;

use crate::config::BBox;
use crate::error::{Result, VisibilityError};

/// Contiguous arc running counter-clockwise from `start` to `end`.
///
/// When `start > end` the arc crosses the 0/2*pi seam.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoveringArc {
    pub start: f64,
    pub end: f64,
    pub span: f64,
}

impl CoveringArc {
    /// The whole circle.
    pub fn full() -> Self {
        Self {
            start: 0.0,
            end: TAU,
            span: TAU,
        }
    }

    #[inline]
    pub fn contains(&self, theta: f64) -> bool {
        if self.span >= TAU {
            return true;
        }
        let theta = normalize_angle(theta);
        if self.start <= self.end {
            theta >= self.start && theta <= self.end
        } else {
            theta >= self.start || theta <= self.end
        }
    }
}

/// `a` wrapped into `[0, 2*pi)`.
///
/// `rem_euclid` rounds tiny negative angles up to exactly `2*pi`; those map
/// to 0 here so they stay on the seam.
#[inline]
pub fn normalize_angle(a: f64) -> f64 {
    let a = a.rem_euclid(TAU);
    if a >= TAU {
        0.0
    } else {
        a
    }
}

/// Shortest arc containing every angle.
///
/// Found by removing the largest gap between circularly consecutive angles.
/// Returns `None` for an empty input.
pub fn minimal_covering_arc(angles: &[f64]) -> Option<CoveringArc> {
    let mut sorted: Vec<f64> = angles.iter().map(|&a| normalize_angle(a)).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();

    // Gap following index i runs from sorted[i] to sorted[(i + 1) % n].
    let mut best_gap = (sorted[0] + TAU) - sorted[n - 1];
    let mut best_idx = n - 1;
    for i in 0..n - 1 {
        let gap = sorted[i + 1] - sorted[i];
        if gap > best_gap {
            best_gap = gap;
            best_idx = i;
        }
    }

    Some(CoveringArc {
        start: sorted[(best_idx + 1) % n],
        end: sorted[best_idx],
        span: (TAU - best_gap).max(0.0),
    })
}

/// Direction of ray `k` out of `rays`.
#[inline]
pub fn ray_angle(k: usize, rays: usize) -> f64 {
    TAU * k as f64 / rays as f64
}

/// Mark each of `rays` directions from `origin` whose ray can intersect
/// `bbox`. Every ray qualifies when the origin lies inside the box.
pub fn ray_mask_for_bbox(origin: (f64, f64), bbox: &BBox, rays: usize) -> Result<Vec<bool>> {
    bbox.validate()?;
    if rays == 0 {
        return Err(VisibilityError::invalid("rays", 0.0));
    }
    let arc = if bbox.contains(origin.0, origin.1) {
        CoveringArc::full()
    } else {
        let corners: Vec<f64> = bbox
            .corners()
            .iter()
            .map(|&(x, y)| (y - origin.1).atan2(x - origin.0))
            .collect();
        minimal_covering_arc(&corners).unwrap_or_else(CoveringArc::full)
    };
    Ok((0..rays).map(|k| arc.contains(ray_angle(k, rays))).collect())
}
