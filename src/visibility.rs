//! Converts a line's horizon into the visible part of the target.

use crate::horizon::Horizon;

/// Vertical extent of the target: its base elevation and height above it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetBand {
    pub base: f64,
    pub height: f64,
}

impl TargetBand {
    pub fn new(base: f64, height: f64) -> Self {
        Self { base, height }
    }

    #[inline]
    pub fn top(&self) -> f64 {
        self.base + self.height
    }

    /// Visible height seen from an eye at elevation `eye`, `distance` away
    /// from the target, behind the given horizon. `None` for a blocked line.
    ///
    /// The result is clamped to `[0, height]`.
    #[inline]
    pub fn visible_height(&self, horizon: Horizon, eye: f64, distance: f64) -> Option<f64> {
        let alpha = match horizon {
            Horizon::Blocked => return None,
            Horizon::Open => return Some(self.height),
            Horizon::Slope(alpha) => alpha,
        };
        let beta_base = (self.base - eye) / distance;
        let beta_top = (self.top() - eye) / distance;

        let visible = if alpha <= beta_base {
            self.height
        } else if alpha >= beta_top {
            0.0
        } else {
            // Height on the target's axis hidden below the horizon line.
            let hidden = (eye + alpha * distance) - self.base;
            self.height - hidden
        };
        Some(visible.clamp(0.0, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn open_line_sees_everything() {
        let band = TargetBand::new(100.0, 50.0);
        assert_eq!(band.visible_height(Horizon::Open, 100.0, 20.0), Some(50.0));
    }

    #[test]
    fn blocked_line_has_no_value() {
        let band = TargetBand::new(100.0, 50.0);
        assert_eq!(band.visible_height(Horizon::Blocked, 100.0, 20.0), None);
    }

    #[test]
    fn horizon_below_base_is_fully_visible() {
        let band = TargetBand::new(100.0, 50.0);
        assert_eq!(band.visible_height(Horizon::Slope(0.0), 100.0, 20.0), Some(50.0));
        assert_eq!(band.visible_height(Horizon::Slope(-1.0), 100.0, 20.0), Some(50.0));
    }

    #[test]
    fn horizon_above_top_hides_everything() {
        // beta_top = 50 / 20 = 2.5
        let band = TargetBand::new(100.0, 50.0);
        assert_eq!(band.visible_height(Horizon::Slope(10.0), 100.0, 20.0), Some(0.0));
        assert_eq!(band.visible_height(Horizon::Slope(2.5), 100.0, 20.0), Some(0.0));
    }

    #[test]
    fn partial_occlusion_subtracts_hidden_height() {
        // hidden = (100 + 1.0 * 20) - 100 = 20, visible = 30
        let band = TargetBand::new(100.0, 50.0);
        let v = band.visible_height(Horizon::Slope(1.0), 100.0, 20.0).unwrap();
        assert!((v - 30.0).abs() < EPS);
    }

    #[test]
    fn elevated_eye_uses_its_own_angles() {
        // eye 120, base 100, top 150, D = 40: beta_base = -0.5, beta_top = 0.75
        // alpha 0.25: hidden = 120 + 10 - 100 = 30, visible = 20
        let band = TargetBand::new(100.0, 50.0);
        let v = band.visible_height(Horizon::Slope(0.25), 120.0, 40.0).unwrap();
        assert!((v - 20.0).abs() < EPS);
    }

    #[test]
    fn visible_height_grows_with_target_height() {
        let horizon = Horizon::Slope(0.8);
        let mut previous = 0.0;
        for h in [10.0, 20.0, 40.0, 80.0, 160.0] {
            let v = TargetBand::new(100.0, h)
                .visible_height(horizon, 101.6, 25.0)
                .unwrap();
            assert!(v >= previous);
            assert!((0.0..=h).contains(&v));
            previous = v;
        }
    }
}
