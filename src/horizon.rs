//! Running maximum of the elevation slope seen from an eye point.

use crate::config::NodataPolicy;

/// Outcome of tracking one line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Horizon {
    /// No valid sample obstructs the line.
    Open,
    /// Highest slope (rise over run) seen along the line.
    Slope(f64),
    /// A nodata sample was met under the strict policy.
    Blocked,
}

/// Tracks the maximum slope `(z - eye) / d` over samples fed in increasing
/// distance order.
#[derive(Debug, Clone)]
pub struct HorizonTracker {
    eye: f64,
    policy: NodataPolicy,
    max_slope: f64,
    blocked: bool,
}

impl HorizonTracker {
    pub fn new(eye: f64, policy: NodataPolicy) -> Self {
        Self {
            eye,
            policy,
            max_slope: f64::NEG_INFINITY,
            blocked: false,
        }
    }

    /// Feed one sample; `None` elevation means nodata.
    ///
    /// Returns `false` once the line is blocked and further samples are
    /// pointless.
    #[inline]
    pub fn observe(&mut self, elevation: Option<f64>, distance: f64) -> bool {
        if self.blocked {
            return false;
        }
        match elevation {
            Some(z) => {
                if distance > 0.0 {
                    let slope = (z - self.eye) / distance;
                    if slope > self.max_slope {
                        self.max_slope = slope;
                    }
                }
                true
            }
            None => match self.policy {
                NodataPolicy::Strict => {
                    self.blocked = true;
                    false
                }
                NodataPolicy::Lenient => true,
            },
        }
    }

    pub fn horizon(&self) -> Horizon {
        if self.blocked {
            Horizon::Blocked
        } else if self.max_slope == f64::NEG_INFINITY {
            Horizon::Open
        } else {
            Horizon::Slope(self.max_slope)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_line_is_open() {
        let t = HorizonTracker::new(100.0, NodataPolicy::Strict);
        assert_eq!(t.horizon(), Horizon::Open);
    }

    #[test]
    fn keeps_running_maximum() {
        let mut t = HorizonTracker::new(100.0, NodataPolicy::Strict);
        t.observe(Some(110.0), 10.0);
        t.observe(Some(150.0), 100.0);
        t.observe(Some(90.0), 200.0);
        assert_eq!(t.horizon(), Horizon::Slope(1.0));
    }

    #[test]
    fn strict_nodata_blocks_the_line() {
        let mut t = HorizonTracker::new(100.0, NodataPolicy::Strict);
        assert!(t.observe(Some(101.0), 10.0));
        assert!(!t.observe(None, 20.0));
        assert!(!t.observe(Some(500.0), 30.0));
        assert_eq!(t.horizon(), Horizon::Blocked);
    }

    #[test]
    fn lenient_nodata_is_skipped() {
        let mut with_gap = HorizonTracker::new(100.0, NodataPolicy::Lenient);
        with_gap.observe(Some(105.0), 10.0);
        with_gap.observe(None, 20.0);
        with_gap.observe(Some(130.0), 30.0);

        let mut without = HorizonTracker::new(100.0, NodataPolicy::Lenient);
        without.observe(Some(105.0), 10.0);
        without.observe(Some(130.0), 30.0);

        assert_eq!(with_gap.horizon(), without.horizon());
        assert_eq!(with_gap.horizon(), Horizon::Slope(1.0));
    }

    #[test]
    fn only_nodata_under_lenient_stays_open() {
        let mut t = HorizonTracker::new(0.0, NodataPolicy::Lenient);
        t.observe(None, 5.0);
        assert_eq!(t.horizon(), Horizon::Open);
    }
}
