//! Power ramp state machine for ERG mode smoothing.
//!
//! Converts a requested power target into an applied target that protects
//! the rider from abrupt load changes: when the rider falls well under the
//! requested power the applied target drops immediately to a recovery
//! level; otherwise it climbs back toward the request at a fixed linear
//! rate.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Tunables for the power ramp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RampConfig {
    /// Linear ramp rate toward the requested target, in watts per second
    pub ramp_watts_per_sec: f64,
    /// Fraction of the requested target below which recovery triggers
    pub recovery_threshold: f64,
    /// Fraction of the requested target applied during recovery
    pub recovery_fraction: f64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            ramp_watts_per_sec: 50.0,
            recovery_threshold: 0.6,
            recovery_fraction: 0.7,
        }
    }
}

/// Pure ramp state: requested target, fractional applied target, and the
/// time of the last processed sample.
///
/// Time is passed in explicitly so the policy stays deterministic under
/// test; the async controller supplies wall-clock instants.
#[derive(Debug)]
pub struct PowerRamp {
    config: RampConfig,
    requested_watts: f64,
    applied_watts: f64,
    last_update: Instant,
}

impl PowerRamp {
    /// Create a ramp at zero target. The first sample measures elapsed
    /// time from `now`.
    pub fn new(config: RampConfig, now: Instant) -> Self {
        Self {
            config,
            requested_watts: 0.0,
            applied_watts: 0.0,
            last_update: now,
        }
    }

    /// Update the requested target.
    ///
    /// The applied target is deliberately left unchanged — ramping or
    /// recovery on the next sample adjusts it. Returns the rounded
    /// applied target, which the caller pushes to the machine
    /// immediately.
    pub fn set_target(&mut self, watts: i16) -> i16 {
        self.requested_watts = f64::from(watts);
        self.applied_target()
    }

    /// The rounded target currently applied to the machine.
    pub fn applied_target(&self) -> i16 {
        self.applied_watts.round() as i16
    }

    /// The rounded requested target.
    pub fn requested_target(&self) -> i16 {
        self.requested_watts.round() as i16
    }

    /// Process a delivered power sample.
    ///
    /// Returns the new applied target when a Set Target Power command
    /// should be issued, or `None` when the applied target already
    /// matches the request (no redundant writes).
    pub fn on_sample(&mut self, power_watts: i16, now: Instant) -> Option<i16> {
        let elapsed_secs = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        // Rider under-delivering: drop straight to the recovery level.
        if f64::from(power_watts) < self.requested_watts * self.config.recovery_threshold {
            self.applied_watts = self.requested_watts * self.config.recovery_fraction;
            return Some(self.applied_target());
        }

        // Ramp back up toward the request, clamped so it never overshoots.
        if self.applied_watts < self.requested_watts {
            self.applied_watts = (self.applied_watts
                + self.config.ramp_watts_per_sec * elapsed_secs)
                .min(self.requested_watts);
            return Some(self.applied_target());
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ramp_at(t0: Instant) -> PowerRamp {
        PowerRamp::new(RampConfig::default(), t0)
    }

    #[test]
    fn test_ramp_increases_linearly_and_clamps() {
        let t0 = Instant::now();
        let mut ramp = ramp_at(t0);

        // Reach an applied target of 100 first (50 W/s over 2s).
        assert_eq!(ramp.set_target(100), 0);
        assert_eq!(ramp.on_sample(100, t0 + Duration::from_secs(2)), Some(100));

        // Raise the request; applied ramps 100 -> 150 -> 200 and clamps.
        assert_eq!(ramp.set_target(200), 100);
        assert_eq!(ramp.on_sample(200, t0 + Duration::from_secs(3)), Some(150));
        assert_eq!(ramp.on_sample(200, t0 + Duration::from_secs(4)), Some(200));
    }

    #[test]
    fn test_ramp_clamp_with_long_gap() {
        let t0 = Instant::now();
        let mut ramp = ramp_at(t0);

        ramp.set_target(120);
        // 50 W/s over 10s would be 500; clamped to the request.
        assert_eq!(ramp.on_sample(120, t0 + Duration::from_secs(10)), Some(120));
    }

    #[test]
    fn test_recovery_snaps_regardless_of_elapsed_time() {
        let t0 = Instant::now();
        let mut ramp = ramp_at(t0);

        ramp.set_target(200);
        // 50W < 0.6 * 200, so applied snaps to 0.7 * 200 = 140.
        assert_eq!(ramp.on_sample(50, t0 + Duration::from_millis(10)), Some(140));
        assert_eq!(ramp.applied_target(), 140);
    }

    #[test]
    fn test_recovery_overrides_reached_target() {
        let t0 = Instant::now();
        let mut ramp = ramp_at(t0);

        ramp.set_target(200);
        ramp.on_sample(200, t0 + Duration::from_secs(4));
        assert_eq!(ramp.applied_target(), 200);

        // Under-delivery still drops the applied target.
        assert_eq!(ramp.on_sample(50, t0 + Duration::from_secs(5)), Some(140));
    }

    #[test]
    fn test_no_command_when_applied_matches_request() {
        let t0 = Instant::now();
        let mut ramp = ramp_at(t0);

        ramp.set_target(150);
        ramp.on_sample(150, t0 + Duration::from_secs(3));
        assert_eq!(ramp.applied_target(), 150);

        // Repeated ticks at target issue nothing further.
        assert_eq!(ramp.on_sample(150, t0 + Duration::from_secs(4)), None);
        assert_eq!(ramp.on_sample(160, t0 + Duration::from_secs(5)), None);
    }

    #[test]
    fn test_set_target_does_not_snap_applied() {
        let t0 = Instant::now();
        let mut ramp = ramp_at(t0);

        ramp.set_target(100);
        ramp.on_sample(100, t0 + Duration::from_secs(2));

        // New request reports the old applied target unchanged.
        assert_eq!(ramp.set_target(300), 100);
        assert_eq!(ramp.applied_target(), 100);
    }

    #[test]
    fn test_first_sample_measures_from_construction() {
        let t0 = Instant::now();
        let mut ramp = ramp_at(t0);

        ramp.set_target(100);
        assert_eq!(ramp.on_sample(100, t0 + Duration::from_secs(1)), Some(50));
    }
}
