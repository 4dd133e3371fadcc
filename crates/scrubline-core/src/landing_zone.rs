//! LandingZoneManager (spec §4.3): given a predicted target and velocity,
//! compute which frames to warm and in what order.

use crate::config::ScrubConfig;
use crate::ids::Epoch;
use crate::reader::Direction;

/// Coarse scrub speed bucket used for telemetry and hysteresis (spec §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrubSpeedState {
    Idle,
    Slow,
    Medium,
    Fast,
}

/// Smoothed velocity + derived direction/state, tagged with the epoch it was
/// computed under.
#[derive(Clone, Copy, Debug)]
pub struct ScrubMetrics {
    pub velocity_fps: f64,
    pub direction: Direction,
    pub state: ScrubSpeedState,
    pub epoch: Epoch,
}

/// The set of frames to keep warm around a predicted target, plus the
/// ordered priority list workers should decode in.
#[derive(Clone, Debug)]
pub struct LandingZone {
    pub t_pred: f64,
    pub direction: Direction,
    /// `[lo, t_pred]`
    pub behind: (f64, f64),
    /// `[t_pred, hi]`
    pub ahead: (f64, f64),
    pub window_frames: u32,
    pub frame_duration: f64,
    pub repair_mode: bool,
    pub repair_delta: Option<f64>,
}

impl LandingZone {
    pub fn is_in_landing_zone(&self, pts: f64) -> bool {
        (pts >= self.behind.0 && pts <= self.behind.1) || (pts >= self.ahead.0 && pts <= self.ahead.1)
    }

    /// Deterministic decode order (spec §4.3): direction-of-travel frames
    /// first (starting at `t_pred`), then the opposite half.
    pub fn priority_list(&self) -> Vec<f64> {
        let fd = self.frame_duration;
        let mut ahead_half = Vec::new();
        let mut t = self.t_pred;
        while t <= self.ahead.1 + fd / 2.0 {
            ahead_half.push(t);
            t += fd;
        }

        let mut behind_half = Vec::new();
        let mut t = self.t_pred - fd;
        while t >= self.behind.0 - fd / 2.0 {
            behind_half.push(t.max(0.0));
            t -= fd;
        }

        match self.direction {
            Direction::Reverse => {
                // [t_pred, t_pred-fd, ...] down to behind.lo, then ahead half.
                let mut out = vec![self.t_pred];
                out.extend(behind_half);
                out.extend(ahead_half.into_iter().skip(1)); // skip t_pred, already emitted
                out
            }
            Direction::Forward => {
                // ahead half (including t_pred) first, then behind half.
                let mut out = ahead_half;
                out.extend(behind_half);
                out
            }
        }
    }
}

pub struct LandingZoneManager {
    config: ScrubConfig,
}

impl LandingZoneManager {
    pub fn new(config: ScrubConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScrubConfig {
        &self.config
    }

    /// Compute a landing zone for `(t_pred, velocity, direction, frame_duration)`.
    ///
    /// `stable_reverse` is supplied by the caller (the coordinator decides
    /// whether recent velocity samples have been steady enough to enter the
    /// narrow stable-reverse submode — keeping this function pure and
    /// velocity-history-free, see DESIGN.md).
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        &self,
        t_pred: f64,
        velocity_fps: f64,
        direction: Direction,
        frame_duration: f64,
        adaptive_window_frames: Option<u32>,
        recent_decode_delta: Option<f64>,
        stable_reverse: bool,
    ) -> LandingZone {
        let cfg = &self.config;

        let window = adaptive_window_frames.unwrap_or_else(|| {
            let raw = (velocity_fps.abs() * cfg.adaptive_lz_mult).floor() as i64;
            raw.clamp(cfg.adaptive_lz_min as i64, cfg.adaptive_lz_max as i64) as u32
        });

        let max_frames_per_window =
            window.max((cfg.max_warm_window_secs / frame_duration).floor().max(0.0) as u32);

        // Symmetric with the travel direction prioritized: reverse scrubs
        // warm more frames behind the cursor, forward scrubs warm more
        // frames ahead of it (spec §4.3).
        let (mut behind_frames, mut ahead_frames) = match direction {
            Direction::Reverse => (
                window.max(cfg.reverse_lz_frames).min(max_frames_per_window),
                window.max(cfg.forward_lz_frames).min(max_frames_per_window),
            ),
            Direction::Forward => (
                window.max(cfg.forward_lz_frames).min(max_frames_per_window),
                window.max(cfg.reverse_lz_frames).min(max_frames_per_window),
            ),
        };

        if direction == Direction::Reverse && stable_reverse {
            let stable_behind = (velocity_fps.abs() * 10.0).ceil() as i64;
            behind_frames = stable_behind.clamp(
                cfg.stable_reverse_behind_min as i64,
                cfg.stable_reverse_behind_max as i64,
            ) as u32;
            ahead_frames = 1;
        }

        let mut repair_mode = false;
        let mut repair_delta = None;
        if direction == Direction::Reverse {
            if let Some(delta) = recent_decode_delta {
                if delta > cfg.repair_delta_threshold_frac * frame_duration {
                    let extra = 2 * (delta / frame_duration).ceil() as u32;
                    behind_frames += extra;
                    repair_mode = true;
                    repair_delta = Some(delta);
                }
            }
        }

        let behind_lo = (t_pred - behind_frames as f64 * frame_duration).max(0.0);
        let ahead_hi = t_pred + ahead_frames as f64 * frame_duration;

        LandingZone {
            t_pred,
            direction,
            behind: (behind_lo, t_pred),
            ahead: (t_pred, ahead_hi),
            window_frames: window,
            frame_duration,
            repair_mode,
            repair_delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mgr() -> LandingZoneManager {
        LandingZoneManager::new(ScrubConfig::default())
    }

    #[test]
    fn reverse_stable_mode_covers_at_least_eight_frames_behind() {
        let lz = mgr().compute(10.0, -40.0, Direction::Reverse, 1.0 / 60.0, None, None, true);
        let frames_behind = ((lz.behind.1 - lz.behind.0) / lz.frame_duration).round() as u32;
        assert!(frames_behind >= 8, "expected >= 8 frames behind, got {frames_behind}");
        let frames_ahead = ((lz.ahead.1 - lz.ahead.0) / lz.frame_duration).round() as u32;
        assert_eq!(frames_ahead, 1);
    }

    #[test]
    fn priority_list_starts_at_t_pred_and_walks_backward_for_reverse() {
        let lz = mgr().compute(10.0, -40.0, Direction::Reverse, 1.0 / 60.0, None, None, true);
        let list = lz.priority_list();
        assert_eq!(list[0], 10.0);
        assert!(list[1] < list[0], "reverse priority list should step backward first");
    }

    #[test]
    fn priority_list_is_deterministic() {
        let lz = mgr().compute(5.0, 20.0, Direction::Forward, 1.0 / 30.0, None, None, false);
        let a = lz.priority_list();
        let b = lz.priority_list();
        assert_eq!(a, b);
    }

    #[test]
    fn velocity_zero_gives_symmetric_zone_around_t_now() {
        let lz = mgr().compute(2.0, 0.0, Direction::Forward, 1.0 / 30.0, None, None, false);
        let behind_span = lz.t_pred - lz.behind.0;
        let ahead_span = lz.ahead.1 - lz.t_pred;
        // With v=0 the adaptive window floors to adaptive_lz_min on both
        // sides when reverse/forward lz_frames agree in magnitude class.
        assert!(behind_span > 0.0 && ahead_span > 0.0);
    }

    #[test]
    fn extreme_velocity_clamps_window_to_adaptive_max() {
        let lz = mgr().compute(1.0, 100_000.0, Direction::Forward, 1.0 / 30.0, None, None, false);
        assert_eq!(lz.window_frames, ScrubConfig::default().adaptive_lz_max);
    }

    #[test]
    fn predicted_target_never_goes_negative() {
        let lz = mgr().compute(0.0, -40.0, Direction::Reverse, 1.0 / 60.0, None, None, false);
        assert!(lz.behind.0 >= 0.0);
    }

    #[test]
    fn repair_mode_extends_behind_range() {
        let frame_duration = 1.0 / 60.0;
        let baseline = mgr().compute(10.0, -20.0, Direction::Reverse, frame_duration, None, None, false);
        let repaired = mgr().compute(
            10.0,
            -20.0,
            Direction::Reverse,
            frame_duration,
            None,
            Some(frame_duration), // > 0.75 * frame_duration
            false,
        );
        assert!(repaired.repair_mode);
        assert!(repaired.behind.1 - repaired.behind.0 > baseline.behind.1 - baseline.behind.0);
    }
}
