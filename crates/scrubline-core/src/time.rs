//! TimelineTime and FrameTimebase (spec §3, §9 "Floating-point timelines").
//!
//! All ordering, rate gating, and frame-count arithmetic avoids accumulating
//! float error the way `LiveDecoder::ts_to_pts`/`pts_to_secs` do it in the
//! teacher: a rational timebase plus an integer frame count, with explicit
//! tolerance comparisons rather than `==` on floats.

use std::cmp::Ordering;

/// Seconds as a finite non-negative real. Strictly ordered via `f64::total_cmp`
/// so it can live in a `BTreeMap`/sorted `Vec` key without NaN surprises.
#[derive(Clone, Copy, Debug)]
pub struct TimelineTime(f64);

impl TimelineTime {
    pub fn new(seconds: f64) -> Self {
        let s = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        Self(s)
    }

    pub fn secs(self) -> f64 {
        self.0
    }

    pub fn clamp(self, lo: TimelineTime, hi: TimelineTime) -> TimelineTime {
        TimelineTime(self.0.clamp(lo.0, hi.0))
    }
}

impl PartialEq for TimelineTime {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}
impl Eq for TimelineTime {}

impl PartialOrd for TimelineTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimelineTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for TimelineTime {
    fn from(v: f64) -> Self {
        TimelineTime::new(v)
    }
}

/// General equality tolerance (spec §9): 1/240s, used where two times should
/// be considered the same instant modulo float noise.
pub const GENERAL_EQUALITY_TOLERANCE_SECS: f64 = 1.0 / 240.0;

/// Exact frame duration as a rational: `rate_num / rate_den` frames per second.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTimebase {
    pub rate_num: u32,
    pub rate_den: u32,
}

impl FrameTimebase {
    pub const NTSC_30: FrameTimebase = FrameTimebase { rate_num: 30000, rate_den: 1001 };
    pub const FILM_24: FrameTimebase = FrameTimebase { rate_num: 24, rate_den: 1 };
    pub const PAL_25: FrameTimebase = FrameTimebase { rate_num: 25, rate_den: 1 };
    pub const HZ_60: FrameTimebase = FrameTimebase { rate_num: 60, rate_den: 1 };

    pub fn new(rate_num: u32, rate_den: u32) -> Self {
        debug_assert!(rate_num > 0 && rate_den > 0, "degenerate timebase");
        Self { rate_num, rate_den }
    }

    /// Exact duration of one frame, in seconds.
    pub fn frame_duration_secs(&self) -> f64 {
        self.rate_den as f64 / self.rate_num as f64
    }

    /// Half a frame — the tolerance used for "nearest-previous" comparisons
    /// throughout the scheduler (history lookup, rate gates, ring reads).
    pub fn half_frame_secs(&self) -> f64 {
        self.frame_duration_secs() / 2.0
    }

    pub fn seconds_to_frame_count(&self, secs: f64) -> u64 {
        (secs.max(0.0) * self.rate_num as f64 / self.rate_den as f64).round() as u64
    }

    pub fn frame_count_to_seconds(&self, frames: u64) -> f64 {
        frames as f64 * self.rate_den as f64 / self.rate_num as f64
    }
}

impl Default for FrameTimebase {
    fn default() -> Self {
        FrameTimebase::NTSC_30
    }
}

/// True when `a` and `b` are the same instant within `tolerance` seconds.
pub fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timebase_roundtrips_frame_count() {
        let tb = FrameTimebase::new(60, 1);
        assert_eq!(tb.frame_count_to_seconds(60), 1.0);
        assert_eq!(tb.seconds_to_frame_count(1.0), 60);
    }

    #[test]
    fn ntsc_frame_duration_is_exact_rational() {
        let tb = FrameTimebase::NTSC_30;
        assert!((tb.frame_duration_secs() - 1001.0 / 30000.0).abs() < 1e-12);
    }

    #[test]
    fn timeline_time_clamps_negative_to_zero() {
        assert_eq!(TimelineTime::new(-5.0).secs(), 0.0);
    }

    #[test]
    fn timeline_time_orders_like_f64() {
        let mut v = vec![TimelineTime::new(3.0), TimelineTime::new(1.0), TimelineTime::new(2.0)];
        v.sort();
        assert_eq!(v.iter().map(|t| t.secs()).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    }
}
