//! WindowedReader contract (spec §4.8): a thin sliding-window random-access
//! interface over an external decoder. The decoder itself is out of scope —
//! this is the seam `ScrubWorker` and `FramePipeline` call through.

use crate::error::ScrubResult;
use crate::frame::DecodedFrame;

/// Direction of travel for a decode request. Reader implementations use this
/// to decide whether the sliding window needs to be rebuilt (a backward jump
/// always forces a rebuild, per spec §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn from_velocity(v: f64) -> Self {
        if v < 0.0 {
            Direction::Reverse
        } else {
            Direction::Forward
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Reverse => -1.0,
        }
    }
}

/// Implementers maintain a sliding window `[t - look_behind, t + look_ahead]`
/// over the compressed source and, within it, return the frame with the
/// largest `pts <= target + tolerance` (nearest-previous).
///
/// Contract (spec §4.8):
/// - If the request falls outside the window, or the caller jumped backward
///   (`target + tolerance < last_delivered_pts`), the window is rebuilt.
/// - `look_behind >= 12 * tolerance`, capped at `0.25 * window_radius`.
pub trait WindowedReader: Send {
    /// Copy the nearest-previous frame at or before `target_time` (within
    /// `tolerance`), building `DecodedFrame`s via `clip`/`origin`/`version`
    /// supplied by the caller (the reader itself does not know which
    /// scheduler path — scrub vs. playback — is asking).
    fn copy_frame(
        &mut self,
        target_time: f64,
        direction: Direction,
        tolerance: f64,
    ) -> ScrubResult<DecodedFrame>;

    /// Seconds covered behind the current window position. Used by callers
    /// to decide whether a request is already inside the window.
    fn look_behind_secs(&self) -> f64;

    /// Seconds covered ahead of the current window position.
    fn look_ahead_secs(&self) -> f64;

    /// PTS of the last frame this reader delivered, or `None` before the
    /// first call. Used to detect a backward jump that forces a rebuild.
    fn last_delivered_pts(&self) -> Option<f64>;
}
