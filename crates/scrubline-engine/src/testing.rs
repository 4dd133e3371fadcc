//! In-memory `WindowedReader` for exercising the scheduler without a real
//! decoder (spec §9 Open Question: "the reference implementation the Open
//! Question anticipates"; expanded in SPEC_FULL §10.4).

use std::collections::BTreeMap;

use scrubline_core::error::{ScrubError, ScrubResult};
use scrubline_core::frame::{DecodedFrame, FrameOrigin, PixelBuffer};
use scrubline_core::ids::ClipId;
use scrubline_core::reader::{Direction, WindowedReader};

/// Frames keyed by integer frame index (`round(pts / frame_duration)`),
/// mirroring the teacher's PTS-as-rational-ticks bookkeeping in
/// `LiveDecoder` (`decode.rs`) without needing ffmpeg to produce them.
pub struct MemoryReader {
    clip: ClipId,
    frame_duration: f64,
    frames: BTreeMap<i64, PixelBuffer>,
    window_lo: f64,
    window_hi: f64,
    last_delivered_pts: Option<f64>,
    look_behind: f64,
    look_ahead: f64,
}

impl MemoryReader {
    /// `fps_buffer(pts) -> PixelBuffer` lets callers generate deterministic
    /// content (e.g. solid color keyed on frame index) without allocating
    /// every frame up front.
    pub fn new(clip: ClipId, frame_duration: f64, look_behind: f64, look_ahead: f64) -> Self {
        Self {
            clip,
            frame_duration,
            frames: BTreeMap::new(),
            window_lo: 0.0,
            window_hi: 0.0,
            last_delivered_pts: None,
            look_behind,
            look_ahead,
        }
    }

    pub fn insert_frame(&mut self, pts: f64, buffer: PixelBuffer) {
        self.frames.insert(self.index_for(pts), buffer);
    }

    fn index_for(&self, pts: f64) -> i64 {
        (pts / self.frame_duration).round() as i64
    }

    fn rebuild_window(&mut self, target: f64) {
        self.window_lo = (target - self.look_behind).max(0.0);
        self.window_hi = target + self.look_ahead;
    }

    fn in_window(&self, target: f64) -> bool {
        target >= self.window_lo && target <= self.window_hi
    }
}

impl WindowedReader for MemoryReader {
    fn copy_frame(&mut self, target_time: f64, _direction: Direction, tolerance: f64) -> ScrubResult<DecodedFrame> {
        let jumped_backward = self
            .last_delivered_pts
            .map(|last| target_time + tolerance < last)
            .unwrap_or(false);

        if jumped_backward || !self.in_window(target_time) {
            self.rebuild_window(target_time);
        }

        let target_idx = self.index_for(target_time);
        let nearest = self
            .frames
            .range(..=target_idx)
            .next_back()
            .map(|(idx, buf)| (*idx, buf.clone()));

        match nearest {
            Some((idx, buffer)) => {
                let pts = idx as f64 * self.frame_duration;
                self.last_delivered_pts = Some(pts);
                // Origin/version are placeholders here; callers (ScrubWorker,
                // FramePipeline) stamp the real ones before caching (spec §4.8).
                Ok(DecodedFrame::new(buffer, pts, self.clip, FrameOrigin::Playback, None))
            }
            None => Err(ScrubError::CacheMiss { clip: self.clip, time: target_time }),
        }
    }

    fn look_behind_secs(&self) -> f64 {
        self.look_behind
    }

    fn look_ahead_secs(&self) -> f64 {
        self.look_ahead
    }

    fn last_delivered_pts(&self) -> Option<f64> {
        self.last_delivered_pts
    }
}

pub fn solid_buffer(width: u32, height: u32, value: u8) -> PixelBuffer {
    PixelBuffer::new(width, height, vec![value; width as usize * height as usize * 4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_frame_returns_nearest_previous() {
        let clip = ClipId::new();
        let mut reader = MemoryReader::new(clip, 1.0 / 30.0, 1.0, 1.0);
        for i in 0..10 {
            reader.insert_frame(i as f64 / 30.0, solid_buffer(2, 2, i as u8));
        }
        let frame = reader.copy_frame(5.0 / 30.0 + 0.001, Direction::Forward, 1.0 / 60.0).unwrap();
        assert_eq!(frame.pts, 5.0 / 30.0);
    }

    #[test]
    fn backward_jump_rebuilds_window() {
        let clip = ClipId::new();
        let mut reader = MemoryReader::new(clip, 1.0 / 30.0, 0.1, 0.1);
        for i in 0..20 {
            reader.insert_frame(i as f64 / 30.0, solid_buffer(1, 1, i as u8));
        }
        reader.copy_frame(15.0 / 30.0, Direction::Forward, 1.0 / 60.0).unwrap();
        let before = (reader.window_lo, reader.window_hi);
        reader.copy_frame(2.0 / 30.0, Direction::Reverse, 1.0 / 60.0).unwrap();
        assert_ne!(before, (reader.window_lo, reader.window_hi));
    }
}
