//! FrameHistoryManager (spec §4.2): a byte-budgeted, anchor-biased frame
//! cache. Single-threaded contract — callers serialize access, the same way
//! `ProjectState` methods in the teacher assume a single mutable borrow.

use std::time::Instant;

use crate::config::ScrubConfig;
use crate::frame::{DecodedFrame, FrameOrigin};
use crate::ids::Epoch;
use crate::time::GENERAL_EQUALITY_TOLERANCE_SECS;

/// One cached frame plus the bookkeeping the eviction score needs.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub time: f64,
    pub frame: DecodedFrame,
    pub byte_size: u64,
    pub last_access: Instant,
}

/// Bounded mapping from `(clip, time)` to `DecodedFrame`, biased to evict
/// whatever is farthest from the caller's current anchor first.
pub struct FrameHistoryManager {
    entries: Vec<HistoryEntry>,
    current_bytes: u64,
    budget: u64,
    bias_window_secs: f64,
    byte_weight: f64,
    scrub_priority_boost: f64,
    max_age_secs: f64,
}

impl FrameHistoryManager {
    pub fn new(config: &ScrubConfig, frame_duration_secs: f64) -> Self {
        Self {
            entries: Vec::new(),
            current_bytes: 0,
            budget: config.cache_bytes_budget,
            bias_window_secs: config.cache_bias_frames as f64 * frame_duration_secs,
            byte_weight: config.cache_byte_weight,
            scrub_priority_boost: config.cache_scrub_priority_boost,
            max_age_secs: config.cache_max_age_secs,
        }
    }

    pub fn current_bytes(&self) -> u64 {
        self.current_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a decoded frame, biased against `anchor`, then trim to the
    /// byte budget. Duplicates at the same PTS are only kept when their
    /// version differs (spec §3 invariant); otherwise the existing entry is
    /// replaced in place.
    pub fn record(&mut self, frame: DecodedFrame, anchor: f64, now: Instant) {
        let byte_size = frame.byte_size();
        let time = frame.pts;

        if let Some(existing) = self.entries.iter_mut().find(|e| {
            approx_same_time(e.time, time) && e.frame.version == frame.version
        }) {
            self.current_bytes = self.current_bytes.saturating_sub(existing.byte_size) + byte_size;
            existing.time = time;
            existing.frame = frame;
            existing.byte_size = byte_size;
            existing.last_access = now;
        } else {
            self.current_bytes += byte_size;
            self.entries.push(HistoryEntry { time, frame, byte_size, last_access: now });
            self.entries.sort_by(|a, b| a.time.total_cmp(&b.time));
        }

        self.prune(anchor, now);
    }

    /// Remove expired entries (older than `max_age_secs` from `anchor`, when
    /// configured), then evict highest-scoring entries until under budget.
    pub fn prune(&mut self, anchor: f64, now: Instant) {
        if self.max_age_secs > 0.0 {
            let cutoff = anchor - self.max_age_secs;
            self.entries.retain(|e| e.time >= cutoff);
            self.recompute_bytes();
        }

        while self.current_bytes > self.budget && !self.entries.is_empty() {
            let (idx, _) = self
                .entries
                .iter()
                .enumerate()
                .map(|(i, e)| (i, self.score(e, anchor, now)))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .expect("non-empty entries");
            let removed = self.entries.remove(idx);
            self.current_bytes = self.current_bytes.saturating_sub(removed.byte_size);
        }
    }

    fn score(&self, entry: &HistoryEntry, anchor: f64, now: Instant) -> f64 {
        let outside_bias = ((entry.time - anchor).abs() - self.bias_window_secs).max(0.0);
        let age_secs = now.saturating_duration_since(entry.last_access).as_secs_f64();
        let boost = if entry.frame.origin == FrameOrigin::Scrub { self.scrub_priority_boost } else { 0.0 };
        outside_bias * 1000.0 + age_secs + self.byte_weight * entry.byte_size as f64 - boost
    }

    /// Three-pass nearest-previous lookup: exact version, then version-free
    /// (playback), then anything. Within each pass, nearest `<= time` wins
    /// over nearest `> time`.
    pub fn best_frame(&mut self, time: f64, preferred_version: Option<Epoch>, now: Instant) -> Option<DecodedFrame> {
        let passes: [fn(Option<Epoch>, Option<Epoch>) -> bool; 3] = [
            |v: Option<Epoch>, pref: Option<Epoch>| v == pref,
            |v: Option<Epoch>, _pref: Option<Epoch>| v.is_none(),
            |_v: Option<Epoch>, _pref: Option<Epoch>| true,
        ];

        for validator in passes {
            if let Some(idx) = self.nearest_previous_idx(time, |v| validator(v, preferred_version)) {
                self.entries[idx].last_access = now;
                return Some(self.entries[idx].frame.clone());
            }
            if let Some(idx) = self.nearest_next_idx(time, |v| validator(v, preferred_version)) {
                self.entries[idx].last_access = now;
                return Some(self.entries[idx].frame.clone());
            }
        }
        None
    }

    fn nearest_previous_idx(&self, time: f64, validator: impl Fn(Option<Epoch>) -> bool) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.time <= time && validator(e.frame.version))
            .max_by(|a, b| a.1.time.total_cmp(&b.1.time))
            .map(|(i, _)| i)
    }

    fn nearest_next_idx(&self, time: f64, validator: impl Fn(Option<Epoch>) -> bool) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.time > time && validator(e.frame.version))
            .min_by(|a, b| a.1.time.total_cmp(&b.1.time))
            .map(|(i, _)| i)
    }

    /// Exact-ish lookup: the entry closest to `at`, within `tolerance`.
    pub fn frame(&mut self, at: f64, tolerance: f64, now: Instant) -> Option<DecodedFrame> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| (e.time - at).abs() <= tolerance)
            .min_by(|a, b| (a.1.time - at).abs().total_cmp(&(b.1.time - at).abs()))
            .map(|(i, _)| i)?;
        self.entries[idx].last_access = now;
        Some(self.entries[idx].frame.clone())
    }

    pub fn latest(&self) -> Option<&DecodedFrame> {
        self.entries.last().map(|e| &e.frame)
    }

    pub fn count_in_range(&self, lo: f64, hi: f64) -> usize {
        self.entries.iter().filter(|e| e.time >= lo && e.time <= hi).count()
    }

    pub fn times_in_range(&self, lo: f64, hi: f64) -> Vec<f64> {
        self.entries.iter().filter(|e| e.time >= lo && e.time <= hi).map(|e| e.time).collect()
    }

    pub fn remove_before(&mut self, cutoff: f64) {
        self.entries.retain(|e| e.time >= cutoff);
        self.recompute_bytes();
    }

    pub fn remove_after(&mut self, cutoff: f64) {
        self.entries.retain(|e| e.time <= cutoff);
        self.recompute_bytes();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_bytes = 0;
    }

    fn recompute_bytes(&mut self) {
        self.current_bytes = self.entries.iter().map(|e| e.byte_size).sum();
    }

    /// Invariant check used by tests: sorted order and a byte total matching
    /// the sum of entries.
    #[cfg(test)]
    fn check_invariants(&self) {
        assert!(self.entries.windows(2).all(|w| w[0].time <= w[1].time), "entries must stay sorted by time");
        let sum: u64 = self.entries.iter().map(|e| e.byte_size).sum();
        assert_eq!(sum, self.current_bytes, "byte total must match sum of entries");
    }
}

fn approx_same_time(a: f64, b: f64) -> bool {
    (a - b).abs() <= GENERAL_EQUALITY_TOLERANCE_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelBuffer;
    use crate::ids::ClipId;

    fn mk_frame(pts: f64, bytes: usize, origin: FrameOrigin, version: Option<Epoch>) -> DecodedFrame {
        let buf = PixelBuffer::new(1, (bytes / 4) as u32, vec![0u8; bytes]);
        DecodedFrame::new(buf, pts, ClipId::new(), origin, version)
    }

    fn cfg_with_budget(budget: u64) -> ScrubConfig {
        let mut cfg = ScrubConfig::default();
        cfg.cache_bytes_budget = budget;
        cfg.cache_bias_frames = 0;
        cfg.cache_max_age_secs = 0.0; // disable age-based eviction for these tests
        cfg
    }

    #[test]
    fn byte_budget_evicts_farthest_from_anchor_first() {
        // Budget 10MiB, ~2MiB frames (see spec §8 scenario 5).
        let cfg = cfg_with_budget(10 * 1024 * 1024);
        let mut hist = FrameHistoryManager::new(&cfg, 1.0 / 30.0);
        let now = Instant::now();
        let two_mib = 2 * 1024 * 1024;

        for t in 0..7u32 {
            let frame = mk_frame(t as f64, two_mib, FrameOrigin::Playback, None);
            hist.record(frame, 3.0, now);
        }

        assert!(hist.current_bytes() <= 10 * 1024 * 1024);
        let times = hist.times_in_range(f64::MIN, f64::MAX);
        assert!(!times.contains(&0.0), "time 0 (farthest from anchor 3) should be evicted");
        assert!(!times.contains(&6.0), "time 6 (farthest from anchor 3) should be evicted");
        assert!(times.contains(&3.0), "anchor frame should survive");
        hist.check_invariants();
    }

    #[test]
    fn record_then_frame_returns_same_buffer() {
        let cfg = cfg_with_budget(64 * 1024 * 1024);
        let mut hist = FrameHistoryManager::new(&cfg, 1.0 / 30.0);
        let now = Instant::now();
        let frame = mk_frame(1.0, 4, FrameOrigin::Playback, None);
        let expected = frame.pixel_buffer.bytes().to_vec();
        hist.record(frame, 1.0, now);
        let got = hist.frame(1.0, 1e-6, now).expect("frame should be present");
        assert_eq!(got.pixel_buffer.bytes(), expected.as_slice());
    }

    #[test]
    fn best_frame_prefers_matching_version_then_playback_then_any() {
        let cfg = cfg_with_budget(64 * 1024 * 1024);
        let mut hist = FrameHistoryManager::new(&cfg, 1.0 / 30.0);
        let now = Instant::now();
        hist.record(mk_frame(1.0, 4, FrameOrigin::Scrub, Some(Epoch(1))), 1.0, now);
        hist.record(mk_frame(1.01, 4, FrameOrigin::Playback, None), 1.01, now);

        let got = hist.best_frame(1.0, Some(Epoch(1)), now).unwrap();
        assert_eq!(got.version, Some(Epoch(1)));

        let got2 = hist.best_frame(1.0, Some(Epoch(2)), now).unwrap();
        assert_eq!(got2.version, None, "falls back to version-free playback frame");
    }

    #[test]
    fn stale_epoch_is_never_written() {
        // Cache-insert-time epoch filtering is the caller's job (coordinator),
        // but history itself must never silently merge different-version
        // entries at the same pts into one.
        let cfg = cfg_with_budget(64 * 1024 * 1024);
        let mut hist = FrameHistoryManager::new(&cfg, 1.0 / 30.0);
        let now = Instant::now();
        hist.record(mk_frame(1.0, 4, FrameOrigin::Scrub, Some(Epoch(1))), 1.0, now);
        hist.record(mk_frame(1.0, 4, FrameOrigin::Scrub, Some(Epoch(2))), 1.0, now);
        assert_eq!(hist.len(), 2, "same pts, different version => two entries");
    }

    #[test]
    fn entries_stay_sorted_after_out_of_order_inserts() {
        let cfg = cfg_with_budget(64 * 1024 * 1024);
        let mut hist = FrameHistoryManager::new(&cfg, 1.0 / 30.0);
        let now = Instant::now();
        for t in [3.0, 1.0, 2.0, 0.5] {
            hist.record(mk_frame(t, 4, FrameOrigin::Playback, None), t, now);
        }
        hist.check_invariants();
    }
}
