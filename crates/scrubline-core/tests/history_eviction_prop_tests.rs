//! Property-based tests for `FrameHistoryManager`'s byte-budgeted eviction
//! (spec §4.2, §8 scenario 5).

use std::time::Instant;

use proptest::prelude::*;

use scrubline_core::frame::{DecodedFrame, FrameOrigin, PixelBuffer};
use scrubline_core::history::FrameHistoryManager;
use scrubline_core::ids::ClipId;
use scrubline_core::ScrubConfig;

fn mk_frame(pts: f64, bytes: usize) -> DecodedFrame {
    let buf = PixelBuffer::new(1, (bytes / 4).max(1) as u32, vec![0u8; bytes]);
    DecodedFrame::new(buf, pts, ClipId::new(), FrameOrigin::Playback, None)
}

proptest! {
    /// However many frames are inserted, current byte usage never exceeds
    /// the configured budget once `record` returns.
    #[test]
    fn never_exceeds_byte_budget(
        times in prop::collection::vec(0.0f64..100.0, 1..40),
        anchor in 0.0f64..100.0,
    ) {
        let mut cfg = ScrubConfig::default();
        cfg.cache_bytes_budget = 1024 * 1024;
        cfg.cache_bias_frames = 0;
        cfg.cache_max_age_secs = 0.0;
        let mut hist = FrameHistoryManager::new(&cfg, 1.0 / 30.0);
        let now = Instant::now();

        for t in times {
            hist.record(mk_frame(t, 4096), anchor, now);
            prop_assert!(hist.current_bytes() <= cfg.cache_bytes_budget);
        }
    }

    /// Whatever survives eviction is never farther from the anchor than an
    /// entry that got evicted alongside it, for a fixed budget that can only
    /// hold a handful of frames (anchor-biased, not plain LRU).
    #[test]
    fn surviving_entries_are_no_farther_than_evicted_ones(
        offsets in prop::collection::vec(-20i32..20, 4..20),
        anchor in 0.0f64..5.0,
    ) {
        let mut cfg = ScrubConfig::default();
        cfg.cache_bytes_budget = 3 * 2 * 1024 * 1024; // room for ~3 frames
        cfg.cache_bias_frames = 0;
        cfg.cache_max_age_secs = 0.0;
        let mut hist = FrameHistoryManager::new(&cfg, 1.0 / 30.0);
        let now = Instant::now();

        let times: Vec<f64> = offsets.iter().map(|o| (anchor + *o as f64).max(0.0)).collect();
        for t in &times {
            hist.record(mk_frame(*t, 2 * 1024 * 1024), anchor, now);
        }

        let surviving = hist.times_in_range(f64::MIN, f64::MAX);
        if let Some(worst_surviving) = surviving.iter().map(|t| (t - anchor).abs()).fold(None::<f64>, |acc, d| {
            Some(acc.map_or(d, |a: f64| a.max(d)))
        }) {
            let evicted: Vec<f64> = times.iter().filter(|t| !surviving.contains(t)).cloned().collect();
            for e in evicted {
                prop_assert!((e - anchor).abs() + 1e-9 >= worst_surviving - 1e-6);
            }
        }
    }
}
