//! End-to-end scenarios from the scheduler's testable-properties table,
//! exercised directly against the pure data model (no threads involved).

use scrubline_core::landing_zone::{LandingZoneManager, ScrubSpeedState};
use scrubline_core::reader::Direction;
use scrubline_core::ScrubConfig;

fn classify_speed(v: f64, fast_threshold: f64, medium_threshold: f64) -> ScrubSpeedState {
    let mag = v.abs();
    if mag > fast_threshold {
        ScrubSpeedState::Fast
    } else if mag > medium_threshold {
        ScrubSpeedState::Medium
    } else {
        ScrubSpeedState::Slow
    }
}

/// Forward scrub, steady: begin at t=1.000, five updates at v=+24 fps.
/// `t_pred` is clamped to `t + prediction_clamp`; landing zone ahead covers
/// at least `forward_lz_frames`.
#[test]
fn forward_scrub_steady_clamps_prediction_and_warms_ahead() {
    let cfg = ScrubConfig::default();
    let lzm = LandingZoneManager::new(cfg.clone());

    let t = 1.000;
    let v = 24.0;
    let direction = Direction::from_velocity(v);
    assert_eq!(direction, Direction::Forward);
    assert_eq!(classify_speed(v, cfg.velocity_fast_threshold_fps, cfg.velocity_medium_threshold_fps), ScrubSpeedState::Medium);

    let raw = v * cfg.prediction_factor;
    let t_pred = (t + raw.clamp(-cfg.prediction_clamp, cfg.prediction_clamp)).max(0.0);
    assert_eq!(t_pred, t + cfg.prediction_clamp, "large raw prediction must clamp");

    let frame_duration = 1.0 / 60.0;
    let lz = lzm.compute(t_pred, v, direction, frame_duration, None, None, false);
    let ahead_frames = ((lz.ahead.1 - lz.ahead.0) / frame_duration).round() as u32;
    assert!(ahead_frames >= cfg.forward_lz_frames, "ahead span should cover at least forward_lz_frames");
}

/// Reverse scrub, stable-reverse mode: begin at t=10.000, v=-40. Behind
/// range covers >= 8 frames, ahead covers exactly 1, and the priority list
/// starts at `t_pred` and walks backward.
#[test]
fn reverse_scrub_stable_mode_walks_backward_from_t_pred() {
    let cfg = ScrubConfig::default();
    let lzm = LandingZoneManager::new(cfg);
    let frame_duration = 1.0 / 60.0;

    let lz = lzm.compute(10.000, -40.0, Direction::Reverse, frame_duration, None, None, true);
    let behind_frames = ((lz.behind.1 - lz.behind.0) / frame_duration).round() as u32;
    let ahead_frames = ((lz.ahead.1 - lz.ahead.0) / frame_duration).round() as u32;
    assert!(behind_frames >= 8);
    assert_eq!(ahead_frames, 1);

    let list = lz.priority_list();
    assert_eq!(list[0], 10.000);
    assert!(list.windows(2).take(behind_frames as usize).all(|w| w[1] < w[0]), "first frames should step backward");
}
