//! Property-based tests for `LandingZoneManager` window sizing (spec §4.3).

use proptest::prelude::*;

use scrubline_core::landing_zone::LandingZoneManager;
use scrubline_core::reader::Direction;
use scrubline_core::ScrubConfig;

proptest! {
    /// The computed zone never dips below zero and always brackets `t_pred`,
    /// for any non-negative predicted target and any velocity.
    #[test]
    fn zone_brackets_t_pred_and_never_goes_negative(
        t_pred in 0.0f64..10_000.0,
        velocity in -200.0f64..200.0,
        frame_duration in (1.0 / 120.0)..(1.0 / 10.0),
    ) {
        let lzm = LandingZoneManager::new(ScrubConfig::default());
        let direction = Direction::from_velocity(velocity);
        let lz = lzm.compute(t_pred, velocity, direction, frame_duration, None, None, false);

        prop_assert!(lz.behind.0 >= 0.0);
        prop_assert!(lz.behind.0 <= lz.behind.1);
        prop_assert!(lz.ahead.0 <= lz.ahead.1);
        prop_assert!((lz.behind.1 - t_pred).abs() < 1e-9);
        prop_assert!((lz.ahead.0 - t_pred).abs() < 1e-9);
    }

    /// `compute` is a pure function of its inputs: calling it twice with the
    /// same arguments produces the same priority list.
    #[test]
    fn compute_is_deterministic(
        t_pred in 0.0f64..10_000.0,
        velocity in -200.0f64..200.0,
        frame_duration in (1.0 / 120.0)..(1.0 / 10.0),
    ) {
        let lzm = LandingZoneManager::new(ScrubConfig::default());
        let direction = Direction::from_velocity(velocity);
        let a = lzm.compute(t_pred, velocity, direction, frame_duration, None, None, false).priority_list();
        let b = lzm.compute(t_pred, velocity, direction, frame_duration, None, None, false).priority_list();
        prop_assert_eq!(a, b);
    }

    /// Extreme velocities never blow past the configured adaptive max window.
    #[test]
    fn window_never_exceeds_adaptive_max(
        t_pred in 0.0f64..10_000.0,
        velocity in -100_000.0f64..100_000.0,
    ) {
        let cfg = ScrubConfig::default();
        let adaptive_max = cfg.adaptive_lz_max;
        let lzm = LandingZoneManager::new(cfg);
        let direction = Direction::from_velocity(velocity);
        let lz = lzm.compute(t_pred, velocity, direction, 1.0 / 30.0, None, None, false);
        prop_assert!(lz.window_frames <= adaptive_max);
    }
}
