//! End-to-end scenarios that need the threaded runtime: deadline-bounded
//! stop, epoch invalidation across a re-scrub, and the spot-proxy late-frame
//! trigger.

use std::sync::Arc;
use std::time::Duration;

use scrubline_core::frame::FrameOrigin;
use scrubline_core::ids::ClipId;
use scrubline_core::telemetry::{NullSink, TelemetrySink};
use scrubline_core::ScrubConfig;

use scrubline_engine::testing::{solid_buffer, MemoryReader};
use scrubline_engine::{PassthroughExporter, ScrubClip, ScrubCoordinator, SpotProxyManager};

fn mk_reader(clip: ClipId, frame_duration: f64, around: f64, span_secs: f64) -> MemoryReader {
    let mut reader = MemoryReader::new(clip, frame_duration, 2.0, 2.0);
    let n = (span_secs / frame_duration).ceil() as i64;
    for i in -n..=n {
        let pts = (around + i as f64 * frame_duration).max(0.0);
        reader.insert_frame(pts, solid_buffer(2, 2, (i.rem_euclid(256)) as u8));
    }
    reader
}

fn coordinator() -> Arc<ScrubCoordinator> {
    let config = Arc::new(ScrubConfig::default());
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(NullSink);
    let spot_proxy = Arc::new(
        SpotProxyManager::new(Arc::clone(&config), Arc::clone(&telemetry), Arc::new(PassthroughExporter))
            .expect("spot proxy manager"),
    );
    Arc::new(ScrubCoordinator::new(config, telemetry, spot_proxy, "memory://test".to_string()))
}

/// End-scrub deadline: within the configured wall-clock budget, history
/// holds an entry near the final time tagged origin=Scrub with the current
/// epoch.
#[test]
fn end_scrub_deadline_delivers_final_frame_in_history() {
    let coord = coordinator();
    let clip = ClipId::new();
    let frame_duration = 1.0 / 60.0;
    let reader = mk_reader(clip, frame_duration, 2.500, 1.0);

    let epoch = coord.begin_scrub(2.500, vec![ScrubClip { clip, reader: Box::new(reader), frame_duration }]);
    // Capture the history handle before end_scrub shuts the worker down and
    // drops it out of the coordinator's map.
    let history = coord.history_for(clip).expect("worker should be registered after begin_scrub");
    coord.end_scrub(2.500);

    let mut history = history.lock();
    let frame = history.frame(2.500, frame_duration / 2.0, std::time::Instant::now()).expect("history should hold the final frame within the stop deadline");
    assert!((frame.pts - 2.500).abs() <= frame_duration / 2.0);
    assert_eq!(frame.origin, FrameOrigin::Scrub);
    assert_eq!(frame.version, Some(epoch));
}

/// Epoch invalidation: a second `begin_scrub` before the first's decode
/// settles bumps the epoch and discards the first epoch's worker (and its
/// history) entirely — no version=E1 entries can survive into the new scrub.
#[test]
fn second_begin_scrub_invalidates_first_epoch() {
    let coord = coordinator();
    let clip = ClipId::new();
    let frame_duration = 1.0 / 60.0;

    let reader_a = mk_reader(clip, frame_duration, 1.0, 1.0);
    let epoch_a = coord.begin_scrub(1.0, vec![ScrubClip { clip, reader: Box::new(reader_a), frame_duration }]);
    coord.update_scrub(1.0, 24.0);

    let reader_b = mk_reader(clip, frame_duration, 1.0, 1.0);
    let epoch_b = coord.begin_scrub(1.0, vec![ScrubClip { clip, reader: Box::new(reader_b), frame_duration }]);

    assert!(epoch_b.0 > epoch_a.0);
    assert_eq!(coord.current_epoch(), epoch_b);

    std::thread::sleep(Duration::from_millis(20));
    if let Some(history) = coord.history_for(clip) {
        let history = history.lock();
        if let Some(frame) = history.latest() {
            assert_ne!(frame.version, Some(epoch_a));
        }
    }
    coord.end_scrub(1.0);
}

/// Proxy trigger: three late-frame reports within the late-frame window
/// latch a trigger at the last reported time; `ensure_spot_proxy` then buckets
/// it per `bucket_span_ms`.
#[test]
fn three_late_frames_trigger_proxy_zone_at_expected_bucket() {
    let config = Arc::new(ScrubConfig::default());
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(NullSink);
    let spot_proxy =
        SpotProxyManager::new(Arc::clone(&config), telemetry, Arc::new(PassthroughExporter)).expect("spot proxy manager");
    let clip = ClipId::new();

    spot_proxy.record_late_frame(clip, 5_000);
    spot_proxy.record_late_frame(clip, 5_100);
    spot_proxy.record_late_frame(clip, 5_250);

    let triggered_at = spot_proxy.consume_late_frame_trigger(clip).expect("trigger should latch after 3 late frames");
    assert_eq!(triggered_at, 5_250);

    spot_proxy.ensure_spot_proxy(clip, "memory://test", triggered_at, 2000, "late-frames", "scrub", None);
    let zone = spot_proxy.zone_for(clip, triggered_at).expect("zone should exist around the trigger");
    assert_eq!(zone.bucket, 5_000 / config.bucket_span_ms);
    assert!(zone.range_ms[0] <= triggered_at && zone.range_ms[1] >= triggered_at, "range must contain the trigger point");
    assert!(zone.export_range_ms[0] < zone.range_ms[0] && zone.export_range_ms[1] > zone.range_ms[1], "export range adds margin");
}
