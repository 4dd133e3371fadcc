//! ScrubCoordinator (spec §4.5): owns every active `ScrubWorker`, the scrub
//! epoch, velocity smoothing, and the predicted-target fan-out.
//!
//! Grounded on `MediaWorker` as the top-level owner of per-purpose threads in
//! `velocut-media/src/worker.rs` — here one worker per clip instead of one
//! worker for the whole app, coordinated through `begin_scrub`/
//! `update_scrub`/`end_scrub` rather than ad hoc method calls.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use scrubline_core::config::ScrubConfig;
use scrubline_core::history::FrameHistoryManager;
use scrubline_core::ids::{ClipId, Epoch, EpochCounter};
use scrubline_core::landing_zone::{LandingZoneManager, ScrubMetrics, ScrubSpeedState};
use scrubline_core::reader::{Direction, WindowedReader};
use scrubline_core::telemetry::{events, TelemetryEvent, TelemetrySink};

use crate::admission::Semaphore;
use crate::spot_proxy::{ProxyTrigger, SpotProxyManager};
use crate::worker::{self, WorkerHandle};

const VELOCITY_RING_CAPACITY: usize = 20;
const VELOCITY_AVG_WINDOW_SECS: f64 = 0.2;

/// A clip offered to `begin_scrub`: its reader and display-rate frame
/// duration. The coordinator owns the reader for the lifetime of the scrub.
pub struct ScrubClip {
    pub clip: ClipId,
    pub reader: Box<dyn WindowedReader>,
    pub frame_duration: f64,
}

pub struct ScrubCoordinator {
    config: Arc<ScrubConfig>,
    telemetry: Arc<dyn TelemetrySink>,
    landing_zones: Arc<LandingZoneManager>,
    epoch_counter: EpochCounter,
    workers: Mutex<HashMap<ClipId, WorkerHandle>>,
    frame_durations: Mutex<HashMap<ClipId, f64>>,
    global_decodes: Semaphore,
    reverse_rescue_global: Semaphore,
    proxy_tx: Sender<ProxyTrigger>,
    velocity_samples: Mutex<VecDeque<(Instant, f64)>>,
    metrics: Mutex<ScrubMetrics>,
    last_state_change: Mutex<Instant>,
    direction_since: Mutex<(Direction, Instant)>,
}

impl ScrubCoordinator {
    pub fn new(
        config: Arc<ScrubConfig>,
        telemetry: Arc<dyn TelemetrySink>,
        spot_proxy: Arc<SpotProxyManager>,
        default_asset_hint: String,
    ) -> Self {
        let (proxy_tx, proxy_rx) = bounded::<ProxyTrigger>(64);
        {
            let spot_proxy = Arc::clone(&spot_proxy);
            std::thread::spawn(move || {
                for trigger in proxy_rx {
                    spot_proxy.ensure_spot_proxy(
                        trigger.clip,
                        &default_asset_hint,
                        trigger.around_ms,
                        2000,
                        &trigger.reason,
                        "deadline-miss",
                        None,
                    );
                }
            });
        }

        Self {
            landing_zones: Arc::new(LandingZoneManager::new((*config).clone())),
            config,
            telemetry,
            epoch_counter: EpochCounter::new(),
            workers: Mutex::new(HashMap::new()),
            frame_durations: Mutex::new(HashMap::new()),
            global_decodes: Semaphore::new(),
            reverse_rescue_global: Semaphore::new(),
            proxy_tx,
            velocity_samples: Mutex::new(VecDeque::with_capacity(VELOCITY_RING_CAPACITY)),
            metrics: Mutex::new(ScrubMetrics {
                velocity_fps: 0.0,
                direction: Direction::Forward,
                state: ScrubSpeedState::Idle,
                epoch: Epoch::FIRST,
            }),
            last_state_change: Mutex::new(Instant::now()),
            direction_since: Mutex::new((Direction::Forward, Instant::now())),
        }
    }

    pub fn current_epoch(&self) -> Epoch {
        self.metrics.lock().epoch
    }

    pub fn metrics(&self) -> ScrubMetrics {
        *self.metrics.lock()
    }

    pub fn history_for(&self, clip: ClipId) -> Option<Arc<Mutex<FrameHistoryManager>>> {
        self.workers.lock().get(&clip).map(|w| Arc::clone(&w.history))
    }

    /// Bumps the epoch and spawns (or respawns) a worker per clip, starting
    /// each one aimed at `time` (spec §4.5 begin_scrub).
    pub fn begin_scrub(&self, time: f64, clips: Vec<ScrubClip>) -> Epoch {
        let epoch = self.epoch_counter.bump();
        self.velocity_samples.lock().clear();
        *self.metrics.lock() = ScrubMetrics { velocity_fps: 0.0, direction: Direction::Forward, state: ScrubSpeedState::Idle, epoch };
        *self.direction_since.lock() = (Direction::Forward, Instant::now());

        let mut workers = self.workers.lock();
        for old in workers.drain().map(|(_, w)| w) {
            old.shutdown();
        }
        let mut frame_durations = self.frame_durations.lock();
        frame_durations.clear();
        for clip in clips {
            let zone = self.landing_zones.compute(time, 0.0, Direction::Forward, clip.frame_duration, None, None, false);
            let handle = worker::spawn(
                clip.clip,
                clip.frame_duration,
                clip.reader,
                Arc::clone(&self.config),
                self.global_decodes.clone(),
                self.reverse_rescue_global.clone(),
                Arc::clone(&self.telemetry),
                self.proxy_tx.clone(),
            );
            handle.start(epoch, time, Direction::Forward, zone);
            frame_durations.insert(clip.clip, clip.frame_duration);
            workers.insert(clip.clip, handle);
        }
        drop(frame_durations);
        self.telemetry.emit(TelemetryEvent::new(events::SCRUB_STATE_CHANGE).with("epoch", epoch.0 as i64).with("phase", "begin"));
        epoch
    }

    /// Samples velocity, recomputes direction/state/`t_pred`, and retargets
    /// every active worker (spec §4.5 update_scrub).
    pub fn update_scrub(&self, time: f64, velocity_fps: f64) -> f64 {
        let now = Instant::now();
        {
            let mut samples = self.velocity_samples.lock();
            if samples.len() >= VELOCITY_RING_CAPACITY {
                samples.pop_front();
            }
            samples.push_back((now, velocity_fps));
        }

        let smoothed = self.smoothed_velocity(now);
        let direction = Direction::from_velocity(smoothed);
        let new_state = classify_speed(smoothed, self.config.velocity_fast_threshold_fps, self.config.velocity_medium_threshold_fps);

        let mut metrics = self.metrics.lock();
        let mut last_change = self.last_state_change.lock();
        if new_state != metrics.state && now.duration_since(*last_change).as_secs_f64() >= self.config.velocity_hysteresis_secs {
            metrics.state = new_state;
            *last_change = now;
        }
        metrics.velocity_fps = smoothed;
        metrics.direction = direction;
        let epoch = metrics.epoch;
        drop(last_change);
        drop(metrics);

        let t_pred = (time + (smoothed * self.config.prediction_factor).clamp(-self.config.prediction_clamp, self.config.prediction_clamp)).max(0.0);

        // Stable-reverse submode needs sustained reverse travel, not just the
        // current sample's sign — track how long direction has held steady.
        let stable_reverse = {
            let mut direction_since = self.direction_since.lock();
            if direction != direction_since.0 {
                *direction_since = (direction, now);
            }
            direction == Direction::Reverse
                && now.duration_since(direction_since.1).as_secs_f64() >= self.config.velocity_hysteresis_secs
        };

        let workers = self.workers.lock();
        let frame_durations = self.frame_durations.lock();
        for handle in workers.values() {
            let frame_duration = frame_durations.get(&handle.clip()).copied().unwrap_or(1.0 / 30.0);
            let zone = self.landing_zones.compute(t_pred, smoothed, direction, frame_duration, None, None, stable_reverse);
            handle.retarget(t_pred, direction, zone);
        }
        drop(frame_durations);
        drop(workers);

        self.telemetry.emit(
            TelemetryEvent::new(events::SCRUB_STATE_CHANGE)
                .with("epoch", epoch.0 as i64)
                .with("t_pred", t_pred)
                .with("velocity", smoothed),
        );
        t_pred
    }

    /// Exponential moving average (spec §6 `velocity_ema_alpha`) over the
    /// samples within `VELOCITY_AVG_WINDOW_SECS`, oldest to newest, so a
    /// fresh direction reversal dominates faster than a plain mean would.
    fn smoothed_velocity(&self, now: Instant) -> f64 {
        let samples = self.velocity_samples.lock();
        let mut recent = samples
            .iter()
            .filter(|(t, _)| now.duration_since(*t).as_secs_f64() <= VELOCITY_AVG_WINDOW_SECS)
            .map(|(_, v)| *v);

        let Some(first) = recent.next() else { return 0.0 };
        let alpha = self.config.velocity_ema_alpha;
        recent.fold(first, |ema, v| alpha * v + (1.0 - alpha) * ema)
    }

    /// Deadline-decodes the exact final time on every worker (bounded 66 ms
    /// total), stops each with backfill allowed, then clears state back to
    /// `Idle` (spec §4.5 end_scrub).
    pub fn end_scrub(&self, time: f64) {
        let epoch = self.current_epoch();
        let deadline = Duration::from_secs_f64(self.config.stop_deadline_target);
        let overall_deadline = Instant::now() + deadline;

        let mut workers = self.workers.lock();
        // Fan out before waiting: every worker starts its deadline decode
        // concurrently, one shared wall-clock budget covers all of them.
        let pending: Vec<_> = workers.values().map(|h| h.request_deadline(time, epoch)).collect();
        for reply_rx in pending {
            let remaining = overall_deadline.saturating_duration_since(Instant::now());
            let _ = reply_rx.recv_timeout(remaining);
        }
        for handle in workers.values() {
            handle.stop(true);
        }
        for (_, handle) in workers.drain() {
            handle.shutdown();
        }
        drop(workers);
        self.frame_durations.lock().clear();

        *self.metrics.lock() = ScrubMetrics { velocity_fps: 0.0, direction: Direction::Forward, state: ScrubSpeedState::Idle, epoch };
        self.velocity_samples.lock().clear();
        *self.direction_since.lock() = (Direction::Forward, Instant::now());
        self.telemetry.emit(TelemetryEvent::new(events::SCRUB_STATE_CHANGE).with("epoch", epoch.0 as i64).with("phase", "end"));
    }
}

/// Classifies an active scrub's magnitude into a speed bucket (spec §4.5:
/// "Fast if |v|>30, Medium if >10, else Slow"). `Idle` is reserved for the
/// not-scrubbing resting state and is never returned here — a velocity of
/// zero during a live scrub still classifies as `Slow` (spec §8).
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

#[cfg(test)]
mod tests {
    use super::classify_speed;
    use scrubline_core::landing_zone::ScrubSpeedState;

    #[test]
    fn classify_speed_matches_spec_thresholds() {
        assert_eq!(classify_speed(0.0, 30.0, 10.0), ScrubSpeedState::Slow);
        assert_eq!(classify_speed(5.0, 30.0, 10.0), ScrubSpeedState::Slow);
        assert_eq!(classify_speed(15.0, 30.0, 10.0), ScrubSpeedState::Medium);
        assert_eq!(classify_speed(40.0, 30.0, 10.0), ScrubSpeedState::Fast);
        assert_eq!(classify_speed(-40.0, 30.0, 10.0), ScrubSpeedState::Fast);
    }
}
