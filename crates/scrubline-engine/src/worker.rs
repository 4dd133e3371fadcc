//! ScrubWorker (spec §4.4): one decode thread per visible clip during a
//! scrub, gated by per-clip/global admission semaphores and a rate gate,
//! driving a `WindowedReader` and writing hits into the clip's
//! `FrameHistoryManager`.
//!
//! Grounded on `MediaWorker`'s scrub-decode thread in
//! `velocut-media/src/worker.rs`: a dedicated thread blocking on a command
//! channel, reusing a stateful decoder, reopening it on backward jumps. The
//! teacher's single always-freshest `frame_req` slot is generalized here to
//! a full command enum (`Start`/`Retarget`/`Stop`/`Deadline`) per the actor
//! re-expression the spec's Design Notes call for (§9).

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;

use scrubline_core::config::ScrubConfig;
use scrubline_core::error::ScrubError;
use scrubline_core::frame::FrameOrigin;
use scrubline_core::history::FrameHistoryManager;
use scrubline_core::ids::{ClipId, Epoch};
use scrubline_core::landing_zone::LandingZone;
use scrubline_core::reader::{Direction, WindowedReader};
use scrubline_core::telemetry::{events, TelemetryEvent, TelemetrySink};

use crate::admission::Semaphore;
use crate::spot_proxy::ProxyTrigger;

pub enum WorkerCmd {
    Start { epoch: Epoch, target: f64, direction: Direction, zone: LandingZone },
    Retarget { target: f64, direction: Direction, zone: LandingZone },
    Stop { allow_backfill: bool },
    Deadline { at: f64, epoch: Epoch, reply: Sender<Result<f64, ScrubError>> },
    Shutdown,
}

/// Shared handle the coordinator holds per active clip.
pub struct WorkerHandle {
    clip: ClipId,
    cmd_tx: Sender<WorkerCmd>,
    join: Option<JoinHandle<()>>,
    pub history: Arc<Mutex<FrameHistoryManager>>,
}

impl WorkerHandle {
    pub fn clip(&self) -> ClipId {
        self.clip
    }

    pub fn start(&self, epoch: Epoch, target: f64, direction: Direction, zone: LandingZone) {
        let _ = self.cmd_tx.send(WorkerCmd::Start { epoch, target, direction, zone });
    }

    pub fn retarget(&self, target: f64, direction: Direction, zone: LandingZone) {
        let _ = self.cmd_tx.send(WorkerCmd::Retarget { target, direction, zone });
    }

    pub fn stop(&self, allow_backfill: bool) {
        let _ = self.cmd_tx.send(WorkerCmd::Stop { allow_backfill });
    }

    /// Sends an ungated deadline decode request and returns the reply
    /// channel immediately, so a caller can fan out to many workers before
    /// waiting on any of them (spec §4.5 end_scrub's "concurrent
    /// deadline_decode").
    pub fn request_deadline(&self, at: f64, epoch: Epoch) -> Receiver<Result<f64, ScrubError>> {
        let (reply_tx, reply_rx) = bounded(1);
        let _ = self.cmd_tx.send(WorkerCmd::Deadline { at, epoch, reply: reply_tx });
        reply_rx
    }

    /// Ungated decode, bounded by `deadline`. Returns the pts actually
    /// delivered into history (may differ slightly from `at` if the reader
    /// snaps to the nearest frame).
    pub fn deadline_decode(&self, at: f64, epoch: Epoch, deadline: Duration) -> Result<f64, ScrubError> {
        match self.request_deadline(at, epoch).recv_timeout(deadline) {
            Ok(result) => result,
            Err(_) => Err(ScrubError::DeadlineExceeded { clip: self.clip, elapsed_ms: deadline.as_millis() as u64 }),
        }
    }

    pub fn shutdown(mut self) {
        let _ = self.cmd_tx.send(WorkerCmd::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    clip: ClipId,
    frame_duration: f64,
    mut reader: Box<dyn WindowedReader>,
    config: Arc<ScrubConfig>,
    global_decodes: Semaphore,
    reverse_rescue_global: Semaphore,
    telemetry: Arc<dyn TelemetrySink>,
    proxy_tx: Sender<ProxyTrigger>,
) -> WorkerHandle {
    let (cmd_tx, cmd_rx) = bounded(64);
    let history = Arc::new(Mutex::new(FrameHistoryManager::new(&config, frame_duration)));
    let history_for_thread = Arc::clone(&history);
    let clip_decodes = Semaphore::new();
    let reverse_rescue_clip = Semaphore::new();

    let join = thread::spawn(move || {
        let mut state = WorkerState {
            clip,
            frame_duration,
            epoch: Epoch::FIRST,
            target: 0.0,
            direction: Direction::Forward,
            zone: None,
            running: false,
            last_decode_time: None,
            blocked_since: None,
            reverse_denials: 0,
            reverse_override_until: None,
            reverse_failures: 0,
            reverse_backoff: None,
        };

        'outer: loop {
            if !state.running {
                match cmd_rx.recv() {
                    Ok(cmd) => {
                        if !apply_cmd(cmd, &mut state, &history_for_thread, &mut *reader, &config, &telemetry, &proxy_tx) {
                            break 'outer;
                        }
                    }
                    Err(_) => break 'outer,
                }
                continue;
            }

            match cmd_rx.try_recv() {
                Ok(cmd) => {
                    if !apply_cmd(cmd, &mut state, &history_for_thread, &mut *reader, &config, &telemetry, &proxy_tx) {
                        break 'outer;
                    }
                    continue;
                }
                Err(TryRecvError::Disconnected) => break 'outer,
                Err(TryRecvError::Empty) => {}
            }

            let priority_list = state.zone.as_ref().map(|z| z.priority_list()).unwrap_or_default();

            let mut decoded_any = false;
            for pts in priority_list {
                // Let a fresh command interrupt the sweep promptly.
                match cmd_rx.try_recv() {
                    Ok(cmd) => {
                        if !apply_cmd(cmd, &mut state, &history_for_thread, &mut *reader, &config, &telemetry, &proxy_tx) {
                            break 'outer;
                        }
                        break;
                    }
                    Err(TryRecvError::Disconnected) => break 'outer,
                    Err(TryRecvError::Empty) => {}
                }

                if !state.running {
                    break;
                }

                decode_one(pts, &mut state, &history_for_thread, &mut *reader, &config, &telemetry, &clip_decodes,
                    &global_decodes, &reverse_rescue_clip, &reverse_rescue_global, &proxy_tx);
                decoded_any = true;
            }

            if !decoded_any {
                thread::sleep(Duration::from_millis(2));
            }
        }
    });

    WorkerHandle { clip, cmd_tx, join: Some(join), history }
}

struct WorkerState {
    clip: ClipId,
    frame_duration: f64,
    epoch: Epoch,
    target: f64,
    direction: Direction,
    zone: Option<LandingZone>,
    running: bool,
    last_decode_time: Option<Instant>,
    blocked_since: Option<Instant>,
    reverse_denials: u32,
    reverse_override_until: Option<Instant>,
    reverse_failures: u32,
    reverse_backoff: Option<Instant>,
}

#[allow(clippy::too_many_arguments)]
fn apply_cmd(
    cmd: WorkerCmd,
    state: &mut WorkerState,
    history: &Arc<Mutex<FrameHistoryManager>>,
    reader: &mut dyn WindowedReader,
    config: &ScrubConfig,
    telemetry: &Arc<dyn TelemetrySink>,
    proxy_tx: &Sender<ProxyTrigger>,
) -> bool {
    match cmd {
        WorkerCmd::Start { epoch, target, direction, zone } => {
            state.epoch = epoch;
            state.target = target;
            state.direction = direction;
            state.zone = Some(zone);
            state.running = true;
            state.reverse_failures = 0;
            state.reverse_denials = 0;
            telemetry.emit(
                TelemetryEvent::new(events::SCRUB_STATE_CHANGE)
                    .with("clip", state.clip.to_string())
                    .with("epoch", state.epoch.0 as i64),
            );
        }
        WorkerCmd::Retarget { target, direction, zone } => {
            state.target = target;
            state.direction = direction;
            state.zone = Some(zone);
        }
        WorkerCmd::Stop { allow_backfill } => {
            if allow_backfill {
                let _ = try_single_decode(state.target, state, history, reader, config, telemetry, proxy_tx);
            }
            state.running = false;
        }
        WorkerCmd::Deadline { at, epoch, reply } => {
            let result = deadline_decode(at, epoch, state, history, reader, config, telemetry, proxy_tx);
            let _ = reply.send(result);
        }
        WorkerCmd::Shutdown => return false,
    }
    true
}

fn deadline_decode(
    at: f64,
    epoch: Epoch,
    state: &mut WorkerState,
    history: &Arc<Mutex<FrameHistoryManager>>,
    reader: &mut dyn WindowedReader,
    _config: &ScrubConfig,
    _telemetry: &Arc<dyn TelemetrySink>,
    proxy_tx: &Sender<ProxyTrigger>,
) -> Result<f64, ScrubError> {
    let tolerance = state.frame_duration / 2.0;
    match reader.copy_frame(at, state.direction, tolerance) {
        Ok(frame) if frame.version.is_none() || frame.version == Some(epoch) => {
            let pts = frame.pts;
            let mut frame = frame;
            frame.version = Some(epoch);
            frame.origin = FrameOrigin::Scrub;
            history.lock().record(frame, at, Instant::now());
            Ok(pts)
        }
        Ok(_) => Err(ScrubError::Cancelled),
        Err(e) => {
            let _ = proxy_tx.try_send(ProxyTrigger {
                clip: state.clip,
                around_ms: (at * 1000.0) as i64,
                reason: format!("deadline_decode failed: {e}"),
            });
            Err(e)
        }
    }
}

fn try_single_decode(
    at: f64,
    state: &mut WorkerState,
    history: &Arc<Mutex<FrameHistoryManager>>,
    reader: &mut dyn WindowedReader,
    config: &ScrubConfig,
    telemetry: &Arc<dyn TelemetrySink>,
    proxy_tx: &Sender<ProxyTrigger>,
) -> Result<f64, ScrubError> {
    deadline_decode(at, state.epoch, state, history, reader, config, telemetry, proxy_tx)
}

#[allow(clippy::too_many_arguments)]
fn decode_one(
    pts: f64,
    state: &mut WorkerState,
    history: &Arc<Mutex<FrameHistoryManager>>,
    reader: &mut dyn WindowedReader,
    config: &ScrubConfig,
    telemetry: &Arc<dyn TelemetrySink>,
    clip_decodes: &Semaphore,
    global_decodes: &Semaphore,
    reverse_rescue_clip: &Semaphore,
    reverse_rescue_global: &Semaphore,
    proxy_tx: &Sender<ProxyTrigger>,
) {
    let tolerance = state.frame_duration / 2.0;

    // History-first (spec §4.4).
    if history.lock().frame(pts, tolerance, Instant::now()).is_some() {
        telemetry.emit(
            TelemetryEvent::new(events::HISTORY_CHECK)
                .with("clip", state.clip.to_string())
                .with("pts", pts)
                .with("hit", true),
        );
        return;
    }

    let now = Instant::now();

    if state.direction == Direction::Reverse {
        if let Some(until) = state.reverse_backoff {
            if now < until {
                state.blocked_since.get_or_insert(now);
                return;
            }
            state.reverse_backoff = None;
        }
    }

    let min_interval = match state.direction {
        Direction::Forward => config.forward_min_interval,
        Direction::Reverse => config.reverse_min_interval,
    };
    let elapsed = state.last_decode_time.map(|t| now.duration_since(t).as_secs_f64());
    let rate_gate_open = elapsed.map(|e| e >= min_interval).unwrap_or(true);

    let override_active = state
        .reverse_override_until
        .map(|until| now < until)
        .unwrap_or(false);

    if state.direction == Direction::Reverse && !rate_gate_open && !override_active {
        state.reverse_denials += 1;
        if state.reverse_denials >= config.reverse_rate_gate_override_count {
            state.reverse_override_until =
                Some(now + Duration::from_secs_f64(config.reverse_rate_gate_override_cooldown_secs));
            state.reverse_denials = 0;
        }
    }

    let gate_open = rate_gate_open || (state.direction == Direction::Reverse && override_active);
    if !gate_open {
        state.blocked_since.get_or_insert(now);
        maybe_rescue(pts, state, history, reader, config, telemetry, reverse_rescue_clip, reverse_rescue_global, proxy_tx);
        return;
    }
    state.blocked_since = None;

    let burst_window = state
        .last_decode_time
        .map(|t| now.duration_since(t).as_secs_f64() < config.burst_duration_secs)
        .unwrap_or(false);
    let clip_cap = if burst_window { config.max_in_flight_burst_per_clip } else { config.max_in_flight_per_clip };

    let Some(_clip_slot) = clip_decodes.try_acquire(clip_cap) else { return };
    let Some(_global_slot) = global_decodes.try_acquire(config.max_concurrent_decodes) else { return };

    run_decode(pts, state, history, reader, config, telemetry, proxy_tx);
}

#[allow(clippy::too_many_arguments)]
fn maybe_rescue(
    pts: f64,
    state: &mut WorkerState,
    history: &Arc<Mutex<FrameHistoryManager>>,
    reader: &mut dyn WindowedReader,
    config: &ScrubConfig,
    telemetry: &Arc<dyn TelemetrySink>,
    reverse_rescue_clip: &Semaphore,
    reverse_rescue_global: &Semaphore,
    proxy_tx: &Sender<ProxyTrigger>,
) {
    if state.direction != Direction::Reverse {
        return;
    }
    let blocked_for = state.blocked_since.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0);
    if blocked_for < config.reverse_rescue_threshold_secs {
        return;
    }
    let Some(_clip_slot) = reverse_rescue_clip.try_acquire(config.reverse_critical_slots_per_clip) else { return };
    let Some(_global_slot) = reverse_rescue_global.try_acquire(config.reverse_global_slack) else { return };
    state.blocked_since = None;
    run_decode(pts, state, history, reader, config, telemetry, proxy_tx);
}

fn run_decode(
    pts: f64,
    state: &mut WorkerState,
    history: &Arc<Mutex<FrameHistoryManager>>,
    reader: &mut dyn WindowedReader,
    config: &ScrubConfig,
    telemetry: &Arc<dyn TelemetrySink>,
    proxy_tx: &Sender<ProxyTrigger>,
) {
    let tolerance = state.frame_duration / 2.0;
    let mut attempt = 0;
    loop {
        match reader.copy_frame(pts, state.direction, tolerance) {
            Ok(mut frame) => {
                state.last_decode_time = Some(Instant::now());
                if frame.version.is_some() && frame.version != Some(state.epoch) {
                    return; // stale epoch, dropped silently
                }
                frame.version = Some(state.epoch);
                frame.origin = FrameOrigin::Scrub;
                let frame_pts = frame.pts;
                history.lock().record(frame, state.target, Instant::now());
                if state.direction == Direction::Reverse {
                    state.reverse_failures = 0;
                }
                telemetry.emit(
                    TelemetryEvent::new(events::DECODE)
                        .with("clip", state.clip.to_string())
                        .with("pts", frame_pts)
                        .with("direction", if state.direction == Direction::Reverse { "reverse" } else { "forward" }),
                );
                return;
            }
            Err(ScrubError::DecoderMalfunction { .. }) if attempt < 3 => {
                attempt += 1;
                thread::sleep(Duration::from_millis(5));
                continue;
            }
            Err(e) => {
                if state.direction == Direction::Reverse {
                    state.reverse_failures += 1;
                    if state.reverse_failures >= config.reverse_failure_recovery_threshold {
                        let backoff = (config.reverse_failure_backoff_secs
                            * 2f64.powi(state.reverse_failures as i32 - config.reverse_failure_recovery_threshold as i32))
                            .min(config.reverse_failure_max_backoff_secs);
                        state.reverse_backoff = Some(Instant::now() + Duration::from_secs_f64(backoff));
                    }
                }
                let _ = proxy_tx.try_send(ProxyTrigger {
                    clip: state.clip,
                    around_ms: (pts * 1000.0) as i64,
                    reason: format!("decode failed: {e}"),
                });
                return;
            }
        }
    }
}
