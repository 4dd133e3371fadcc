//! TimelineTicker (spec §4.1): a single dedicated thread that emits the
//! frame clock at the display timebase rate, computed from an integer frame
//! count rather than wall-clock subtraction so drift never accumulates.
//!
//! Grounded on the teacher's dedicated-thread-per-concern shape
//! (`MediaWorker`'s playback thread in `velocut-media/src/worker.rs`): one
//! `std::thread` fed by a small bounded command channel, publishing results
//! for readers to pull rather than pushing into a UI callback directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use scrubline_core::time::FrameTimebase;

const RATE_EPSILON: f64 = 1e-6;
const TIMER_LEEWAY_SECS: f64 = 0.001;

/// A read of the clock's current state. Other components poll this instead
/// of subscribing to ticks — it is the *source of truth* per spec §4.1.
#[derive(Clone, Copy, Debug)]
pub struct ClockSnapshot {
    pub time: f64,
    pub host_time: Instant,
    pub rate: f64,
}

#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<Mutex<ClockSnapshot>>,
}

impl PlaybackClock {
    fn new(snapshot: ClockSnapshot) -> Self {
        Self { inner: Arc::new(Mutex::new(snapshot)) }
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        *self.inner.lock()
    }

    fn publish(&self, snapshot: ClockSnapshot) {
        *self.inner.lock() = snapshot;
    }
}

enum TickerCmd {
    UpdateRate(f64),
    Seek(f64),
    Resync(f64),
    SetTimebase(FrameTimebase),
    Stop,
}

/// Monotonic frame-accurate clock. `start` spawns the ticker thread; dropping
/// or calling `stop` joins it.
pub struct TimelineTicker {
    cmd_tx: Sender<TickerCmd>,
    clock: PlaybackClock,
    join: Option<JoinHandle<()>>,
    stopped: Arc<AtomicBool>,
}

struct TickerState {
    timebase: FrameTimebase,
    rate: f64,
    frame_count: u64,
    base_time: f64,
    base_host: Instant,
}

impl TickerState {
    fn reset(&mut self, base_time: f64, rate: f64, now: Instant) {
        self.base_time = base_time;
        self.rate = rate;
        self.base_host = now;
        self.frame_count = 0;
    }

    /// `base_time + frame_count * frame_duration * rate` — never wall-clock
    /// subtraction, per spec §4.1's anti-drift rationale.
    fn current_time(&self) -> f64 {
        self.base_time + self.frame_count as f64 * self.timebase.frame_duration_secs() * self.rate
    }
}

impl TimelineTicker {
    pub fn start(
        from: f64,
        rate: f64,
        timebase: FrameTimebase,
        mut handler: impl FnMut(f64) + Send + 'static,
    ) -> Self {
        let (cmd_tx, cmd_rx) = bounded(32);
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_for_thread = Arc::clone(&stopped);

        let start_snapshot = ClockSnapshot { time: from, host_time: Instant::now(), rate };
        let clock = PlaybackClock::new(start_snapshot);
        let clock_for_thread = clock.clone();

        let join = thread::spawn(move || {
            let mut state = TickerState {
                timebase,
                rate,
                frame_count: 0,
                base_time: from,
                base_host: Instant::now(),
            };
            clock_for_thread.publish(ClockSnapshot { time: from, host_time: state.base_host, rate });
            handler(from);

            loop {
                let period = state.timebase.frame_duration_secs().max(TIMER_LEEWAY_SECS);
                match cmd_rx.recv_timeout(Duration::from_secs_f64(period)) {
                    Ok(TickerCmd::Stop) => break,
                    Ok(TickerCmd::UpdateRate(new_rate)) => {
                        let t = state.current_time();
                        state.reset(t, new_rate, Instant::now());
                    }
                    Ok(TickerCmd::Seek(to)) => {
                        state.reset(to, state.rate, Instant::now());
                        clock_for_thread.publish(ClockSnapshot {
                            time: to,
                            host_time: state.base_host,
                            rate: state.rate,
                        });
                        handler(to);
                    }
                    Ok(TickerCmd::Resync(to)) => {
                        state.reset(to, state.rate, Instant::now());
                        clock_for_thread.publish(ClockSnapshot {
                            time: to,
                            host_time: state.base_host,
                            rate: state.rate,
                        });
                    }
                    Ok(TickerCmd::SetTimebase(tb)) => {
                        let t = state.current_time();
                        state.timebase = tb;
                        state.reset(t, state.rate, Instant::now());
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        if state.rate.abs() <= RATE_EPSILON {
                            continue; // paused: no tick, handler only fires on seek
                        }
                        state.frame_count += 1;
                        let t = state.current_time();
                        clock_for_thread.publish(ClockSnapshot {
                            time: t,
                            host_time: Instant::now(),
                            rate: state.rate,
                        });
                        handler(t);
                    }
                }
            }
            stopped_for_thread.store(true, Ordering::Release);
        });

        Self { cmd_tx, clock, join: Some(join), stopped }
    }

    pub fn clock(&self) -> PlaybackClock {
        self.clock.clone()
    }

    pub fn update_rate(&self, new_rate: f64) {
        let _ = self.cmd_tx.send(TickerCmd::UpdateRate(new_rate));
    }

    pub fn seek(&self, to: f64) {
        let _ = self.cmd_tx.send(TickerCmd::Seek(to));
    }

    pub fn resync(&self, to: f64) {
        let _ = self.cmd_tx.send(TickerCmd::Resync(to));
    }

    pub fn set_frame_timebase(&self, tb: FrameTimebase) {
        let _ = self.cmd_tx.send(TickerCmd::SetTimebase(tb));
    }

    pub fn stop(&mut self) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let _ = self.cmd_tx.send(TickerCmd::Stop);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for TimelineTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn ticker_invokes_handler_once_on_seek_while_paused() {
        let (tx, rx) = mpsc::channel();
        let mut ticker = TimelineTicker::start(0.0, 0.0, FrameTimebase::NTSC_30, move |t| {
            let _ = tx.send(t);
        });
        assert_eq!(rx.recv().unwrap(), 0.0);
        ticker.seek(5.0);
        assert_eq!(rx.recv().unwrap(), 5.0);
        ticker.stop();
    }

    #[test]
    fn ticker_reports_increasing_time_when_running() {
        let (tx, rx) = mpsc::channel();
        let mut ticker = TimelineTicker::start(0.0, 1.0, FrameTimebase::FILM_24, move |t| {
            let _ = tx.send(t);
        });
        let first = rx.recv().unwrap();
        let second = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert!(second > first);
        ticker.stop();
    }
}
