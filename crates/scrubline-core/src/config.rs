//! Runtime configuration (spec §6, expanded §10.3).
//!
//! Every tunable is a typed field with the spec's stated default. `from_env`
//! reads `SCRUB_<NAME>` overrides; a missing or unparsable variable falls
//! back to the default rather than failing startup — matching the teacher's
//! preference for graceful degradation over panics in non-decoder paths.

use std::env;

/// All scheduler tunables enumerated in spec §6, plus the additional
/// per-component constants §4 names inline (rescue slots, watchdogs, ...).
#[derive(Clone, Debug, PartialEq)]
pub struct ScrubConfig {
    // ── WindowedReader ──────────────────────────────────────────────────
    pub scrub_reader_window: f64,

    // ── ScrubCoordinator (§4.5) ─────────────────────────────────────────
    pub prediction_factor: f64,
    pub prediction_clamp: f64,
    pub velocity_ema_alpha: f64,
    pub velocity_hysteresis_secs: f64,
    pub velocity_fast_threshold_fps: f64,
    pub velocity_medium_threshold_fps: f64,

    // ── LandingZoneManager (§4.3) ───────────────────────────────────────
    pub reverse_lz_frames: u32,
    pub forward_lz_frames: u32,
    pub adaptive_lz_mult: f64,
    pub adaptive_lz_min: u32,
    pub adaptive_lz_max: u32,
    pub max_warm_window_secs: f64,
    pub stable_reverse_behind_min: u32,
    pub stable_reverse_behind_max: u32,
    pub repair_delta_threshold_frac: f64,

    // ── FrameHistoryManager (§4.2) ──────────────────────────────────────
    pub cache_bytes_budget: u64,
    pub cache_bias_frames: u32,
    pub cache_byte_weight: f64,
    pub cache_scrub_priority_boost: f64,
    pub cache_max_age_secs: f64,

    // ── ScrubWorker admission + rate gates (§4.4) ───────────────────────
    pub max_in_flight_per_clip: u32,
    pub max_in_flight_burst_per_clip: u32,
    pub burst_duration_secs: f64,
    pub max_concurrent_decodes: u32,
    pub reverse_min_interval: f64,
    pub forward_min_interval: f64,
    pub admission_never_cancel_running: bool,
    pub reverse_rescue_threshold_secs: f64,
    pub reverse_critical_slots_per_clip: u32,
    pub reverse_global_slack: u32,
    pub reverse_rate_gate_override_count: u32,
    pub reverse_rate_gate_override_cooldown_secs: f64,
    pub reverse_failure_recovery_threshold: u32,
    pub reverse_failure_backoff_secs: f64,
    pub reverse_failure_max_backoff_secs: f64,
    pub reverse_watchdog_timeout_secs: f64,

    // ── ScrubCoordinator / stop path ─────────────────────────────────────
    pub stop_idle_threshold: f64,
    pub stop_deadline_target: f64,
    pub stop_backfill_window: f64,

    // ── FramePipeline (§4.6) ─────────────────────────────────────────────
    pub pipeline_ring_capacity: usize,
    pub pipeline_look_ahead_frames: u32,
    pub pipeline_look_ahead_min_secs: f64,
    pub pipeline_look_ahead_max_secs: f64,
    pub pipeline_sleep_floor_secs: f64,

    // ── SpotProxyManager (§4.7) ──────────────────────────────────────────
    pub max_zones: u32,
    pub zone_ttl_secs: f64,
    pub bucket_span_ms: i64,
    pub late_frame_threshold: u32,
    pub late_frame_window_ms: i64,
    pub proxy_export_margin_secs: f64,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            scrub_reader_window: 1.0,

            prediction_factor: 0.12,
            prediction_clamp: 0.5,
            velocity_ema_alpha: 0.3,
            velocity_hysteresis_secs: 0.175,
            velocity_fast_threshold_fps: 30.0,
            velocity_medium_threshold_fps: 10.0,

            reverse_lz_frames: 5,
            forward_lz_frames: 2,
            adaptive_lz_mult: 0.5,
            adaptive_lz_min: 2,
            adaptive_lz_max: 12,
            max_warm_window_secs: 2.0,
            stable_reverse_behind_min: 8,
            stable_reverse_behind_max: 12,
            repair_delta_threshold_frac: 0.75,

            cache_bytes_budget: 200 * 1024 * 1024,
            cache_bias_frames: 5,
            cache_byte_weight: 1.0,
            cache_scrub_priority_boost: 500.0,
            cache_max_age_secs: 30.0,

            max_in_flight_per_clip: 8,
            max_in_flight_burst_per_clip: 12,
            burst_duration_secs: 0.25,
            max_concurrent_decodes: 10,
            reverse_min_interval: 0.008,
            forward_min_interval: 0.033,
            admission_never_cancel_running: true,
            reverse_rescue_threshold_secs: 0.1,
            reverse_critical_slots_per_clip: 2,
            reverse_global_slack: 2,
            reverse_rate_gate_override_count: 5,
            reverse_rate_gate_override_cooldown_secs: 0.5,
            reverse_failure_recovery_threshold: 3,
            reverse_failure_backoff_secs: 0.05,
            reverse_failure_max_backoff_secs: 0.5,
            reverse_watchdog_timeout_secs: 0.6,

            stop_idle_threshold: 0.2,
            stop_deadline_target: 0.066,
            stop_backfill_window: 0.5,

            pipeline_ring_capacity: 12,
            pipeline_look_ahead_frames: 6,
            pipeline_look_ahead_min_secs: 0.18,
            pipeline_look_ahead_max_secs: 0.6,
            pipeline_sleep_floor_secs: 0.00417,

            max_zones: 32,
            zone_ttl_secs: 1200.0,
            bucket_span_ms: 2000,
            late_frame_threshold: 3,
            late_frame_window_ms: 300,
            proxy_export_margin_secs: 0.5,
        }
    }
}

impl ScrubConfig {
    /// Build from the compiled defaults, applying any `SCRUB_<NAME>`
    /// environment overrides found. Never panics: a malformed override is
    /// logged via `warn` (the caller can route that through telemetry) and
    /// the default is kept.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        let mut warnings = Vec::new();
        macro_rules! ov_f64 {
            ($field:ident, $name:literal) => {
                if let Some(v) = read_f64($name, &mut warnings) {
                    cfg.$field = v;
                }
            };
        }
        macro_rules! ov_u32 {
            ($field:ident, $name:literal) => {
                if let Some(v) = read_u32($name, &mut warnings) {
                    cfg.$field = v;
                }
            };
        }
        macro_rules! ov_i64 {
            ($field:ident, $name:literal) => {
                if let Some(v) = read_i64($name, &mut warnings) {
                    cfg.$field = v;
                }
            };
        }
        macro_rules! ov_u64 {
            ($field:ident, $name:literal) => {
                if let Some(v) = read_u64($name, &mut warnings) {
                    cfg.$field = v;
                }
            };
        }
        macro_rules! ov_bool {
            ($field:ident, $name:literal) => {
                if let Some(v) = read_bool($name, &mut warnings) {
                    cfg.$field = v;
                }
            };
        }

        ov_f64!(scrub_reader_window, "SCRUB_SCRUB_READER_WINDOW");
        ov_f64!(prediction_factor, "SCRUB_PREDICTION_FACTOR");
        ov_f64!(prediction_clamp, "SCRUB_PREDICTION_CLAMP");
        ov_f64!(velocity_ema_alpha, "SCRUB_VELOCITY_EMA_ALPHA");
        ov_f64!(velocity_hysteresis_secs, "SCRUB_VELOCITY_HYSTERESIS");
        ov_u32!(reverse_lz_frames, "SCRUB_REVERSE_LZ_FRAMES");
        ov_u32!(forward_lz_frames, "SCRUB_FORWARD_LZ_FRAMES");
        ov_f64!(adaptive_lz_mult, "SCRUB_ADAPTIVE_LZ_MULT");
        ov_u32!(adaptive_lz_min, "SCRUB_ADAPTIVE_LZ_MIN");
        ov_u32!(adaptive_lz_max, "SCRUB_ADAPTIVE_LZ_MAX");
        ov_u64!(cache_bytes_budget, "SCRUB_CACHE_BYTES_BUDGET");
        ov_u32!(cache_bias_frames, "SCRUB_CACHE_BIAS_FRAMES");
        ov_u32!(max_in_flight_per_clip, "SCRUB_MAX_IN_FLIGHT_PER_CLIP");
        ov_u32!(max_concurrent_decodes, "SCRUB_MAX_CONCURRENT_DECODES");
        ov_f64!(reverse_min_interval, "SCRUB_REVERSE_MIN_INTERVAL");
        ov_f64!(forward_min_interval, "SCRUB_FORWARD_MIN_INTERVAL");
        ov_f64!(stop_idle_threshold, "SCRUB_STOP_IDLE_THRESHOLD");
        ov_f64!(stop_deadline_target, "SCRUB_STOP_DEADLINE_TARGET");
        ov_f64!(stop_backfill_window, "SCRUB_STOP_BACKFILL_WINDOW");
        ov_u32!(max_zones, "SCRUB_MAX_ZONES");
        ov_f64!(zone_ttl_secs, "SCRUB_ZONE_TTL");
        ov_i64!(bucket_span_ms, "SCRUB_BUCKET_SPAN_MS");
        ov_u32!(late_frame_threshold, "SCRUB_LATE_FRAME_THRESHOLD");
        ov_i64!(late_frame_window_ms, "SCRUB_LATE_FRAME_WINDOW_MS");
        ov_bool!(admission_never_cancel_running, "SCRUB_ADMISSION_NEVER_CANCEL_RUNNING");

        for w in warnings {
            eprintln!("[scrub] config: {w}");
        }
        cfg
    }
}

fn read_f64(name: &str, warnings: &mut Vec<String>) -> Option<f64> {
    read_raw(name).and_then(|raw| parse_or_warn(name, &raw, warnings))
}
fn read_u32(name: &str, warnings: &mut Vec<String>) -> Option<u32> {
    read_raw(name).and_then(|raw| parse_or_warn(name, &raw, warnings))
}
fn read_u64(name: &str, warnings: &mut Vec<String>) -> Option<u64> {
    read_raw(name).and_then(|raw| parse_or_warn(name, &raw, warnings))
}
fn read_i64(name: &str, warnings: &mut Vec<String>) -> Option<i64> {
    read_raw(name).and_then(|raw| parse_or_warn(name, &raw, warnings))
}
fn read_bool(name: &str, warnings: &mut Vec<String>) -> Option<bool> {
    read_raw(name).and_then(|raw| match raw.as_str() {
        "0" => Some(false),
        "1" => Some(true),
        _ => {
            warnings.push(format!("{name}={raw:?} is not 0|1, keeping default"));
            None
        }
    })
}

fn read_raw(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn parse_or_warn<T: std::str::FromStr>(name: &str, raw: &str, warnings: &mut Vec<String>) -> Option<T> {
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warnings.push(format!("{name}={raw:?} failed to parse, keeping default"));
            None
        }
    }
}
