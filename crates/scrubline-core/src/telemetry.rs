//! Structured event emission to a pluggable sink (spec §6, expanded §10.2).
//!
//! The teacher has no telemetry layer of its own — `velocut-media` logs with
//! bare `eprintln!("[media] ...")`/`eprintln!("[pb] ...")` calls. Here the
//! event names are a first-class part of the contract (§6 enumerates them),
//! so they're promoted to a small struct + trait; the default sink keeps the
//! teacher's terse bracket-prefixed register.

use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

/// A field value attached to a telemetry event. Kept small and non-generic
/// so `TelemetrySink` stays object-safe.
#[derive(Clone, Debug)]
pub enum TelemetryValue {
    Str(String),
    F64(f64),
    I64(i64),
    U64(u64),
    Bool(bool),
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryValue::Str(s) => write!(f, "{s}"),
            TelemetryValue::F64(v) => write!(f, "{v:.4}"),
            TelemetryValue::I64(v) => write!(f, "{v}"),
            TelemetryValue::U64(v) => write!(f, "{v}"),
            TelemetryValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from_value {
    ($t:ty, $variant:ident) => {
        impl From<$t> for TelemetryValue {
            fn from(v: $t) -> Self {
                TelemetryValue::$variant(v.into())
            }
        }
    };
}
impl_from_value!(&str, Str);
impl_from_value!(String, Str);
impl_from_value!(f64, F64);
impl_from_value!(i64, I64);
impl_from_value!(u64, U64);
impl_from_value!(bool, Bool);

/// One structured event: a fixed name from the §6 catalogue, a field list,
/// and the instant it was recorded.
#[derive(Clone, Debug)]
pub struct TelemetryEvent {
    pub name: &'static str,
    pub fields: Vec<(&'static str, TelemetryValue)>,
    pub at: Instant,
}

impl TelemetryEvent {
    pub fn new(name: &'static str) -> Self {
        Self { name, fields: Vec::new(), at: Instant::now() }
    }

    pub fn with(mut self, key: &'static str, value: impl Into<TelemetryValue>) -> Self {
        self.fields.push((key, value.into()));
        self
    }
}

/// Event names enumerated in spec §6. Kept as associated consts rather than
/// an enum so new event kinds don't require touching every match arm in
/// every sink implementor.
pub mod events {
    pub const SCRUB_STATE_CHANGE: &str = "SCRUB_STATE_CHANGE";
    pub const DECODE: &str = "DECODE";
    pub const COALESCE: &str = "COALESCE";
    pub const HISTORY_CHECK: &str = "HISTORY_CHECK";
    pub const REVERSE_LZ: &str = "REVERSE_LZ";
    pub const STOP_METRIC: &str = "STOP_METRIC";
    pub const SPOT_PROXY_TRIGGER: &str = "SPOT_PROXY_TRIGGER";
    pub const SPOT_PROXY_START: &str = "SPOT_PROXY_START";
    pub const SPOT_PROXY_READY: &str = "SPOT_PROXY_READY";
    pub const SPOT_PROXY_FAIL: &str = "SPOT_PROXY_FAIL";
    pub const SPOT_PROXY_HIT: &str = "SPOT_PROXY_HIT";
    pub const SPOT_PROXY_LEAVE: &str = "SPOT_PROXY_LEAVE";
    pub const SPOT_PROXY_STATUS: &str = "SPOT_PROXY_STATUS";
    pub const TICK: &str = "TICK";
    pub const AV_SYNC: &str = "AV_SYNC";
}

/// Pluggable sink for telemetry events. Dependency-injected per the
/// Singletons design note (spec §9) rather than a process-wide global, so
/// tests can swap in a `RecordingSink` without touching shared state.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Default sink: one line per event, in the teacher's bracket-prefixed style.
pub struct StderrSink {
    prefix: &'static str,
}

impl StderrSink {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }
}

impl Default for StderrSink {
    fn default() -> Self {
        Self::new("scrub")
    }
}

impl TelemetrySink for StderrSink {
    fn emit(&self, event: TelemetryEvent) {
        let fields = event
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        eprintln!("[{}] {} {}", self.prefix, event.name, fields);
    }
}

/// Discards every event. Useful when the caller just wants the side effects
/// (retarget, eviction, ...) without the logging noise.
#[derive(Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Captures events for assertions in tests.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().unwrap().iter().filter(|e| e.name == name).count()
    }

    pub fn last(&self, name: &str) -> Option<TelemetryEvent> {
        self.events.lock().unwrap().iter().rev().find(|e| e.name == name).cloned()
    }
}

impl TelemetrySink for RecordingSink {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_captures_fields() {
        let sink = RecordingSink::new();
        sink.emit(TelemetryEvent::new(events::DECODE).with("clip", "abc").with("pts", 1.5_f64));
        assert_eq!(sink.count(events::DECODE), 1);
        let last = sink.last(events::DECODE).unwrap();
        assert_eq!(last.fields[0].0, "clip");
    }
}
