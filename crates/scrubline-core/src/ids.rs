//! Opaque identities (spec §3): ClipId, Epoch, RandomAccessKey.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity, unique per loaded clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClipId(pub Uuid);

impl ClipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing 64-bit counter, incremented on every `begin_scrub`.
/// Work produced under epoch E is discarded once the coordinator holds epoch > E.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Epoch(pub u64);

impl Epoch {
    pub const FIRST: Epoch = Epoch(1);

    pub fn next(self) -> Epoch {
        Epoch(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Process-wide epoch source. A coordinator owns one; tests can construct
/// their own without reaching for a global.
#[derive(Debug, Default)]
pub struct EpochCounter(AtomicU64);

impl EpochCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Bump and return the new epoch. Called on every `begin_scrub`.
    pub fn bump(&self) -> Epoch {
        Epoch(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> Epoch {
        Epoch(self.0.load(Ordering::SeqCst))
    }
}

/// Identity of a GOP or seek anchor. Two prefetches with equal key and equal
/// `t_pred` within 0.25s are treated as the same session (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RandomAccessKey {
    pub clip: ClipId,
    pub gop_index: u64,
}

impl RandomAccessKey {
    /// Window (seconds) within which two requests at the same key and target
    /// collapse into one session.
    pub const SESSION_WINDOW_SECS: f64 = 0.25;

    pub fn same_session(&self, other: &RandomAccessKey, t_pred_a: f64, t_pred_b: f64) -> bool {
        self == other && (t_pred_a - t_pred_b).abs() <= Self::SESSION_WINDOW_SECS
    }
}
