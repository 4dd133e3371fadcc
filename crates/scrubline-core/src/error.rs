//! Domain error kinds shared across the scheduler (spec §7).
//!
//! Unlike the teacher's single-binary `anyhow::Result` style, callers here
//! branch on error *kind* (a `DecoderMalfunction` is retried, a `CacheMiss`
//! triggers a prefetch, a `Cancelled` is dropped silently) so the kind is
//! named in the type rather than left to string inspection.

use crate::ids::ClipId;

/// Domain error kinds a `WindowedReader` or scheduler component can surface.
#[derive(Debug, thiserror::Error)]
pub enum ScrubError {
    /// Requested frame not present in history; caller should trigger a prefetch.
    #[error("cache miss for clip {clip:?} at t={time:.3}")]
    CacheMiss { clip: ClipId, time: f64 },

    /// The reader's sliding window no longer covers the request; it must rebuild.
    #[error("reader window expired for clip {clip:?} at t={time:.3}")]
    WindowExpired { clip: ClipId, time: f64 },

    /// Transient decoder failure. Distinguished from other kinds so callers
    /// know retrying (up to 3 times, per spec §4.4) is worthwhile.
    #[error("decoder malfunction on clip {clip:?}: {reason}")]
    DecoderMalfunction { clip: ClipId, reason: String },

    /// The requested sample has no data in this format (e.g. audio-only asset).
    #[error("format missing for clip {clip:?}")]
    FormatMissing { clip: ClipId },

    /// A deadline decode exceeded its wall-clock bound.
    #[error("deadline exceeded for clip {clip:?} after {elapsed_ms}ms")]
    DeadlineExceeded { clip: ClipId, elapsed_ms: u64 },

    /// A spot-proxy export failed; the zone falls back to `Original`.
    #[error("proxy export failed for clip {clip:?}: {reason}")]
    ExportFailed { clip: ClipId, reason: String },

    /// Work was cancelled by an epoch bump or explicit stop; drop silently.
    #[error("cancelled")]
    Cancelled,

    /// Boundary failure (I/O, config) that doesn't fit a domain kind above.
    #[error("{0}")]
    Other(String),
}

impl ScrubError {
    /// True for kinds the spec says should trigger a retry loop (§4.4, §7).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScrubError::DecoderMalfunction { .. })
    }

    pub fn clip(&self) -> Option<ClipId> {
        match self {
            ScrubError::CacheMiss { clip, .. }
            | ScrubError::WindowExpired { clip, .. }
            | ScrubError::DecoderMalfunction { clip, .. }
            | ScrubError::FormatMissing { clip }
            | ScrubError::DeadlineExceeded { clip, .. }
            | ScrubError::ExportFailed { clip, .. } => Some(*clip),
            ScrubError::Cancelled | ScrubError::Other(_) => None,
        }
    }
}

/// Lightweight alternative to `Display` for log lines that want the bare kind
/// name without the formatted message (telemetry field values, mostly).
impl ScrubError {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ScrubError::CacheMiss { .. } => "CacheMiss",
            ScrubError::WindowExpired { .. } => "WindowExpired",
            ScrubError::DecoderMalfunction { .. } => "DecoderMalfunction",
            ScrubError::FormatMissing { .. } => "FormatMissing",
            ScrubError::DeadlineExceeded { .. } => "DeadlineExceeded",
            ScrubError::ExportFailed { .. } => "ExportFailed",
            ScrubError::Cancelled => "Cancelled",
            ScrubError::Other(_) => "Other",
        }
    }
}

pub type ScrubResult<T> = Result<T, ScrubError>;

