//! Shared types for the scrub/playback scheduler: ids, time arithmetic,
//! config, telemetry, errors, frame/cache types, and the windowed-reader
//! contract. No threads live here — `scrubline-engine` owns the runtime.

pub mod config;
pub mod error;
pub mod frame;
pub mod history;
pub mod ids;
pub mod landing_zone;
pub mod reader;
pub mod telemetry;
pub mod time;

pub use config::ScrubConfig;
pub use error::{ScrubError, ScrubResult};
pub use frame::{DecodedFrame, FrameOrigin, PixelBuffer};
pub use history::{FrameHistoryManager, HistoryEntry};
pub use ids::{ClipId, Epoch, EpochCounter, RandomAccessKey};
pub use landing_zone::{LandingZone, LandingZoneManager, ScrubMetrics, ScrubSpeedState};
pub use reader::{Direction, WindowedReader};
pub use telemetry::{events, NullSink, RecordingSink, StderrSink, TelemetryEvent, TelemetrySink, TelemetryValue};
pub use time::{approx_eq, FrameTimebase, TimelineTime, GENERAL_EQUALITY_TOLERANCE_SECS};
