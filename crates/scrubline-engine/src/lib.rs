//! Threaded runtime that turns `scrubline-core`'s pure data model into a
//! running scrub session: one `ScrubWorker` thread per visible clip, a
//! `FramePipeline` thread for ordinary playback, a `TimelineTicker` for the
//! playback clock, and a `SpotProxyManager`/`ScrubCoordinator` tying them
//! together.
//!
//! Mirrors `velocut-media`'s split of a single `MediaWorker` into several
//! purpose-built threads coordinated through channels rather than shared
//! mutable state.

pub mod admission;
pub mod coordinator;
pub mod pipeline;
pub mod spot_proxy;
pub mod testing;
pub mod ticker;
pub mod worker;

pub use admission::{Semaphore, SemaphoreGuard};
pub use coordinator::{ScrubClip, ScrubCoordinator};
pub use pipeline::PipelineHandle;
pub use spot_proxy::{Decision, PassthroughExporter, ProxyExporter, ProxyTrigger, ProxyZone, SpotProxyManager, ZoneState};
pub use testing::{solid_buffer, MemoryReader};
pub use ticker::{ClockSnapshot, PlaybackClock, TimelineTicker};
pub use worker::{WorkerCmd, WorkerHandle};
