//! SpotProxyManager (spec §4.7): on-demand proxy-clip export for timeline
//! regions where the original media cannot meet decode deadlines.
//!
//! Grounded on the teacher's `encode_timeline`/`start_encode` job pattern in
//! `velocut-media/src/worker.rs` + `encode.rs`: a spawned thread does the
//! (slow, external-tool-backed) export while the caller gets a handle back
//! immediately; cancellation is a flag, not a kill. Zone bookkeeping mirrors
//! `encode_cancels: Mutex<HashMap<Uuid, _>>` — a small lock-guarded map keyed
//! by job identity, pruned as jobs complete or go stale.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rayon::ThreadPool;
use tempfile::TempDir;
use uuid::Uuid;

use scrubline_core::config::ScrubConfig;
use scrubline_core::error::{ScrubError, ScrubResult};
use scrubline_core::ids::ClipId;
use scrubline_core::telemetry::{events, TelemetryEvent, TelemetrySink};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoneState {
    Pending,
    Ready,
    Failed,
}

#[derive(Clone, Debug)]
pub struct ProxyZone {
    pub zone_id: Uuid,
    pub clip: ClipId,
    pub bucket: i64,
    pub range_ms: [i64; 2],
    pub export_range_ms: [i64; 2],
    pub state: ZoneState,
    pub url: Option<PathBuf>,
    pub anchor_ms: i64,
    pub reason: String,
    pub context: String,
    pub created_at: Instant,
    pub last_access: Instant,
}

/// External export side effect. Out of scope per spec §1 ("the core does not
/// itself decode bytes" extends to re-encode); callers supply a real
/// exporter, tests use `PassthroughExporter`.
pub trait ProxyExporter: Send + Sync {
    fn export(&self, clip: ClipId, export_range_ms: [i64; 2], dest: &Path) -> ScrubResult<()>;
}

/// Writes an empty placeholder file — stands in for "fall back to
/// passthrough" when no real transcoder preference succeeds (spec §4.7
/// lists ProRes 422 Proxy, then highest-quality, then passthrough).
pub struct PassthroughExporter;

impl ProxyExporter for PassthroughExporter {
    fn export(&self, _clip: ClipId, _export_range_ms: [i64; 2], dest: &Path) -> ScrubResult<()> {
        std::fs::write(dest, []).map_err(|e| ScrubError::Other(format!("passthrough export: {e}")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Original,
    Proxy,
}

/// Signal sent by a `ScrubWorker`/`FramePipeline` when decoding a region
/// consistently misses its deadline.
pub struct ProxyTrigger {
    pub clip: ClipId,
    pub around_ms: i64,
    pub reason: String,
}

type ZoneKey = (ClipId, i64);

type ZoneMap = Arc<Mutex<HashMap<ZoneKey, ProxyZone>>>;

pub struct SpotProxyManager {
    config: Arc<ScrubConfig>,
    zones: ZoneMap,
    late_frames: Mutex<HashMap<ClipId, VecDeque<Instant>>>,
    pending_trigger: Mutex<HashMap<ClipId, i64>>,
    telemetry: Arc<dyn TelemetrySink>,
    exporter: Arc<dyn ProxyExporter>,
    proxy_dir: TempDir,
    pool: ThreadPool,
}

impl SpotProxyManager {
    pub fn new(config: Arc<ScrubConfig>, telemetry: Arc<dyn TelemetrySink>, exporter: Arc<dyn ProxyExporter>) -> std::io::Result<Self> {
        let proxy_dir = tempfile::Builder::new().prefix("SpotProxies").tempdir()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .thread_name(|i| format!("spot-proxy-export-{i}"))
            .build()
            .expect("rayon pool");
        Ok(Self {
            config,
            zones: Arc::new(Mutex::new(HashMap::new())),
            late_frames: Mutex::new(HashMap::new()),
            pending_trigger: Mutex::new(HashMap::new()),
            telemetry,
            exporter,
            proxy_dir,
            pool,
        })
    }

    fn bucket_for(&self, around_ms: i64) -> i64 {
        around_ms / self.config.bucket_span_ms as i64
    }

    fn prune_expired(&self, zones: &mut HashMap<ZoneKey, ProxyZone>) {
        let ttl = Duration::from_secs_f64(self.config.zone_ttl_secs);
        let now = Instant::now();
        let expired: Vec<ZoneKey> = zones
            .iter()
            .filter(|(_, z)| now.duration_since(z.last_access) > ttl)
            .map(|(k, _)| *k)
            .collect();
        for key in expired {
            if let Some(zone) = zones.remove(&key) {
                self.delete_zone_file(&zone);
            }
        }
    }

    fn delete_zone_file(&self, zone: &ProxyZone) {
        if let Some(url) = &zone.url {
            let _ = std::fs::remove_file(url);
        }
    }

    fn evict_lru_if_needed(&self, zones: &mut HashMap<ZoneKey, ProxyZone>) {
        while zones.len() >= self.config.max_zones as usize {
            let lru_key = zones.iter().min_by_key(|(_, z)| z.last_access).map(|(k, _)| *k);
            match lru_key {
                Some(key) => {
                    if let Some(zone) = zones.remove(&key) {
                        self.delete_zone_file(&zone);
                    }
                }
                None => break,
            }
        }
    }

    /// spec §4.7 ensure flow.
    pub fn ensure_spot_proxy(
        &self,
        clip: ClipId,
        asset_path_hint: &str,
        around_ms: i64,
        span_ms: i64,
        reason: &str,
        context: &str,
        ra_anchor_ms: Option<i64>,
    ) -> Uuid {
        let margin_ms = (self.config.proxy_export_margin_secs * 1000.0) as i64;
        let mut start = (around_ms - span_ms / 2).max(0);
        if let Some(anchor) = ra_anchor_ms {
            start = start.max(anchor);
        }
        let export_start = (start - margin_ms).max(0);
        let duration = (span_ms).max(span_ms + 2 * margin_ms);
        let range = [start, start + span_ms];
        let export_range = [export_start, export_start + duration];
        let bucket = self.bucket_for(around_ms);
        let key = (clip, bucket);

        let mut zones = self.zones.lock();
        self.prune_expired(&mut zones);

        let (zone_id, should_export) = if let Some(existing) = zones.get_mut(&key) {
            existing.last_access = Instant::now();
            let widened = range[0] < existing.range_ms[0] || range[1] > existing.range_ms[1];
            if widened || existing.state == ZoneState::Failed {
                existing.range_ms = [existing.range_ms[0].min(range[0]), existing.range_ms[1].max(range[1])];
                existing.export_range_ms = [
                    existing.export_range_ms[0].min(export_range[0]),
                    existing.export_range_ms[1].max(export_range[1]),
                ];
                existing.state = ZoneState::Pending;
                existing.reason = reason.to_string();
                existing.context = context.to_string();
                (existing.zone_id, true)
            } else {
                (existing.zone_id, false)
            }
        } else {
            self.evict_lru_if_needed(&mut zones);
            let zone_id = Uuid::new_v4();
            let now = Instant::now();
            zones.insert(
                key,
                ProxyZone {
                    zone_id,
                    clip,
                    bucket,
                    range_ms: range,
                    export_range_ms: export_range,
                    state: ZoneState::Pending,
                    url: None,
                    anchor_ms: around_ms,
                    reason: reason.to_string(),
                    context: context.to_string(),
                    created_at: now,
                    last_access: now,
                },
            );
            (zone_id, true)
        };
        drop(zones);

        self.telemetry.emit(
            TelemetryEvent::new(events::SPOT_PROXY_TRIGGER)
                .with("clip", clip.to_string())
                .with("bucket", bucket)
                .with("reason", reason.to_string()),
        );

        if should_export {
            self.start_export(clip, key, export_range, asset_path_hint.to_string());
        }
        zone_id
    }

    fn start_export(&self, clip: ClipId, key: ZoneKey, export_range_ms: [i64; 2], _asset_hint: String) {
        let dest = self.proxy_dir.path().join(format!("proxy_{clip}_{}.mov", key.1));
        let exporter = Arc::clone(&self.exporter);
        let telemetry = Arc::clone(&self.telemetry);
        let zones = Arc::clone(&self.zones);
        telemetry.emit(TelemetryEvent::new(events::SPOT_PROXY_START).with("clip", clip.to_string()));
        self.pool.spawn(move || {
            let result = exporter.export(clip, export_range_ms, &dest);
            let mut zones = zones.lock();
            if let Some(zone) = zones.get_mut(&key) {
                match result {
                    Ok(()) => {
                        zone.state = ZoneState::Ready;
                        zone.url = Some(dest.clone());
                        zone.last_access = Instant::now();
                        telemetry.emit(TelemetryEvent::new(events::SPOT_PROXY_READY).with("clip", clip.to_string()));
                    }
                    Err(e) => {
                        zone.state = ZoneState::Failed;
                        telemetry.emit(
                            TelemetryEvent::new(events::SPOT_PROXY_FAIL)
                                .with("clip", clip.to_string())
                                .with("reason", e.to_string()),
                        );
                    }
                }
            }
        });
    }

    pub fn decision(&self, clip: ClipId, abs_ms: i64) -> Decision {
        let mut zones = self.zones.lock();
        let hit = zones
            .values_mut()
            .find(|z| z.clip == clip && z.state == ZoneState::Ready && z.range_ms[0] <= abs_ms && abs_ms <= z.range_ms[1]);
        match hit {
            Some(zone) => {
                zone.last_access = Instant::now();
                self.telemetry.emit(TelemetryEvent::new(events::SPOT_PROXY_HIT).with("clip", clip.to_string()));
                Decision::Proxy
            }
            None => {
                self.telemetry.emit(TelemetryEvent::new(events::SPOT_PROXY_LEAVE).with("clip", clip.to_string()));
                Decision::Original
            }
        }
    }

    pub fn record_late_frame(&self, clip: ClipId, abs_ms: i64) {
        let window = Duration::from_millis(self.config.late_frame_window_ms);
        let now = Instant::now();
        let mut late_frames = self.late_frames.lock();
        let entry = late_frames.entry(clip).or_default();
        entry.push_back(now);
        while let Some(front) = entry.front() {
            if now.duration_since(*front) > window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() as u32 >= self.config.late_frame_threshold {
            self.pending_trigger.lock().insert(clip, abs_ms);
        }
    }

    pub fn consume_late_frame_trigger(&self, clip: ClipId) -> Option<i64> {
        self.pending_trigger.lock().remove(&clip)
    }

    pub fn zone_for(&self, clip: ClipId, abs_ms: i64) -> Option<ProxyZone> {
        self.zones
            .lock()
            .values()
            .find(|z| z.clip == clip && z.range_ms[0] <= abs_ms && abs_ms <= z.range_ms[1])
            .cloned()
    }

    pub fn zone_count(&self) -> usize {
        self.zones.lock().len()
    }
}
