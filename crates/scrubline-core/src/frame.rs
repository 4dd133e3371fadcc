//! DecodedFrame and the reference-counted pixel buffer handle (spec §3, §9
//! "Pixel buffer ownership").
//!
//! The teacher's `MediaResult::VideoFrame`/`PlaybackFrame` carry a plain
//! `Vec<u8>` across a channel, cloned once into an egui texture. Here the
//! same buffer is held by both the cache and a renderer binding at once, so
//! it's wrapped in `Arc<[u8]>` instead: cheap `clone`, no cycles, dropped
//! when the last holder releases it.

use std::sync::Arc;

use crate::ids::{ClipId, Epoch};

/// Where a decoded frame came from. Playback frames are version-free
/// (`version: None`); scrub frames always carry the epoch they were
/// produced under so stale results can be dropped at the cache boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOrigin {
    Playback,
    Scrub,
}

/// Reference-counted, zero-copy-to-renderer pixel data. Always tightly
/// packed RGBA (no stride padding) — callers that hand in strided decoder
/// output are responsible for destriping first, the way `probe.rs` and
/// `decode.rs` do in the teacher.
#[derive(Clone, Debug)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    data: Arc<[u8]>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 4, "expected tightly packed RGBA");
        Self { width, height, data: Arc::from(data) }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Estimated memory footprint: width × height × 4 bytes/pixel (RGBA, one
    /// plane). Matches spec §3's "bytes-per-row over all planes" for the
    /// single-plane RGBA case this scheduler deals in.
    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Number of distinct holders of this buffer (cache + at most one
    /// renderer binding, per spec §3's DecodedFrame lifetime note).
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.data)
    }
}

/// A decoded video frame ready for the renderer.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub pixel_buffer: PixelBuffer,
    pub pts: f64,
    pub clip: ClipId,
    pub origin: FrameOrigin,
    pub version: Option<Epoch>,
}

impl DecodedFrame {
    pub fn new(pixel_buffer: PixelBuffer, pts: f64, clip: ClipId, origin: FrameOrigin, version: Option<Epoch>) -> Self {
        debug_assert!(
            matches!(origin, FrameOrigin::Playback) == version.is_none(),
            "playback frames are version-free; scrub frames always carry an epoch"
        );
        Self { pixel_buffer, pts, clip, origin, version }
    }

    pub fn byte_size(&self) -> u64 {
        self.pixel_buffer.byte_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_buffer_byte_size_matches_rgba_dimensions() {
        let buf = PixelBuffer::new(4, 2, vec![0u8; 4 * 2 * 4]);
        assert_eq!(buf.byte_size(), 32);
    }

    #[test]
    fn cloning_pixel_buffer_is_cheap_and_shares_storage() {
        let buf = PixelBuffer::new(2, 2, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
        let clone = buf.clone();
        assert_eq!(buf.ref_count(), 2);
        assert_eq!(clone.bytes(), buf.bytes());
    }
}
