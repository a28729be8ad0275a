// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame fan-out on the producer thread
//!
//! ```text
//! frame ─▶ pack rows ─▶ mirror ─▶ first-frame hook
//!                                   │
//!       ┌───────────────────────────┴─────────────┬──────────────┐
//!       ▼                   ▼                     ▼              ▼
//!  SnapshotCache      VideoRecorder      StreamExportChannel   preview
//!  (always)           (if recording)     (if streaming)        (unless paused;
//!                                                               byte order fixed
//!                                                               on its own copy)
//! ```
//!
//! Geometry fixes happen once, so every consumer sees the same orientation.
//! Consumers copy what they keep; the frame is not retained past the call.

use crate::backends::camera::format_converters;
use crate::backends::camera::types::{CameraFrame, PixelLayout};
use crate::pipelines::photo::SnapshotCache;
use crate::pipelines::preview::TriplePreviewBuffer;
use crate::pipelines::stream::StreamExportChannel;
use crate::pipelines::video::{PushOutcome, VideoRecorder};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tracing::{debug, info, trace, warn};

/// Everything a frame is fanned out to, shared with the application thread
pub struct Consumers {
    pub snapshot: SnapshotCache,
    pub preview: TriplePreviewBuffer,
    pub recorder: VideoRecorder,
    pub stream: ArcSwapOption<StreamExportChannel>,
    paused: AtomicBool,
    mirror: AtomicBool,
    /// Width in the high half, height in the low half; 0 until the first frame
    dimensions: AtomicU64,
    /// [`PixelLayout::tag`] of distributed frames
    layout: AtomicU32,
    preview_layout: PixelLayout,
}

impl Consumers {
    pub fn new(recorder: VideoRecorder, mirror: bool, preview_layout: PixelLayout) -> Self {
        Self {
            snapshot: SnapshotCache::new(),
            preview: TriplePreviewBuffer::new(),
            recorder,
            stream: ArcSwapOption::empty(),
            paused: AtomicBool::new(false),
            mirror: AtomicBool::new(mirror),
            dimensions: AtomicU64::new(0),
            layout: AtomicU32::new(PixelLayout::default().tag()),
            preview_layout,
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_mirror(&self, mirror: bool) {
        self.mirror.store(mirror, Ordering::Release);
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirror.load(Ordering::Acquire)
    }

    /// Actual frame size, `None` before the first frame
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let packed = self.dimensions.load(Ordering::Acquire);
        (packed != 0).then(|| ((packed >> 32) as u32, packed as u32))
    }

    fn set_dimensions(&self, width: u32, height: u32) {
        let packed = (u64::from(width) << 32) | u64::from(height);
        self.dimensions.store(packed, Ordering::Release);
    }

    /// Byte order of frames handed to photo, record and stream
    pub fn layout(&self) -> PixelLayout {
        PixelLayout::from_tag(self.layout.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn preview_layout(&self) -> PixelLayout {
        self.preview_layout
    }

    /// Drop buffered pixels once the producer has exited
    pub fn release_buffers(&self) {
        self.preview.clear();
        self.snapshot.clear();
        self.dimensions.store(0, Ordering::Release);
    }
}

/// Called with the frame size when the first frame arrives
///
/// Returns `false` when the session no longer wants frames (initialization
/// already failed), in which case nothing is distributed.
pub type FirstFrameHook = Box<dyn FnMut(u32, u32) -> bool + Send>;

/// Where one frame went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distribution {
    pub first_frame: bool,
    pub previewed: bool,
    pub recorded: PushOutcome,
    /// Stream sequence assigned, if streaming
    pub streamed: Option<i64>,
}

/// Producer-side fan-out, owned by the capture thread
pub struct FrameDistributor {
    consumers: Arc<Consumers>,
    on_first_frame: FirstFrameHook,
    initialized: bool,
    /// Packed and mirrored pixels of the current frame
    work: Vec<u8>,
    /// Preview copy in the preview byte order
    preview_work: Vec<u8>,
    distributed: u64,
}

impl FrameDistributor {
    pub fn new(consumers: Arc<Consumers>, on_first_frame: FirstFrameHook) -> Self {
        Self {
            consumers,
            on_first_frame,
            initialized: false,
            work: Vec::new(),
            preview_work: Vec::new(),
            distributed: 0,
        }
    }

    pub fn frames_distributed(&self) -> u64 {
        self.distributed
    }

    /// Fan one frame out; `None` if the frame was rejected
    pub fn distribute(&mut self, frame: &CameraFrame) -> Option<Distribution> {
        if !frame.is_well_formed() {
            warn!(
                width = frame.width,
                height = frame.height,
                stride = frame.stride,
                len = frame.data.len(),
                "Dropping malformed frame"
            );
            return None;
        }
        let (width, height) = (frame.width, frame.height);
        let consumers = Arc::clone(&self.consumers);

        let mirror = consumers.is_mirrored();
        let pixels: &[u8] = if frame.is_packed() && !mirror {
            &frame.data[..]
        } else {
            format_converters::pack_rows_into(
                &frame.data,
                frame.stride as usize,
                frame.row_bytes(),
                height as usize,
                &mut self.work,
            );
            if mirror {
                format_converters::mirror_horizontal(&mut self.work, width);
            }
            &self.work
        };

        let first_frame = !self.initialized;
        if first_frame {
            consumers.layout.store(frame.layout.tag(), Ordering::Release);
            consumers.set_dimensions(width, height);
            if !(self.on_first_frame)(width, height) {
                debug!("First frame not accepted, discarding");
                return None;
            }
            self.initialized = true;
            info!(width, height, layout = ?frame.layout, "First frame distributed");
        } else if consumers.dimensions() != Some((width, height)) {
            info!(width, height, "Frame size changed");
            consumers.set_dimensions(width, height);
        }

        consumers
            .snapshot
            .store(pixels, width, height, frame.layout, frame.sequence);

        let recorded = consumers.recorder.push_video(pixels, width, height);
        if recorded == PushOutcome::Dropped {
            trace!(sequence = frame.sequence, "Record queue full");
        }

        let streamed = consumers
            .stream
            .load_full()
            .map(|channel| channel.publish(pixels, width, height, frame.layout));

        let previewed = first_frame || !consumers.is_paused();
        if previewed {
            if frame.layout == consumers.preview_layout {
                consumers.preview.publish(pixels, width, height);
            } else {
                self.preview_work.clear();
                self.preview_work.extend_from_slice(pixels);
                format_converters::swap_red_blue(&mut self.preview_work);
                consumers.preview.publish(&self.preview_work, width, height);
            }
        }

        self.distributed += 1;
        Some(Distribution {
            first_frame,
            previewed,
            recorded,
            streamed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::FrameData;
    use crate::pipelines::video::{VideoConfig, WriterFactory, Y4mWriterFactory};
    use crate::backends::audio::AudioConfig;
    use crate::backends::camera::types::Framerate;
    use crate::session::SessionId;
    use std::sync::Mutex;
    use std::time::Instant;

    fn frame(width: u32, height: u32, stride: u32, seq: u64) -> CameraFrame {
        let mut data = vec![0u8; (stride * height) as usize];
        for y in 0..height {
            for x in 0..width {
                let i = (y * stride + x * 4) as usize;
                data[i..i + 4].copy_from_slice(&[x as u8, y as u8, seq as u8, 255]);
            }
        }
        CameraFrame {
            width,
            height,
            stride,
            layout: PixelLayout::Rgba,
            data: FrameData::from(data),
            sequence: seq,
            captured_at: Instant::now(),
        }
    }

    fn consumers(mirror: bool, preview: PixelLayout) -> Arc<Consumers> {
        Arc::new(Consumers::new(VideoRecorder::new(8, 64), mirror, preview))
    }

    #[test]
    fn test_first_frame_hook_and_dimensions() {
        let consumers = consumers(false, PixelLayout::Rgba);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = Arc::clone(&seen);
        let mut distributor = FrameDistributor::new(
            Arc::clone(&consumers),
            Box::new(move |w, h| {
                hook_seen.lock().unwrap().push((w, h));
                true
            }),
        );
        assert_eq!(consumers.dimensions(), None);

        let first = distributor.distribute(&frame(4, 2, 16, 0)).unwrap();
        assert!(first.first_frame);
        let second = distributor.distribute(&frame(4, 2, 16, 1)).unwrap();
        assert!(!second.first_frame);

        assert_eq!(*seen.lock().unwrap(), vec![(4, 2)]);
        assert_eq!(consumers.dimensions(), Some((4, 2)));
        assert_eq!(distributor.frames_distributed(), 2);
    }

    #[test]
    fn test_rejected_first_frame_is_not_distributed() {
        let consumers = consumers(false, PixelLayout::Rgba);
        let mut distributor = FrameDistributor::new(Arc::clone(&consumers), Box::new(|_, _| false));
        assert!(distributor.distribute(&frame(4, 2, 16, 0)).is_none());
        assert!(consumers.snapshot.is_empty());
        assert!(consumers.preview.consume().is_none());
    }

    #[test]
    fn test_paused_preview_still_shows_first_frame() {
        let consumers = consumers(false, PixelLayout::Rgba);
        consumers.set_paused(true);
        let mut distributor = FrameDistributor::new(Arc::clone(&consumers), Box::new(|_, _| true));

        assert!(distributor.distribute(&frame(2, 2, 8, 0)).unwrap().previewed);
        assert!(!distributor.distribute(&frame(2, 2, 8, 1)).unwrap().previewed);
        // snapshot keeps updating while paused
        assert_eq!(consumers.snapshot.latest().unwrap().sequence, 1);
        assert_eq!(consumers.preview.frames_published(), 1);
    }

    #[test]
    fn test_padding_and_mirror_applied_before_fan_out() {
        let consumers = consumers(true, PixelLayout::Bgra);
        let mut distributor = FrameDistributor::new(Arc::clone(&consumers), Box::new(|_, _| true));
        // 3 pixels wide, 4 bytes of padding per row
        distributor.distribute(&frame(3, 1, 16, 9)).unwrap();

        let snapshot = consumers.snapshot.latest().unwrap();
        assert_eq!(snapshot.pixels.len(), 12);
        // mirrored: the rightmost pixel comes first
        assert_eq!(&snapshot.pixels[0..4], &[2, 0, 9, 255]);
        assert_eq!(snapshot.layout, PixelLayout::Rgba);

        // preview copy has red and blue swapped, the snapshot does not
        let preview = consumers.preview.consume().unwrap();
        assert_eq!(&preview.pixels[0..4], &[9, 0, 2, 255]);
    }

    #[test]
    fn test_each_frame_reaches_record_and_stream_once() {
        const N: u64 = 20;
        let dir = tempfile::tempdir().unwrap();
        let consumers = consumers(false, PixelLayout::Rgba);
        let video = VideoConfig {
            width: 4,
            height: 2,
            framerate: Framerate::from_int(30),
            bitrate_kbps: 0,
            layout: PixelLayout::Rgba,
        };
        let factory: &dyn WriterFactory = &Y4mWriterFactory;
        consumers
            .recorder
            .start(factory, &dir.path().join("fan.y4m"), video, None, AudioConfig::default())
            .unwrap();
        let channel = Arc::new(StreamExportChannel::new(SessionId(1)));
        consumers.stream.store(Some(Arc::clone(&channel)));

        let mut distributor = FrameDistributor::new(Arc::clone(&consumers), Box::new(|_, _| true));
        let mut enqueued = 0;
        for seq in 0..N {
            let outcome = distributor.distribute(&frame(4, 2, 16, seq)).unwrap();
            assert_eq!(outcome.streamed, Some(seq as i64 + 1));
            if outcome.recorded == PushOutcome::Enqueued {
                enqueued += 1;
            }
        }
        assert!(enqueued <= N);
        assert_eq!(channel.latest_sequence(), N as i64);

        let result = consumers.recorder.abort().unwrap();
        assert!(result.is_ok());
    }
}
