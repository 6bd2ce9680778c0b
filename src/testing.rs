//! Shared fixtures for unit tests: a scripted media backend, synthetic
//! images and fast engine settings.

use crate::analytics::{AnalyticsEvent, AnalyticsSink};
use crate::backend::{
    raster, AudioEncoding, ImageEncoding, MediaBackend, OutputFormat, StreamInfo, VideoEncoding,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::storage::MemoryStorage;
use crate::types::{ContentType, Dimensions};
use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Inputs starting with this prefix make every encode fail transiently
pub(crate) const FAIL_PREFIX: &[u8] = b"FAIL";
/// Inputs starting with this prefix are rejected as unreadable
pub(crate) const CORRUPT_PREFIX: &[u8] = b"CORRUPT";

/// In-memory backend with call counters and rigged failures.
///
/// Still images go through the real `image` encoders (WebP is faked with
/// JPEG bytes), video and audio outputs are zero-filled buffers sized from
/// the requested bitrate.
pub(crate) struct ScriptedBackend {
    encode_calls: AtomicUsize,
    probe_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    transient_failures: AtomicUsize,
    delay: Option<Duration>,
    stream: StreamInfo,
    webp: bool,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self {
            encode_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            transient_failures: AtomicUsize::new(0),
            delay: None,
            stream: StreamInfo {
                dimensions: Some(Dimensions::new(1920, 1080)),
                duration_secs: 120.0,
                bitrate_kbps: 4000,
                codec: "h264".to_string(),
                has_video: true,
                has_audio: true,
                mean_volume_db: Some(-20.0),
                max_volume_db: Some(-2.0),
            },
            webp: true,
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The first `count` encode calls fail with a transient backend error
    pub(crate) fn failing_first(self, count: usize) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_stream(mut self, stream: StreamInfo) -> Self {
        self.stream = stream;
        self
    }

    pub(crate) fn without_webp(mut self) -> Self {
        self.webp = false;
        self
    }

    pub(crate) fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        InFlight(&self.in_flight)
    }

    fn check_encode(&self, input: &[u8]) -> Result<()> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        if input.starts_with(CORRUPT_PREFIX) {
            return Err(EngineError::CorruptInput("scripted corrupt input".into()));
        }
        if input.starts_with(FAIL_PREFIX) {
            return Err(EngineError::TranscodeBackend("scripted crash".into()));
        }
        let rigged = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rigged {
            return Err(EngineError::TranscodeBackend("scripted transient failure".into()));
        }
        Ok(())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn supports(&self, format: OutputFormat) -> bool {
        format != OutputFormat::Webp || self.webp
    }

    async fn probe(&self, input: &[u8], _content_type: ContentType) -> Result<StreamInfo> {
        let _guard = self.enter().await;
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if input.starts_with(CORRUPT_PREFIX) {
            return Err(EngineError::CorruptInput("scripted corrupt input".into()));
        }
        Ok(self.stream.clone())
    }

    async fn sample_frames(&self, _input: &[u8], timestamps: &[f64]) -> Result<Vec<DynamicImage>> {
        let _guard = self.enter().await;
        Ok(timestamps.iter().map(|_| gradient_image(320, 180)).collect())
    }

    async fn encode_image(&self, image: DynamicImage, encoding: &ImageEncoding) -> Result<Vec<u8>> {
        let _guard = self.enter().await;
        self.check_encode(&[])?;
        match encoding.format {
            OutputFormat::Webp if self.webp => raster::encode(&image, OutputFormat::Jpeg, encoding.quality),
            format => raster::encode(&image, format, encoding.quality),
        }
    }

    async fn encode_video(&self, input: &[u8], encoding: &VideoEncoding) -> Result<Vec<u8>> {
        let _guard = self.enter().await;
        self.check_encode(input)?;
        let size = (input.len() as u64 * encoding.video_bitrate_kbps as u64 / 6000).max(64);
        Ok(vec![0u8; size as usize])
    }

    async fn encode_audio(&self, input: &[u8], encoding: &AudioEncoding) -> Result<Vec<u8>> {
        let _guard = self.enter().await;
        self.check_encode(input)?;
        let size = (input.len() as u64 * encoding.bitrate_kbps as u64 / 320).max(32);
        Ok(vec![0u8; size as usize])
    }
}

/// Analytics sink that keeps every event
#[derive(Default)]
pub(crate) struct RecordingAnalytics {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingAnalytics {
    pub(crate) fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn record(&self, event: &AnalyticsEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Engine settings with millisecond retry delays
pub(crate) fn fast_config() -> EngineConfig {
    EngineConfig {
        retry_base_delay_ms: 1,
        backend_permits: 8,
        ..EngineConfig::default()
    }
}

pub(crate) fn memory_storage(objects: &[(&str, Vec<u8>)]) -> Arc<MemoryStorage> {
    let storage = MemoryStorage::new();
    for (reference, data) in objects {
        storage.insert(reference, data.clone());
    }
    Arc::new(storage)
}

/// Deterministic per-pixel noise
pub(crate) fn noisy_image(width: u32, height: u32, seed: u32) -> DynamicImage {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    let image = RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        };
        Rgb([next(), next(), next()])
    });
    DynamicImage::ImageRgb8(image)
}

/// Smooth diagonal colour gradient
pub(crate) fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgb([r, g, 128])
    });
    DynamicImage::ImageRgb8(image)
}

pub(crate) fn flat_image(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
}

/// White page with rows of thin black strokes, like lines of small print
pub(crate) fn text_like_image(width: u32, height: u32) -> DynamicImage {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let in_line = y % 48 < 32;
        let in_stroke = x % 8 < 4;
        if in_line && in_stroke {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    });
    DynamicImage::ImageRgb8(image)
}

pub(crate) fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    raster::encode(image, OutputFormat::Png, 100).expect("png fixture")
}

pub(crate) fn jpeg_bytes(image: &DynamicImage, quality: u8) -> Vec<u8> {
    raster::encode(image, OutputFormat::Jpeg, quality).expect("jpeg fixture")
}
