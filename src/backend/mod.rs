//! # Media Backend Module
//!
//! Questo modulo definisce la capability verso la libreria media sottostante.
//!
//! ## Responsabilità:
//! - `MediaBackend`: trait con probe, campionamento frame ed encoding
//! - `LimitedBackend`: wrapper che limita l'accesso concorrente con un semaforo
//!   dimensionato sulle risorse di calcolo, indipendente da `max_concurrent`
//! - Tipi condivisi: `OutputFormat`, `StreamInfo`, parametri di encoding
//!
//! ## Implementazioni:
//! - `ToolBackend` (`tools`): `image` in-process per JPEG/PNG, tool esterni
//!   (ffmpeg, ffprobe, cwebp, exiftool) per tutto il resto
//! - `raster`: encoder in-process condiviso
//!
//! Nessuna matematica di codec vive qui: il backend delega sempre a una
//! libreria o a un tool.

pub mod raster;
pub mod tools;

pub use tools::ToolBackend;

use crate::error::{EngineError, Result};
use crate::types::{ContentType, Dimensions};
use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Container/codec of an encoded output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webp,
    Jpeg,
    Png,
    Mp4,
    M4a,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Mp4 => "mp4",
            OutputFormat::M4a => "m4a",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Mp4 => "mp4",
            OutputFormat::M4a => "m4a",
        }
    }

    /// Matching `image` crate format for still-image outputs
    pub fn image_format(&self) -> Option<image::ImageFormat> {
        match self {
            OutputFormat::Webp => Some(image::ImageFormat::WebP),
            OutputFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            OutputFormat::Png => Some(image::ImageFormat::Png),
            OutputFormat::Mp4 | OutputFormat::M4a => None,
        }
    }

    /// Still-image output format for a decoded source, if the engine can emit it
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::WebP => Some(OutputFormat::Webp),
            image::ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            image::ImageFormat::Png => Some(OutputFormat::Png),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container-level facts reported by a probe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamInfo {
    pub dimensions: Option<Dimensions>,
    pub duration_secs: f64,
    pub bitrate_kbps: u32,
    pub codec: String,
    pub has_video: bool,
    pub has_audio: bool,
    /// Only filled for audio probes
    pub mean_volume_db: Option<f32>,
    pub max_volume_db: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageEncoding {
    pub format: OutputFormat,
    pub quality: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoEncoding {
    /// Output is scaled down to this height, never up
    pub max_height: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub preserve_metadata: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioEncoding {
    pub format: OutputFormat,
    pub bitrate_kbps: u32,
    pub preserve_metadata: bool,
}

/// The underlying media library wrapped by analyzers and transcoders.
///
/// Implementations classify their failures: bad input data is
/// `CorruptInput`, a missing codec or tool is `UnsupportedFormat` /
/// `MissingDependency`, and anything transient is `TranscodeBackend`.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backend can produce this output format
    fn supports(&self, format: OutputFormat) -> bool;

    async fn probe(&self, input: &[u8], content_type: ContentType) -> Result<StreamInfo>;

    /// Decode one frame per timestamp (seconds)
    async fn sample_frames(&self, input: &[u8], timestamps: &[f64]) -> Result<Vec<DynamicImage>>;

    async fn encode_image(&self, image: DynamicImage, encoding: &ImageEncoding) -> Result<Vec<u8>>;

    async fn encode_video(&self, input: &[u8], encoding: &VideoEncoding) -> Result<Vec<u8>>;

    async fn encode_audio(&self, input: &[u8], encoding: &AudioEncoding) -> Result<Vec<u8>>;

    /// Copy descriptive tags from the source onto an encoded output
    async fn copy_metadata(
        &self,
        _source: &[u8],
        encoded: Vec<u8>,
        _format: OutputFormat,
    ) -> Result<Vec<u8>> {
        Ok(encoded)
    }
}

/// Bounds concurrent access to a shared backend
pub struct LimitedBackend {
    inner: Arc<dyn MediaBackend>,
    permits: Arc<Semaphore>,
}

impl LimitedBackend {
    pub fn new(inner: Arc<dyn MediaBackend>, permits: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| EngineError::TranscodeBackend("backend pool closed".to_string()))
    }
}

#[async_trait]
impl MediaBackend for LimitedBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn supports(&self, format: OutputFormat) -> bool {
        self.inner.supports(format)
    }

    async fn probe(&self, input: &[u8], content_type: ContentType) -> Result<StreamInfo> {
        let _permit = self.acquire().await?;
        self.inner.probe(input, content_type).await
    }

    async fn sample_frames(&self, input: &[u8], timestamps: &[f64]) -> Result<Vec<DynamicImage>> {
        let _permit = self.acquire().await?;
        self.inner.sample_frames(input, timestamps).await
    }

    async fn encode_image(&self, image: DynamicImage, encoding: &ImageEncoding) -> Result<Vec<u8>> {
        let _permit = self.acquire().await?;
        self.inner.encode_image(image, encoding).await
    }

    async fn encode_video(&self, input: &[u8], encoding: &VideoEncoding) -> Result<Vec<u8>> {
        let _permit = self.acquire().await?;
        self.inner.encode_video(input, encoding).await
    }

    async fn encode_audio(&self, input: &[u8], encoding: &AudioEncoding) -> Result<Vec<u8>> {
        let _permit = self.acquire().await?;
        self.inner.encode_audio(input, encoding).await
    }

    async fn copy_metadata(
        &self,
        source: &[u8],
        encoded: Vec<u8>,
        format: OutputFormat,
    ) -> Result<Vec<u8>> {
        let _permit = self.acquire().await?;
        self.inner.copy_metadata(source, encoded, format).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use std::time::Duration;

    #[test]
    fn test_output_format_names() {
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Jpeg.to_string(), "jpeg");
        assert_eq!(OutputFormat::M4a.extension(), "m4a");
        assert_eq!(OutputFormat::Webp.image_format(), Some(image::ImageFormat::WebP));
        assert_eq!(OutputFormat::Mp4.image_format(), None);
        assert_eq!(OutputFormat::from_image_format(image::ImageFormat::Png), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::from_image_format(image::ImageFormat::Gif), None);
    }

    #[tokio::test]
    async fn test_limited_backend_caps_concurrency() {
        let scripted = Arc::new(ScriptedBackend::new().with_delay(Duration::from_millis(30)));
        let limited = Arc::new(LimitedBackend::new(scripted.clone(), 2));

        let encoding = AudioEncoding {
            format: OutputFormat::M4a,
            bitrate_kbps: 128,
            preserve_metadata: false,
        };
        let calls = (0..6).map(|_| {
            let limited = limited.clone();
            async move { limited.encode_audio(b"audio-bytes", &encoding).await }
        });
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(scripted.encode_calls(), 6);
        assert!(scripted.max_in_flight() <= 2);
        assert_eq!(limited.available_permits(), 2);
    }
}
