//! # Transcoder Module
//!
//! Questo modulo esegue un `ResolvedPlan` producendo gli output codificati.
//!
//! ## Responsabilità:
//! - Dispatch per tipo di contenuto tramite l'enum `Transcoder`
//! - Resize, encoding e gestione metadata delegati al `MediaBackend`
//! - Verifica che ogni output sia non vuoto
//! - Calcolo del quality score dell'output primario
//!
//! ## Varianti:
//! - `Image`: WebP primario + JPEG fallback, resize Lanczos3, mai upscale
//! - `Video`: un encode H.264/AAC per ogni rung + thumbnail JPEG
//! - `Audio`: un encode AAC/M4A

pub mod audio;
pub mod image;
pub mod video;

pub use self::audio::AudioTranscoder;
pub use self::image::ImageTranscoder;
pub use self::video::VideoTranscoder;

use crate::backend::{MediaBackend, OutputFormat};
use crate::error::{EngineError, Result};
use crate::resolver::ResolvedPlan;
use crate::types::ContentType;
use crate::utils::run_blocking;
use ::image::imageops::FilterType;
use ::image::{DynamicImage, GenericImageView};
use std::sync::Arc;

/// One encoded rendition, not yet stored
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedOutput {
    pub label: String,
    pub format: OutputFormat,
    pub data: Vec<u8>,
    pub optimizations: Vec<String>,
    /// Perceived quality in [0, 100]
    pub quality: f64,
}

pub enum Transcoder {
    Image(ImageTranscoder),
    Video(VideoTranscoder),
    Audio(AudioTranscoder),
}

impl Transcoder {
    pub fn for_content_type(content_type: ContentType, backend: Arc<dyn MediaBackend>) -> Self {
        match content_type {
            ContentType::Image => Transcoder::Image(ImageTranscoder::new(backend)),
            ContentType::Video => Transcoder::Video(VideoTranscoder::new(backend)),
            ContentType::Audio => Transcoder::Audio(AudioTranscoder::new(backend)),
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Transcoder::Image(_) => ContentType::Image,
            Transcoder::Video(_) => ContentType::Video,
            Transcoder::Audio(_) => ContentType::Audio,
        }
    }

    pub async fn encode(&self, input: Arc<[u8]>, plan: &ResolvedPlan) -> Result<Vec<EncodedOutput>> {
        if plan.content_type != self.content_type() {
            return Err(EngineError::UnsupportedFormat(format!(
                "{} transcoder cannot execute a {} plan",
                self.content_type(),
                plan.content_type
            )));
        }

        let outputs = match self {
            Transcoder::Image(t) => t.encode(input, plan).await?,
            Transcoder::Video(t) => t.encode(input, plan).await?,
            Transcoder::Audio(t) => t.encode(input, plan).await?,
        };

        if outputs.is_empty() {
            return Err(EngineError::UnsupportedFormat(format!(
                "no planned {} output can be produced by this backend",
                plan.content_type
            )));
        }
        if let Some(empty) = outputs.iter().find(|o| o.data.is_empty()) {
            return Err(EngineError::TranscodeBackend(format!(
                "backend returned an empty {} output",
                empty.label
            )));
        }
        Ok(outputs)
    }
}

/// Quality of the primary rendition, clamped to [0, 100]
pub fn quality_score(outputs: &[EncodedOutput]) -> f64 {
    let score = outputs.first().map(|o| o.quality).unwrap_or(0.0);
    (score.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

pub(crate) fn metadata_tag(preserve: bool) -> &'static str {
    if preserve {
        "metadata-preserved"
    } else {
        "metadata-stripped"
    }
}

/// Tag the output and copy tags from the source when asked to
pub(crate) async fn apply_metadata(
    backend: &dyn MediaBackend,
    source: &[u8],
    encoded: Vec<u8>,
    format: OutputFormat,
    preserve: bool,
    optimizations: &mut Vec<String>,
) -> Result<Vec<u8>> {
    optimizations.push(metadata_tag(preserve).to_string());
    if preserve {
        backend.copy_metadata(source, encoded, format).await
    } else {
        Ok(encoded)
    }
}

/// Downscale so the longest side fits `max_dimension`; returns whether it resized
pub(crate) async fn fit_within(
    image: Arc<DynamicImage>,
    max_dimension: u32,
) -> Result<(DynamicImage, bool)> {
    run_blocking(move || {
        let (width, height) = image.dimensions();
        if width.max(height) > max_dimension {
            Ok((image.resize(max_dimension, max_dimension, FilterType::Lanczos3), true))
        } else {
            Ok(((*image).clone(), false))
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StrategyResolver;
    use crate::strategy::StrategyCatalog;
    use crate::testing::{gradient_image, ScriptedBackend};
    use crate::types::OptimizationOptions;

    fn plan(content_type: ContentType) -> ResolvedPlan {
        let request = OptimizationOptions::with_strategy("balanced").parse().unwrap();
        StrategyResolver::new(Arc::new(StrategyCatalog::new()))
            .resolve(&request, None, content_type)
            .unwrap()
    }

    #[tokio::test]
    async fn test_mismatched_plan_is_rejected() {
        let transcoder = Transcoder::for_content_type(ContentType::Audio, Arc::new(ScriptedBackend::new()));
        let err = transcoder
            .encode(Arc::from(&b"audio"[..]), &plan(ContentType::Video))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_fit_within_never_upscales() {
        let image = Arc::new(gradient_image(400, 200));
        let (same, resized) = fit_within(image.clone(), 1000).await.unwrap();
        assert!(!resized);
        assert_eq!(same.dimensions(), (400, 200));

        let (smaller, resized) = fit_within(image, 100).await.unwrap();
        assert!(resized);
        assert_eq!(smaller.dimensions(), (100, 50));
    }

    #[test]
    fn test_quality_score_is_clamped() {
        let output = |quality: f64| EncodedOutput {
            label: "primary".into(),
            format: OutputFormat::Webp,
            data: vec![1],
            optimizations: Vec::new(),
            quality,
        };
        assert_eq!(quality_score(&[output(140.0)]), 100.0);
        assert_eq!(quality_score(&[output(81.26), output(10.0)]), 81.3);
        assert_eq!(quality_score(&[]), 0.0);
    }
}
