//! # Content Analyzer Module
//!
//! Questo modulo ispeziona un media e produce un `ContentAnalysis`.
//!
//! ## Responsabilità:
//! - **Immagini**: decodifica in-process e feature visive (`visual`)
//! - **Video**: probe del contenitore e campionamento di frame rappresentativi
//! - **Audio**: probe, durata, bitrate e dinamica (volumedetect)
//! - Raccomanda una strategia concreta (mai `auto`) per ogni analisi
//!
//! ## Regole di raccomandazione:
//! - Immagine complessa con testo o volti → `quality`
//! - Immagine semplice con pochi colori → `aggressive`
//! - Video/audio lunghi → `streaming`, bitrate bassi → `mobile`
//! - Tutto il resto → `balanced`
//!
//! Il lavoro sui pixel gira sul pool bloccante di tokio.

pub mod visual;

use crate::backend::{MediaBackend, StreamInfo};
use crate::error::{EngineError, Result};
use crate::types::{
    ColorComplexity, Complexity, ContentAnalysis, ContentType, Dimensions, DynamicRange,
    NoiseLevel, StrategyKey,
};
use crate::utils::run_blocking;
use image::{DynamicImage, GenericImageView};
use std::sync::Arc;
use tracing::debug;
use visual::VisualFeatures;

const LONG_VIDEO_SECS: f64 = 600.0;
const LOW_VIDEO_BITRATE_KBPS: u32 = 1500;
const LONG_AUDIO_SECS: f64 = 1200.0;
const LOW_AUDIO_BITRATE_KBPS: u32 = 96;
const HIGH_AUDIO_BITRATE_KBPS: u32 = 256;
const FRAME_POSITIONS: [f64; 3] = [0.2, 0.5, 0.8];

/// Inspects media through the shared backend
pub struct MediaAnalyzer {
    backend: Arc<dyn MediaBackend>,
}

impl MediaAnalyzer {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    pub async fn analyze(&self, input: Arc<[u8]>, content_type: ContentType) -> Result<ContentAnalysis> {
        debug!("Analyzing {} bytes of {}", input.len(), content_type);
        match content_type {
            ContentType::Image => analyze_image(input).await,
            ContentType::Video => self.analyze_video(&input).await,
            ContentType::Audio => self.analyze_audio(&input).await,
        }
    }

    async fn analyze_video(&self, input: &[u8]) -> Result<ContentAnalysis> {
        let info = self
            .backend
            .probe(input, ContentType::Video)
            .await
            .map_err(into_analysis_error)?;

        let timestamps: Vec<f64> = if info.duration_secs > 0.0 {
            FRAME_POSITIONS.iter().map(|p| p * info.duration_secs).collect()
        } else {
            vec![0.0]
        };
        let frames = self
            .backend
            .sample_frames(input, &timestamps)
            .await
            .map_err(into_analysis_error)?;

        let features = run_blocking(move || Ok(merge_frames(&frames))).await?;
        Ok(video_analysis(&info, features))
    }

    async fn analyze_audio(&self, input: &[u8]) -> Result<ContentAnalysis> {
        let info = self
            .backend
            .probe(input, ContentType::Audio)
            .await
            .map_err(into_analysis_error)?;
        Ok(audio_analysis(&info))
    }
}

/// Unreadable data surfaces as an analysis failure, transient errors stay retryable
fn into_analysis_error(err: EngineError) -> EngineError {
    match err {
        EngineError::CorruptInput(msg) | EngineError::UnsupportedFormat(msg) => {
            EngineError::Analysis(msg)
        }
        other => other,
    }
}

async fn analyze_image(input: Arc<[u8]>) -> Result<ContentAnalysis> {
    run_blocking(move || {
        let image = image::load_from_memory(&input)
            .map_err(|e| EngineError::Analysis(format!("cannot decode image: {}", e)))?;
        let (width, height) = image.dimensions();
        let features = visual::extract(&image);
        Ok(image_analysis(Dimensions::new(width, height), features))
    })
    .await
}

fn image_analysis(dimensions: Dimensions, features: VisualFeatures) -> ContentAnalysis {
    let recommended_strategy = recommend_image(&features);
    ContentAnalysis {
        dimensions: Some(dimensions),
        complexity: features.complexity,
        color_complexity: features.color_complexity,
        noise_level: features.noise_level,
        has_text: features.has_text,
        has_faces: features.has_faces,
        dominant_colors: features.dominant_colors,
        duration: None,
        bitrate: None,
        dynamic_range: None,
        recommended_strategy,
    }
}

/// Combine per-frame features: worst case for complexity and noise,
/// any-frame for text and faces, middle frame for colours
fn merge_frames(frames: &[DynamicImage]) -> Option<VisualFeatures> {
    let per_frame: Vec<VisualFeatures> = frames.iter().map(visual::extract).collect();
    let middle = per_frame.get(per_frame.len() / 2)?.clone();

    Some(VisualFeatures {
        complexity: per_frame.iter().map(|f| f.complexity).max().unwrap_or(middle.complexity),
        noise_level: per_frame.iter().map(|f| f.noise_level).max().unwrap_or(middle.noise_level),
        has_text: per_frame.iter().any(|f| f.has_text),
        has_faces: per_frame.iter().any(|f| f.has_faces),
        ..middle
    })
}

fn video_analysis(info: &StreamInfo, features: Option<VisualFeatures>) -> ContentAnalysis {
    let (complexity, color_complexity, noise_level, has_text, has_faces, dominant_colors) =
        match features {
            Some(f) => (
                f.complexity,
                f.color_complexity,
                f.noise_level,
                f.has_text,
                f.has_faces,
                f.dominant_colors,
            ),
            None => (
                Complexity::Medium,
                ColorComplexity::Full,
                NoiseLevel::Clean,
                false,
                false,
                Vec::new(),
            ),
        };

    let mut analysis = ContentAnalysis {
        dimensions: info.dimensions,
        complexity,
        color_complexity,
        noise_level,
        has_text,
        has_faces,
        dominant_colors,
        duration: Some(info.duration_secs),
        bitrate: Some(info.bitrate_kbps),
        dynamic_range: None,
        recommended_strategy: StrategyKey::Balanced,
    };
    analysis.recommended_strategy = recommend_video(&analysis);
    analysis
}

fn audio_analysis(info: &StreamInfo) -> ContentAnalysis {
    let dynamic_range = match (info.mean_volume_db, info.max_volume_db) {
        (Some(mean), Some(max)) => classify_dynamic_range(max - mean),
        _ => DynamicRange::Normal,
    };
    let complexity = match dynamic_range {
        DynamicRange::Narrow => Complexity::Low,
        DynamicRange::Normal => Complexity::Medium,
        DynamicRange::Wide => Complexity::High,
    };

    let mut analysis = ContentAnalysis {
        dimensions: None,
        complexity,
        color_complexity: ColorComplexity::Monochrome,
        noise_level: NoiseLevel::Clean,
        has_text: false,
        has_faces: false,
        dominant_colors: Vec::new(),
        duration: Some(info.duration_secs),
        bitrate: Some(info.bitrate_kbps),
        dynamic_range: Some(dynamic_range),
        recommended_strategy: StrategyKey::Balanced,
    };
    analysis.recommended_strategy = recommend_audio(&analysis);
    analysis
}

/// Peak-to-mean loudness spread in dB
pub fn classify_dynamic_range(spread_db: f32) -> DynamicRange {
    if spread_db < 6.0 {
        DynamicRange::Narrow
    } else if spread_db < 14.0 {
        DynamicRange::Normal
    } else {
        DynamicRange::Wide
    }
}

fn recommend_image(features: &VisualFeatures) -> StrategyKey {
    match features.complexity {
        Complexity::High if features.has_text || features.has_faces => StrategyKey::Quality,
        Complexity::Low if features.color_complexity != ColorComplexity::Full => {
            StrategyKey::Aggressive
        }
        _ => StrategyKey::Balanced,
    }
}

fn recommend_video(analysis: &ContentAnalysis) -> StrategyKey {
    let duration = analysis.duration.unwrap_or(0.0);
    let bitrate = analysis.bitrate.unwrap_or(0);
    let height = analysis.dimensions.map(|d| d.height).unwrap_or(0);

    if duration > LONG_VIDEO_SECS {
        StrategyKey::Streaming
    } else if bitrate > 0 && bitrate < LOW_VIDEO_BITRATE_KBPS {
        StrategyKey::Mobile
    } else if analysis.complexity == Complexity::High && height >= 1080 {
        StrategyKey::Quality
    } else {
        StrategyKey::Balanced
    }
}

fn recommend_audio(analysis: &ContentAnalysis) -> StrategyKey {
    let duration = analysis.duration.unwrap_or(0.0);
    let bitrate = analysis.bitrate.unwrap_or(0);

    if duration > LONG_AUDIO_SECS {
        StrategyKey::Streaming
    } else if bitrate > 0 && bitrate <= LOW_AUDIO_BITRATE_KBPS {
        StrategyKey::Mobile
    } else if analysis.dynamic_range == Some(DynamicRange::Wide) && bitrate >= HIGH_AUDIO_BITRATE_KBPS {
        StrategyKey::Quality
    } else {
        StrategyKey::Balanced
    }
}
