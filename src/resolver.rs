//! # Strategy Resolver Module
//!
//! Trasforma una richiesta validata in un piano di encoding concreto.
//!
//! ## Responsabilità:
//! - Risolve `auto` nella strategia raccomandata dall'analisi
//! - Applica il bias del dispositivo e della connessione target
//! - Produce i target di output per tipo di contenuto:
//!   - **Immagine**: primario WebP + fallback JPEG
//!   - **Video**: ladder di bitrate (1080p/720p/480p/360p) + thumbnail JPEG
//!   - **Audio**: AAC/M4A a bitrate della strategia
//!
//! ## Bias di connessione:
//! - `2g`: qualità -15, dimensione massima dimezzata, audio max 64k
//! - `3g`: qualità -8, dimensione massima a 3/4, audio max 96k
//! - `wifi` / `4g` / `5g`: nessuna riduzione
//!
//! Il resolver è puro: nessun I/O, nessuno stato.

use crate::backend::OutputFormat;
use crate::error::{EngineError, Result};
use crate::strategy::{StrategyCatalog, StrategyDefinition};
use crate::types::{ContentAnalysis, ContentType, OptimizationRequest, StrategyKey, TargetConnection, TargetDevice};
use std::sync::Arc;

/// Video ladder: (height, base bitrate in kbps)
const VIDEO_LADDER: [(u32, u32); 4] = [(1080, 5000), (720, 2800), (480, 1400), (360, 800)];
const MIN_IMAGE_DIMENSION: u32 = 320;
const THUMBNAIL_DIMENSION: u32 = 640;
const THUMBNAIL_QUALITY: u8 = 80;

/// What a single output should look like
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSpec {
    Image { format: OutputFormat, max_dimension: u32 },
    VideoRung { height: u32, video_bitrate_kbps: u32, audio_bitrate_kbps: u32 },
    Thumbnail { max_dimension: u32 },
    Audio { format: OutputFormat, bitrate_kbps: u32 },
}

impl TargetSpec {
    pub fn format(&self) -> OutputFormat {
        match self {
            TargetSpec::Image { format, .. } | TargetSpec::Audio { format, .. } => *format,
            TargetSpec::VideoRung { .. } => OutputFormat::Mp4,
            TargetSpec::Thumbnail { .. } => OutputFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputTarget {
    /// Rendition label reported in `Output.quality`
    pub label: String,
    pub quality: u8,
    pub spec: TargetSpec,
}

/// A concrete encoding plan; the first target is the primary rendition
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlan {
    pub strategy: StrategyKey,
    pub content_type: ContentType,
    pub targets: Vec<OutputTarget>,
    pub preserve_metadata: bool,
}

impl ResolvedPlan {
    pub fn primary(&self) -> Option<&OutputTarget> {
        self.targets.first()
    }
}

pub struct StrategyResolver {
    catalog: Arc<StrategyCatalog>,
}

impl StrategyResolver {
    pub fn new(catalog: Arc<StrategyCatalog>) -> Self {
        Self { catalog }
    }

    pub fn resolve(
        &self,
        request: &OptimizationRequest,
        analysis: Option<&ContentAnalysis>,
        content_type: ContentType,
    ) -> Result<ResolvedPlan> {
        let key = match request.strategy {
            StrategyKey::Auto => match analysis {
                Some(a) if a.recommended_strategy != StrategyKey::Auto => a.recommended_strategy,
                Some(_) => StrategyKey::Balanced,
                None => {
                    return Err(EngineError::Validation(
                        "strategy 'auto' requires a content analysis".to_string(),
                    ))
                }
            },
            explicit => explicit,
        };
        let definition = self.catalog.get(key)?;
        let bias = Bias::new(request.target_device, request.target_connection);

        let targets = match content_type {
            ContentType::Image => image_targets(definition, &bias),
            ContentType::Video => video_targets(definition, &bias),
            ContentType::Audio => audio_targets(definition, &bias),
        };

        Ok(ResolvedPlan {
            strategy: key,
            content_type,
            targets,
            preserve_metadata: request.preserve_metadata,
        })
    }
}

struct Bias {
    device: Option<TargetDevice>,
    connection: Option<TargetConnection>,
}

impl Bias {
    fn new(device: Option<TargetDevice>, connection: Option<TargetConnection>) -> Self {
        Self { device, connection }
    }

    fn quality_adjust(&self) -> i16 {
        match self.connection {
            Some(TargetConnection::TwoG) => -15,
            Some(TargetConnection::ThreeG) => -8,
            _ => 0,
        }
    }

    fn quality(&self, threshold: u8, penalty: i16) -> u8 {
        (threshold as i16 + self.quality_adjust() - penalty).clamp(1, 100) as u8
    }

    fn image_dimension(&self, base: u32) -> u32 {
        let by_device = match self.device {
            Some(TargetDevice::Mobile) => base.min(1080),
            Some(TargetDevice::Tablet) => base.min(2048),
            Some(TargetDevice::Tv) => base.max(2560),
            Some(TargetDevice::Desktop) | None => base,
        };
        let by_connection = match self.connection {
            Some(TargetConnection::TwoG) => by_device / 2,
            Some(TargetConnection::ThreeG) => by_device * 3 / 4,
            _ => by_device,
        };
        by_connection.max(MIN_IMAGE_DIMENSION)
    }

    /// Index of the highest ladder rung allowed
    fn top_rung(&self, strategy: StrategyKey) -> usize {
        let base = match strategy {
            StrategyKey::Aggressive | StrategyKey::Mobile => 1,
            _ => 0,
        };
        let constrained = self.connection.map(|c| c.is_constrained()).unwrap_or(false);
        match (self.device, self.connection) {
            (Some(TargetDevice::Tv), _) => 0,
            (Some(TargetDevice::Mobile), _) if constrained => base.max(2),
            (Some(TargetDevice::Mobile), _) => base.max(1),
            (_, Some(TargetConnection::TwoG)) => base.max(2),
            (_, Some(TargetConnection::ThreeG)) => base.max(1),
            _ => base,
        }
    }

    fn audio_bitrate(&self, base: u32) -> u32 {
        match self.connection {
            Some(TargetConnection::TwoG) => base.min(64),
            Some(TargetConnection::ThreeG) => base.min(96),
            _ => base,
        }
    }
}

fn image_targets(definition: &StrategyDefinition, bias: &Bias) -> Vec<OutputTarget> {
    let max_dimension = bias.image_dimension(definition.image_max_dimension);
    let quality = bias.quality(definition.quality_threshold, 0);

    [("primary", OutputFormat::Webp), ("fallback", OutputFormat::Jpeg)]
        .into_iter()
        .map(|(label, format)| OutputTarget {
            label: label.to_string(),
            quality,
            spec: TargetSpec::Image { format, max_dimension },
        })
        .collect()
}

fn rung_penalty(height: u32) -> i16 {
    match height {
        h if h >= 1080 => 0,
        h if h >= 720 => 4,
        h if h >= 480 => 10,
        _ => 16,
    }
}

fn video_targets(definition: &StrategyDefinition, bias: &Bias) -> Vec<OutputTarget> {
    let top = bias.top_rung(definition.key);
    let audio_bitrate_kbps = bias.audio_bitrate(definition.audio_bitrate_kbps);

    let mut targets: Vec<OutputTarget> = VIDEO_LADDER[top..]
        .iter()
        .take(definition.video_rungs)
        .map(|&(height, base_kbps)| OutputTarget {
            label: format!("{}p", height),
            quality: bias.quality(definition.quality_threshold, rung_penalty(height)),
            spec: TargetSpec::VideoRung {
                height,
                video_bitrate_kbps: (base_kbps as f32 * definition.video_bitrate_scale).round() as u32,
                audio_bitrate_kbps,
            },
        })
        .collect();

    let thumbnail_dimension = match bias.device {
        Some(TargetDevice::Mobile) => THUMBNAIL_DIMENSION * 3 / 4,
        _ => THUMBNAIL_DIMENSION,
    };
    targets.push(OutputTarget {
        label: "thumbnail".to_string(),
        quality: THUMBNAIL_QUALITY,
        spec: TargetSpec::Thumbnail { max_dimension: thumbnail_dimension },
    });
    targets
}

fn audio_targets(definition: &StrategyDefinition, bias: &Bias) -> Vec<OutputTarget> {
    let bitrate_kbps = bias.audio_bitrate(definition.audio_bitrate_kbps);
    vec![OutputTarget {
        label: format!("{}k", bitrate_kbps),
        quality: bias.quality(definition.quality_threshold, 0),
        spec: TargetSpec::Audio { format: OutputFormat::M4a, bitrate_kbps },
    }]
}
