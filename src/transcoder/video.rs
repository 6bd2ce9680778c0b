//! Video ladder renditions plus a poster thumbnail.

use super::{apply_metadata, fit_within, metadata_tag, EncodedOutput};
use crate::backend::{ImageEncoding, MediaBackend, OutputFormat, VideoEncoding};
use crate::error::{EngineError, Result};
use crate::resolver::{ResolvedPlan, TargetSpec};
use crate::types::ContentType;
use image::GenericImageView;
use std::sync::Arc;
use tracing::debug;

/// Thumbnail frame position as a fraction of the duration
const THUMBNAIL_POSITION: f64 = 0.1;

pub struct VideoTranscoder {
    backend: Arc<dyn MediaBackend>,
}

impl VideoTranscoder {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    pub async fn encode(&self, input: Arc<[u8]>, plan: &ResolvedPlan) -> Result<Vec<EncodedOutput>> {
        let info = self.backend.probe(&input, ContentType::Video).await?;
        let source_height = info.dimensions.map(|d| d.height);

        let mut outputs = Vec::with_capacity(plan.targets.len());
        for target in &plan.targets {
            match target.spec {
                TargetSpec::VideoRung {
                    height,
                    video_bitrate_kbps,
                    audio_bitrate_kbps,
                } => {
                    let encoding = VideoEncoding {
                        max_height: height,
                        video_bitrate_kbps,
                        audio_bitrate_kbps,
                        preserve_metadata: plan.preserve_metadata,
                    };
                    let data = self.backend.encode_video(&input, &encoding).await?;
                    debug!("Encoded {} rung: {} bytes", target.label, data.len());

                    let mut optimizations = vec![
                        "h264-aac".to_string(),
                        format!("{}kbps", video_bitrate_kbps),
                        "faststart".to_string(),
                    ];
                    if source_height.map(|h| h < height).unwrap_or(false) {
                        optimizations.push("no-upscale".to_string());
                    }
                    // ffmpeg maps container tags itself
                    optimizations.push(metadata_tag(plan.preserve_metadata).to_string());

                    outputs.push(EncodedOutput {
                        label: target.label.clone(),
                        format: OutputFormat::Mp4,
                        data,
                        optimizations,
                        quality: target.quality as f64,
                    });
                }
                TargetSpec::Thumbnail { max_dimension } => {
                    let timestamp = (info.duration_secs * THUMBNAIL_POSITION).max(0.0);
                    let frame = self
                        .backend
                        .sample_frames(&input, &[timestamp])
                        .await?
                        .into_iter()
                        .next()
                        .ok_or_else(|| {
                            EngineError::TranscodeBackend("no frame decoded for the thumbnail".to_string())
                        })?;

                    let (frame, _) = fit_within(Arc::new(frame), max_dimension).await?;
                    let (width, height) = frame.dimensions();
                    let encoding = ImageEncoding {
                        format: OutputFormat::Jpeg,
                        quality: target.quality,
                    };
                    let encoded = self.backend.encode_image(frame, &encoding).await?;

                    let mut optimizations = vec!["thumbnail".to_string(), format!("{}x{}", width, height)];
                    let data = apply_metadata(
                        self.backend.as_ref(),
                        &input,
                        encoded,
                        OutputFormat::Jpeg,
                        false,
                        &mut optimizations,
                    )
                    .await?;

                    outputs.push(EncodedOutput {
                        label: target.label.clone(),
                        format: OutputFormat::Jpeg,
                        data,
                        optimizations,
                        quality: target.quality as f64,
                    });
                }
                ref other => {
                    return Err(EngineError::UnsupportedFormat(format!(
                        "video transcoder cannot produce {:?}",
                        other
                    )))
                }
            }
        }

        Ok(outputs)
    }
}
