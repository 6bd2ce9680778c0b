//! Still-image renditions.
//!
//! Each target is resized to its maximum dimension (Lanczos3, never up)
//! and encoded through the backend. Targets whose format the backend
//! cannot produce are skipped. When the primary rendition would not be
//! smaller than the source and nothing was resized, the source bytes are
//! kept under their own format (JPEG, PNG or WebP sources only).

use super::{apply_metadata, fit_within, EncodedOutput};
use crate::backend::{ImageEncoding, MediaBackend, OutputFormat};
use crate::error::{EngineError, Result};
use crate::resolver::{ResolvedPlan, TargetSpec};
use crate::utils::run_blocking;
use image::{GenericImageView, ImageError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Share of the quality score lost when an image is shrunk to nothing
const DOWNSCALE_QUALITY_WEIGHT: f64 = 0.15;

pub struct ImageTranscoder {
    backend: Arc<dyn MediaBackend>,
}

impl ImageTranscoder {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    pub async fn encode(&self, input: Arc<[u8]>, plan: &ResolvedPlan) -> Result<Vec<EncodedOutput>> {
        let source = {
            let input = input.clone();
            run_blocking(move || image::load_from_memory(&input).map_err(source_error)).await?
        };
        let source_format = image::guess_format(&input).ok().and_then(OutputFormat::from_image_format);
        let source_side = source.width().max(source.height()).max(1);
        let source = Arc::new(source);

        let mut outputs: Vec<EncodedOutput> = Vec::with_capacity(plan.targets.len());
        for target in &plan.targets {
            let (format, max_dimension) = match target.spec {
                TargetSpec::Image { format, max_dimension } => (format, max_dimension),
                ref other => {
                    return Err(EngineError::UnsupportedFormat(format!(
                        "image transcoder cannot produce {:?}",
                        other
                    )))
                }
            };
            if !self.backend.supports(format) {
                warn!("Backend {} cannot encode {}, skipping {}", self.backend.name(), format, target.label);
                continue;
            }

            let (frame, resized) = fit_within(source.clone(), max_dimension).await?;
            let (width, height) = frame.dimensions();
            let encoding = ImageEncoding {
                format,
                quality: target.quality,
            };
            let encoded = self.backend.encode_image(frame, &encoding).await?;

            let mut optimizations = vec![format!("format-{}", format), format!("quality-{}", target.quality)];
            if resized {
                optimizations.push(format!("resized-{}x{}", width, height));
            }
            let data = apply_metadata(
                self.backend.as_ref(),
                &input,
                encoded,
                format,
                plan.preserve_metadata,
                &mut optimizations,
            )
            .await?;

            let is_primary = outputs.is_empty();
            if let Some(source_format) = source_format.filter(|_| is_primary && !resized && data.len() >= input.len()) {
                debug!(
                    "{} rendition ({} bytes) is not smaller than the {} source, keeping original",
                    target.label,
                    data.len(),
                    source_format
                );
                outputs.push(EncodedOutput {
                    label: target.label.clone(),
                    format: source_format,
                    data: input.to_vec(),
                    optimizations: vec!["kept-original".to_string()],
                    quality: 100.0,
                });
                continue;
            }

            let scale = width.max(height) as f64 / source_side as f64;
            outputs.push(EncodedOutput {
                label: target.label.clone(),
                format,
                data,
                optimizations,
                quality: target.quality as f64 * (1.0 - DOWNSCALE_QUALITY_WEIGHT * (1.0 - scale.min(1.0))),
            });
        }

        Ok(outputs)
    }
}

/// Any failure to decode the source is a property of the input
fn source_error(err: ImageError) -> EngineError {
    match err {
        ImageError::Unsupported(e) => EngineError::UnsupportedFormat(e.to_string()),
        other => EngineError::CorruptInput(format!("cannot decode image: {}", other)),
    }
}
