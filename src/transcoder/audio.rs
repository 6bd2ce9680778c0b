//! Audio rendition: a single AAC encode at the planned bitrate.

use super::{metadata_tag, EncodedOutput};
use crate::backend::{AudioEncoding, MediaBackend};
use crate::error::{EngineError, Result};
use crate::resolver::{ResolvedPlan, TargetSpec};
use std::sync::Arc;

pub struct AudioTranscoder {
    backend: Arc<dyn MediaBackend>,
}

impl AudioTranscoder {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    pub async fn encode(&self, input: Arc<[u8]>, plan: &ResolvedPlan) -> Result<Vec<EncodedOutput>> {
        let mut outputs = Vec::with_capacity(plan.targets.len());

        for target in &plan.targets {
            let TargetSpec::Audio { format, bitrate_kbps } = target.spec else {
                return Err(EngineError::UnsupportedFormat(format!(
                    "audio transcoder cannot produce {:?}",
                    target.spec
                )));
            };

            let encoding = AudioEncoding {
                format,
                bitrate_kbps,
                preserve_metadata: plan.preserve_metadata,
            };
            let data = self.backend.encode_audio(&input, &encoding).await?;

            // Tags travel through ffmpeg's -map_metadata
            let optimizations = vec![
                "aac".to_string(),
                format!("{}kbps", bitrate_kbps),
                metadata_tag(plan.preserve_metadata).to_string(),
            ];

            outputs.push(EncodedOutput {
                label: target.label.clone(),
                format,
                data,
                optimizations,
                quality: target.quality as f64,
            });
        }

        Ok(outputs)
    }
}
