//! In-process still-image encoding through the `image` crate.

use crate::backend::OutputFormat;
use crate::error::{EngineError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder};

/// Formats this module can write without external tools
pub fn supports(format: OutputFormat) -> bool {
    matches!(format, OutputFormat::Jpeg | OutputFormat::Png)
}

/// Encode `image` as JPEG (lossy, `quality` 1-100) or PNG (lossless).
pub fn encode(image: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
            encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
        }
        OutputFormat::Png => {
            let rgba = image.to_rgba8();
            let encoder =
                PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, FilterType::Adaptive);
            encoder.write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)?;
        }
        other => {
            return Err(EngineError::UnsupportedFormat(format!(
                "{} cannot be encoded in-process",
                other
            )))
        }
    }

    Ok(buffer)
}
