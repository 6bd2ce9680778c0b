//! # Tool Backend
//!
//! Implementazione di `MediaBackend` basata su tool esterni.
//!
//! ## Pipeline:
//! - **Probe**: `ffprobe -print_format json`, più `volumedetect` di ffmpeg per l'audio
//! - **Frame**: `ffmpeg -ss <t> -frames:v 1` in PNG su stdout
//! - **JPEG/PNG**: encoder in-process del crate `image`
//! - **WebP**: `cwebp` su un PNG lossless intermedio
//! - **Video**: H.264 + AAC in MP4 con `+faststart`, mai upscale
//! - **Audio**: AAC in contenitore M4A
//! - **Metadata**: `exiftool -tagsFromFile`, best effort
//!
//! Ogni invocazione lavora su file temporanei (`tempfile`) rimossi al drop,
//! e i processi figli vengono terminati se il task viene cancellato.

use crate::args;
use crate::backend::{
    raster, AudioEncoding, ImageEncoding, MediaBackend, OutputFormat, StreamInfo, VideoEncoding,
};
use crate::error::{EngineError, Result};
use crate::platform::PlatformCommands;
use crate::types::{ContentType, Dimensions};
use crate::utils::{path_arg, run_blocking};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::collections::HashMap;
use std::process::Output;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

/// Media backend driven by ffmpeg, ffprobe, cwebp and exiftool
pub struct ToolBackend {
    platform: &'static PlatformCommands,
    available: HashMap<&'static str, bool>,
    video_preset: String,
}

impl ToolBackend {
    /// Probe the host for every media tool
    pub async fn detect() -> Self {
        let platform = PlatformCommands::instance();
        let report = platform.media_tools_report().await;
        for (tool, found) in &report {
            debug!("Tool {}: {}", tool, if *found { "available" } else { "missing" });
        }
        Self::from_report(report)
    }

    /// Build from a known availability report
    pub fn from_report(report: Vec<(&'static str, bool)>) -> Self {
        Self {
            platform: PlatformCommands::instance(),
            available: report.into_iter().collect(),
            video_preset: "medium".to_string(),
        }
    }

    /// x264 preset used for video rungs
    pub fn with_video_preset(mut self, preset: impl Into<String>) -> Self {
        self.video_preset = preset.into();
        self
    }

    fn has(&self, tool: &str) -> bool {
        self.available.get(tool).copied().unwrap_or(false)
    }

    fn require(&self, tool: &str) -> Result<()> {
        if self.has(tool) {
            Ok(())
        } else {
            Err(EngineError::MissingDependency(format!(
                "{} is required but was not found on PATH",
                tool
            )))
        }
    }

    /// Fail early when the tools a content type needs are missing
    pub fn check_dependencies(&self, content_type: ContentType) -> Result<()> {
        match content_type {
            ContentType::Image => Ok(()),
            ContentType::Video | ContentType::Audio => {
                self.require("ffprobe")?;
                self.require("ffmpeg")
            }
        }
    }

    async fn run(&self, tool: &'static str, args: &[String]) -> Result<Output> {
        self.require(tool)?;
        let command = self.platform.get_command(tool);
        debug!("Running {} {}", command, args.join(" "));

        let output = Command::new(command)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    EngineError::MissingDependency(format!("{} could not be executed", tool))
                }
                _ => EngineError::TranscodeBackend(format!("failed to execute {}: {}", tool, e)),
            })?;

        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(classify_failure(tool, &stderr))
        }
    }

    async fn loudness(&self, input: &NamedTempFile) -> Option<(f32, f32)> {
        let args = args![
            "-hide_banner",
            "-nostats",
            "-i",
            path_arg(input.path()),
            "-vn",
            "-af",
            "volumedetect",
            "-f",
            "null",
            "-"
        ];
        match self.run("ffmpeg", &args).await {
            Ok(output) => parse_volume(&String::from_utf8_lossy(&output.stderr)),
            Err(e) => {
                warn!("Loudness detection failed: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl MediaBackend for ToolBackend {
    fn name(&self) -> &str {
        "tools"
    }

    fn supports(&self, format: OutputFormat) -> bool {
        match format {
            OutputFormat::Jpeg | OutputFormat::Png => true,
            OutputFormat::Webp => self.has("cwebp"),
            OutputFormat::Mp4 | OutputFormat::M4a => self.has("ffmpeg"),
        }
    }

    async fn probe(&self, input: &[u8], content_type: ContentType) -> Result<StreamInfo> {
        let source = write_temp(".input", input).await?;
        let args = args![
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            path_arg(source.path())
        ];
        let output = self.run("ffprobe", &args).await?;
        let mut info = parse_probe(&String::from_utf8_lossy(&output.stdout))?;

        match content_type {
            ContentType::Video if !info.has_video => {
                return Err(EngineError::CorruptInput("no video stream found".to_string()))
            }
            ContentType::Audio if !info.has_audio => {
                return Err(EngineError::CorruptInput("no audio stream found".to_string()))
            }
            _ => {}
        }

        if content_type == ContentType::Audio {
            if let Some((mean, max)) = self.loudness(&source).await {
                info.mean_volume_db = Some(mean);
                info.max_volume_db = Some(max);
            }
        }

        Ok(info)
    }

    async fn sample_frames(&self, input: &[u8], timestamps: &[f64]) -> Result<Vec<DynamicImage>> {
        let source = write_temp(".input", input).await?;
        let mut frames = Vec::with_capacity(timestamps.len());

        for timestamp in timestamps {
            let args = args![
                "-hide_banner",
                "-loglevel",
                "error",
                "-ss",
                format!("{:.3}", timestamp.max(0.0)),
                "-i",
                path_arg(source.path()),
                "-frames:v",
                1,
                "-f",
                "image2pipe",
                "-vcodec",
                "png",
                "-"
            ];
            let output = self.run("ffmpeg", &args).await?;
            if output.stdout.is_empty() {
                // Seeking past the last keyframe yields nothing
                debug!("No frame decoded at {:.3}s", timestamp);
                continue;
            }
            let png = output.stdout;
            let frame = run_blocking(move || {
                Ok(image::load_from_memory_with_format(&png, ImageFormat::Png)?)
            })
            .await?;
            frames.push(frame);
        }

        Ok(frames)
    }

    async fn encode_image(&self, image: DynamicImage, encoding: &ImageEncoding) -> Result<Vec<u8>> {
        let ImageEncoding { format, quality } = *encoding;

        if raster::supports(format) {
            return run_blocking(move || raster::encode(&image, format, quality)).await;
        }
        if format != OutputFormat::Webp {
            return Err(EngineError::UnsupportedFormat(format!(
                "{} is not a still-image format",
                format
            )));
        }

        self.require("cwebp")?;
        let lossless = run_blocking(move || raster::encode(&image, OutputFormat::Png, 100)).await?;
        let source = write_temp(".png", &lossless).await?;
        let target = empty_temp(".webp")?;
        let args = args![
            "-quiet",
            "-q",
            quality,
            "-m",
            4,
            "-metadata",
            "none",
            path_arg(source.path()),
            "-o",
            path_arg(target.path())
        ];
        self.run("cwebp", &args).await?;
        read_output("cwebp", &target).await
    }

    async fn encode_video(&self, input: &[u8], encoding: &VideoEncoding) -> Result<Vec<u8>> {
        let source = write_temp(".input", input).await?;
        let target = empty_temp(".mp4")?;
        let bitrate = encoding.video_bitrate_kbps;

        let args = args![
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            path_arg(source.path()),
            "-vf",
            format!("scale=-2:'trunc(min(ih,{})/2)*2'", encoding.max_height),
            "-c:v",
            "libx264",
            "-preset",
            self.video_preset,
            "-b:v",
            format!("{}k", bitrate),
            "-maxrate",
            format!("{}k", bitrate * 3 / 2),
            "-bufsize",
            format!("{}k", bitrate * 2),
            "-c:a",
            "aac",
            "-b:a",
            format!("{}k", encoding.audio_bitrate_kbps),
            "-map_metadata",
            metadata_map(encoding.preserve_metadata),
            "-movflags",
            "+faststart",
            "-y",
            path_arg(target.path())
        ];
        self.run("ffmpeg", &args).await?;
        read_output("ffmpeg", &target).await
    }

    async fn encode_audio(&self, input: &[u8], encoding: &AudioEncoding) -> Result<Vec<u8>> {
        if encoding.format != OutputFormat::M4a {
            return Err(EngineError::UnsupportedFormat(format!(
                "{} is not an audio format",
                encoding.format
            )));
        }

        let source = write_temp(".input", input).await?;
        let target = empty_temp(".m4a")?;
        let args = args![
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            path_arg(source.path()),
            "-vn",
            "-c:a",
            "aac",
            "-b:a",
            format!("{}k", encoding.bitrate_kbps),
            "-map_metadata",
            metadata_map(encoding.preserve_metadata),
            "-movflags",
            "+faststart",
            "-f",
            "ipod",
            "-y",
            path_arg(target.path())
        ];
        self.run("ffmpeg", &args).await?;
        read_output("ffmpeg", &target).await
    }

    async fn copy_metadata(
        &self,
        source: &[u8],
        encoded: Vec<u8>,
        format: OutputFormat,
    ) -> Result<Vec<u8>> {
        if !self.has("exiftool") {
            debug!("exiftool not available, metadata not copied");
            return Ok(encoded);
        }

        let original = write_temp(".input", source).await?;
        let target = write_temp(&format!(".{}", format.extension()), &encoded).await?;
        let args = args![
            "-tagsFromFile",
            path_arg(original.path()),
            "-all:all",
            "-overwrite_original",
            path_arg(target.path())
        ];

        match self.run("exiftool", &args).await {
            Ok(_) => read_output("exiftool", &target).await,
            Err(e) => {
                // Metadata problems never fail the output
                warn!("Failed to copy metadata: {}", e);
                Ok(encoded)
            }
        }
    }
}

fn metadata_map(preserve: bool) -> &'static str {
    if preserve {
        "0"
    } else {
        "-1"
    }
}

fn empty_temp(suffix: &str) -> Result<NamedTempFile> {
    Ok(tempfile::Builder::new()
        .prefix("content-optimizer-")
        .suffix(suffix)
        .tempfile()?)
}

async fn write_temp(suffix: &str, bytes: &[u8]) -> Result<NamedTempFile> {
    let file = empty_temp(suffix)?;
    tokio::fs::write(file.path(), bytes).await?;
    Ok(file)
}

async fn read_output(tool: &str, file: &NamedTempFile) -> Result<Vec<u8>> {
    let data = tokio::fs::read(file.path()).await?;
    if data.is_empty() {
        return Err(EngineError::TranscodeBackend(format!(
            "{} produced an empty output",
            tool
        )));
    }
    Ok(data)
}

/// Map a failed tool run to an error category
pub(crate) fn classify_failure(tool: &str, stderr: &str) -> EngineError {
    const CORRUPT_MARKERS: [&str; 5] = [
        "Invalid data found when processing input",
        "moov atom not found",
        "could not find codec parameters",
        "does not contain any stream",
        "Cannot read file",
    ];
    const UNSUPPORTED_MARKERS: [&str; 3] = [
        "Unknown encoder",
        "Encoder not found",
        "Unsupported codec",
    ];

    let detail = stderr.trim();
    let detail = detail.lines().last().unwrap_or("exited with an error");
    let message = format!("{}: {}", tool, detail);

    if CORRUPT_MARKERS.iter().any(|m| stderr.contains(m)) {
        EngineError::CorruptInput(message)
    } else if UNSUPPORTED_MARKERS.iter().any(|m| stderr.contains(m)) {
        EngineError::UnsupportedFormat(message)
    } else {
        EngineError::TranscodeBackend(message)
    }
}

/// Parse `ffprobe -print_format json` output
pub(crate) fn parse_probe(json: &str) -> Result<StreamInfo> {
    let info: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| EngineError::CorruptInput(format!("unreadable probe output: {}", e)))?;

    let empty = Vec::new();
    let streams = info["streams"].as_array().unwrap_or(&empty);
    if streams.is_empty() {
        return Err(EngineError::CorruptInput("no media streams found".to_string()));
    }

    let video = streams.iter().find(|s| s["codec_type"] == "video");
    let audio = streams.iter().find(|s| s["codec_type"] == "audio");

    let format = &info["format"];
    let duration = format["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    let bitrate = format["bit_rate"]
        .as_str()
        .and_then(|b| b.parse::<u64>().ok())
        .map(|bps| (bps / 1000) as u32)
        .unwrap_or(0);

    let dimensions = video.and_then(|s| {
        let width = s["width"].as_u64()? as u32;
        let height = s["height"].as_u64()? as u32;
        Some(Dimensions::new(width, height))
    });
    let codec = video
        .or(audio)
        .and_then(|s| s["codec_name"].as_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(StreamInfo {
        dimensions,
        duration_secs: duration,
        bitrate_kbps: bitrate,
        codec,
        has_video: video.is_some(),
        has_audio: audio.is_some(),
        mean_volume_db: None,
        max_volume_db: None,
    })
}

/// Extract `(mean, max)` dB from ffmpeg `volumedetect` output
pub(crate) fn parse_volume(stderr: &str) -> Option<(f32, f32)> {
    let read = |key: &str| {
        stderr.lines().find_map(|line| {
            let (_, rest) = line.split_once(key)?;
            rest.trim().trim_end_matches("dB").trim().parse::<f32>().ok()
        })
    };
    Some((read("mean_volume:")?, read("max_volume:")?))
}
