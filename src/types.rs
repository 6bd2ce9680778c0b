//! # Core Types Module
//!
//! Questo modulo definisce il modello dati condiviso dal motore.
//!
//! ## Responsabilità:
//! - Enumerazioni validate al confine (`ContentType`, `StrategyKey`,
//!   `TargetDevice`, `TargetConnection`) con parsing case-insensitive
//! - `ContentAnalysis`: risultato dell'analisi di un media
//! - `OptimizationOptions`: opzioni grezze di una richiesta e loro validazione
//! - `OptimizationResult` / `Output`: risultato di una singola ottimizzazione
//! - `BatchResult` / `BatchSummary`: risultato aggregato di un batch
//!
//! ## Serializzazione:
//! Tutti i tipi di risultato usano campi camelCase, così il layer HTTP
//! può restituirli come JSON senza conversioni.

use crate::error::{EngineError, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of media handled by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentType {
    Image,
    Video,
    Audio,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Image => "IMAGE",
            ContentType::Video => "VIDEO",
            ContentType::Audio => "AUDIO",
        }
    }
}

impl FromStr for ContentType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IMAGE" => Ok(ContentType::Image),
            "VIDEO" => Ok(ContentType::Video),
            "AUDIO" => Ok(ContentType::Audio),
            other => Err(EngineError::Validation(format!(
                "Invalid content type '{}', expected one of IMAGE, VIDEO, AUDIO",
                other
            ))),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a strategy in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKey {
    Auto,
    Aggressive,
    Balanced,
    Quality,
    Mobile,
    Streaming,
}

impl StrategyKey {
    pub const ALL: [StrategyKey; 6] = [
        StrategyKey::Auto,
        StrategyKey::Aggressive,
        StrategyKey::Balanced,
        StrategyKey::Quality,
        StrategyKey::Mobile,
        StrategyKey::Streaming,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKey::Auto => "auto",
            StrategyKey::Aggressive => "aggressive",
            StrategyKey::Balanced => "balanced",
            StrategyKey::Quality => "quality",
            StrategyKey::Mobile => "mobile",
            StrategyKey::Streaming => "streaming",
        }
    }
}

impl FromStr for StrategyKey {
    type Err = EngineError;

    /// Unknown keys fail with `UnknownStrategy`, which callers surface as a
    /// client error before any work starts
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        StrategyKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| EngineError::UnknownStrategy(s.trim().to_string()))
    }
}

impl fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device class the outputs are adapted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetDevice {
    Mobile,
    Tablet,
    Desktop,
    Tv,
}

impl FromStr for TargetDevice {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mobile" => Ok(TargetDevice::Mobile),
            "tablet" => Ok(TargetDevice::Tablet),
            "desktop" => Ok(TargetDevice::Desktop),
            "tv" => Ok(TargetDevice::Tv),
            other => Err(EngineError::Validation(format!(
                "Invalid target device '{}', expected one of mobile, tablet, desktop, tv",
                other
            ))),
        }
    }
}

/// Network class the outputs are adapted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetConnection {
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
    #[serde(rename = "5g")]
    FiveG,
    #[serde(rename = "wifi")]
    Wifi,
}

impl TargetConnection {
    /// Slow links that force smaller outputs
    pub fn is_constrained(&self) -> bool {
        matches!(self, TargetConnection::TwoG | TargetConnection::ThreeG)
    }
}

impl FromStr for TargetConnection {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "2g" => Ok(TargetConnection::TwoG),
            "3g" => Ok(TargetConnection::ThreeG),
            "4g" => Ok(TargetConnection::FourG),
            "5g" => Ok(TargetConnection::FiveG),
            "wifi" => Ok(TargetConnection::Wifi),
            other => Err(EngineError::Validation(format!(
                "Invalid target connection '{}', expected one of 2g, 3g, 4g, 5g, wifi",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorComplexity {
    Monochrome,
    Limited,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseLevel {
    Clean,
    Moderate,
    Heavy,
}

/// Loudness spread of an audio track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicRange {
    Narrow,
    Normal,
    Wide,
}

/// Result of inspecting one media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentAnalysis {
    /// Absent for audio
    pub dimensions: Option<Dimensions>,
    pub complexity: Complexity,
    pub color_complexity: ColorComplexity,
    pub noise_level: NoiseLevel,
    pub has_text: bool,
    pub has_faces: bool,
    /// At most five `#rrggbb` entries, most frequent first
    pub dominant_colors: Vec<String>,
    /// Seconds
    pub duration: Option<f64>,
    /// Kilobits per second
    pub bitrate: Option<u32>,
    pub dynamic_range: Option<DynamicRange>,
    pub recommended_strategy: StrategyKey,
}

/// Raw options of one optimization request, as received at the boundary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizationOptions {
    pub strategy: Option<String>,
    pub target_device: Option<String>,
    pub target_connection: Option<String>,
    pub preserve_metadata: Option<bool>,
    pub enable_analytics: Option<bool>,
    pub content_id: Option<String>,
    pub artist_id: Option<String>,
}

impl OptimizationOptions {
    pub fn with_strategy(strategy: &str) -> Self {
        Self {
            strategy: Some(strategy.to_string()),
            ..Default::default()
        }
    }

    /// Validate every enumerated field
    pub fn parse(&self) -> Result<OptimizationRequest> {
        let strategy = match self.strategy.as_deref() {
            Some(raw) => raw.parse()?,
            None => StrategyKey::Auto,
        };
        let target_device: Option<TargetDevice> = self
            .target_device
            .as_deref()
            .map(str::parse)
            .transpose()?;
        let target_connection: Option<TargetConnection> = self
            .target_connection
            .as_deref()
            .map(str::parse)
            .transpose()?;

        Ok(OptimizationRequest {
            strategy,
            target_device,
            target_connection,
            preserve_metadata: self.preserve_metadata.unwrap_or(false),
            analytics: PassThroughMetadata {
                enabled: self.enable_analytics.unwrap_or(false),
                content_id: self.content_id.clone(),
                artist_id: self.artist_id.clone(),
            },
        })
    }
}

/// Opaque metadata forwarded to the analytics sink, never used for decisions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassThroughMetadata {
    pub enabled: bool,
    pub content_id: Option<String>,
    pub artist_id: Option<String>,
}

/// Validated form of [`OptimizationOptions`]
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRequest {
    pub strategy: StrategyKey,
    pub target_device: Option<TargetDevice>,
    pub target_connection: Option<TargetConnection>,
    pub preserve_metadata: bool,
    pub analytics: PassThroughMetadata,
}

impl OptimizationRequest {
    pub fn needs_analysis(&self) -> bool {
        self.strategy == StrategyKey::Auto
    }
}

/// One encoded artifact produced from a source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    /// Rendition label: `primary`, `fallback`, `1080p`, `thumbnail`, `128k`...
    pub quality: String,
    pub format: String,
    pub size: u64,
    pub url: String,
    pub optimizations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub original_size: u64,
    pub optimized_size: u64,
    /// Whole percent, `(original - optimized) / original * 100` rounded
    pub size_reduction: f64,
    pub quality_score: f64,
    /// Milliseconds, including retries
    pub processing_time: u64,
    pub strategy: StrategyKey,
    pub outputs: Vec<Output>,
    /// Encoding attempts needed, 1 when nothing was retried
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    #[serde(rename = "ref")]
    pub reference: String,
    pub error: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_files: usize,
    pub successful_optimizations: usize,
    pub failed_optimizations: usize,
    /// Average size reduction over successes
    pub total_size_reduction: f64,
    pub average_quality_score: f64,
    /// Sum of per-file processing times, milliseconds
    pub total_processing_time: u64,
}

impl BatchSummary {
    pub fn from_outcomes(results: &[OptimizationResult], failed: usize) -> Self {
        let successes = results.len();
        let (reduction, quality) = if successes == 0 {
            (0.0, 0.0)
        } else {
            (
                results.iter().map(|r| r.size_reduction).sum::<f64>() / successes as f64,
                results.iter().map(|r| r.quality_score).sum::<f64>() / successes as f64,
            )
        };

        Self {
            total_files: successes + failed,
            successful_optimizations: successes,
            failed_optimizations: failed,
            total_size_reduction: reduction,
            average_quality_score: quality,
            total_processing_time: results.iter().map(|r| r.processing_time).sum(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub results: Vec<OptimizationResult>,
    pub failures: Vec<BatchFailure>,
    pub summary: BatchSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!("image".parse::<ContentType>().unwrap(), ContentType::Image);
        assert_eq!("VIDEO".parse::<ContentType>().unwrap(), ContentType::Video);
        assert_eq!("Quality".parse::<StrategyKey>().unwrap(), StrategyKey::Quality);
        assert_eq!("TV".parse::<TargetDevice>().unwrap(), TargetDevice::Tv);
        assert_eq!("WiFi".parse::<TargetConnection>().unwrap(), TargetConnection::Wifi);
    }

    #[test]
    fn test_invalid_enums_fail_validation() {
        assert!(matches!(
            "DOCUMENT".parse::<ContentType>(),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            "ultra".parse::<StrategyKey>(),
            Err(EngineError::UnknownStrategy(key)) if key == "ultra"
        ));
        assert!(matches!(
            "watch".parse::<TargetDevice>(),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            "6g".parse::<TargetConnection>(),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_options_parse_defaults_to_auto() {
        let request = OptimizationOptions::default().parse().unwrap();
        assert_eq!(request.strategy, StrategyKey::Auto);
        assert!(request.needs_analysis());
        assert!(!request.preserve_metadata);
        assert!(!request.analytics.enabled);
    }

    #[test]
    fn test_options_parse_full_request() {
        let options = OptimizationOptions {
            strategy: Some("streaming".into()),
            target_device: Some("tv".into()),
            target_connection: Some("wifi".into()),
            preserve_metadata: Some(true),
            enable_analytics: Some(true),
            content_id: Some("c-1".into()),
            artist_id: Some("a-9".into()),
        };
        let request = options.parse().unwrap();
        assert_eq!(request.strategy, StrategyKey::Streaming);
        assert_eq!(request.target_device, Some(TargetDevice::Tv));
        assert_eq!(request.target_connection, Some(TargetConnection::Wifi));
        assert!(request.preserve_metadata);
        assert_eq!(request.analytics.content_id.as_deref(), Some("c-1"));
        assert!(!request.needs_analysis());
    }

    #[test]
    fn test_options_deserialize_camel_case() {
        let json = r#"{"strategy":"mobile","targetDevice":"mobile","targetConnection":"3g"}"#;
        let options: OptimizationOptions = serde_json::from_str(json).unwrap();
        let request = options.parse().unwrap();
        assert_eq!(request.target_connection, Some(TargetConnection::ThreeG));
    }

    #[test]
    fn test_summary_averages_are_zero_without_successes() {
        let summary = BatchSummary::from_outcomes(&[], 3);
        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.failed_optimizations, 3);
        assert_eq!(summary.total_size_reduction, 0.0);
        assert_eq!(summary.average_quality_score, 0.0);
    }

    #[test]
    fn test_summary_aggregates_successes() {
        let result = |reduction: f64, quality: f64, time: u64| OptimizationResult {
            original_size: 100,
            optimized_size: 50,
            size_reduction: reduction,
            quality_score: quality,
            processing_time: time,
            strategy: StrategyKey::Balanced,
            outputs: Vec::new(),
            attempts: 1,
        };
        let summary = BatchSummary::from_outcomes(&[result(40.0, 80.0, 10), result(60.0, 90.0, 30)], 1);
        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.successful_optimizations, 2);
        assert_eq!(summary.total_size_reduction, 50.0);
        assert_eq!(summary.average_quality_score, 85.0);
        assert_eq!(summary.total_processing_time, 40);
    }
}
