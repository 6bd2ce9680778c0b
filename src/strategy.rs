//! # Strategy Catalog Module
//!
//! Registro in sola lettura delle strategie di ottimizzazione.
//!
//! ## Responsabilità:
//! - Definisce le 6 strategie: auto, aggressive, balanced, quality, mobile, streaming
//! - Espone lookup per chiave e listing (key/name/description) per il layer di presentazione
//! - Raccoglie le manopole di encoding di ogni strategia (qualità, dimensioni, bitrate)
//!
//! Il catalogo viene costruito una volta all'avvio e condiviso via `Arc`.
//!
//! ## Tabella strategie:
//! | key        | riduzione | qualità | max dim | video | audio | rung |
//! |------------|-----------|---------|---------|-------|-------|------|
//! | auto       | dinamica  | 85      | 1920    | 0.80  | 128k  | 2    |
//! | aggressive | 70%       | 65      | 1280    | 0.55  | 96k   | 1    |
//! | balanced   | 45%       | 82      | 1920    | 0.80  | 128k  | 2    |
//! | quality    | 20%       | 95      | 2560    | 1.00  | 192k  | 2    |
//! | mobile     | 60%       | 72      | 1080    | 0.60  | 96k   | 2    |
//! | streaming  | 55%       | 78      | 1920    | 0.75  | 128k  | 3    |

use crate::error::{EngineError, Result};
use crate::types::StrategyKey;
use serde::Serialize;
use std::collections::BTreeMap;

/// A named size/quality policy
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDefinition {
    pub key: StrategyKey,
    pub name: &'static str,
    pub description: &'static str,
    /// Expected size reduction in percent (0 for auto, decided per file)
    pub target_size_reduction: u8,
    /// Encoder quality floor in [0, 100]
    pub quality_threshold: u8,
    /// Longest side of still-image outputs before device bias
    pub image_max_dimension: u32,
    /// Multiplier applied to the base bitrate of every video rung
    pub video_bitrate_scale: f32,
    pub audio_bitrate_kbps: u32,
    /// How many rungs of the video ladder to emit
    pub video_rungs: usize,
}

/// Listing entry for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySummary {
    pub key: String,
    pub name: String,
    pub description: String,
}

/// Immutable registry of strategies
#[derive(Debug, Clone)]
pub struct StrategyCatalog {
    strategies: BTreeMap<StrategyKey, StrategyDefinition>,
}

impl Default for StrategyCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyCatalog {
    /// Build the standard catalog
    pub fn new() -> Self {
        let definitions = [
            StrategyDefinition {
                key: StrategyKey::Auto,
                name: "Auto",
                description: "Content-aware selection based on media analysis",
                target_size_reduction: 0,
                quality_threshold: 85,
                image_max_dimension: 1920,
                video_bitrate_scale: 0.80,
                audio_bitrate_kbps: 128,
                video_rungs: 2,
            },
            StrategyDefinition {
                key: StrategyKey::Aggressive,
                name: "Aggressive",
                description: "Maximum compression, visible quality loss acceptable",
                target_size_reduction: 70,
                quality_threshold: 65,
                image_max_dimension: 1280,
                video_bitrate_scale: 0.55,
                audio_bitrate_kbps: 96,
                video_rungs: 1,
            },
            StrategyDefinition {
                key: StrategyKey::Balanced,
                name: "Balanced",
                description: "Good compression with minimal visible quality loss",
                target_size_reduction: 45,
                quality_threshold: 82,
                image_max_dimension: 1920,
                video_bitrate_scale: 0.80,
                audio_bitrate_kbps: 128,
                video_rungs: 2,
            },
            StrategyDefinition {
                key: StrategyKey::Quality,
                name: "Quality",
                description: "Near-lossless output for detailed or text-heavy content",
                target_size_reduction: 20,
                quality_threshold: 95,
                image_max_dimension: 2560,
                video_bitrate_scale: 1.0,
                audio_bitrate_kbps: 192,
                video_rungs: 2,
            },
            StrategyDefinition {
                key: StrategyKey::Mobile,
                name: "Mobile",
                description: "Small outputs for phones and slow networks",
                target_size_reduction: 60,
                quality_threshold: 72,
                image_max_dimension: 1080,
                video_bitrate_scale: 0.60,
                audio_bitrate_kbps: 96,
                video_rungs: 2,
            },
            StrategyDefinition {
                key: StrategyKey::Streaming,
                name: "Streaming",
                description: "Adaptive ladder for progressive playback",
                target_size_reduction: 55,
                quality_threshold: 78,
                image_max_dimension: 1920,
                video_bitrate_scale: 0.75,
                audio_bitrate_kbps: 128,
                video_rungs: 3,
            },
        ];

        Self {
            strategies: definitions.into_iter().map(|d| (d.key, d)).collect(),
        }
    }

    /// Look up a strategy by its raw key
    pub fn lookup(&self, key: &str) -> Result<&StrategyDefinition> {
        let key: StrategyKey = key.parse()?;
        self.get(key)
    }

    pub fn get(&self, key: StrategyKey) -> Result<&StrategyDefinition> {
        self.strategies
            .get(&key)
            .ok_or_else(|| EngineError::UnknownStrategy(key.to_string()))
    }

    pub fn list(&self) -> Vec<StrategySummary> {
        self.strategies
            .values()
            .map(|d| StrategySummary {
                key: d.key.to_string(),
                name: d.name.to_string(),
                description: d.description.to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
