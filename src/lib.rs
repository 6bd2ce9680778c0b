//! # Content Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare del motore di ottimizzazione
//! - Espone i tipi e le operazioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per il layer HTTP
//!
//! ## Architettura dei moduli:
//! - `engine`: Facciata con le quattro operazioni di confine
//! - `strategy`: Catalogo immutabile delle strategie
//! - `analyzer`: Analisi dei contenuti e strategia raccomandata
//! - `resolver`: Strategia + dispositivo + connessione → piano di encoding
//! - `transcoder`: Esecuzione del piano per immagini, video e audio
//! - `backend`: Capability verso `image` e i tool esterni (ffmpeg, cwebp, exiftool)
//! - `optimizer`: Orchestratore per file, retry e batch concorrente
//! - `storage`: Lettura degli originali e scrittura degli output
//! - `config` / `error` / `types`: Configurazione, errori e modello dati
//!
//! ## Utilizzo:
//! ```rust
//! use content_optimizer::storage::MemoryStorage;
//! use content_optimizer::backend::ToolBackend;
//! use content_optimizer::{ContentEngine, EngineConfig};
//! use std::sync::Arc;
//!
//! let engine = ContentEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(ToolBackend::from_report(Vec::new())),
//! )
//! .unwrap();
//! assert_eq!(engine.list_strategies().len(), 6);
//! ```

pub mod analytics;
pub mod analyzer;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod optimizer;
pub mod platform;
pub mod progress;
pub mod resolver;
pub mod storage;
pub mod strategy;
pub mod transcoder;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use engine::ContentEngine;
pub use error::{EngineError, ErrorKind, Result};
pub use types::{
    BatchFailure, BatchResult, BatchSummary, ContentAnalysis, ContentType, OptimizationOptions,
    OptimizationResult, Output, StrategyKey, TargetConnection, TargetDevice,
};
