//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato JSON-lines della CLI, per
//! processi che pilotano il binario (worker di upload, script).
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio di un comando con il numero di file
//! - `progress`: Task conclusi sul totale
//! - `file_complete`: Risultato o errore di un file
//! - `analysis`: Analisi di un file
//! - `strategies`: Catalogo delle strategie
//! - `complete`: Fine del batch con riepilogo, risultati e fallimenti
//! - `error`: Errore generale

use crate::strategy::StrategySummary;
use crate::types::{BatchFailure, BatchSummary, ContentAnalysis, OptimizationResult};
use serde::Serialize;

/// One line of machine-readable output
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        command: String,
        total_files: usize,
    },

    Progress {
        completed: usize,
        total: usize,
        percentage: f64,
    },

    FileComplete {
        #[serde(rename = "ref")]
        reference: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<OptimizationResult>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    Analysis {
        #[serde(rename = "ref")]
        reference: String,
        analysis: ContentAnalysis,
    },

    Strategies {
        strategies: Vec<StrategySummary>,
    },

    Complete {
        summary: BatchSummary,
        /// Submission order
        results: Vec<OptimizationResult>,
        failures: Vec<BatchFailure>,
        duration_seconds: f64,
    },

    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(command: &str, total_files: usize) -> Self {
        Self::Start {
            command: command.to_string(),
            total_files,
        }
    }

    pub fn progress(completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self::Progress {
            completed,
            total,
            percentage,
        }
    }

    pub fn file_complete(reference: &str, outcome: Result<&OptimizationResult, String>) -> Self {
        let (result, error) = match outcome {
            Ok(result) => (Some(result.clone()), None),
            Err(error) => (None, Some(error)),
        };
        Self::FileComplete {
            reference: reference.to_string(),
            result,
            error,
        }
    }

    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_tagged() {
        let json = serde_json::to_value(JsonMessage::progress(1, 4)).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["percentage"], 25.0);

        let json = serde_json::to_value(JsonMessage::start("batch", 4)).unwrap();
        assert_eq!(json["type"], "start");
        assert_eq!(json["total_files"], 4);
    }

    #[test]
    fn test_file_complete_error_shape() {
        let json = serde_json::to_value(JsonMessage::file_complete("a.png", Err("boom".into()))).unwrap();
        assert_eq!(json["type"], "file_complete");
        assert_eq!(json["ref"], "a.png");
        assert_eq!(json["error"], "boom");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_progress_with_zero_total() {
        match JsonMessage::progress(0, 0) {
            JsonMessage::Progress { percentage, .. } => assert_eq!(percentage, 0.0),
            other => panic!("unexpected {:?}", other),
        }
    }
}
