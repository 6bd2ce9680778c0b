//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione del motore di ottimizzazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `EngineConfig` con limiti, retry e timeout
//! - Fornisce validazione dei parametri
//! - Supporta caricamento/salvataggio da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `max_batch_size`: Numero massimo di task per batch (default: 100)
//! - `max_concurrent`: Worker paralleli del batch (default: 4)
//! - `backend_permits`: Accessi concorrenti al backend media (default: 0 = CPU disponibili)
//! - `retry_attempts`: Tentativi per analisi/encoding (default: 3)
//! - `retry_base_delay_ms`: Base del backoff esponenziale (default: 200)
//! - `storage_attempts`: Tentativi per letture/scritture storage (default: 2)
//! - `timeout_attempts`: Tentativi dopo un timeout (default: 2)
//! - `task_timeout_secs`: Tempo massimo per task (default: 900)
//! - `output_prefix`: Prefisso dei riferimenti di output (default: "optimized")
//! - `video_preset`: Preset x264 usato dalla CLI (default: "medium")
//!
//! ## Esempio:
//! ```rust
//! use content_optimizer::EngineConfig;
//!
//! let config = EngineConfig {
//!     max_concurrent: 8,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use crate::optimizer::RetryPolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the optimization engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest accepted batch
    pub max_batch_size: usize,
    /// Default number of batch workers
    pub max_concurrent: usize,
    /// Concurrent backend calls (0 = available parallelism)
    pub backend_permits: usize,
    /// Attempts for analysis and encoding stages
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// Attempts for storage reads and writes
    pub storage_attempts: u32,
    /// Attempts when a task exceeds its timeout
    pub timeout_attempts: u32,
    pub task_timeout_secs: u64,
    pub output_prefix: String,
    /// x264 preset handed to the tool backend
    pub video_preset: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_concurrent: 4,
            backend_permits: 0,
            retry_attempts: 3,
            retry_base_delay_ms: 200,
            storage_attempts: 2,
            timeout_attempts: 2,
            task_timeout_secs: 900,
            output_prefix: "optimized".to_string(),
            video_preset: "medium".to_string(),
        }
    }
}

impl EngineConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(anyhow::anyhow!("Maximum batch size must be greater than 0"));
        }

        if self.max_concurrent == 0 {
            return Err(anyhow::anyhow!("Number of concurrent workers must be greater than 0"));
        }

        if self.retry_attempts == 0 || self.retry_attempts > 10 {
            return Err(anyhow::anyhow!("Retry attempts must be between 1 and 10"));
        }

        if self.storage_attempts == 0 || self.timeout_attempts == 0 {
            return Err(anyhow::anyhow!("Storage and timeout attempts must be at least 1"));
        }

        if self.video_preset.trim().is_empty() {
            return Err(anyhow::anyhow!("Video preset cannot be empty"));
        }

        if self.task_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Task timeout must be greater than 0"));
        }

        if self.output_prefix.trim().is_empty() || self.output_prefix.starts_with('/') {
            return Err(anyhow::anyhow!(
                "Output prefix must be a non-empty relative path: '{}'",
                self.output_prefix
            ));
        }

        Ok(())
    }

    /// Backend permits, resolving 0 to the available parallelism
    pub fn effective_backend_permits(&self) -> usize {
        if self.backend_permits > 0 {
            self.backend_permits
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            storage_attempts: self.storage_attempts,
            timeout_attempts: self.timeout_attempts,
        }
    }

    /// `~/.content-optimizer/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".content-optimizer").join("config.json"))
    }

    /// Load configuration from file, falling back to defaults if it does not exist
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());

        config.max_batch_size = 0;
        assert!(config.validate().is_err());

        config.max_batch_size = 100;
        config.retry_attempts = 0;
        assert!(config.validate().is_err());

        config.retry_attempts = 3;
        config.output_prefix = "/abs".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.task_timeout(), Duration::from_secs(900));
        assert!(config.effective_backend_permits() >= 1);

        let policy = config.retry_policy();
        assert_eq!(policy.base_delay, Duration::from_millis(200));
        assert_eq!(policy.storage_attempts, 2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_concurrent": 2}"#).unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.max_batch_size, 100);
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let original = EngineConfig {
            max_concurrent: 8,
            backend_permits: 2,
            task_timeout_secs: 60,
            output_prefix: "renditions".to_string(),
            ..Default::default()
        };
        original.save_to_file(&config_path).await.unwrap();

        let loaded = EngineConfig::from_file(&config_path).await.unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = EngineConfig::from_file(&temp_dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(loaded, EngineConfig::default());
    }
}
