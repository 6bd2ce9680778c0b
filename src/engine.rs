//! # Content Engine
//!
//! Facciata pubblica del motore: le quattro operazioni di confine con input
//! stringa validati all'ingresso.
//!
//! ## Operazioni:
//! - `analyze_content(ref, contentType)` → `ContentAnalysis`
//! - `optimize_content(ref, contentType, options)` → `OptimizationResult`
//! - `batch_optimize(tasks, options)` → `BatchResult`
//! - `list_strategies()` → `[{key, name, description}]`
//!
//! ## Esempio:
//! ```rust,no_run
//! use content_optimizer::backend::ToolBackend;
//! use content_optimizer::storage::FileStorage;
//! use content_optimizer::{ContentEngine, EngineConfig, OptimizationOptions};
//! use std::sync::Arc;
//!
//! # async fn run() -> content_optimizer::Result<()> {
//! let engine = ContentEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(FileStorage::new("uploads", "public")),
//!     Arc::new(ToolBackend::detect().await),
//! )?;
//! let result = engine
//!     .optimize_content("cover.png", "IMAGE", &OptimizationOptions::with_strategy("balanced"))
//!     .await?;
//! println!("{}% smaller", result.size_reduction);
//! # Ok(())
//! # }
//! ```

use crate::analytics::AnalyticsSink;
use crate::backend::MediaBackend;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::optimizer::{BatchCoordinator, BatchOptions, BatchTask, OptimizationOrchestrator};
use crate::storage::MediaStorage;
use crate::strategy::{StrategyCatalog, StrategySummary};
use crate::types::{BatchResult, ContentAnalysis, ContentType, OptimizationOptions, OptimizationResult};
use std::sync::Arc;

pub struct ContentEngine {
    config: EngineConfig,
    orchestrator: Arc<OptimizationOrchestrator>,
    batch: BatchCoordinator,
}

impl ContentEngine {
    pub fn new(config: EngineConfig, storage: Arc<dyn MediaStorage>, backend: Arc<dyn MediaBackend>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        let orchestrator =
            OptimizationOrchestrator::new(&config, Arc::new(StrategyCatalog::new()), backend, storage);
        Ok(Self::assemble(config, orchestrator))
    }

    /// Same as [`ContentEngine::new`] with a custom analytics sink
    pub fn with_analytics(
        config: EngineConfig,
        storage: Arc<dyn MediaStorage>,
        backend: Arc<dyn MediaBackend>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        let orchestrator = OptimizationOrchestrator::new(&config, Arc::new(StrategyCatalog::new()), backend, storage)
            .with_analytics(analytics);
        Ok(Self::assemble(config, orchestrator))
    }

    fn assemble(config: EngineConfig, orchestrator: OptimizationOrchestrator) -> Self {
        let orchestrator = Arc::new(orchestrator);
        let batch = BatchCoordinator::new(orchestrator.clone(), &config);
        Self {
            config,
            orchestrator,
            batch,
        }
    }

    #[cfg(test)]
    fn with_task_timeout(
        config: EngineConfig,
        storage: Arc<dyn MediaStorage>,
        backend: Arc<dyn MediaBackend>,
        timeout: std::time::Duration,
    ) -> Self {
        let orchestrator = OptimizationOrchestrator::new(&config, Arc::new(StrategyCatalog::new()), backend, storage)
            .with_task_timeout(timeout);
        Self::assemble(config, orchestrator)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn analyze_content(&self, reference: &str, content_type: &str) -> Result<ContentAnalysis> {
        let content_type: ContentType = content_type.parse()?;
        self.orchestrator.analyze_content(reference, content_type).await
    }

    pub async fn optimize_content(
        &self,
        reference: &str,
        content_type: &str,
        options: &OptimizationOptions,
    ) -> Result<OptimizationResult> {
        let content_type: ContentType = content_type.parse()?;
        self.orchestrator
            .optimize_content(reference, content_type, options)
            .await
    }

    pub async fn batch_optimize(&self, tasks: Vec<BatchTask>, options: BatchOptions) -> Result<BatchResult> {
        self.batch.run(tasks, options).await
    }

    pub fn list_strategies(&self) -> Vec<StrategySummary> {
        self.orchestrator.catalog().list()
    }
}
