//! # Optimization Orchestrator
//!
//! Esegue la pipeline di un singolo file:
//! `Pending → Analyzing → Resolving → Encoding → Succeeded | Failed`.
//!
//! ## Responsabilità:
//! - Validazione delle opzioni prima di qualsiasi I/O
//! - Lettura dell'input e scrittura degli output tramite `MediaStorage`
//! - Retry con backoff esponenziale per analisi, encoding e storage
//! - Timeout per task (ritentato una volta) e cancellazione cooperativa
//! - Calcolo di riduzione, quality score e tempo di elaborazione
//! - Inoltro dei metadati pass-through all'`AnalyticsSink`

use super::retry::RetryPolicy;
use crate::analytics::{AnalyticsEvent, AnalyticsSink, TracingAnalytics};
use crate::analyzer::MediaAnalyzer;
use crate::backend::{LimitedBackend, MediaBackend};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::resolver::{ResolvedPlan, StrategyResolver};
use crate::storage::{content_hash, output_reference, MediaStorage};
use crate::strategy::StrategyCatalog;
use crate::transcoder::{quality_score, EncodedOutput, Transcoder};
use crate::types::{
    ContentAnalysis, ContentType, OptimizationOptions, OptimizationRequest, OptimizationResult, Output,
};
use crate::utils::run_blocking;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

/// Lifecycle of one optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Analyzing,
    Resolving,
    Encoding,
    Succeeded,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Analyzing => "analyzing",
            Stage::Resolving => "resolving",
            Stage::Encoding => "encoding",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn transition(reference: &str, stage: Stage) {
    debug!("{} -> {}", reference, stage);
}

/// Output of the timed part of the pipeline
struct Encoded {
    plan: ResolvedPlan,
    outputs: Vec<EncodedOutput>,
    attempts: u32,
}

pub struct OptimizationOrchestrator {
    catalog: Arc<StrategyCatalog>,
    analyzer: MediaAnalyzer,
    resolver: StrategyResolver,
    backend: Arc<dyn MediaBackend>,
    storage: Arc<dyn MediaStorage>,
    analytics: Arc<dyn AnalyticsSink>,
    retry: RetryPolicy,
    task_timeout: Duration,
    output_prefix: String,
}

impl OptimizationOrchestrator {
    /// Build an orchestrator whose backend access is capped by
    /// `config.backend_permits`
    pub fn new(
        config: &EngineConfig,
        catalog: Arc<StrategyCatalog>,
        backend: Arc<dyn MediaBackend>,
        storage: Arc<dyn MediaStorage>,
    ) -> Self {
        let backend: Arc<dyn MediaBackend> =
            Arc::new(LimitedBackend::new(backend, config.effective_backend_permits()));

        Self {
            analyzer: MediaAnalyzer::new(backend.clone()),
            resolver: StrategyResolver::new(catalog.clone()),
            catalog,
            backend,
            storage,
            analytics: Arc::new(TracingAnalytics),
            retry: config.retry_policy(),
            task_timeout: config.task_timeout(),
            output_prefix: config.output_prefix.clone(),
        }
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    /// Inspect a stored file without producing any output
    pub async fn analyze_content(&self, reference: &str, content_type: ContentType) -> Result<ContentAnalysis> {
        let cancel = CancellationToken::new();
        let input = self.read_input(reference, &cancel).await.map_err(|err| match err {
            EngineError::CorruptInput(msg) => EngineError::Analysis(msg),
            other => other,
        })?;

        let (analysis, _) = self
            .retry
            .run("analysis", &cancel, || self.analyzer.analyze(input.clone(), content_type))
            .await?;
        Ok(analysis)
    }

    pub async fn optimize_content(
        &self,
        reference: &str,
        content_type: ContentType,
        options: &OptimizationOptions,
    ) -> Result<OptimizationResult> {
        self.optimize_with_cancel(reference, content_type, options, &CancellationToken::new())
            .await
    }

    pub async fn optimize_with_cancel(
        &self,
        reference: &str,
        content_type: ContentType,
        options: &OptimizationOptions,
        cancel: &CancellationToken,
    ) -> Result<OptimizationResult> {
        let span = info_span!("optimize", reference = %reference, content_type = %content_type);
        async {
            transition(reference, Stage::Pending);
            match self.optimize(reference, content_type, options, cancel).await {
                Ok(result) => {
                    transition(reference, Stage::Succeeded);
                    info!(
                        "Optimized {}: {} -> {} bytes ({:.0}% reduction, {} outputs)",
                        reference,
                        result.original_size,
                        result.optimized_size,
                        result.size_reduction,
                        result.outputs.len()
                    );
                    Ok(result)
                }
                Err(err) => {
                    transition(reference, Stage::Failed);
                    error!("Optimization of {} failed: {}", reference, err);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn optimize(
        &self,
        reference: &str,
        content_type: ContentType,
        options: &OptimizationOptions,
        cancel: &CancellationToken,
    ) -> Result<OptimizationResult> {
        let started = Instant::now();
        let request = options.parse()?;

        let input = self.read_input(reference, cancel).await?;
        let original_size = input.len() as u64;

        let task_timeout = self.task_timeout;
        let request = &request;
        let (encoded, _) = self
            .retry
            .run("task", cancel, || {
                let input = input.clone();
                async move {
                    tokio::time::timeout(task_timeout, self.encode(reference, input, content_type, request, cancel))
                        .await
                        .map_err(|_| EngineError::Timeout(task_timeout))?
                }
            })
            .await?;

        let outputs = self.store_outputs(&input, &encoded, cancel).await?;

        let optimized_size = outputs.first().map(|o| o.size).unwrap_or(original_size);
        let result = OptimizationResult {
            original_size,
            optimized_size,
            size_reduction: size_reduction(original_size, optimized_size),
            quality_score: quality_score(&encoded.outputs),
            processing_time: started.elapsed().as_millis() as u64,
            strategy: encoded.plan.strategy,
            outputs,
            attempts: encoded.attempts,
        };

        if request.analytics.enabled {
            self.analytics.record(&analytics_event(reference, content_type, request, &result));
        }
        Ok(result)
    }

    /// Analyzing (when needed), Resolving and Encoding, the part bounded by
    /// the task timeout
    async fn encode(
        &self,
        reference: &str,
        input: Arc<[u8]>,
        content_type: ContentType,
        request: &OptimizationRequest,
        cancel: &CancellationToken,
    ) -> Result<Encoded> {
        let analysis = if request.needs_analysis() {
            transition(reference, Stage::Analyzing);
            let (analysis, _) = self
                .retry
                .run("analysis", cancel, || self.analyzer.analyze(input.clone(), content_type))
                .await?;
            Some(analysis)
        } else {
            None
        };

        transition(reference, Stage::Resolving);
        let plan = self.resolver.resolve(request, analysis.as_ref(), content_type)?;
        debug!(
            "Resolved {} to '{}' with {} target(s)",
            reference,
            plan.strategy,
            plan.targets.len()
        );

        transition(reference, Stage::Encoding);
        let transcoder = Transcoder::for_content_type(content_type, self.backend.clone());
        let (outputs, attempts) = self
            .retry
            .run("encoding", cancel, || transcoder.encode(input.clone(), &plan))
            .await?;

        Ok(Encoded { plan, outputs, attempts })
    }

    async fn read_input(&self, reference: &str, cancel: &CancellationToken) -> Result<Arc<[u8]>> {
        let (data, _) = self
            .retry
            .run("read", cancel, || self.storage.read(reference))
            .await?;
        if data.is_empty() {
            return Err(EngineError::CorruptInput(format!("{} is empty", reference)));
        }
        Ok(Arc::from(data))
    }

    async fn store_outputs(
        &self,
        input: &Arc<[u8]>,
        encoded: &Encoded,
        cancel: &CancellationToken,
    ) -> Result<Vec<Output>> {
        let hash = {
            let input = input.clone();
            run_blocking(move || Ok(content_hash(&input))).await?
        };

        let mut outputs = Vec::with_capacity(encoded.outputs.len());
        for output in &encoded.outputs {
            let target = output_reference(
                &self.output_prefix,
                &hash,
                encoded.plan.strategy.as_str(),
                &output.label,
                output.format.extension(),
            );
            let (url, _) = self
                .retry
                .run("write", cancel, || self.storage.write(&target, &output.data))
                .await?;

            outputs.push(Output {
                quality: output.label.clone(),
                format: output.format.as_str().to_string(),
                size: output.data.len() as u64,
                url,
                optimizations: output.optimizations.clone(),
            });
        }
        Ok(outputs)
    }
}

/// Whole percent saved, clamped to [0, 100]
fn size_reduction(original: u64, optimized: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let saved = original.saturating_sub(optimized) as f64;
    (saved / original as f64 * 100.0).round().clamp(0.0, 100.0)
}

fn analytics_event(
    reference: &str,
    content_type: ContentType,
    request: &OptimizationRequest,
    result: &OptimizationResult,
) -> AnalyticsEvent {
    AnalyticsEvent {
        reference: reference.to_string(),
        content_type,
        strategy: result.strategy,
        content_id: request.analytics.content_id.clone(),
        artist_id: request.analytics.artist_id.clone(),
        original_size: result.original_size,
        optimized_size: result.optimized_size,
        size_reduction: result.size_reduction,
        quality_score: result.quality_score,
    }
}
