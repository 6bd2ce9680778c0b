//! # Batch Coordinator
//!
//! Esegue molte ottimizzazioni con concorrenza limitata.
//!
//! ## Responsabilità:
//! - Validazione del batch prima di avviare qualsiasi task
//! - Coda MPMC limitata (`async-channel`) consumata da un pool fisso di worker
//! - Un singolo collector che conta i task conclusi e chiama `on_progress`
//! - Risultati in ordine di sottomissione, fallimenti come `{ref, error, kind}`
//! - Cancellazione: i task non ancora avviati vengono registrati come `Cancelled`
//!
//! Il fallimento di un task non interrompe mai il batch.

use super::orchestrator::OptimizationOrchestrator;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::types::{
    BatchFailure, BatchResult, BatchSummary, ContentType, OptimizationOptions, OptimizationResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One entry of a batch request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTask {
    #[serde(rename = "ref")]
    pub reference: String,
    /// Validated per task, so a bad entry only fails itself
    pub content_type: String,
    #[serde(default)]
    pub options: OptimizationOptions,
}

impl BatchTask {
    pub fn new(reference: impl Into<String>, content_type: ContentType, options: OptimizationOptions) -> Self {
        Self {
            reference: reference.into(),
            content_type: content_type.to_string(),
            options,
        }
    }
}

/// Called with `(completed, total)` once per settled task
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Clone, Default)]
pub struct BatchOptions {
    /// Worker count, defaults to the configured `max_concurrent`
    pub max_concurrent: Option<usize>,
    pub on_progress: Option<ProgressCallback>,
    pub cancel: Option<CancellationToken>,
}

type Settled = (usize, Result<OptimizationResult>);

pub struct BatchCoordinator {
    orchestrator: Arc<OptimizationOrchestrator>,
    max_batch_size: usize,
    max_concurrent: usize,
}

impl BatchCoordinator {
    pub fn new(orchestrator: Arc<OptimizationOrchestrator>, config: &EngineConfig) -> Self {
        Self {
            orchestrator,
            max_batch_size: config.max_batch_size,
            max_concurrent: config.max_concurrent,
        }
    }

    pub fn validate(&self, tasks: &[BatchTask]) -> Result<()> {
        if tasks.is_empty() {
            return Err(EngineError::Validation("No files provided".to_string()));
        }
        if tasks.len() > self.max_batch_size {
            return Err(EngineError::Validation(format!(
                "Too many files: {} exceeds the limit of {}",
                tasks.len(),
                self.max_batch_size
            )));
        }
        Ok(())
    }

    pub async fn run(&self, tasks: Vec<BatchTask>, options: BatchOptions) -> Result<BatchResult> {
        self.validate(&tasks)?;

        let BatchOptions {
            max_concurrent,
            on_progress,
            cancel,
        } = options;
        let cancel = cancel.unwrap_or_default();
        let total = tasks.len();
        let references: Vec<String> = tasks.iter().map(|task| task.reference.clone()).collect();
        let workers = max_concurrent.unwrap_or(self.max_concurrent).clamp(1, total);
        info!("Starting batch of {} file(s) with {} worker(s)", total, workers);

        let (queue_tx, queue_rx) = async_channel::bounded::<(usize, BatchTask)>(workers);
        let feeder = tokio::spawn(async move {
            for entry in tasks.into_iter().enumerate() {
                if queue_tx.send(entry).await.is_err() {
                    break;
                }
            }
        });

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Settled>();
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let queue_rx = queue_rx.clone();
            let done_tx = done_tx.clone();
            let orchestrator = self.orchestrator.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                while let Ok((index, task)) = queue_rx.recv().await {
                    let outcome = if cancel.is_cancelled() {
                        Err(EngineError::Cancelled)
                    } else {
                        debug!("Worker {} picked {}", worker, task.reference);
                        run_isolated(orchestrator.clone(), task, cancel.clone()).await
                    };
                    if done_tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(done_tx);
        drop(queue_rx);

        // Single writer for progress and result slots
        let mut slots: Vec<Option<Result<OptimizationResult>>> = (0..total).map(|_| None).collect();
        let mut completed = 0;
        while let Some((index, outcome)) = done_rx.recv().await {
            completed += 1;
            if let Some(callback) = &on_progress {
                callback(completed, total);
            }
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(outcome);
            }
        }

        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                warn!("Batch worker ended abnormally: {}", e);
            }
        }
        if let Err(e) = feeder.await {
            warn!("Batch feeder ended abnormally: {}", e);
        }

        let (results, failures) = partition(references, slots);
        let summary = BatchSummary::from_outcomes(&results, failures.len());
        info!(
            "Batch finished: {} succeeded, {} failed, {:.1}% average reduction",
            summary.successful_optimizations, summary.failed_optimizations, summary.total_size_reduction
        );

        Ok(BatchResult {
            results,
            failures,
            summary,
        })
    }
}

/// Split settled slots into results and failures, in submission order.
/// A slot no worker filled counts as cancelled.
fn partition(
    references: Vec<String>,
    slots: Vec<Option<Result<OptimizationResult>>>,
) -> (Vec<OptimizationResult>, Vec<BatchFailure>) {
    let mut results = Vec::new();
    let mut failures = Vec::new();
    for (reference, slot) in references.into_iter().zip(slots) {
        match slot.unwrap_or(Err(EngineError::Cancelled)) {
            Ok(result) => results.push(result),
            Err(err) => failures.push(BatchFailure {
                reference,
                error: err.to_string(),
                kind: err.root().kind(),
            }),
        }
    }
    (results, failures)
}

/// Run one task on its own tokio task so a panic becomes a failure
async fn run_isolated(
    orchestrator: Arc<OptimizationOrchestrator>,
    task: BatchTask,
    cancel: CancellationToken,
) -> Result<OptimizationResult> {
    let handle = tokio::spawn(async move {
        let content_type: ContentType = task.content_type.parse()?;
        orchestrator
            .optimize_with_cancel(&task.reference, content_type, &task.options, &cancel)
            .await
    });

    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => Err(EngineError::TranscodeBackend(format!("task aborted: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::MemoryStorage;
    use crate::strategy::StrategyCatalog;
    use crate::testing::{fast_config, memory_storage, ScriptedBackend, FAIL_PREFIX};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    fn coordinator(backend: Arc<ScriptedBackend>, storage: Arc<MemoryStorage>) -> BatchCoordinator {
        coordinator_with(fast_config(), backend, storage)
    }

    fn coordinator_with(config: EngineConfig, backend: Arc<ScriptedBackend>, storage: Arc<MemoryStorage>) -> BatchCoordinator {
        let orchestrator =
            OptimizationOrchestrator::new(&config, Arc::new(StrategyCatalog::new()), backend, storage);
        BatchCoordinator::new(Arc::new(orchestrator), &config)
    }

    fn audio(prefix: &[u8], len: usize) -> Vec<u8> {
        let mut data = prefix.to_vec();
        data.resize(len, 1);
        data
    }

    fn task(reference: &str) -> BatchTask {
        BatchTask::new(reference, ContentType::Audio, OptimizationOptions::with_strategy("balanced"))
    }

    #[tokio::test]
    async fn test_partial_failure_does_not_abort_batch() {
        let backend = Arc::new(ScriptedBackend::new());
        let storage = memory_storage(&[
            ("a.wav", audio(b"RIFF", 32_000)),
            ("b.wav", audio(FAIL_PREFIX, 32_000)),
            ("c.wav", audio(b"RIFF", 48_000)),
        ]);
        let progress = Arc::new(Mutex::new(Vec::new()));
        let seen = progress.clone();
        let options = BatchOptions {
            on_progress: Some(Arc::new(move |done: usize, total: usize| seen.lock().unwrap().push((done, total)))),
            ..Default::default()
        };

        let batch = coordinator(backend, storage)
            .run(vec![task("a.wav"), task("b.wav"), task("c.wav")], options)
            .await
            .unwrap();

        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].reference, "b.wav");
        assert_eq!(batch.failures[0].kind, ErrorKind::TranscodeBackend);
        assert_eq!(batch.summary.total_files, 3);
        assert_eq!(batch.summary.successful_optimizations, 2);
        assert_eq!(batch.summary.failed_optimizations, 1);
        assert_eq!(*progress.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_results_keep_submission_order() {
        let backend = Arc::new(ScriptedBackend::new().with_delay(Duration::from_millis(5)));
        let objects: Vec<(String, Vec<u8>)> = (0..6)
            .map(|i| (format!("t{}.wav", i), audio(b"RIFF", 10_000 + i * 1_000)))
            .collect();
        let seeded: Vec<(&str, Vec<u8>)> = objects.iter().map(|(r, d)| (r.as_str(), d.clone())).collect();
        let tasks = objects.iter().map(|(r, _)| task(r)).collect();

        let batch = coordinator(backend, memory_storage(&seeded))
            .run(tasks, BatchOptions::default())
            .await
            .unwrap();

        let sizes: Vec<u64> = batch.results.iter().map(|r| r.original_size).collect();
        assert_eq!(sizes, vec![10_000, 11_000, 12_000, 13_000, 14_000, 15_000]);
    }

    #[tokio::test]
    async fn test_worker_count_bounds_concurrency() {
        let backend = Arc::new(ScriptedBackend::new().with_delay(Duration::from_millis(20)));
        let seeded: Vec<(String, Vec<u8>)> = (0..6).map(|i| (format!("{}.wav", i), audio(b"RIFF", 8_000))).collect();
        let objects: Vec<(&str, Vec<u8>)> = seeded.iter().map(|(r, d)| (r.as_str(), d.clone())).collect();
        let tasks = seeded.iter().map(|(r, _)| task(r)).collect();

        let options = BatchOptions {
            max_concurrent: Some(2),
            ..Default::default()
        };
        let batch = coordinator(backend.clone(), memory_storage(&objects))
            .run(tasks, options)
            .await
            .unwrap();

        assert_eq!(batch.results.len(), 6);
        assert!(backend.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_batch_size_is_validated_first() {
        let backend = Arc::new(ScriptedBackend::new());
        let coordinator = coordinator(backend.clone(), memory_storage(&[]));

        let err = coordinator.run(Vec::new(), BatchOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(ref msg) if msg == "No files provided"));

        let tasks = (0..101).map(|i| task(&format!("{}.wav", i))).collect();
        let err = coordinator.run(tasks, BatchOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(ref msg) if msg.starts_with("Too many files")));
        assert_eq!(backend.encode_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_batch_records_every_task() {
        let backend = Arc::new(ScriptedBackend::new());
        let storage = memory_storage(&[("a.wav", audio(b"RIFF", 1_000)), ("b.wav", audio(b"RIFF", 1_000))]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let options = BatchOptions {
            cancel: Some(cancel),
            ..Default::default()
        };
        let batch = coordinator(backend.clone(), storage)
            .run(vec![task("a.wav"), task("b.wav")], options)
            .await
            .unwrap();

        assert!(batch.results.is_empty());
        let refs: Vec<&str> = batch.failures.iter().map(|f| f.reference.as_str()).collect();
        assert_eq!(refs, vec!["a.wav", "b.wav"]);
        assert!(batch.failures.iter().all(|f| f.kind == ErrorKind::Cancelled));
        assert_eq!(batch.summary.average_quality_score, 0.0);
        assert_eq!(backend.encode_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_retry_backoff() {
        let config = EngineConfig {
            retry_base_delay_ms: 10_000,
            ..fast_config()
        };
        let storage = memory_storage(&[("good.wav", audio(b"RIFF", 4_000)), ("bad.wav", audio(FAIL_PREFIX, 4_000))]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        // The failing task sits in its first backoff when the good one settles
        let options = BatchOptions {
            max_concurrent: Some(2),
            on_progress: Some(Arc::new(move |_done: usize, _total: usize| trigger.cancel())),
            cancel: Some(cancel),
        };

        let started = Instant::now();
        let batch = coordinator_with(config, Arc::new(ScriptedBackend::new()), storage)
            .run(vec![task("good.wav"), task("bad.wav")], options)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].reference, "bad.wav");
        assert_eq!(batch.failures[0].kind, ErrorKind::Cancelled);
    }

    #[test]
    fn test_unfilled_slot_keeps_its_reference() {
        let references = vec!["a.wav".to_string(), "b.wav".to_string()];
        let slots = vec![Some(Err(EngineError::Storage("gone".into()))), None];

        let (results, failures) = partition(references, slots);
        assert!(results.is_empty());
        assert_eq!(failures[0].reference, "a.wav");
        assert_eq!(failures[0].kind, ErrorKind::Storage);
        assert_eq!(failures[1].reference, "b.wav");
        assert_eq!(failures[1].kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_invalid_content_type_fails_only_its_task() {
        let storage = memory_storage(&[("a.wav", audio(b"RIFF", 4_000))]);
        let bad = BatchTask {
            reference: "doc.pdf".into(),
            content_type: "DOCUMENT".into(),
            options: OptimizationOptions::default(),
        };

        let batch = coordinator(Arc::new(ScriptedBackend::new()), storage)
            .run(vec![bad, task("a.wav")], BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.failures[0].kind, ErrorKind::Validation);
    }

    #[test]
    fn test_task_deserializes_from_request_json() {
        let json = r#"{"ref":"uploads/1.mp4","contentType":"video","options":{"strategy":"streaming"}}"#;
        let task: BatchTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.reference, "uploads/1.mp4");
        assert_eq!(task.options.strategy.as_deref(), Some("streaming"));

        let bare: BatchTask = serde_json::from_str(r#"{"ref":"a.png","contentType":"IMAGE"}"#).unwrap();
        assert!(bare.options.strategy.is_none());
    }
}
