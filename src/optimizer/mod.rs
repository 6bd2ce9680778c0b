//! # Optimizer Module
//!
//! Esecuzione delle ottimizzazioni, separata in sottomoduli:
//! - `orchestrator`: pipeline Analyze → Resolve → Encode per un singolo file
//! - `batch`: pool di worker con coda limitata e collector dei progressi
//! - `retry`: politica di retry con backoff esponenziale

pub mod batch;
pub mod orchestrator;
pub mod retry;

pub use batch::{BatchCoordinator, BatchOptions, BatchTask, ProgressCallback};
pub use orchestrator::{OptimizationOrchestrator, Stage};
pub use retry::RetryPolicy;
