//! # Progress Reporting Module
//!
//! Questo modulo gestisce il feedback visivo della CLI durante un batch.
//!
//! ## Responsabilità:
//! - Progress bar con `indicatif`, avanzata dal callback `on_progress` del batch
//! - Spinner per operazioni singole (analisi, ottimizzazione di un file)
//! - Riepilogo finale leggibile di un `BatchSummary`
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 42/70 (60%)
//! ```

use crate::file_manager::FileManager;
use crate::optimizer::ProgressCallback;
use crate::types::{BatchResult, BatchSummary};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

/// Manages the progress bar of a batch run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// A bar that draws nothing, for JSON output
    pub fn hidden(total_files: u64) -> Self {
        Self {
            bar: ProgressBar::with_draw_target(Some(total_files), ProgressDrawTarget::hidden()),
        }
    }

    /// Callback for `BatchOptions::on_progress`; `completed` is absolute
    pub fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        Arc::new(move |completed: usize, _total: usize| bar.set_position(completed as u64))
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

pub fn format_summary(summary: &BatchSummary) -> String {
    format!(
        "Processed: {} files | Optimized: {} | Failed: {} | Avg reduction: {:.1}% | Avg quality: {:.1} | Time: {:.2}s",
        summary.total_files,
        summary.successful_optimizations,
        summary.failed_optimizations,
        summary.total_size_reduction,
        summary.average_quality_score,
        summary.total_processing_time as f64 / 1000.0
    )
}

/// Summary plus the bytes saved by the primary renditions
pub fn format_batch(batch: &BatchResult) -> String {
    let saved = FileManager::total_saved(batch.results.iter().map(|r| (r.original_size, r.optimized_size)));
    format!("{} | Saved: {}", format_summary(&batch.summary), FileManager::format_size(saved))
}
