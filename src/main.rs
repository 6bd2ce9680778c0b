//! # Content Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso della CLI.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti con `clap` (sottocomandi analyze, optimize, batch, strategies)
//! - Inizializzazione del logging con `tracing` (INFO, o DEBUG con `--verbose`)
//! - Caricamento della configurazione da `~/.content-optimizer/config.json`
//! - Costruzione del `ContentEngine` su `FileStorage` e `ToolBackend`
//! - Output leggibile (progress bar) o JSON-lines (`--json`)
//!
//! ## Esempio di utilizzo:
//! ```bash
//! content-optimizer optimize cover.png --strategy balanced --device mobile
//! content-optimizer batch ./uploads --output ./public --workers 8 --json
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use content_optimizer::backend::ToolBackend;
use content_optimizer::file_manager::FileManager;
use content_optimizer::json_output::JsonMessage;
use content_optimizer::optimizer::{BatchOptions, BatchTask, ProgressCallback};
use content_optimizer::progress::{format_batch, ProgressManager};
use content_optimizer::storage::FileStorage;
use content_optimizer::{BatchResult, BatchSummary, ContentEngine, ContentType, EngineConfig, OptimizationOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "content-optimizer")]
#[command(about = "Content-aware optimization of images, videos and audio")]
struct Cli {
    /// Configuration file (defaults to ~/.content-optimizer/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON lines on stdout instead of human output
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect a file and print its content analysis
    Analyze {
        file: PathBuf,
        /// IMAGE, VIDEO or AUDIO (guessed from the extension when absent)
        #[arg(short = 't', long = "type")]
        content_type: Option<String>,
    },

    /// Optimize a single file
    Optimize {
        file: PathBuf,
        #[arg(short = 't', long = "type")]
        content_type: Option<String>,
        #[command(flatten)]
        options: OptionArgs,
        /// Root directory for the optimized outputs
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Optimize every media file under a directory
    Batch {
        directory: PathBuf,
        #[command(flatten)]
        options: OptionArgs,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Parallel workers (defaults to the configured max_concurrent)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// List the available strategies
    Strategies,
}

#[derive(Args, Clone)]
struct OptionArgs {
    /// auto, aggressive, balanced, quality, mobile or streaming
    #[arg(short, long)]
    strategy: Option<String>,

    /// mobile, tablet, desktop or tv
    #[arg(long)]
    device: Option<String>,

    /// 2g, 3g, 4g, 5g or wifi
    #[arg(long)]
    connection: Option<String>,

    /// Copy tags from the source onto the outputs
    #[arg(long)]
    preserve_metadata: bool,
}

impl From<OptionArgs> for OptimizationOptions {
    fn from(args: OptionArgs) -> Self {
        OptimizationOptions {
            strategy: args.strategy,
            target_device: args.device,
            target_connection: args.connection,
            preserve_metadata: Some(args.preserve_metadata),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so that --json output stays parseable
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref()).await?;

    let outcome = match cli.command {
        Command::Strategies => list_strategies(config, cli.json),
        Command::Analyze { file, content_type } => analyze(config, &file, content_type, cli.json).await,
        Command::Optimize {
            file,
            content_type,
            options,
            output,
        } => optimize(config, &file, content_type, options.into(), &output, cli.json).await,
        Command::Batch {
            directory,
            options,
            output,
            workers,
        } => batch(config, &directory, options.into(), &output, workers, cli.json).await,
    };

    if let Err(ref e) = outcome {
        if cli.json {
            JsonMessage::error(e.to_string(), e.chain().nth(1).map(|c| c.to_string())).emit();
        }
    }
    outcome
}

async fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match EngineConfig::default_path() {
            Some(path) => path,
            None => return Ok(EngineConfig::default()),
        },
    };
    EngineConfig::from_file(&path)
        .await
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Storage rooted at the parent of `file`, plus the file's reference
fn single_file_storage(file: &Path, output: &Path) -> Result<(FileStorage, String)> {
    if !file.is_file() {
        anyhow::bail!("File does not exist: {}", file.display());
    }
    let root = file.parent().unwrap_or_else(|| Path::new("."));
    let reference = FileManager::relative_reference(root, file)?;
    Ok((FileStorage::new(root, output), reference))
}

fn resolve_content_type(file: &Path, explicit: Option<String>) -> Result<ContentType> {
    match explicit {
        Some(raw) => Ok(raw.parse()?),
        None => FileManager::content_type_for(file)
            .with_context(|| format!("Cannot guess the content type of {}, pass --type", file.display())),
    }
}

fn list_strategies(config: EngineConfig, json: bool) -> Result<()> {
    let engine = ContentEngine::new(config, Arc::new(FileStorage::new(".", ".")), Arc::new(ToolBackend::from_report(Vec::new())))?;
    let strategies = engine.list_strategies();

    if json {
        JsonMessage::Strategies { strategies }.emit();
    } else {
        for strategy in strategies {
            println!("{:<11} {:<22} {}", strategy.key, strategy.name, strategy.description);
        }
    }
    Ok(())
}

async fn analyze(config: EngineConfig, file: &Path, content_type: Option<String>, json: bool) -> Result<()> {
    let content_type = resolve_content_type(file, content_type)?;
    let (storage, reference) = single_file_storage(file, Path::new("."))?;
    let backend = ToolBackend::detect().await;
    backend.check_dependencies(content_type)?;

    let engine = ContentEngine::new(config, Arc::new(storage), Arc::new(backend))?;
    let analysis = engine.analyze_content(&reference, content_type.as_str()).await?;

    if json {
        JsonMessage::Analysis { reference, analysis }.emit();
    } else {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    }
    Ok(())
}

async fn optimize(
    config: EngineConfig,
    file: &Path,
    content_type: Option<String>,
    options: OptimizationOptions,
    output: &Path,
    json: bool,
) -> Result<()> {
    let content_type = resolve_content_type(file, content_type)?;
    let (storage, reference) = single_file_storage(file, output)?;
    let backend = ToolBackend::detect().await.with_video_preset(config.video_preset.clone());
    backend.check_dependencies(content_type)?;

    let engine = ContentEngine::new(config, Arc::new(storage), Arc::new(backend))?;
    if json {
        JsonMessage::start("optimize", 1).emit();
    }

    let spinner = (!json).then(|| ProgressManager::spinner(&format!("Optimizing {}", reference)));
    let outcome = engine
        .optimize_content(&reference, content_type.as_str(), &options)
        .await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match outcome {
        Ok(result) => {
            if json {
                JsonMessage::file_complete(&reference, Ok(&result)).emit();
            } else {
                println!(
                    "{}: {} -> {} ({:.0}% smaller, quality {:.1}, strategy {})",
                    reference,
                    FileManager::format_size(result.original_size),
                    FileManager::format_size(result.optimized_size),
                    result.size_reduction,
                    result.quality_score,
                    result.strategy
                );
                for output in &result.outputs {
                    println!("  {:<10} {:<5} {:>10}  {}", output.quality, output.format, FileManager::format_size(output.size), output.url);
                }
            }
            Ok(())
        }
        Err(e) => {
            if json {
                JsonMessage::file_complete(&reference, Err(e.to_string())).emit();
            }
            Err(e.into())
        }
    }
}

async fn batch(
    config: EngineConfig,
    directory: &Path,
    options: OptimizationOptions,
    output: &Path,
    workers: Option<usize>,
    json: bool,
) -> Result<()> {
    let started = Instant::now();
    let files = FileManager::find_media_files(directory)?;
    if json {
        JsonMessage::start("batch", files.len()).emit();
    }
    if files.is_empty() {
        warn!("No media files found in {}", directory.display());
        return Ok(());
    }

    let mut tasks = Vec::with_capacity(files.len());
    for path in &files {
        if let Some(content_type) = FileManager::content_type_for(path) {
            let reference = FileManager::relative_reference(directory, path)?;
            tasks.push(BatchTask::new(reference, content_type, options.clone()));
        }
    }

    let max_batch_size = config.max_batch_size;
    let backend = ToolBackend::detect().await.with_video_preset(config.video_preset.clone());
    let engine = ContentEngine::new(config, Arc::new(FileStorage::new(directory, output)), Arc::new(backend))?;

    let total = tasks.len();
    let progress = if json {
        ProgressManager::hidden(total as u64)
    } else {
        ProgressManager::new(total as u64)
    };

    // Large directories run as consecutive batches of at most max_batch_size
    let mut combined = BatchResult::default();
    let mut offset = 0;
    let chunks: Vec<Vec<BatchTask>> = tasks.chunks(max_batch_size).map(|c| c.to_vec()).collect();
    for chunk in chunks {
        let chunk_len = chunk.len();
        let bar = progress.callback();
        let on_progress: ProgressCallback = Arc::new(move |done: usize, _chunk_total: usize| {
            bar(offset + done, total);
            if json {
                JsonMessage::progress(offset + done, total).emit();
            }
        });

        let result = engine
            .batch_optimize(
                chunk,
                BatchOptions {
                    max_concurrent: workers,
                    on_progress: Some(on_progress),
                    cancel: None,
                },
            )
            .await?;

        if json {
            for failure in &result.failures {
                JsonMessage::file_complete(&failure.reference, Err(failure.error.clone())).emit();
            }
        }
        combined.results.extend(result.results);
        combined.failures.extend(result.failures);
        offset += chunk_len;
    }
    combined.summary = BatchSummary::from_outcomes(&combined.results, combined.failures.len());

    if json {
        JsonMessage::Complete {
            summary: combined.summary.clone(),
            results: combined.results.clone(),
            failures: combined.failures.clone(),
            duration_seconds: started.elapsed().as_secs_f64(),
        }
        .emit();
    } else {
        progress.finish(&format_batch(&combined));
        for failure in &combined.failures {
            warn!("{} failed ({}): {}", failure.reference, failure.kind, failure.error);
        }
        info!("Batch completed in {:.1}s", started.elapsed().as_secs_f64());
    }
    Ok(())
}
