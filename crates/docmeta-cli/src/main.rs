use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use docmeta_core::{
    ContentAnalyzer, EventCallback, JsonLinesSinkGroup, MemorySinkGroup, StageConfig, StageEvent,
    StageReport, StageRunner,
};
use docmeta_ingest::{DescriptorSource, DiscoverOptions, RecordDescriptor, discover, partition};
use docmeta_pdf_mupdf::{MupdfAnalyzer, MupdfAnalyzerFactory};

mod config;
mod output;

use output::ColorMode;

const REPORT_FILE: &str = "report.json";

/// Batch PDF metadata extraction - structured metadata and fault records for scholarly PDFs
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file layered over the platform and ./.docmeta.toml configs
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override a config key, e.g. --set excluded.ids=a,b (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract metadata from PDFs, directories, JSONL manifests or archives
    Run {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory receiving one subdirectory per named output
        #[arg(short, long)]
        output: PathBuf,

        /// Number of parallel workers (default: $DOCMETA_WORKERS or CPU count)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Maximum total size extracted from each archive, in MB (0 = unlimited)
        #[arg(long, default_value_t = 500)]
        max_archive_mb: u64,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Run a single PDF through the stage and print the emitted records
    Inspect {
        /// Path to the PDF
        file: PathBuf,

        /// Print the analyzer's document tree as XML instead
        #[arg(long)]
        tree: bool,
    },

    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;
    let color = ColorMode(!cli.no_color);

    match cli.command {
        Command::Run {
            inputs,
            output,
            workers,
            max_archive_mb,
            no_progress,
        } => {
            let settings = RunSettings {
                inputs,
                output,
                workers,
                max_archive_mb,
                no_progress,
            };
            run(cli.config.as_deref(), &cli.overrides, settings, color).await
        }
        Command::Inspect { file, tree } => {
            if tree {
                inspect_tree(&file)
            } else {
                inspect(cli.config.as_deref(), &cli.overrides, &file, color)
            }
        }
        Command::Config => show_config(cli.config.as_deref(), &cli.overrides, color),
    }
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("invalid log file path {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "docmeta=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

fn stage_config(
    config: Option<&Path>,
    overrides: &[String],
) -> anyhow::Result<(docmeta_core::ConfigBag, StageConfig)> {
    let bag = config::resolve(config, overrides)?;
    let stage = StageConfig::from_bag(&bag).context("invalid stage configuration")?;
    Ok((bag, stage))
}

struct RunSettings {
    inputs: Vec<PathBuf>,
    output: PathBuf,
    workers: Option<usize>,
    max_archive_mb: u64,
    no_progress: bool,
}

async fn run(
    config: Option<&Path>,
    overrides: &[String],
    settings: RunSettings,
    color: ColorMode,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let (_, stage) = stage_config(config, overrides)?;
    let workers = config::worker_count(settings.workers)?;

    // Archives are unpacked here and removed when the run ends
    let staging = tempfile::tempdir().context("failed to create staging directory")?;
    let options = DiscoverOptions {
        max_archive_size: settings.max_archive_mb * 1024 * 1024,
    };
    let mut descriptors = Vec::new();
    for input in &settings.inputs {
        descriptors.extend(discover(input, staging.path(), &options)?);
    }
    if descriptors.is_empty() {
        anyhow::bail!("no input documents found");
    }

    std::fs::create_dir_all(&settings.output)
        .with_context(|| format!("failed to create {}", settings.output.display()))?;

    let total = descriptors.len();
    let partitions = partition(descriptors, workers.min(total));
    tracing::info!(records = total, workers = partitions.len(), "starting extraction");

    let bar = if settings.no_progress {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.green/dim}] {pos}/{len} (eta {eta}) {msg}",
            )?
            .progress_chars("=> "),
        );
        bar
    };
    let events: EventCallback = {
        let bar = bar.clone();
        Arc::new(move |event: &StageEvent| match event {
            StageEvent::RecordStarted { document_id } => bar.set_message(document_id.clone()),
            StageEvent::RecordFinished { .. } => bar.inc(1),
        })
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let runner = StageRunner::new(stage, Arc::new(MupdfAnalyzerFactory::default()))
        .with_cancellation(cancel.clone())
        .with_events(events);

    let mut handles = Vec::new();
    for (index, descriptors) in partitions.into_iter().enumerate() {
        let runner = runner.clone();
        let cancel = cancel.clone();
        let sinks = JsonLinesSinkGroup::new(settings.output.clone(), index);
        handles.push(tokio::task::spawn_blocking(move || {
            let result = runner.run(DescriptorSource::new(descriptors), sinks);
            if result.is_err() {
                // A fatal record stops the sibling partitions too
                cancel.cancel();
            }
            result
        }));
    }

    let mut report = StageReport::default();
    let mut failure = None;
    for (index, handle) in handles.into_iter().enumerate() {
        match handle.await.context("worker task panicked")? {
            Ok(partial) => report.merge(&partial),
            Err(e) => {
                tracing::error!(partition = index, error = %e, "worker aborted");
                failure.get_or_insert(e);
            }
        }
    }
    bar.finish_and_clear();

    let report_path = settings.output.join(REPORT_FILE);
    let file = std::fs::File::create(&report_path)
        .with_context(|| format!("failed to create {}", report_path.display()))?;
    serde_json::to_writer_pretty(file, &report)?;

    let mut stdout = std::io::stdout();
    output::print_summary(&mut stdout, &report, &settings.output, started.elapsed(), color)?;
    stdout.flush()?;

    match failure {
        Some(e) => Err(anyhow::Error::new(e).context("extraction stage aborted")),
        None => Ok(()),
    }
}

fn inspect(
    config: Option<&Path>,
    overrides: &[String],
    file: &Path,
    color: ColorMode,
) -> anyhow::Result<()> {
    let (_, stage) = stage_config(config, overrides)?;
    let id = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .with_context(|| format!("invalid file path {}", file.display()))?;
    let descriptor = RecordDescriptor::from_path(id, file)?;

    let sinks = MemorySinkGroup::new();
    StageRunner::new(stage, Arc::new(MupdfAnalyzerFactory::default()))
        .run(DescriptorSource::new(vec![descriptor]), sinks.clone())?;

    output::print_records(&mut std::io::stdout(), &sinks.records(), color)
}

fn inspect_tree(file: &Path) -> anyhow::Result<()> {
    let content =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let mut analyzer = MupdfAnalyzer::default();
    analyzer.feed(content)?;
    let tree = analyzer.document_tree()?;
    println!("{}", tree.to_xml()?);
    Ok(())
}

fn show_config(config: Option<&Path>, overrides: &[String], color: ColorMode) -> anyhow::Result<()> {
    let (bag, stage) = stage_config(config, overrides)?;
    output::print_config(&mut std::io::stdout(), &bag, &stage, color)?;
    Ok(())
}
