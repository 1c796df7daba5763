use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use derma_core::progress::{self, AnalysisRecord};
use derma_core::{AnalysisReport, CascadeLocator, HaarCascade, SkinAnalyzer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;

use config::Config;
use engine::EngineHandle;

#[derive(Parser)]
#[command(name = "derma", about = "Derma facial skin analysis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one face photo and print the report as JSON
    Analyze {
        /// Image file (JPEG, PNG, ...)
        image: PathBuf,
        /// Write the annotated JPEG here
        #[arg(short, long)]
        annotated: Option<PathBuf>,
        /// Append a progress record to this JSON file on success
        #[arg(short, long)]
        records: Option<PathBuf>,
    },
    /// Analyze many photos concurrently, one JSON line per image
    Batch {
        images: Vec<PathBuf>,
        /// Append a progress record per successful analysis
        #[arg(short, long)]
        records: Option<PathBuf>,
    },
    /// Summarize stored analyses over a trailing window
    Progress {
        /// JSON file of analysis records
        #[arg(short, long)]
        records: PathBuf,
        /// Window length in days
        #[arg(short, long, default_value_t = 30)]
        days: i64,
    },
    /// Show configuration and check the cascade loads
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Analyze {
            image,
            annotated,
            records,
        } => {
            let (handle, pool) = start_pool(&config)?;
            let report = analyze_file(&handle, &image).await?;
            drop(handle);
            tokio::task::spawn_blocking(move || pool.join()).await?;

            if let (Some(out), Some(payload)) = (annotated, report.payload.as_ref()) {
                write_data_uri(&out, &payload.annotated_image)?;
                eprintln!("annotated image written to {}", out.display());
            }
            if let Some(path) = records {
                append_records(&path, std::slice::from_ref(&report))?;
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Batch { images, records } => {
            if images.is_empty() {
                bail!("no images given");
            }
            let (handle, pool) = start_pool(&config)?;

            let tasks: Vec<_> = images
                .into_iter()
                .map(|path| {
                    let handle = handle.clone();
                    tokio::spawn(async move {
                        let report = analyze_file(&handle, &path).await;
                        (path, report)
                    })
                })
                .collect();

            let mut reports = Vec::with_capacity(tasks.len());
            for task in tasks {
                let (path, report) = task.await.context("batch task panicked")?;
                let report = match report {
                    Ok(report) => report,
                    Err(err) => AnalysisReport::failed(format!("{err:#}")),
                };
                println!(
                    "{}",
                    serde_json::json!({ "path": path.display().to_string(), "report": report })
                );
                reports.push(report);
            }
            drop(handle);
            tokio::task::spawn_blocking(move || pool.join()).await?;

            if let Some(path) = records {
                append_records(&path, &reports)?;
            }
        }
        Commands::Progress { records, days } => {
            let all = load_records(&records)?;
            let since = Utc::now() - Duration::days(days);
            match progress::summarize(&all, since) {
                Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
                None => println!("No analyses in the last {days} days"),
            }
        }
        Commands::Status => {
            let path = config.cascade_path();
            println!("cascade:         {}", path.display());
            match HaarCascade::load(&path) {
                Ok(cascade) => println!(
                    "                 loaded ({} stages, {}x{} window)",
                    cascade.stages.len(),
                    cascade.window.0,
                    cascade.window.1
                ),
                Err(err) => println!("                 unavailable: {err}"),
            }
            println!("workers:         {}", config.workers);
            println!("queue depth:     {}", config.queue_depth);
            println!("reject if full:  {}", config.reject_when_full);
            println!("face selection:  {:?}", config.face_selection);
            println!(
                "scan:            scale {} / neighbors {} / min size {}",
                config.scale_factor, config.min_neighbors, config.min_face_size
            );
            println!("jpeg quality:    {}", config.jpeg_quality);
        }
    }

    Ok(())
}

/// Load the cascade once and start the worker pool around it.
fn start_pool(config: &Config) -> Result<(EngineHandle, engine::WorkerPool)> {
    let path = config.cascade_path();
    let cascade = HaarCascade::load(&path)
        .with_context(|| format!("failed to load cascade {}", path.display()))?;
    let locator = CascadeLocator::new(Arc::new(cascade), config.scan_params());
    let analyzer =
        SkinAnalyzer::new(Arc::new(locator)).with_options(config.analyzer_options());

    engine::spawn_pool(
        Arc::new(analyzer),
        config.workers,
        config.queue_depth,
        config.reject_when_full,
    )
    .context("failed to start analysis pool")
}

async fn analyze_file(handle: &EngineHandle, path: &Path) -> Result<AnalysisReport> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let report = handle.analyze(STANDARD.encode(bytes)).await?;
    tracing::info!(path = %path.display(), success = report.success, "analyzed");
    Ok(report)
}

fn write_data_uri(path: &Path, data_uri: &str) -> Result<()> {
    let body = data_uri.split_once(',').map_or(data_uri, |(_, b)| b);
    let bytes = STANDARD
        .decode(body)
        .context("annotated image is not valid base64")?;
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn load_records(path: &Path) -> Result<Vec<AnalysisRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("malformed records in {}", path.display()))
}

fn append_records(path: &Path, reports: &[AnalysisReport]) -> Result<()> {
    let now = Utc::now();
    let fresh: Vec<_> = reports
        .iter()
        .filter_map(|r| AnalysisRecord::from_report(r, now))
        .collect();
    if fresh.is_empty() {
        return Ok(());
    }

    let mut all = load_records(path)?;
    all.extend(fresh);
    std::fs::write(path, serde_json::to_string_pretty(&all)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), total = all.len(), "records updated");
    Ok(())
}
