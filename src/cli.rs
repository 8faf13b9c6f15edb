///
/// This module implements the CLI for archive-pipeline: command parsing, config loading,
/// wiring concrete collaborators into the core pipeline, and user-visible summaries.
///
/// All orchestration (parse → publish → serialize → upload, per-pair failure isolation,
/// upload retries) lives in the [`archive-pipeline-core`] crate. This module is glue.
///
/// ## Commands
/// - `run`: execute every job of a config file against one destination.
/// - `validate`: check a config file and the documents it references, without running anything.
/// - `upload`: push already-serialized JSON documents to a destination.
///
/// [`archive-pipeline-core`]: ../../archive-pipeline-core/
use crate::load_config::{load_config, CliConfig};
use crate::upload::ArchiveClient;
use anyhow::{Context, Result};
use archive_pipeline_core::contract::Destination;
use archive_pipeline_core::parse::CommandParser;
use archive_pipeline_core::pipeline::{upload_documents, Pipeline};
use archive_pipeline_core::publish::AssetPublisher;
use archive_pipeline_core::serialize::CommandSerializer;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI for archive-pipeline: turn root texts and their translations/commentaries into archive records.
#[derive(Parser)]
#[clap(
    name = "archive-pipeline",
    version,
    about = "Parse root texts with translations or commentaries, serialize aligned pairs, and upload them to the archive"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every job in the config file
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Destination for every upload of this invocation (overrides the config file)
        #[clap(long)]
        destination: Option<Destination>,
    },
    /// Check the config file and the documents it references
    Validate {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Destination whose URL must be configured (overrides the config file)
        #[clap(long)]
        destination: Option<Destination>,
    },
    /// Upload already-serialized JSON documents
    Upload {
        /// Path to the YAML config file (destinations and retry settings)
        #[clap(long)]
        config: PathBuf,
        /// Destination for every upload of this invocation (overrides the config file)
        #[clap(long)]
        destination: Option<Destination>,
        /// Ask the archive not to replace existing records (also off when the config sets `overwrite: false`)
        #[clap(long)]
        no_overwrite: bool,
        /// JSON documents to upload, in order
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run {
            config,
            destination,
        } => {
            let config = load_config(config)?;
            let destination = destination.unwrap_or(config.destination);
            run_jobs(&config, destination).await
        }
        Commands::Validate {
            config,
            destination,
        } => {
            let config = load_config(config)?;
            let destination = destination.unwrap_or(config.destination);
            validate(&config, destination)
        }
        Commands::Upload {
            config,
            destination,
            no_overwrite,
            files,
        } => {
            let config = load_config(config)?;
            let destination = destination.unwrap_or(config.destination);
            let overwrite = config.upload_overwrite(no_overwrite);
            upload(&config, destination, overwrite, &files).await
        }
    }
}

async fn run_jobs(config: &CliConfig, destination: Destination) -> Result<()> {
    config.require_destination_url(destination)?;
    let tools = config
        .tools
        .as_ref()
        .context("`tools` section (parser and serializer) is required for `run`")?;

    let pipeline = Pipeline::new(
        CommandParser::new(tools.parser.clone()),
        AssetPublisher::new(),
        CommandSerializer::new(tools.serializer.clone()),
        ArchiveClient::from_config(config),
    )
    .with_retry(config.retry.to_policy());

    tracing::info!(command = "run", jobs = config.jobs.len(), %destination, "Starting pipeline jobs");
    println!("Run starting ({} job(s), destination {destination})...", config.jobs.len());

    let mut aborted_jobs = 0;
    let mut failed_pairs = 0;
    for (index, request) in config.requests(destination).iter().enumerate() {
        match pipeline.run(request).await {
            Ok(report) => {
                let failed = report.failures().count();
                for pair in report.failures() {
                    if let Err(e) = &pair.outcome {
                        eprintln!(
                            "[ERROR] job {index}: {} failed: {e}",
                            pair.document.display()
                        );
                    }
                }
                println!(
                    "Job {index} ({}): {} uploaded, {failed} failed",
                    report.kind,
                    report.uploaded().count()
                );
                failed_pairs += failed;
            }
            Err(e) => {
                tracing::error!(command = "run", job = index, error = %e, "Job aborted");
                eprintln!("[ERROR] job {index} aborted: {e}");
                aborted_jobs += 1;
            }
        }
    }

    if aborted_jobs > 0 || failed_pairs > 0 {
        anyhow::bail!(
            "{aborted_jobs} job(s) aborted, {failed_pairs} aligned pair(s) failed"
        );
    }
    println!("Run complete.");
    Ok(())
}

fn validate(config: &CliConfig, destination: Destination) -> Result<()> {
    let problems = config.problems(destination);
    if problems.is_empty() {
        println!(
            "Config OK: {} job(s), {} aligned pair(s), destination {destination}",
            config.jobs.len(),
            config.jobs.iter().map(|job| job.derived.len()).sum::<usize>()
        );
        return Ok(());
    }
    for problem in &problems {
        tracing::error!(command = "validate", problem = %problem, "Config problem");
        eprintln!("[ERROR] {problem}");
    }
    anyhow::bail!("config has {} problem(s)", problems.len())
}

async fn upload(
    config: &CliConfig,
    destination: Destination,
    overwrite: bool,
    files: &[PathBuf],
) -> Result<()> {
    config.require_destination_url(destination)?;
    let client = ArchiveClient::from_config(config);
    let reports = upload_documents(
        &client,
        files,
        destination,
        overwrite,
        &config.retry.to_policy(),
    )
    .await;

    let mut failed = 0;
    for report in &reports {
        match &report.outcome {
            Ok(uploaded) => println!(
                "Uploaded {} ({} attempt(s))",
                report.json_path.display(),
                uploaded.attempts
            ),
            Err(e) => {
                eprintln!("[ERROR] {e}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} upload(s) failed", reports.len());
    }
    Ok(())
}
