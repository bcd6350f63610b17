/*
 * Copyright 2025 Vijaykumar Singh
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Results CLI - feed anomaly detection job output into a results store

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use anomaly_results::{
    open_store, Bucket, CategoryDefinition, Config, Influencer, ModelDebugOutput,
    ModelSizeStats, ModelSnapshot, Quantiles, ResultsPersister, StoreBackend, WriteOutcome,
};

#[derive(Parser)]
#[command(name = "results-cli")]
#[command(about = "Persist anomaly detection results into a document store")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[arg(short, long)]
    job_id: Option<String>,

    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Memory,
    Filestore,
}

impl From<BackendArg> for StoreBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Memory => StoreBackend::Memory,
            BackendArg::Filestore => StoreBackend::Filestore,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Persist a newline-delimited stream of job output messages
    Ingest {
        /// NDJSON file, one message per line
        file: PathBuf,
    },
    /// Make every write of the job visible to searches
    Commit,
    /// Delete the job's interim results
    DeleteInterim,
}

/// One line of job output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum JobOutput {
    Bucket(Bucket),
    Quantiles(Quantiles),
    CategoryDefinition(CategoryDefinition),
    ModelSnapshot(ModelSnapshot),
    ModelSizeStats(ModelSizeStats),
    ModelDebugOutput(ModelDebugOutput),
    Influencer(Influencer),
    Flush(FlushAcknowledgement),
}

#[derive(Debug, Deserialize)]
struct FlushAcknowledgement {
    #[serde(default)]
    id: String,
}

#[derive(Default)]
struct IngestSummary {
    messages: usize,
    written: usize,
    failed: usize,
    warnings: usize,
}

impl IngestSummary {
    fn add(&mut self, outcome: &WriteOutcome) {
        self.written += outcome.documents_written;
        self.failed += outcome.documents_failed;
        self.warnings += outcome.warnings.len();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {:?}", cli.config))?;

    // Override with CLI arguments
    if let Some(data_dir) = cli.data_dir {
        config.store.data_dir = data_dir;
    }
    if let Some(job_id) = cli.job_id {
        config.persister.default_job_id = job_id;
    }
    if let Some(backend) = cli.backend {
        config.store.backend = backend.into();
    }
    config.validate().context("invalid configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let store = open_store(&config.store)
        .await
        .context("opening document store")?;
    let persister = ResultsPersister::new(store);
    let job_id = config.persister.default_job_id.clone();

    match cli.command {
        Commands::Ingest { file } => ingest(&persister, &job_id, &file).await?,
        Commands::Commit => {
            if !persister.commit_writes(&job_id).await {
                bail!("commit failed for job {}", job_id);
            }
            info!("✅ Committed results of job {}", job_id);
        }
        Commands::DeleteInterim => {
            persister.delete_interim_results(&job_id);
            persister.drain_background_tasks().await;
            info!("🗑️ Interim results of job {} deleted", job_id);
        }
    }

    Ok(())
}

async fn ingest(persister: &ResultsPersister, job_id: &str, file: &Path) -> anyhow::Result<()> {
    let input = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("opening {:?}", file))?;
    let mut lines = BufReader::new(input).lines();

    info!("📥 Ingesting results of job {} from {:?}", job_id, file);
    let mut summary = IngestSummary::default();
    let mut interim_pending = false;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("reading input")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let message: JobOutput = serde_json::from_str(&line)
            .with_context(|| format!("parsing message on line {}", line_no))?;
        summary.messages += 1;

        let outcome = match message {
            JobOutput::Bucket(mut bucket) => {
                // Final results supersede whatever interim ones are stored
                if bucket.is_interim {
                    interim_pending = true;
                } else if interim_pending {
                    persister.delete_interim_results(job_id);
                    interim_pending = false;
                }
                persister.persist_bucket(job_id, &mut bucket).await
            }
            JobOutput::Quantiles(quantiles) => {
                persister.persist_quantiles(job_id, Some(&quantiles)).await
            }
            JobOutput::CategoryDefinition(category) => {
                persister
                    .persist_category_definition(job_id, Some(&category))
                    .await
            }
            JobOutput::ModelSnapshot(snapshot) => {
                persister.persist_model_snapshot(job_id, Some(&snapshot)).await
            }
            JobOutput::ModelSizeStats(stats) => {
                persister.persist_model_size_stats(job_id, Some(&stats)).await
            }
            JobOutput::ModelDebugOutput(output) => {
                persister
                    .persist_model_debug_output(job_id, Some(&output))
                    .await
            }
            JobOutput::Influencer(influencer) => {
                persister.persist_influencer(job_id, Some(&influencer)).await
            }
            JobOutput::Flush(flush) => {
                if !persister.commit_writes(job_id).await {
                    warn!("Flush {} could not be committed", flush.id);
                }
                continue;
            }
        };
        summary.add(&outcome);
    }

    let drained = persister.drain_background_tasks().await;
    info!(
        "✅ Ingested {} messages for job {}: {} documents written, {} failed, {} warnings, {} background tasks drained",
        summary.messages, job_id, summary.written, summary.failed, summary.warnings, drained
    );
    Ok(())
}
