//! page-ocr - turns folders of page images into text via a remote vision OCR model.

mod assembler;
mod config;
mod document;
mod error;
mod ocr;
mod pipeline;
mod pool;
mod server;
mod sink;
mod source;
#[cfg(test)]
mod testing;

use clap::{Args, Parser, Subcommand};
use config::PipelineConfig;
use ocr::retry::RetryingOcrClient;
use ocr::vision::VisionOcrClient;
use pipeline::{DocumentOutcome, PipelineDriver};
use pool::PageWorkerPool;
use sink::FsOutputSink;
use source::DirPageSource;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "page-ocr", version, about = "Page-level vision OCR pipeline")]
struct Cli {
    /// JSON config file; `OCR_*` environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// OCR every document folder under the input directory.
    Run(RunArgs),
    /// Serve `PUT /process` for uploaded page images.
    Serve(ServeArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Directory with one sub-folder of page images per document
    #[arg(long)]
    input: Option<PathBuf>,
    /// Directory receiving `<document>.txt`
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    concurrency: Option<usize>,
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Seconds between attempts
    #[arg(long)]
    retry_delay: Option<u64>,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long)]
    bind: Option<String>,
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "page_ocr=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run(args) => {
            if let Some(v) = args.input {
                config.input_dir = v;
            }
            if let Some(v) = args.output {
                config.output_dir = v;
            }
            if let Some(v) = args.concurrency {
                config.concurrency = v;
            }
            if let Some(v) = args.max_attempts {
                config.max_attempts = v;
            }
            if let Some(v) = args.retry_delay {
                config.retry_delay_secs = v;
            }
            config.validate()?;
            run(&config).await
        }
        Command::Serve(args) => {
            if let Some(v) = args.bind {
                config.server.bind_addr = v;
            }
            if let Some(v) = args.concurrency {
                config.concurrency = v;
            }
            config.validate()?;
            serve(&config).await
        }
    }
}

async fn run(config: &PipelineConfig) -> anyhow::Result<()> {
    let client = Arc::new(VisionOcrClient::from_config(config)?);
    let sink = FsOutputSink::new(&config.output_dir);
    let source = DirPageSource::new(&config.input_dir);
    info!(
        "OCR run: {:?} -> {:?} (model={}, concurrency={}, attempts={})",
        source.root(),
        sink.dir(),
        config.model,
        config.concurrency,
        config.max_attempts
    );

    let driver = PipelineDriver::from_config(config, client, Arc::new(sink));
    let summary = driver.run_source(&source).await?;

    if summary.failed > 0 {
        let failed: Vec<&str> = summary
            .outcomes
            .iter()
            .filter(|o| matches!(o, DocumentOutcome::Failed { .. }))
            .map(DocumentOutcome::name)
            .collect();
        anyhow::bail!(
            "{} document(s) failed ({}); rerun to retry them",
            summary.failed,
            failed.join(", ")
        );
    }
    Ok(())
}

async fn serve(config: &PipelineConfig) -> anyhow::Result<()> {
    let client = Arc::new(VisionOcrClient::from_config(config)?);
    let retrying = RetryingOcrClient::new(client, config.retry_policy());
    let pool = PageWorkerPool::new(retrying, config.concurrency);
    info!(
        "OCR client initialized (model={}, concurrency={})",
        config.model,
        pool.concurrency()
    );

    let state = server::AppState::new(pool, &config.server);
    server::serve(state, &config.server.bind_addr).await
}
