use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::{error, info, warn};
use std::io;
use std::path::Path;
use std::sync::Arc;

use guru_rag::config::AppConfig;
use guru_rag::document::UploadedFile;
use guru_rag::ingest::DocumentProcessor;
use guru_rag::openai::OpenAiClient;
use guru_rag::rag::{HistoryPolicy, QaEngine};
use guru_rag::session::Session;

/// Chat with your documents: answers grounded in uploaded text, PDF and image files
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Documents to load (txt, pdf, png, jpg)
    #[arg(required = true)]
    files: Vec<String>,

    /// Number of source passages retrieved per question
    #[arg(long)]
    top_k: Option<usize>,

    /// Search with the latest question only, ignoring earlier turns
    #[arg(long)]
    question_only: bool,

    /// Do not print source excerpts under answers
    #[arg(long)]
    no_sources: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(top_k) = args.top_k {
        anyhow::ensure!(top_k > 0, "--top-k must be at least 1");
        config.top_k = top_k;
    }
    if args.question_only {
        config.history_policy = HistoryPolicy::QuestionOnly;
    }
    config.warn_inert_settings();

    // Validate and read the input files
    let mut uploads = Vec::with_capacity(args.files.len());
    for file_path in &args.files {
        if !Path::new(file_path).exists() {
            error!("File not found: {}", file_path);
            return Err(anyhow::anyhow!("File not found: {}", file_path));
        }
        uploads.push(UploadedFile::from_path(file_path)?);
    }

    let client = Arc::new(
        OpenAiClient::new(config.openai.clone()).context("Failed to initialize API client")?,
    );
    let processor = DocumentProcessor::new(config.splitter, &config.tesseract_cmd);
    let engine = QaEngine::new(client.clone(), config.temperature, config.history_policy);
    let mut session = Session::new(processor, client, engine, config.top_k);

    info!("Processing {} file(s)", uploads.len());
    let report = session
        .load_documents(&uploads)
        .await
        .context("Failed to process documents")?;

    println!(
        "Processed {} of {} file(s) into {} passages.",
        report.succeeded.len(),
        report.attempted(),
        report.succeeded.iter().map(|f| f.chunk_count).sum::<usize>()
    );
    for failed in &report.failed {
        warn!("Could not read {}: {}", failed.name, failed.error);
        println!("  failed: {}", failed.name);
    }
    for skipped in &report.skipped {
        println!("  skipped (unsupported format): {}", skipped);
    }

    let stdin = io::stdin();
    session
        .run_query_loop(stdin.lock(), io::stdout(), !args.no_sources)
        .await
        .context("Error in query loop")?;

    Ok(())
}
