mod cli;
mod config;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use ecrag_index::VectorIndex;
use ecrag_rag::{AnswerOutcome, RagEngine};
use tracing::info;

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    logging::init(&args.log_file)?;

    let config = config::resolve(&args);
    config.validate().context("invalid configuration")?;
    config.log_summary();

    match &args.command {
        Command::Load { paths } => {
            let mut engine =
                RagEngine::from_config(config).context("failed to initialize RAG engine")?;
            let count = engine
                .load_knowledge(paths.as_slice())
                .await
                .context("failed to load knowledge base")?;
            info!(chunks = count, entries = engine.index().len(), "knowledge base loaded");
            println!("Loaded {count} chunks ({} in index)", engine.index().len());
        }
        Command::Ask { .. } => {
            let question = args.command.question().unwrap_or_default();
            let engine =
                RagEngine::from_config(config).context("failed to initialize RAG engine")?;
            let outcome = engine.answer(&question).await;
            println!("{}", outcome.text());
            if let AnswerOutcome::Failed(_) = outcome {
                std::process::exit(1);
            }
        }
        Command::Stats => {
            let index_dir = config.storage.index_dir.clone();
            let index = VectorIndex::load(&index_dir)
                .with_context(|| format!("failed to read index at {}", index_dir.display()))?;
            let index_json = match &index {
                Some(index) => serde_json::json!({
                    "entries": index.len(),
                    "dimensions": index.dimensions(),
                    "created_at": index.manifest().created_at,
                    "updated_at": index.manifest().updated_at,
                }),
                None => serde_json::Value::Null,
            };
            let report = serde_json::json!({
                "index_dir": index_dir,
                "index": index_json,
                "config": config.redacted_summary(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
