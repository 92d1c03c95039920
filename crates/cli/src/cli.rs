use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Question answering over cross-border e-commerce knowledge bases.
///
/// Settings come from the environment (and `.env`); the flags below override
/// the most common ones for a single run.
#[derive(Parser, Debug)]
#[command(name = "ecrag", version, about = "RAG question answering over PDF knowledge bases")]
pub struct CliArgs {
    /// Config profile; keys are looked up as {PROFILE}_{KEY} before {KEY}
    #[arg(long, env = "ECRAG_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Directory holding the persisted vector index
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,

    /// Number of chunks passed to the model as context
    #[arg(long, global = true)]
    pub top_n: Option<usize>,

    /// File that receives a copy of every log line (appended)
    #[arg(long, env = "ECRAG_LOG_FILE", default_value = "ec_rag.log", global = true)]
    pub log_file: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest PDF or text sources into the index
    Load {
        /// Source files; missing ones are skipped with a warning
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Answer a question from the loaded knowledge base
    Ask {
        /// The question (multiple words are joined with spaces)
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Show index and configuration details
    Stats,
}

impl Command {
    pub fn question(&self) -> Option<String> {
        match self {
            Command::Ask { question } => Some(question.join(" ")),
            _ => None,
        }
    }
}
