//! Command-line interface for LOTSAWA.
//!
//! [`Cli`] carries the [`Command`] subcommands (run, plan) and global flags
//! that override `lotsawa.toml`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::LotsawaConfig;
use crate::pipeline::PipelineKind;

/// LOTSAWA: self-correcting translation pipelines with batching and per-item fallback.
#[derive(Debug, Parser)]
#[command(name = "lotsawa", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Alternative config file path.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Default target language.
    #[arg(long, global = true)]
    pub language: Option<String>,

    /// Items per batch.
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Attempts per batch.
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Attempts per item after degrading.
    #[arg(long, global = true)]
    pub item_retries: Option<u32>,

    /// Delay between attempts, in seconds.
    #[arg(long, global = true)]
    pub delay: Option<u64>,

    /// Pipeline variant.
    #[arg(long, global = true)]
    pub pipeline: Option<PipelineArg>,

    /// Enable verbose output.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Pipeline argument, mapped to [`PipelineKind`] internally.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PipelineArg {
    /// Commentary-guided translation with a plain variant and glossary.
    Translation,
    /// Semantic-graph refinement from supplied commentaries.
    SemanticGraph,
    /// Word-by-word glossing.
    Glossing,
}

impl From<PipelineArg> for PipelineKind {
    fn from(arg: PipelineArg) -> Self {
        match arg {
            PipelineArg::Translation => PipelineKind::Translation,
            PipelineArg::SemanticGraph => PipelineKind::SemanticGraph,
            PipelineArg::Glossing => PipelineKind::Glossing,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process every record in the input file.
    Run {
        /// JSON or JSONL file of input records.
        #[arg(long)]
        input: PathBuf,

        /// Output prefix (`<prefix>.jsonl` and `<prefix>_fail.jsonl`).
        #[arg(long, default_value = "batch_results")]
        output: String,
    },

    /// Validate the input and show the batch plan without calling the service.
    Plan {
        /// JSON or JSONL file of input records.
        #[arg(long)]
        input: PathBuf,
    },
}

impl Cli {
    /// Apply the global flags on top of the loaded config.
    pub fn apply_overrides(&self, config: &mut LotsawaConfig) {
        if let Some(language) = &self.language {
            config.target_language = language.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(retries) = self.retries {
            config.max_batch_retries = retries;
        }
        if let Some(item_retries) = self.item_retries {
            config.max_item_retries = item_retries;
        }
        if let Some(delay) = self.delay {
            config.retry_delay_seconds = delay;
        }
        if let Some(pipeline) = self.pipeline {
            config.pipeline = pipeline.into();
        }
    }
}
