// src/cli/mod.rs - CLI definition (clap derive)

pub mod cache;
pub mod check;
pub mod progress;
pub mod run;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "moonforge",
    about = "Iterative prompt refinement: generate, score, mutate, repeat",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tune a prompt and print the result as JSON
    Run(RunArgs),
    /// Load and validate a workflow definition
    Check {
        /// Workflow YAML file
        workflow: String,
    },
    /// Inspect and maintain the prompt cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Prompt to tune
    #[arg(trailing_var_arg = true, required = true)]
    pub prompt: Vec<String>,

    /// Target style (wizard, cosmic, cyber, ...)
    #[arg(short, long, default_value = "wizard")]
    pub style: String,

    /// Workflow definition to run instead of the configured one
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Skip the cache lookup before running
    #[arg(long)]
    pub no_cache: bool,

    /// Suppress progress output (only emit final result)
    #[arg(short, long)]
    pub quiet: bool,

    /// Run deadline in seconds (0 = none)
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Clone)]
pub enum CacheAction {
    /// Show the entry stored for a prompt
    Get {
        #[arg(required = true)]
        prompt: Vec<String>,
    },
    /// Remove the entry stored for a prompt
    Delete {
        #[arg(required = true)]
        prompt: Vec<String>,
    },
    /// Entries sharing most words with a prompt
    Similar {
        #[arg(required = true)]
        prompt: Vec<String>,
        #[arg(short, long)]
        style: String,
        /// Minimum word overlap (defaults to the configured threshold)
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Entries ranked by vector similarity to a prompt
    Nearest {
        #[arg(required = true)]
        prompt: Vec<String>,
        #[arg(short, long)]
        style: String,
        #[arg(long, default_value = "5")]
        top: usize,
    },
    /// Totals by style and average score
    Stats,
    /// Delete expired rows from the database
    Purge,
}
