use clap::{ArgAction, Parser};

const CMD_NAME: &str = "mc";
const DEFAULT_PIPELINE: &str = "pipeline.mc";
const DEFAULT_LOG_DIR: &str = "logs";

/// Stores our command-line args format.
#[derive(Parser)]
#[command(name = CMD_NAME, version, about = None, long_about = None)]
pub struct Args {
    /// Pipeline definition file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_PIPELINE)]
    #[arg(env = "MODCHAIN_PIPELINE")]
    pub pipeline: String,

    /// Directory for per-invocation log files
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_LOG_DIR)]
    #[arg(env = "MODCHAIN_LOG_DIR")]
    pub log_dir: String,

    /// Runtime executable, overriding the pipeline's config
    #[arg(short, long, value_name = "PATH")]
    #[arg(env = "MODCHAIN_RUNTIME")]
    pub runtime: Option<String>,

    /// Bypass user confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run; print the planned invocations but don't run anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Keep running after an invocation fails
    #[arg(short, long)]
    pub keep_going: bool,

    /// Print additional debugging info (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
