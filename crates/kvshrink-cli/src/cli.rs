use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kvshrink",
    about = "Compact hierarchical key-value store files",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Copy every live entry of a store into a new, compact store file
    Compact(CompactArgs),
    /// Check that a compacted store holds every entry of its source
    Verify(VerifyArgs),
    /// Show what a store holds
    Stats(StatsArgs),
}

/// Options shared by every command that opens a store.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// How long to wait for a locked store file, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Args)]
pub struct CompactArgs {
    /// Store file to compact
    pub old: PathBuf,
    /// Where to write the compacted store (must not exist)
    pub new: PathBuf,
    /// Acknowledge that compaction is experimental
    #[arg(long)]
    pub yes_i_understand: bool,
    /// Verify the new store against the old one afterwards
    #[arg(long)]
    pub verify: bool,
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub old: PathBuf,
    pub new: PathBuf,
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args)]
pub struct StatsArgs {
    pub path: PathBuf,
    #[command(flatten)]
    pub config: ConfigArgs,
}
