use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "hgx",
    about = "Hypergolix cache maintenance",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Cache directory; overrides the configuration file
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Restore the cache and count primitives per kind
    Inspect(InspectArgs),
    /// Show one primitive
    Show(ShowArgs),
    /// Show what binds, debinds, or requests a ghid
    Status(StatusArgs),
    /// Re-check signatures and validation rules of every cached primitive
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct InspectArgs {}

#[derive(Args)]
pub struct ShowArgs {
    pub ghid: String,
}

#[derive(Args)]
pub struct StatusArgs {
    pub ghid: String,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Exit with an error if any primitive fails
    #[arg(long)]
    pub strict: bool,
}
