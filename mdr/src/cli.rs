// mdr/src/cli.rs
//! Defines the command-line argument structure using clap.
use clap::{ArgAction, Parser, Subcommand};
use mdr_common::error::Result;
use mdr_common::Config;

pub mod cache;
pub mod resolve;

use crate::cli::cache::CacheCommand;
use crate::cli::resolve::Resolve;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "mdr", bin_name = "mdr")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve coordinates and download their files
    Resolve(Resolve),
    /// Inspect or clear the local cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

impl Command {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Resolve(command) => command.run(config).await,
            Self::Cache(command) => command.run(config),
        }
    }
}
