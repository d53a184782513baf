use clap::Subcommand;
use colored::Colorize;
use mdr_common::cache::Cache;
use mdr_common::config::Config;
use mdr_common::error::Result;
use tracing::debug;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Print the cache root
    Path,
    /// Remove every cached file, descriptor and lock
    Clean,
}

impl CacheCommand {
    pub fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Path => {
                println!("{}", config.cache_root().display());
            }
            Self::Clean => {
                debug!("Clearing cache at {}", config.cache_root().display());
                Cache::new(config)?.clear_all()?;
                println!("{} {}", "Cleared".green().bold(), config.cache_root().display());
            }
        }
        Ok(())
    }
}
