// mdr/src/main.rs
use std::fs;
use std::process;

use clap::Parser;
use colored::Colorize;
use mdr_common::config::Config;
use mdr_common::error::Result;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: Could not load config: {:#}", "Error".red().bold(), e);
            process::exit(2);
        }
    };

    let log_guard = init_logging(&config, cli_args.verbose);

    let failed = match cli_args.command.run(&config).await {
        Ok(()) => {
            debug!("Command completed successfully.");
            false
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            true
        }
    };

    // process::exit skips destructors, so the file log is flushed here.
    drop(log_guard);
    if failed {
        process::exit(1);
    }
    Ok(())
}

/// Logs go to stderr. With `-vv` or more a daily `mdr.log` under the logs directory
/// receives the same events; the returned guard flushes it when dropped.
fn init_logging(config: &Config, verbose: u8) -> Option<WorkerGuard> {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("MDR_LOG")
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(true).without_time();

    let log_dir = config.logs_dir();
    let file_log = (verbose >= 2).then(|| fs::create_dir_all(&log_dir));
    match file_log {
        Some(Ok(())) => {
            let (file_writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "mdr.log"));
            let _ = subscriber.with_writer(std::io::stderr.and(file_writer)).try_init();
            debug!("Writing logs to {}", log_dir.join("mdr.log").display());
            Some(guard)
        }
        Some(Err(e)) => {
            let _ = subscriber.with_writer(std::io::stderr).try_init();
            warn!("Cannot create log directory {}: {}", log_dir.display(), e);
            None
        }
        None => {
            let _ = subscriber.with_writer(std::io::stderr).try_init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_log_guard_outlives_initialisation() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_cache_root(dir.path());

        let guard = init_logging(&config, 2);
        assert!(guard.is_some());
        tracing::info!("written before the guard is dropped");
        drop(guard);

        let logs: Vec<_> = fs::read_dir(config.logs_dir()).unwrap().collect();
        assert!(!logs.is_empty());
        assert!(init_logging(&config, 0).is_none());
    }
}
