use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use logspool_core::Logger;
use logspool_rotate::{RetentionManager, RotatingWriter};
use logspool_types::{LogSettings, Severity};

mod config;

/// logspool - batched, sampled, rotating structured logging
#[derive(Parser, Debug)]
#[command(name = "logspool")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML settings file; LOGSPOOL_* variables override it
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log every line read from stdin
    Pipe {
        /// Severity given to each line
        #[arg(long, default_value = "info")]
        severity: Severity,
    },

    /// Run one retention sweep over the rotated files
    Sweep,

    /// Rotate the active file now
    Rotate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let settings = config::load(args.config.as_deref())?;

    match args.command {
        Command::Pipe { severity } => pipe(settings, severity).await,
        Command::Sweep => sweep(settings).await,
        Command::Rotate => rotate(settings),
    }
}

async fn pipe(settings: LogSettings, severity: Severity) -> Result<()> {
    let logger = Logger::builder(settings)
        .build()
        .context("failed to start logger")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let read = async {
        while let Some(line) = lines.next_line().await? {
            if !line.is_empty() {
                logger.log(severity, line, []);
            }
        }
        Ok::<_, std::io::Error>(())
    }
    .await;

    logger.close().await;
    let stats = logger.stats();
    eprintln!(
        "queued {}, written {} in {} batches, direct {}, dropped {}, write errors {}",
        stats.queued,
        stats.events_written,
        stats.batches_written,
        stats.direct_writes,
        stats.dropped,
        stats.write_errors
    );

    read.context("failed to read stdin")
}

async fn sweep(settings: LogSettings) -> Result<()> {
    let manager = RetentionManager::new(&settings.rotation.path, settings.retention);
    let report = tokio::task::spawn_blocking(move || manager.cleanup())
        .await
        .context("sweep task failed")??;

    println!(
        "scanned {}, compressed {}, deleted {}",
        report.scanned,
        report.compressed.len(),
        report.deleted.len()
    );
    for path in &report.deleted {
        println!("deleted {}", path.display());
    }
    for path in &report.compressed {
        println!("compressed {}", path.display());
    }
    for failure in &report.failures {
        eprintln!("{}", failure);
    }

    if !report.failures.is_empty() {
        bail!("{} files could not be processed", report.failures.len());
    }
    Ok(())
}

fn rotate(settings: LogSettings) -> Result<()> {
    let mut writer = RotatingWriter::open(settings.rotation)?;
    if writer.current_size() == 0 {
        println!("{} is empty, nothing to rotate", writer.path().display());
        return Ok(());
    }
    match writer.rotate()? {
        Some(segment) => println!("rotated to {}", segment.display()),
        None => println!("nothing to rotate"),
    }
    Ok(())
}
