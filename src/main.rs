use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use wikiharvest::{Crawler, CrawlerConfig};

/// Polite, resumable crawler for Wikipedia category trees.
#[derive(Debug, Parser)]
#[command(name = "wikiharvest", version)]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Seed category URL (overrides the config file).
    #[arg(long)]
    start_url: Option<String>,
    /// Output directory (overrides the config file).
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Maximum subcategory depth (overrides the config file).
    #[arg(long)]
    max_depth: Option<u32>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Fatal: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => CrawlerConfig::load(path)?,
        None => {
            let start_url = args
                .start_url
                .clone()
                .context("Provide --start-url or --config")?;
            CrawlerConfig::new(start_url)
        }
    };
    if let Some(start_url) = args.start_url {
        config.start_url = start_url;
    }
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(max_depth) = args.max_depth {
        config.max_depth = max_depth;
    }

    let _guard = init_tracing(&config)?;
    config.validate()?;

    let mut crawler = Crawler::new(config)?;
    let shutdown = crawler.shutdown_handle();
    ctrlc::set_handler(move || {
        if shutdown.swap(true, Ordering::SeqCst) {
            eprintln!("\nSecond signal received, aborting immediately.");
            std::process::exit(1);
        }
        eprintln!("\nShutdown requested; finishing the current URL and checkpointing...");
    })
    .context("Failed to install signal handler")?;

    crawler.run()?;
    println!("{}", crawler.summary());
    Ok(())
}

/// Install the tracing subscriber: console by default, a log file when one
/// is configured. The returned guard must stay alive for the file writer.
fn init_tracing(config: &CrawlerConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    match &config.log_file {
        Some(log_file) => {
            let directory = log_file.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = log_file
                .file_name()
                .context("log_file must name a file")?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}
