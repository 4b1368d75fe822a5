mod cli;
mod commands;
mod config;
mod error;
mod progress;

use std::process;

use clap::Parser;
use mimalloc::MiMalloc;
use streamfetch_engine::CollectionKind;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands, DownloadArgs},
    commands::{DownloadJob, Target},
    config::AppConfig,
    error::{AppError, Result},
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    init_logging(args.verbose, args.quiet, &config.general.log_level)?;
    config.apply_args(&args);

    match args.command {
        Commands::Track { inputs, download } => {
            run_download(config, Target::Tracks(inputs), download, args.quiet).await?;
        }
        Commands::Album { input, download } => {
            let target = Target::Collection(CollectionKind::Album, input);
            run_download(config, target, download, args.quiet).await?;
        }
        Commands::Playlist { input, download } => {
            let target = Target::Collection(CollectionKind::Playlist, input);
            run_download(config, target, download, args.quiet).await?;
        }

        Commands::Config { path } => {
            if path {
                match AppConfig::resolve_path(args.config.as_deref()) {
                    Some(path) => println!("{}", path.display()),
                    None => println!("No config directory available on this platform"),
                }
            } else {
                println!("{}", config.show()?);
            }
        }
    }

    Ok(())
}

async fn run_download(
    mut config: AppConfig,
    target: Target,
    download: DownloadArgs,
    quiet: bool,
) -> Result<()> {
    if let Some(quality) = download.quality {
        config.audio.max_quality = quality.to_string();
    }
    if download.no_fallback {
        config.audio.auto_fallback = false;
    }
    if let Some(concurrency) = download.concurrency {
        config.network.concurrency = concurrency;
    }
    if let Some(tracks) = download.tracks {
        config.general.max_concurrent_tracks = tracks;
    }

    let job = DownloadJob {
        target,
        endpoints: config.network.api_urls.clone(),
        engine: config.acquisition_config()?,
        output_dir: download
            .output
            .unwrap_or_else(|| config.general.download_dir.clone()),
        max_concurrent_tracks: config.general.max_concurrent_tracks,
        hide_progress: quiet,
    };

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight requests");
            signal_token.cancel();
        }
    });

    commands::run_download(job, token).await
}

fn init_logging(verbose: bool, quiet: bool, default_level: &str) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}
