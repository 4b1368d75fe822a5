use std::path::PathBuf;

use clap::{Parser, Subcommand};
use streamfetch_engine::QualityTier;

#[derive(Parser, Debug)]
#[command(
    name = "streamfetch",
    version,
    about = "Download audio tracks with quality fallback and endpoint rotation"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors and hide progress bars
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to a TOML config file
    #[arg(long, global = true, env = "STREAMFETCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// API base URL; repeat to build an endpoint pool (replaces the configured list)
    #[arg(long = "endpoint", global = true, value_name = "URL")]
    pub endpoints: Vec<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Retries per quality tier before falling back
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Proxy URL (http://, https:// or socks5://)
    #[arg(long, global = true, env = "STREAMFETCH_PROXY")]
    pub proxy: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download one or more tracks by id or share link
    Track {
        /// Track ids or links
        #[arg(required = true, value_name = "ID_OR_LINK")]
        inputs: Vec<String>,

        #[command(flatten)]
        download: DownloadArgs,
    },

    /// Download every track of an album
    Album {
        /// Album id or link
        #[arg(value_name = "ID_OR_LINK")]
        input: String,

        #[command(flatten)]
        download: DownloadArgs,
    },

    /// Download every track of a playlist
    Playlist {
        /// Playlist UUID or link
        #[arg(value_name = "ID_OR_LINK")]
        input: String,

        #[command(flatten)]
        download: DownloadArgs,
    },

    /// Print the effective configuration
    Config {
        /// Print the config file location instead
        #[arg(long)]
        path: bool,
    },
}

/// Options shared by every downloading subcommand.
#[derive(clap::Args, Debug, Default)]
pub struct DownloadArgs {
    /// Highest quality to request
    #[arg(long, value_enum)]
    pub quality: Option<QualityTier>,

    /// Fail instead of falling back to a lower quality
    #[arg(long)]
    pub no_fallback: bool,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Segments downloaded in parallel per track
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Tracks downloaded in parallel
    #[arg(long)]
    pub tracks: Option<usize>,
}
