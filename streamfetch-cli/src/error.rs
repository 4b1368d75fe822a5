use streamfetch_engine::AcquireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Acquisition error: {0}")]
    Acquire(#[from] AcquireError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Failed to initialise logging: {0}")]
    Logging(String),

    #[error("{failed} of {total} track(s) failed")]
    TracksFailed { failed: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, AppError>;
