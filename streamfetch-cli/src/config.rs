use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamfetch_engine::{
    AcquisitionConfig, ProxyConfig, QualityPreference, QualityTier, RetryPolicy,
};

use crate::cli::Args;
use crate::error::{AppError, Result};

const CONFIG_FILE_NAME: &str = "streamfetch.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub audio: AudioConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub download_dir: PathBuf,
    pub log_level: String,
    /// Tracks acquired in parallel.
    pub max_concurrent_tracks: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads_music"),
            log_level: "info".to_string(),
            max_concurrent_tracks: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// HI_RES_LOSSLESS, LOSSLESS or HIGH; anything else means no cap.
    pub max_quality: String,
    pub auto_fallback: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_quality: QualityTier::HighRes.to_string(),
            auto_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub api_urls: Vec<String>,
    pub concurrency: usize,
    /// Seconds.
    pub timeout: u64,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_urls: vec![
                "https://tidal.kinoplus.online".to_string(),
                "https://api.tidalhifi.com".to_string(),
            ],
            concurrency: streamfetch_engine::config::DEFAULT_CONCURRENCY,
            timeout: 30,
            max_retries: 3,
            proxy: None,
        }
    }
}

impl AppConfig {
    /// Load from `path`, else `./streamfetch.toml`, else the user config dir.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_path(path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// First existing candidate location, or the explicit path even if missing.
    pub fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = path {
            return Some(path.to_path_buf());
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir().map(|dir| dir.join("streamfetch").join("config.toml"))
    }

    pub fn show(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply global command-line overrides on top of the file values.
    pub fn apply_args(&mut self, args: &Args) {
        if !args.endpoints.is_empty() {
            self.network.api_urls = args.endpoints.clone();
        }
        if let Some(timeout) = args.timeout {
            self.network.timeout = timeout;
        }
        if let Some(retries) = args.retries {
            self.network.max_retries = retries;
        }
        if let Some(proxy) = &args.proxy {
            self.network.proxy = Some(proxy.clone());
        }
    }

    pub fn quality(&self) -> QualityPreference {
        QualityPreference {
            cap: QualityTier::parse_user_cap(&self.audio.max_quality),
            allow_fallback: self.audio.auto_fallback,
        }
    }

    /// Engine configuration derived from this file.
    pub fn acquisition_config(&self) -> Result<AcquisitionConfig> {
        if self.network.api_urls.is_empty() {
            return Err(AppError::Config(
                "network.api_urls must list at least one endpoint".to_string(),
            ));
        }
        let mut builder = AcquisitionConfig::builder()
            .timeout(Duration::from_secs(self.network.timeout))
            .concurrency(self.network.concurrency)
            .retry(RetryPolicy::default().with_max_retries(self.network.max_retries))
            .quality(self.quality());
        if let Some(proxy) = self.network.proxy.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(ProxyConfig::from_url(proxy));
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [audio]
            max_quality = "LOSSLESS"

            [network]
            api_urls = ["https://one.example"]
            "#,
        )
        .unwrap();

        assert_eq!(config.network.api_urls, ["https://one.example"]);
        assert_eq!(config.network.max_retries, 3);
        assert!(config.audio.auto_fallback);
        assert_eq!(config.quality().cap, QualityTier::Lossless);
        assert_eq!(config.general.download_dir, PathBuf::from("downloads_music"));
    }

    #[test]
    fn unknown_quality_means_no_cap() {
        let mut config = AppConfig::default();
        config.audio.max_quality = "SUPER".to_string();
        assert_eq!(config.quality().cap, QualityTier::HighRes);
    }

    #[test]
    fn command_line_overrides_file() {
        let mut config = AppConfig::default();
        let args = Args::try_parse_from([
            "streamfetch",
            "--endpoint",
            "https://cli.example",
            "--retries",
            "7",
            "--timeout",
            "5",
            "config",
        ])
        .unwrap();
        config.apply_args(&args);

        let engine = config.acquisition_config().unwrap();
        assert_eq!(config.network.api_urls, ["https://cli.example"]);
        assert_eq!(engine.retry.max_retries, 7);
        assert_eq!(engine.timeout, Duration::from_secs(5));
    }

    #[test]
    fn load_reads_explicit_path_and_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        assert!(AppConfig::load(Some(&path)).is_ok());

        std::fs::write(&path, "[general]\nmax_concurrent_tracks = 4\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.general.max_concurrent_tracks, 4);

        std::fs::write(&path, "[general\n").unwrap();
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(AppError::ConfigParse(_))
        ));
    }

    #[test]
    fn empty_endpoint_list_is_rejected() {
        let mut config = AppConfig::default();
        config.network.api_urls.clear();
        assert!(config.acquisition_config().is_err());
    }

    #[test]
    fn shows_as_toml() {
        let shown = AppConfig::default().show().unwrap();
        assert!(shown.contains("[network]"));
        assert!(shown.contains("max_quality = \"HI_RES_LOSSLESS\""));
    }
}
