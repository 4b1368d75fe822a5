use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::proxy::ProxyConfig;
use crate::quality::QualityPreference;
use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Origin of the web player the API expects requests from.
pub const DEFAULT_ORIGIN: &str = "https://listen.tidal.com";

/// Default segment worker pool size.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Configurable options for one acquisition engine.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Timeout for each individual request (manifest, metadata or segment)
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Headers sent with every request
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,

    /// Maximum idle connections to keep per host
    pub pool_max_idle_per_host: usize,

    /// Duration to keep idle connections alive before closing
    pub pool_idle_timeout: Duration,

    /// Segments fetched in parallel for one track
    pub concurrency: usize,

    /// Per-tier retry budget and backoff for manifest fetch plus download
    pub retry: RetryPolicy,

    /// Transport-level retry for a single segment request
    pub segment_retry: RetryPolicy,

    /// Requested quality cap and whether lower tiers may be tried
    pub quality: QualityPreference,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: AcquisitionConfig::get_default_headers(),
            proxy: None,
            use_system_proxy: true,
            pool_max_idle_per_host: 16,
            pool_idle_timeout: Duration::from_secs(30),
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            segment_retry: RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(8),
                jitter: true,
            },
            quality: QualityPreference::default(),
        }
    }
}

impl AcquisitionConfig {
    pub fn builder() -> crate::builder::AcquisitionConfigBuilder {
        crate::builder::AcquisitionConfigBuilder::new()
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );

        default_headers.insert(
            reqwest::header::REFERER,
            HeaderValue::from_static("https://listen.tidal.com/"),
        );

        default_headers.insert(
            reqwest::header::ORIGIN,
            HeaderValue::from_static(DEFAULT_ORIGIN),
        );
        default_headers
    }
}
