use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::AcquisitionConfig;
use crate::error::AcquireError;
use crate::proxy::ProxyConfig;
use crate::quality::{QualityPreference, QualityTier};
use crate::retry::RetryPolicy;

/// Fluent construction of an [`AcquisitionConfig`].
#[derive(Debug, Clone, Default)]
pub struct AcquisitionConfigBuilder {
    config: AcquisitionConfig,
}

impl AcquisitionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add or replace a default header.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, AcquireError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AcquireError::configuration(format!("invalid header name `{name}`: {e}")))?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            AcquireError::configuration(format!("invalid value for header `{name}`: {e}"))
        })?;
        self.config.headers.insert(name, value);
        Ok(self)
    }

    /// Merge `headers` over the defaults; custom headers win on conflicts.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.config.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    pub fn use_system_proxy(mut self, enabled: bool) -> Self {
        self.config.use_system_proxy = enabled;
        self
    }

    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency.max(1);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Shorthand for changing only the per-tier retry budget.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.retry.max_retries = max_retries;
        self
    }

    pub fn segment_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.segment_retry = policy;
        self
    }

    pub fn quality_cap(mut self, cap: QualityTier) -> Self {
        self.config.quality.cap = cap;
        self
    }

    pub fn allow_fallback(mut self, allow: bool) -> Self {
        self.config.quality.allow_fallback = allow;
        self
    }

    pub fn quality(mut self, quality: QualityPreference) -> Self {
        self.config.quality = quality;
        self
    }

    pub fn build(self) -> AcquisitionConfig {
        self.config
    }
}
