use reqwest::Proxy;

use crate::error::AcquireError;

/// Proxy configuration types
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ProxyType {
    /// Proxy for every request regardless of target scheme
    All,
    /// HTTP proxy, used for `http://` targets only
    Http,
    /// HTTPS proxy, used for `https://` targets only
    Https,
    /// SOCKS5 proxy
    Socks5,
}

/// Credentials for an authenticating proxy.
#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// Proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g., "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>, proxy_type: ProxyType) -> Self {
        Self {
            url: url.into(),
            proxy_type,
            auth: None,
        }
    }

    /// Proxy all traffic through `url`, tunnelling through SOCKS5 when the scheme says so.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let proxy_type = if url.starts_with("socks5") {
            ProxyType::Socks5
        } else {
            ProxyType::All
        };
        Self::new(url, proxy_type)
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(ProxyAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

/// Build a reqwest [`Proxy`] from a [`ProxyConfig`].
pub fn build_proxy_from_config(config: &ProxyConfig) -> Result<Proxy, AcquireError> {
    let proxy_url = &config.url;

    let mut proxy = match config.proxy_type {
        ProxyType::All => Proxy::all(proxy_url).map_err(|e| {
            AcquireError::proxy_configuration(format!("invalid proxy URL: {e}"))
        })?,
        ProxyType::Http => Proxy::http(proxy_url).map_err(|e| {
            AcquireError::proxy_configuration(format!("invalid HTTP proxy URL: {e}"))
        })?,
        ProxyType::Https => Proxy::https(proxy_url).map_err(|e| {
            AcquireError::proxy_configuration(format!("invalid HTTPS proxy URL: {e}"))
        })?,
        ProxyType::Socks5 => {
            let url = if proxy_url.starts_with("socks5://") || proxy_url.starts_with("socks5h://")
            {
                proxy_url.to_string()
            } else {
                format!("socks5://{proxy_url}")
            };
            Proxy::all(&url).map_err(|e| {
                AcquireError::proxy_configuration(format!("invalid SOCKS5 proxy URL: {e}"))
            })?
        }
    };

    if let Some(auth) = &config.auth {
        proxy = proxy.basic_auth(&auth.username, &auth.password);
    }

    Ok(proxy)
}
