use reqwest::StatusCode;

use crate::quality::QualityTier;

/// How the orchestrator reacts to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rotate the endpoint and retry within the tier's budget.
    Transient,
    /// The tier is not offered for this track; move to the next tier at once.
    QualityUnavailable,
    /// Retrying cannot help; abandon the tier without rotating.
    Permanent,
}

/// One abandoned quality tier, kept for the terminal error report.
#[derive(Debug)]
pub struct TierFailure {
    pub tier: QualityTier,
    pub attempts: u32,
    pub endpoint: String,
    pub error: Box<AcquireError>,
}

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("acquisition cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("proxy configuration error: {reason}")]
    ProxyConfiguration { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("unexpected response: {reason}")]
    UnexpectedResponse { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("manifest parse error: {reason}")]
    ManifestParse { reason: String },

    #[error("manifest produced no media segments")]
    EmptySegmentList,

    #[error("segment {index} failed: {source}")]
    SegmentFetch {
        index: usize,
        #[source]
        source: Box<AcquireError>,
    },

    #[error("quality {tier} is not offered for track {track_id}")]
    QualityUnavailable { track_id: String, tier: QualityTier },

    #[error("all quality tiers exhausted for track {track_id}: {}", summarize_failures(.failures))]
    ExhaustedAllTiers {
        track_id: String,
        failures: Vec<TierFailure>,
    },
}

fn summarize_failures(failures: &[TierFailure]) -> String {
    if failures.is_empty() {
        return "no tiers attempted".to_string();
    }
    failures
        .iter()
        .map(|f| {
            format!(
                "{} after {} attempt(s) via {} ({})",
                f.tier, f.attempts, f.endpoint, f.error
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl AcquireError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn proxy_configuration(reason: impl Into<String>) -> Self {
        Self::ProxyConfiguration {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn unexpected_response(reason: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            reason: reason.into(),
        }
    }

    pub fn manifest_parse(reason: impl Into<String>) -> Self {
        Self::ManifestParse {
            reason: reason.into(),
        }
    }

    pub fn segment_fetch(index: usize, source: AcquireError) -> Self {
        Self::SegmentFetch {
            index,
            source: Box::new(source),
        }
    }

    /// Whether the lower transport layer should repeat the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { source } => is_retryable_reqwest_error(source),
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::UnexpectedResponse { .. } => true,
            Self::Cancelled
            | Self::InvalidUrl { .. }
            | Self::ProxyConfiguration { .. }
            | Self::Configuration { .. }
            | Self::Io { .. }
            | Self::ManifestParse { .. }
            | Self::EmptySegmentList
            | Self::SegmentFetch { .. }
            | Self::QualityUnavailable { .. }
            | Self::ExhaustedAllTiers { .. } => false,
        }
    }

    /// Classification used by the tier/endpoint state machine.
    pub fn classify(&self) -> FailureKind {
        match self {
            Self::QualityUnavailable { .. } => FailureKind::QualityUnavailable,
            Self::ManifestParse { .. }
            | Self::EmptySegmentList
            | Self::Cancelled
            | Self::InvalidUrl { .. }
            | Self::ProxyConfiguration { .. }
            | Self::Configuration { .. }
            | Self::ExhaustedAllTiers { .. } => FailureKind::Permanent,
            Self::Network { .. }
            | Self::HttpStatus { .. }
            | Self::UnexpectedResponse { .. }
            | Self::Io { .. }
            | Self::SegmentFetch { .. } => FailureKind::Transient,
        }
    }

    pub fn is_quality_unavailable(&self) -> bool {
        self.classify() == FailureKind::QualityUnavailable
    }
}

/// Classify a reqwest error as retryable or non-retryable.
///
/// Retryable: connect, timeout, request, body read, and decode errors.
/// Non-retryable: redirect and builder errors.
pub fn is_retryable_reqwest_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode()
}
