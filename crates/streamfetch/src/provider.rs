//! Upstream stream API: manifest and track metadata lookups against one endpoint.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::AcquireError;
use crate::quality::QualityTier;
use crate::response::{MANIFEST_SCHEMA, TRACK_INFO_SCHEMA};

static UUID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});
static DIGITS_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Host serving album artwork.
pub const COVER_ART_BASE: &str = "https://resources.tidal.com/images";

/// Source of stream manifests and track capabilities.
///
/// Every call targets an explicit endpoint so the caller decides about
/// rotation; implementations perform a single attempt.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Raw manifest document for `track_id` at `tier`.
    ///
    /// Fails with [`AcquireError::QualityUnavailable`] when the tier is not
    /// offered for the track.
    async fn stream_manifest(
        &self,
        endpoint: &str,
        track_id: &str,
        tier: QualityTier,
    ) -> Result<String, AcquireError>;

    /// Highest tier the track is offered in.
    async fn track_capability(
        &self,
        endpoint: &str,
        track_id: &str,
    ) -> Result<QualityTier, AcquireError>;
}

/// Descriptive metadata of one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub track_number: u32,
    pub cover_id: Option<String>,
    pub year: Option<String>,
    pub explicit: bool,
    pub capability: QualityTier,
}

impl TrackMetadata {
    pub fn cover_url(&self, size: u32) -> Option<String> {
        self.cover_id.as_deref().map(|id| cover_url(id, size))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawTrackInfo {
    id: Option<Value>,
    title: Option<String>,
    artist: Option<RawNamed>,
    artists: Option<Vec<RawNamed>>,
    album: Option<RawAlbum>,
    cover: Option<String>,
    track_number: Option<u32>,
    audio_quality: Option<String>,
    media_metadata: Option<RawMediaMetadata>,
    stream_start_date: Option<String>,
    release_date: Option<String>,
    explicit: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNamed {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAlbum {
    title: Option<String>,
    cover: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMediaMetadata {
    tags: Option<Vec<String>>,
}

impl RawTrackInfo {
    fn capability(&self) -> QualityTier {
        let tags = self
            .media_metadata
            .as_ref()
            .and_then(|m| m.tags.as_deref())
            .unwrap_or_default();
        if tags.iter().any(|t| t == "HIRES_LOSSLESS" || t == "MQA") {
            return QualityTier::HighRes;
        }
        self.audio_quality
            .as_deref()
            .map(QualityTier::parse_capability)
            .unwrap_or(QualityTier::Lossless)
    }

    fn into_metadata(self, requested_id: &str) -> TrackMetadata {
        let capability = self.capability();
        let id = match self.id {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => requested_id.to_string(),
        };
        let artist = self
            .artist
            .and_then(|a| a.name)
            .or_else(|| {
                self.artists
                    .and_then(|list| list.into_iter().next())
                    .and_then(|a| a.name)
            })
            .unwrap_or_else(|| "Unknown Artist".to_string());
        let (album, album_cover) = match self.album {
            Some(album) => (album.title, album.cover),
            None => (None, None),
        };
        let year = self
            .stream_start_date
            .or(self.release_date)
            .and_then(|date| date.split('-').next().map(str::to_string))
            .filter(|year| !year.is_empty());

        TrackMetadata {
            id,
            title: self.title.unwrap_or_else(|| "Unknown Title".to_string()),
            artist,
            album: album.unwrap_or_else(|| "Unknown Album".to_string()),
            track_number: self.track_number.unwrap_or(1),
            cover_id: album_cover.or(self.cover),
            year,
            explicit: self.explicit.unwrap_or(false),
            capability,
        }
    }
}

/// [`StreamProvider`] speaking the JSON API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStreamProvider {
    client: Client,
    timeout: Duration,
}

impl HttpStreamProvider {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub(crate) fn endpoint_url(
        endpoint: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Url, AcquireError> {
        let base = format!("{}/{path}/", endpoint.trim_end_matches('/'));
        Url::parse_with_params(&base, params)
            .map_err(|e| AcquireError::invalid_url(base, e.to_string()))
    }

    pub(crate) async fn get_json(&self, url: Url, operation: &'static str) -> Result<Value, AcquireError> {
        let mut request = self.client.get(url.clone());
        if !self.timeout.is_zero() {
            request = request.timeout(self.timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::http_status(status, url.as_str(), operation));
        }
        let body = response.text().await?;
        trace!(url = %url, bytes = body.len(), operation, "Response received");
        serde_json::from_str(&body).map_err(|e| {
            AcquireError::unexpected_response(format!("{operation} returned invalid JSON: {e}"))
        })
    }

    /// Full metadata record for `track_id`.
    pub async fn track_metadata(
        &self,
        endpoint: &str,
        track_id: &str,
    ) -> Result<TrackMetadata, AcquireError> {
        let url = Self::endpoint_url(endpoint, "info", &[("id", track_id)])?;
        let body = self.get_json(url, "track info").await?;
        let info = TRACK_INFO_SCHEMA
            .locate(&body)
            .filter(|v| v.is_object())
            .ok_or_else(|| AcquireError::unexpected_response("track info has no object body"))?;
        let raw = RawTrackInfo::deserialize(info).map_err(|e| {
            AcquireError::unexpected_response(format!("malformed track info: {e}"))
        })?;
        Ok(raw.into_metadata(track_id))
    }
}

#[async_trait]
impl StreamProvider for HttpStreamProvider {
    async fn stream_manifest(
        &self,
        endpoint: &str,
        track_id: &str,
        tier: QualityTier,
    ) -> Result<String, AcquireError> {
        let url = Self::endpoint_url(
            endpoint,
            "track",
            &[("id", track_id), ("quality", tier.api_name())],
        )?;
        let body = match self.get_json(url, "manifest request").await {
            Err(AcquireError::HttpStatus { status, .. }) if status == StatusCode::NOT_FOUND => {
                return Err(AcquireError::QualityUnavailable {
                    track_id: track_id.to_string(),
                    tier,
                });
            }
            other => other?,
        };

        let encoded = MANIFEST_SCHEMA
            .locate_str(&body)
            .ok_or_else(|| AcquireError::unexpected_response("response carries no manifest"))?;
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AcquireError::manifest_parse(format!("manifest is not base64: {e}")))?;
        let manifest = String::from_utf8(decoded)
            .map_err(|e| AcquireError::manifest_parse(format!("manifest is not UTF-8: {e}")))?;
        debug!(track_id, %tier, bytes = manifest.len(), "Manifest fetched");
        Ok(manifest)
    }

    async fn track_capability(
        &self,
        endpoint: &str,
        track_id: &str,
    ) -> Result<QualityTier, AcquireError> {
        Ok(self.track_metadata(endpoint, track_id).await?.capability)
    }
}

/// Artwork URL for `cover_id` at `size`x`size` pixels.
pub fn cover_url(cover_id: &str, size: u32) -> String {
    format!(
        "{COVER_ART_BASE}/{}/{size}x{size}.jpg",
        cover_id.replace('-', "/")
    )
}

/// Pull a track, album or playlist id out of a bare id or a share link.
///
/// Prefers a UUID, then the first run of digits, then the trimmed input.
pub fn extract_track_id(input: &str) -> String {
    UUID_REGEX
        .find(input)
        .or_else(|| DIGITS_REGEX.find(input))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| input.trim().to_string())
}
