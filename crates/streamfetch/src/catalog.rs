//! Album and playlist listings: the tracks behind a collection id, read page
//! by page from the upstream API.

use std::collections::HashSet;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::endpoint::EndpointPool;
use crate::error::{AcquireError, FailureKind};
use crate::provider::HttpStreamProvider;
use crate::response::{ALBUM_INFO_SCHEMA, ITEMS_SCHEMA, PLAYLIST_INFO_SCHEMA, ResponseSchema};
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};

/// Entries requested per page.
pub const PAGE_LIMIT: usize = 100;

/// Upper bound on pages read for one collection.
pub const MAX_PAGES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Album,
    Playlist,
}

impl CollectionKind {
    fn path(self) -> &'static str {
        match self {
            Self::Album => "album",
            Self::Playlist => "playlist",
        }
    }

    fn operation(self) -> &'static str {
        match self {
            Self::Album => "album listing",
            Self::Playlist => "playlist listing",
        }
    }

    fn info_schema(self) -> &'static ResponseSchema {
        match self {
            Self::Album => &ALBUM_INFO_SCHEMA,
            Self::Playlist => &PLAYLIST_INFO_SCHEMA,
        }
    }

    fn untitled(self) -> &'static str {
        match self {
            Self::Album => "Unknown Album",
            Self::Playlist => "Unknown Playlist",
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// One audio track listed in a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionListing {
    pub kind: CollectionKind,
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    /// Audio tracks in listing order; videos are dropped.
    pub tracks: Vec<TrackRef>,
}

impl CollectionListing {
    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.iter().map(|track| track.id.clone()).collect()
    }
}

fn value_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_video(entry: &Value) -> bool {
    entry
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.eq_ignore_ascii_case("video"))
}

/// Audio tracks of one page. Entries are either bare tracks or wrapped in `item`.
fn page_tracks(entries: &[Value]) -> impl Iterator<Item = TrackRef> + '_ {
    entries
        .iter()
        .filter(|entry| !is_video(entry))
        .filter_map(|entry| {
            let track = entry.get("item").filter(|v| v.is_object()).unwrap_or(entry);
            if is_video(track) {
                return None;
            }
            let id = track.get("id").and_then(value_id)?;
            let title = track
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("Unknown Title")
                .to_string();
            Some(TrackRef { id, title })
        })
}

fn listing_header(kind: CollectionKind, body: &Value) -> (String, Option<String>) {
    let info = kind.info_schema().locate_object(body);
    let title = info
        .and_then(|info| info.get("title"))
        .and_then(Value::as_str)
        .filter(|title| !title.is_empty())
        .unwrap_or(kind.untitled())
        .to_string();
    let artist = info
        .and_then(|info| {
            ["/artist/name", "/artists/0/name", "/creator/name"]
                .iter()
                .find_map(|pointer| info.pointer(pointer).and_then(Value::as_str))
        })
        .map(str::to_string);
    (title, artist)
}

impl HttpStreamProvider {
    pub async fn album_tracks(
        &self,
        endpoint: &str,
        album_id: &str,
    ) -> Result<CollectionListing, AcquireError> {
        self.collection(endpoint, CollectionKind::Album, album_id).await
    }

    pub async fn playlist_tracks(
        &self,
        endpoint: &str,
        playlist_id: &str,
    ) -> Result<CollectionListing, AcquireError> {
        self.collection(endpoint, CollectionKind::Playlist, playlist_id)
            .await
    }

    /// Read every page of a collection from `endpoint`.
    ///
    /// Paging stops at the first short page, at a page that lists nothing
    /// new, or after [`MAX_PAGES`]. A failure after the first page keeps the
    /// tracks listed so far.
    pub async fn collection(
        &self,
        endpoint: &str,
        kind: CollectionKind,
        id: &str,
    ) -> Result<CollectionListing, AcquireError> {
        let mut page = self.collection_page(endpoint, kind, id, 0).await?;
        let (title, artist) = listing_header(kind, &page);

        let mut tracks = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0;
        for page_number in 1..=MAX_PAGES {
            let Some(entries) = ITEMS_SCHEMA.locate_array(&page) else {
                debug!(%kind, id, page_number, "Page carries no items");
                break;
            };
            let before = tracks.len();
            tracks.extend(page_tracks(entries).filter(|track| seen.insert(track.id.clone())));
            debug!(
                %kind,
                id,
                page_number,
                entries = entries.len(),
                added = tracks.len() - before,
                "Collection page read"
            );

            if entries.len() < PAGE_LIMIT || tracks.len() == before {
                break;
            }
            if page_number == MAX_PAGES {
                warn!(%kind, id, pages = MAX_PAGES, "Page limit reached, listing may be incomplete");
                break;
            }

            offset += entries.len();
            page = match self.collection_page(endpoint, kind, id, offset).await {
                Ok(next) => next,
                Err(e) => {
                    warn!(%kind, id, offset, error = %e, "Paging interrupted, keeping tracks listed so far");
                    break;
                }
            };
        }

        info!(%kind, id, title, tracks = tracks.len(), "Collection listed");
        Ok(CollectionListing {
            kind,
            id: id.to_string(),
            title,
            artist,
            tracks,
        })
    }

    async fn collection_page(
        &self,
        endpoint: &str,
        kind: CollectionKind,
        id: &str,
        offset: usize,
    ) -> Result<Value, AcquireError> {
        let offset = offset.to_string();
        let limit = PAGE_LIMIT.to_string();
        let mut params = vec![("id", id), ("offset", offset.as_str()), ("limit", limit.as_str())];
        if kind == CollectionKind::Playlist {
            params.push(("countryCode", "WW"));
        }
        let url = Self::endpoint_url(endpoint, kind.path(), &params)?;
        self.get_json(url, kind.operation()).await
    }
}

/// List a collection, rotating through `pool` on transient failures.
pub async fn list_collection(
    provider: &HttpStreamProvider,
    pool: &EndpointPool,
    retry: &RetryPolicy,
    token: &CancellationToken,
    kind: CollectionKind,
    id: &str,
) -> Result<CollectionListing, AcquireError> {
    retry_with_backoff(retry, token, |attempt| async move {
        let endpoint = if attempt == 0 {
            pool.current()
        } else {
            pool.rotate(&pool.current())
        };
        match provider.collection(&endpoint, kind, id).await {
            Ok(listing) => RetryAction::Success(listing),
            Err(e) if e.classify() == FailureKind::Transient => RetryAction::Retry(e),
            Err(e) => RetryAction::Fail(e),
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn videos_and_id_less_entries_are_dropped() {
        let entries = json!([
            {"type": "track", "item": {"id": 1, "title": "One"}},
            {"type": "video", "item": {"id": 2, "title": "Clip"}},
            {"item": {"id": 3, "title": "Live", "type": "VIDEO"}},
            {"id": "4", "title": "Bare"},
            {"item": {"title": "No id"}},
            {"id": 5}
        ]);
        let tracks: Vec<_> = page_tracks(entries.as_array().unwrap()).collect();
        assert_eq!(
            tracks,
            [
                TrackRef {
                    id: "1".into(),
                    title: "One".into()
                },
                TrackRef {
                    id: "4".into(),
                    title: "Bare".into()
                },
                TrackRef {
                    id: "5".into(),
                    title: "Unknown Title".into()
                },
            ]
        );
    }

    #[test]
    fn album_header_comes_from_first_track_or_leading_object() {
        let wrapped = json!({"data": {"items": [
            {"item": {"id": 1, "album": {"title": "Wrapped LP"}, "artist": {"name": "A"}}}
        ]}});
        assert_eq!(
            listing_header(CollectionKind::Album, &wrapped),
            ("Wrapped LP".to_string(), None)
        );

        let pair = json!([{"title": "Pair LP", "artist": {"name": "B"}}, {"items": []}]);
        assert_eq!(
            listing_header(CollectionKind::Album, &pair),
            ("Pair LP".to_string(), Some("B".to_string()))
        );
    }

    #[test]
    fn untitled_playlist_gets_placeholder() {
        let body = json!({"items": []});
        assert_eq!(
            listing_header(CollectionKind::Playlist, &body),
            ("Unknown Playlist".to_string(), None)
        );
    }
}
