// Segment download: bounded-concurrency fetching and in-order reassembly.

mod fetcher;

pub use fetcher::HttpSegmentFetcher;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::AcquireError;
use crate::events::{AcquisitionEvent, EventEmitter};

/// One fetchable piece of the asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub url: String,
}

/// Ordered, densely indexed segments of one asset.
///
/// Index 0 is the initialization segment when the manifest is segmented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentJob {
    segments: Vec<Segment>,
}

impl SegmentJob {
    pub fn new(urls: Vec<String>) -> Result<Self, AcquireError> {
        if urls.is_empty() {
            return Err(AcquireError::EmptySegmentList);
        }
        let segments = urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| Segment { index, url })
            .collect();
        Ok(Self { segments })
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// Fetches the payload behind one segment URL.
///
/// `token` is cancelled once a sibling segment of the same job has failed;
/// implementations should stop retrying when they see it.
#[async_trait]
pub trait SegmentFetch: Send + Sync {
    async fn fetch(&self, url: &str, token: &CancellationToken) -> Result<Bytes, AcquireError>;
}

/// Runs a [`SegmentJob`] against a [`SegmentFetch`] with at most
/// `concurrency` requests in flight.
#[derive(Debug, Clone)]
pub struct SegmentDownloader {
    concurrency: usize,
    events: EventEmitter,
    track_id: String,
}

impl SegmentDownloader {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            events: EventEmitter::default(),
            track_id: String::new(),
        }
    }

    /// Report per-segment progress for `track_id` through `events`.
    pub fn with_events(mut self, track_id: impl Into<String>, events: EventEmitter) -> Self {
        self.track_id = track_id.into();
        self.events = events;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetch every segment and concatenate the payloads in index order.
    ///
    /// The first failure stops dispatch of further segments. Requests already
    /// in flight are allowed to finish and their payloads are discarded; the
    /// call then fails with [`AcquireError::SegmentFetch`] for the failed index.
    pub async fn fetch_all(
        &self,
        job: &SegmentJob,
        fetcher: &dyn SegmentFetch,
    ) -> Result<Bytes, AcquireError> {
        let total = job.len();
        if total == 0 {
            return Err(AcquireError::EmptySegmentList);
        }

        let token = CancellationToken::new();
        let mut pending = job.segments().iter();
        let mut in_flight = FuturesUnordered::new();
        let mut payloads: BTreeMap<usize, Bytes> = BTreeMap::new();
        let mut failure: Option<AcquireError> = None;

        debug!(
            segments = total,
            concurrency = self.concurrency,
            "Dispatching segment job"
        );

        loop {
            while failure.is_none() && in_flight.len() < self.concurrency {
                let Some(segment) = pending.next() else {
                    break;
                };
                let token = &token;
                in_flight.push(async move {
                    let result = fetcher.fetch(&segment.url, token).await;
                    (segment.index, result)
                });
            }

            let Some((index, result)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(data) if failure.is_none() => {
                    trace!(index, bytes = data.len(), "Segment fetched");
                    self.events.emit(AcquisitionEvent::SegmentCompleted {
                        track_id: self.track_id.clone(),
                        index,
                        bytes: data.len(),
                        completed: payloads.len() + 1,
                        total,
                    });
                    payloads.insert(index, data);
                }
                Ok(_) => trace!(index, "Discarding segment fetched after job failure"),
                Err(e) => {
                    if failure.is_none() {
                        warn!(index, error = %e, "Segment failed, abandoning remaining segments");
                        token.cancel();
                        failure = Some(AcquireError::segment_fetch(index, e));
                    } else {
                        trace!(index, error = %e, "Additional segment failure after abandon");
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        reassemble(payloads, total)
    }
}

/// Concatenate payloads in ascending index order, requiring every index in `0..total`.
pub fn reassemble(mut payloads: BTreeMap<usize, Bytes>, total: usize) -> Result<Bytes, AcquireError> {
    let size: usize = payloads.values().map(Bytes::len).sum();
    let mut output = BytesMut::with_capacity(size);
    for index in 0..total {
        let Some(data) = payloads.remove(&index) else {
            return Err(AcquireError::segment_fetch(
                index,
                AcquireError::unexpected_response("segment payload missing after download"),
            ));
        };
        output.extend_from_slice(&data);
    }
    Ok(output.freeze())
}
