//! Tier and endpoint state machine driving one track acquisition.
//!
//! For every negotiated tier the orchestrator fetches a manifest from the
//! current endpoint, resolves it into segment URLs and downloads them. A
//! transient failure rotates the endpoint and retries within the tier's
//! budget; a missing tier or a broken manifest moves on to the next tier.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::create_client;
use crate::config::AcquisitionConfig;
use crate::endpoint::EndpointPool;
use crate::error::{AcquireError, FailureKind, TierFailure};
use crate::events::{AcquisitionEvent, EventEmitter};
use crate::manifest::{self, build_segment_urls};
use crate::provider::{HttpStreamProvider, StreamProvider};
use crate::quality::{QualityPreference, QualityTier, tier_sequence};
use crate::retry::{RetryAction, RetryPolicy, pause, retry_with_backoff};
use crate::segment::{HttpSegmentFetcher, SegmentDownloader, SegmentFetch, SegmentJob};

/// A successfully acquired artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub track_id: String,
    pub tier: QualityTier,
    /// Endpoint that served the manifest.
    pub endpoint: String,
    pub segment_count: usize,
    pub segmented: bool,
    pub data: Bytes,
}

impl Acquisition {
    /// Container extension of the raw artifact: direct streams are FLAC,
    /// segmented ones fragmented MP4.
    pub fn file_extension(&self) -> &'static str {
        if self.segmented { "mp4" } else { "flac" }
    }
}

/// Per-tier bookkeeping, discarded when the tier ends either way.
#[derive(Debug)]
struct AttemptState {
    tier: QualityTier,
    attempts: u32,
    retries: u32,
    endpoint: String,
    last_kind: Option<FailureKind>,
}

impl AttemptState {
    fn new(tier: QualityTier, endpoint: String) -> Self {
        Self {
            tier,
            attempts: 0,
            retries: 0,
            endpoint,
            last_kind: None,
        }
    }

    fn into_failure(self, error: AcquireError) -> TierFailure {
        debug!(
            tier = %self.tier,
            attempts = self.attempts,
            kind = ?self.last_kind,
            "Tier attempt finished"
        );
        TierFailure {
            tier: self.tier,
            attempts: self.attempts,
            endpoint: self.endpoint,
            error: Box::new(error),
        }
    }
}

pub struct AcquisitionOrchestrator {
    pool: Arc<EndpointPool>,
    provider: Arc<dyn StreamProvider>,
    fetcher: Arc<dyn SegmentFetch>,
    retry: RetryPolicy,
    concurrency: usize,
    quality: QualityPreference,
    events: EventEmitter,
    token: CancellationToken,
}

impl AcquisitionOrchestrator {
    pub fn new(
        pool: Arc<EndpointPool>,
        provider: Arc<dyn StreamProvider>,
        fetcher: Arc<dyn SegmentFetch>,
        config: &AcquisitionConfig,
    ) -> Self {
        Self {
            pool,
            provider,
            fetcher,
            retry: config.retry.clone(),
            concurrency: config.concurrency.max(1),
            quality: config.quality,
            events: EventEmitter::default(),
            token: CancellationToken::new(),
        }
    }

    /// Orchestrator backed by the HTTP provider and segment fetcher, sharing
    /// one client built from `config`.
    pub fn from_config(
        pool: Arc<EndpointPool>,
        config: &AcquisitionConfig,
    ) -> Result<Self, AcquireError> {
        Ok(Self::from_client(pool, create_client(config)?, config))
    }

    /// Like [`from_config`](Self::from_config) but reusing an existing client.
    pub fn from_client(pool: Arc<EndpointPool>, client: Client, config: &AcquisitionConfig) -> Self {
        let provider = HttpStreamProvider::new(client.clone(), config.timeout);
        let fetcher =
            HttpSegmentFetcher::new(client, config.segment_retry.clone(), config.timeout);
        Self::new(pool, Arc::new(provider), Arc::new(fetcher), config)
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// Stop between attempts once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }

    /// Acquire `track_id`, negotiating the tier sequence from the track's
    /// reported capability.
    pub async fn acquire(&self, track_id: &str) -> Result<Acquisition, AcquireError> {
        let capability = self.resolve_capability(track_id).await;
        self.acquire_with_capability(track_id, capability).await
    }

    /// Acquire `track_id` with an already known capability.
    pub async fn acquire_with_capability(
        &self,
        track_id: &str,
        capability: QualityTier,
    ) -> Result<Acquisition, AcquireError> {
        let tiers = tier_sequence(
            self.quality.cap,
            capability,
            self.quality.allow_fallback,
        );
        info!(
            track_id,
            %capability,
            tiers = ?tiers,
            "Starting acquisition"
        );

        let mut failures = Vec::with_capacity(tiers.len());
        for tier in tiers {
            match self.attempt_tier(track_id, tier).await {
                Ok(acquisition) => {
                    info!(
                        track_id,
                        %tier,
                        bytes = acquisition.data.len(),
                        segments = acquisition.segment_count,
                        "Acquisition completed"
                    );
                    self.events.emit(AcquisitionEvent::Completed {
                        track_id: track_id.to_string(),
                        tier,
                        bytes: acquisition.data.len(),
                    });
                    return Ok(acquisition);
                }
                Err(failure) => {
                    if matches!(*failure.error, AcquireError::Cancelled) {
                        return Err(AcquireError::Cancelled);
                    }
                    self.events.emit(AcquisitionEvent::TierAbandoned {
                        track_id: track_id.to_string(),
                        tier,
                        attempts: failure.attempts,
                        reason: failure.error.to_string(),
                    });
                    failures.push(failure);
                }
            }
        }

        Err(AcquireError::ExhaustedAllTiers {
            track_id: track_id.to_string(),
            failures,
        })
    }

    /// Ask the provider for the track's capability, rotating endpoints on
    /// transient failures. Falls back to lossless when it cannot be learned.
    async fn resolve_capability(&self, track_id: &str) -> QualityTier {
        let result = retry_with_backoff(&self.retry, &self.token, |attempt| async move {
            let endpoint = if attempt == 0 {
                self.pool.current()
            } else {
                self.pool.rotate(&self.pool.current())
            };
            match self.provider.track_capability(&endpoint, track_id).await {
                Ok(tier) => RetryAction::Success(tier),
                Err(e) if e.classify() == FailureKind::Transient => RetryAction::Retry(e),
                Err(e) => RetryAction::Fail(e),
            }
        })
        .await;

        match result {
            Ok(tier) => {
                debug!(track_id, %tier, "Track capability resolved");
                tier
            }
            Err(e) => {
                warn!(track_id, error = %e, "Could not resolve track capability, assuming LOSSLESS");
                QualityTier::Lossless
            }
        }
    }

    async fn attempt_tier(&self, track_id: &str, tier: QualityTier) -> Result<Acquisition, TierFailure> {
        let mut state = AttemptState::new(tier, self.pool.current());
        self.events.emit(AcquisitionEvent::TierStarted {
            track_id: track_id.to_string(),
            tier,
            endpoint: state.endpoint.clone(),
        });

        loop {
            if self.token.is_cancelled() {
                return Err(state.into_failure(AcquireError::Cancelled));
            }

            state.attempts += 1;
            let error = match self.run_attempt(track_id, tier, &state.endpoint).await {
                Ok(acquisition) => return Ok(acquisition),
                Err(e) => e,
            };

            let kind = error.classify();
            state.last_kind = Some(kind);
            match kind {
                FailureKind::QualityUnavailable => {
                    info!(track_id, %tier, "Quality not offered, moving to next tier");
                    return Err(state.into_failure(error));
                }
                FailureKind::Permanent => {
                    warn!(track_id, %tier, error = %error, "Abandoning tier after permanent failure");
                    return Err(state.into_failure(error));
                }
                FailureKind::Transient if state.retries >= self.retry.max_retries => {
                    warn!(
                        track_id,
                        %tier,
                        attempts = state.attempts,
                        error = %error,
                        "Retry budget exhausted for tier"
                    );
                    return Err(state.into_failure(error));
                }
                FailureKind::Transient => {
                    let delay = self.retry.delay_for_attempt(state.retries);
                    let next = self.pool.rotate(&state.endpoint);
                    warn!(
                        track_id,
                        %tier,
                        attempt = state.attempts,
                        max_attempts = self.retry.max_attempts(),
                        endpoint = %next,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, rotating endpoint"
                    );
                    if next != state.endpoint {
                        self.events.emit(AcquisitionEvent::EndpointRotated {
                            track_id: track_id.to_string(),
                            from: state.endpoint.clone(),
                            to: next.clone(),
                        });
                    }
                    state.endpoint = next;
                    state.retries += 1;
                    if let Err(e) = pause(delay, &self.token).await {
                        return Err(state.into_failure(e));
                    }
                }
            }
        }
    }

    /// One manifest fetch, resolve and download against `endpoint`.
    async fn run_attempt(
        &self,
        track_id: &str,
        tier: QualityTier,
        endpoint: &str,
    ) -> Result<Acquisition, AcquireError> {
        let text = self
            .provider
            .stream_manifest(endpoint, track_id, tier)
            .await?;
        let descriptor = manifest::resolve(&text)?;
        let job = SegmentJob::new(build_segment_urls(&descriptor)?)?;

        debug!(
            track_id,
            %tier,
            endpoint,
            segments = job.len(),
            segmented = descriptor.is_segmented(),
            "Manifest resolved"
        );
        self.events.emit(AcquisitionEvent::ManifestResolved {
            track_id: track_id.to_string(),
            tier,
            segments: job.len(),
            segmented: descriptor.is_segmented(),
        });

        let data = SegmentDownloader::new(self.concurrency)
            .with_events(track_id, self.events.clone())
            .fetch_all(&job, self.fetcher.as_ref())
            .await?;

        Ok(Acquisition {
            track_id: track_id.to_string(),
            tier,
            endpoint: endpoint.to_string(),
            segment_count: job.len(),
            segmented: descriptor.is_segmented(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    type ManifestReply = Result<String, AcquireError>;

    /// Replies to manifest requests from a per-tier script; an exhausted script
    /// repeats a transient error.
    #[derive(Default)]
    struct ScriptedProvider {
        capability: Option<QualityTier>,
        replies: Mutex<HashMap<QualityTier, VecDeque<ManifestReply>>>,
        calls: Mutex<Vec<(String, QualityTier)>>,
    }

    impl ScriptedProvider {
        fn script(self, tier: QualityTier, replies: Vec<ManifestReply>) -> Self {
            self.replies.lock().unwrap().insert(tier, replies.into());
            self
        }

        fn calls(&self) -> Vec<(String, QualityTier)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StreamProvider for ScriptedProvider {
        async fn stream_manifest(
            &self,
            endpoint: &str,
            _track_id: &str,
            tier: QualityTier,
        ) -> Result<String, AcquireError> {
            self.calls.lock().unwrap().push((endpoint.to_string(), tier));
            self.replies
                .lock()
                .unwrap()
                .get_mut(&tier)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Err(AcquireError::unexpected_response("upstream 502")))
        }

        async fn track_capability(&self, _: &str, _: &str) -> Result<QualityTier, AcquireError> {
            self.capability
                .ok_or_else(|| AcquireError::unexpected_response("metadata down"))
        }
    }

    struct EchoFetcher;

    #[async_trait]
    impl SegmentFetch for EchoFetcher {
        async fn fetch(&self, url: &str, _: &CancellationToken) -> Result<Bytes, AcquireError> {
            Ok(Bytes::copy_from_slice(url.as_bytes()))
        }
    }

    fn direct(url: &str) -> ManifestReply {
        Ok(format!(r#"{{"url":"{url}"}}"#))
    }

    fn unavailable(tier: QualityTier) -> ManifestReply {
        Err(AcquireError::QualityUnavailable {
            track_id: "1".to_string(),
            tier,
        })
    }

    fn orchestrator(provider: Arc<ScriptedProvider>, endpoints: &[&str], retries: u32) -> AcquisitionOrchestrator {
        let config = AcquisitionConfig::builder()
            .retry(RetryPolicy::immediate(retries))
            .quality_cap(QualityTier::High)
            .concurrency(2)
            .build();
        let pool = Arc::new(EndpointPool::new(endpoints.iter().copied()).unwrap());
        AcquisitionOrchestrator::new(pool, provider, Arc::new(EchoFetcher), &config)
    }

    #[tokio::test]
    async fn first_successful_tier_wins() {
        let provider = Arc::new(
            ScriptedProvider::default().script(QualityTier::HighRes, vec![direct("https://cdn/hr.flac")]),
        );
        let orch = orchestrator(provider.clone(), &["https://a"], 3);
        let acq = orch
            .acquire_with_capability("1", QualityTier::HighRes)
            .await
            .unwrap();
        assert_eq!(acq.tier, QualityTier::HighRes);
        assert_eq!(&acq.data[..], b"https://cdn/hr.flac");
        assert_eq!(acq.file_extension(), "flac");
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn transient_failures_rotate_until_budget_is_spent() {
        let provider = Arc::new(ScriptedProvider::default());
        let orch = orchestrator(provider.clone(), &["https://a", "https://b"], 2);
        let (events, mut rx) = EventEmitter::channel();
        let orch = orch.with_events(events);

        let err = orch
            .acquire_with_capability("1", QualityTier::High)
            .await
            .unwrap_err();
        let AcquireError::ExhaustedAllTiers { failures, .. } = err else {
            panic!("expected exhaustion, got {err}");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].attempts, 3);

        // Every retry went to a different endpoint than the attempt before it.
        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert_ne!(pair[0].0, pair[1].0);
        }

        let mut rotations = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AcquisitionEvent::EndpointRotated { .. }) {
                rotations += 1;
            }
        }
        assert_eq!(rotations, 2);
    }

    #[tokio::test]
    async fn parse_errors_abandon_tier_without_rotation() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .script(QualityTier::Lossless, vec![Ok("<MPD><Period/></MPD>".to_string())])
                .script(QualityTier::High, vec![direct("https://cdn/low.m4a")]),
        );
        let orch = orchestrator(provider.clone(), &["https://a", "https://b"], 3);
        let acq = orch
            .acquire_with_capability("1", QualityTier::Lossless)
            .await
            .unwrap();
        assert_eq!(acq.tier, QualityTier::High);

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, calls[1].0, "parse failure must not rotate");
    }

    #[tokio::test]
    async fn quality_unavailable_skips_straight_to_next_tier() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .script(QualityTier::HighRes, vec![unavailable(QualityTier::HighRes)])
                .script(QualityTier::Lossless, vec![direct("https://cdn/ll.flac")]),
        );
        let orch = orchestrator(provider.clone(), &["https://a", "https://b"], 3);
        let acq = orch
            .acquire_with_capability("1", QualityTier::HighRes)
            .await
            .unwrap();
        assert_eq!(acq.tier, QualityTier::Lossless);
        let tiers: Vec<_> = provider.calls().into_iter().map(|(_, t)| t).collect();
        assert_eq!(tiers, [QualityTier::HighRes, QualityTier::Lossless]);
    }

    #[tokio::test]
    async fn no_fallback_stops_after_start_tier() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .script(QualityTier::HighRes, vec![unavailable(QualityTier::HighRes)]),
        );
        let config = AcquisitionConfig::builder()
            .retry(RetryPolicy::immediate(3))
            .allow_fallback(false)
            .build();
        let pool = Arc::new(EndpointPool::new(["https://a"]).unwrap());
        let orch = AcquisitionOrchestrator::new(pool, provider, Arc::new(EchoFetcher), &config);

        let err = orch
            .acquire_with_capability("1", QualityTier::Lossless)
            .await
            .unwrap_err();
        let AcquireError::ExhaustedAllTiers { failures, .. } = err else {
            panic!("expected exhaustion");
        };
        assert_eq!(failures.len(), 1);
        assert!(failures[0].error.is_quality_unavailable());
    }

    #[tokio::test]
    async fn unknown_capability_assumes_lossless() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .script(QualityTier::Lossless, vec![direct("https://cdn/ll.flac")]),
        );
        let config = AcquisitionConfig::builder()
            .retry(RetryPolicy::immediate(1))
            .quality_cap(QualityTier::High)
            .build();
        let pool = Arc::new(EndpointPool::new(["https://a", "https://b"]).unwrap());
        let orch =
            AcquisitionOrchestrator::new(pool, provider.clone(), Arc::new(EchoFetcher), &config);

        let acq = orch.acquire("1").await.unwrap();
        assert_eq!(acq.tier, QualityTier::Lossless);
        assert_eq!(provider.calls()[0].1, QualityTier::Lossless);
    }

    #[tokio::test]
    async fn cancelled_orchestrator_stops_before_any_attempt() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .script(QualityTier::HighRes, vec![direct("https://cdn/hr.flac")]),
        );
        let token = CancellationToken::new();
        token.cancel();
        let orch = orchestrator(provider.clone(), &["https://a"], 3).with_cancellation(token);

        let err = orch
            .acquire_with_capability("1", QualityTier::HighRes)
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::Cancelled));
        assert!(provider.calls().is_empty());
    }
}
