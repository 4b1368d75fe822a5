pub mod builder;
pub mod catalog;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod manifest;
pub mod orchestrator;
pub mod provider;
pub mod proxy;
pub mod quality;
pub mod response;
pub mod retry;
pub mod segment;
pub mod sink;

pub use builder::AcquisitionConfigBuilder;
pub use catalog::{CollectionKind, CollectionListing, TrackRef, list_collection};
pub use client::create_client;
pub use config::AcquisitionConfig;
pub use endpoint::EndpointPool;
pub use error::{AcquireError, FailureKind, TierFailure};
pub use events::{AcquisitionEvent, EventEmitter};
pub use manifest::{ManifestDescriptor, SegmentedManifest, TimelineEntry, build_segment_urls, resolve};
pub use orchestrator::{Acquisition, AcquisitionOrchestrator};
pub use provider::{HttpStreamProvider, StreamProvider, TrackMetadata, cover_url, extract_track_id};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use quality::{QualityPreference, QualityTier, tier_sequence};
pub use retry::RetryPolicy;
pub use segment::{HttpSegmentFetcher, Segment, SegmentDownloader, SegmentFetch, SegmentJob};
pub use sink::FileSink;
