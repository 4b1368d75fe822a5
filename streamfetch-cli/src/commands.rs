use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use streamfetch_engine::{
    AcquireError, AcquisitionConfig, AcquisitionOrchestrator, CollectionKind, EndpointPool,
    EventEmitter, FileSink, HttpStreamProvider, create_client, extract_track_id, list_collection,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{AppError, Result};
use crate::progress::ProgressReporter;

/// What a download invocation asks for.
#[derive(Debug)]
pub enum Target {
    Tracks(Vec<String>),
    Collection(CollectionKind, String),
}

/// Everything a download needs after config and flags are merged.
pub struct DownloadJob {
    pub target: Target,
    pub endpoints: Vec<String>,
    pub engine: AcquisitionConfig,
    pub output_dir: PathBuf,
    pub max_concurrent_tracks: usize,
    pub hide_progress: bool,
}

pub async fn run_download(job: DownloadJob, token: CancellationToken) -> Result<()> {
    let pool = Arc::new(EndpointPool::new(&job.endpoints)?);
    let client = create_client(&job.engine)?;

    let ids: Vec<String> = match &job.target {
        Target::Tracks(inputs) => inputs.iter().map(|i| extract_track_id(i)).collect(),
        Target::Collection(kind, input) => {
            let provider = HttpStreamProvider::new(client.clone(), job.engine.timeout);
            let listing = list_collection(
                &provider,
                &pool,
                &job.engine.retry,
                &token,
                *kind,
                &extract_track_id(input),
            )
            .await?;
            info!(
                kind = %listing.kind,
                title = listing.title,
                artist = listing.artist.as_deref().unwrap_or("-"),
                tracks = listing.tracks.len(),
                "Collection resolved"
            );
            listing.track_ids()
        }
    };
    if ids.is_empty() {
        warn!("Nothing to download");
        return Ok(());
    }

    let (events, rx) = EventEmitter::channel();
    let progress = ProgressReporter::new(job.hide_progress).spawn(rx);

    let orchestrator = Arc::new(
        AcquisitionOrchestrator::from_client(pool, client, &job.engine)
            .with_events(events)
            .with_cancellation(token),
    );

    let total = ids.len();
    info!(
        tracks = total,
        output = %job.output_dir.display(),
        "Starting downloads"
    );

    let results: Vec<(String, std::result::Result<PathBuf, AcquireError>)> = stream::iter(ids)
        .map(|track_id| {
            let orchestrator = Arc::clone(&orchestrator);
            let output_dir = job.output_dir.clone();
            async move {
                let result = acquire_to_file(&orchestrator, &track_id, &output_dir).await;
                (track_id, result)
            }
        })
        .buffer_unordered(job.max_concurrent_tracks.max(1))
        .collect()
        .await;

    // Dropping the last emitter closes the event channel.
    drop(orchestrator);
    let _ = progress.await;

    let mut failed = 0;
    for (track_id, result) in results {
        match result {
            Ok(path) => info!(track_id, path = %path.display(), "Saved"),
            Err(e) => {
                failed += 1;
                error!(track_id, error = %e, "Track failed");
            }
        }
    }

    if failed > 0 {
        return Err(AppError::TracksFailed { failed, total });
    }
    Ok(())
}

async fn acquire_to_file(
    orchestrator: &AcquisitionOrchestrator,
    track_id: &str,
    output_dir: &Path,
) -> std::result::Result<PathBuf, AcquireError> {
    let acquisition = orchestrator.acquire(track_id).await?;
    let path = output_dir.join(format!("{track_id}.{}", acquisition.file_extension()));
    FileSink::new(path).write(&acquisition.data).await
}
