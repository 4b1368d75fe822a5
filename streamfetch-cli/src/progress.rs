use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use streamfetch_engine::AcquisitionEvent;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Renders [`AcquisitionEvent`]s as one progress bar per track.
pub struct ProgressReporter {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new(hidden: bool) -> Self {
        let multi = if hidden {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        let style = ProgressStyle::with_template(
            "{spinner:.yellow} {prefix:.bold} [{bar:30.cyan/white}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        Self {
            multi,
            bars: HashMap::new(),
            style,
        }
    }

    /// Consume events until every sender is gone.
    pub fn spawn(mut self, mut rx: UnboundedReceiver<AcquisitionEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.handle(event);
            }
            for bar in self.bars.values() {
                if !bar.is_finished() {
                    bar.abandon();
                }
            }
        })
    }

    fn bar(&mut self, track_id: &str) -> &ProgressBar {
        self.bars.entry(track_id.to_string()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(0));
            bar.set_style(self.style.clone());
            bar.set_prefix(track_id.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        })
    }

    fn handle(&mut self, event: AcquisitionEvent) {
        match event {
            AcquisitionEvent::TierStarted { track_id, tier, .. } => {
                let bar = self.bar(&track_id);
                bar.set_position(0);
                bar.set_message(format!("{tier}: fetching manifest"));
            }
            AcquisitionEvent::EndpointRotated { track_id, to, .. } => {
                self.bar(&track_id).set_message(format!("retrying via {to}"));
            }
            AcquisitionEvent::ManifestResolved {
                track_id,
                tier,
                segments,
                ..
            } => {
                let bar = self.bar(&track_id);
                bar.set_length(segments as u64);
                bar.set_position(0);
                bar.set_message(tier.to_string());
            }
            AcquisitionEvent::SegmentCompleted {
                track_id,
                completed,
                ..
            } => {
                self.bar(&track_id).set_position(completed as u64);
            }
            AcquisitionEvent::TierAbandoned {
                track_id,
                tier,
                attempts,
                ..
            } => {
                self.bar(&track_id)
                    .set_message(format!("{tier} abandoned after {attempts} attempt(s)"));
            }
            AcquisitionEvent::Completed {
                track_id,
                tier,
                bytes,
            } => {
                self.bar(&track_id)
                    .finish_with_message(format!("{tier} done ({})", indicatif::HumanBytes(bytes as u64)));
            }
        }
    }
}
