use tokio::sync::mpsc;

use crate::quality::QualityTier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionEvent {
    TierStarted {
        track_id: String,
        tier: QualityTier,
        endpoint: String,
    },
    EndpointRotated {
        track_id: String,
        from: String,
        to: String,
    },
    ManifestResolved {
        track_id: String,
        tier: QualityTier,
        segments: usize,
        segmented: bool,
    },
    SegmentCompleted {
        track_id: String,
        index: usize,
        bytes: usize,
        completed: usize,
        total: usize,
    },
    TierAbandoned {
        track_id: String,
        tier: QualityTier,
        attempts: u32,
        reason: String,
    },
    Completed {
        track_id: String,
        tier: QualityTier,
        bytes: usize,
    },
}

/// Optional fan-out of [`AcquisitionEvent`]s to a listener.
///
/// Sending never blocks and a dropped receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    sender: Option<mpsc::UnboundedSender<AcquisitionEvent>>,
}

impl EventEmitter {
    pub fn new(sender: mpsc::UnboundedSender<AcquisitionEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Create an emitter together with the receiving half.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AcquisitionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: AcquisitionEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
