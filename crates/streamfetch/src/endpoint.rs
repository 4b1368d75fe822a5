//! Redundant API origins and rotation between them.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::RngExt;
use tracing::debug;
use url::Url;

use crate::error::AcquireError;

/// Random draws attempted before falling back to the next member in order.
const MAX_ROTATION_DRAWS: usize = 3;

/// A fixed set of interchangeable origin base URLs plus the currently selected one.
///
/// The set is immutable after construction; only the selected index changes, and it
/// does so atomically, so one pool can be shared by concurrent acquisitions.
#[derive(Debug)]
pub struct EndpointPool {
    endpoints: Vec<String>,
    current: AtomicUsize,
}

impl EndpointPool {
    /// Build a pool from base URLs. Trailing slashes are trimmed and duplicates dropped.
    ///
    /// The initially selected endpoint is chosen at random.
    pub fn new<I, S>(endpoints: I) -> Result<Self, AcquireError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for raw in endpoints {
            let trimmed = raw.as_ref().trim().trim_end_matches('/');
            if trimmed.is_empty() {
                continue;
            }
            Url::parse(trimmed).map_err(|e| AcquireError::invalid_url(trimmed, e.to_string()))?;
            if !unique.iter().any(|existing| existing == trimmed) {
                unique.push(trimmed.to_string());
            }
        }

        if unique.is_empty() {
            return Err(AcquireError::configuration(
                "endpoint pool requires at least one API URL",
            ));
        }

        let initial = rand::rng().random_range(0..unique.len());
        debug!(endpoint = %unique[initial], pool_size = unique.len(), "Selected initial endpoint");
        Ok(Self {
            endpoints: unique,
            current: AtomicUsize::new(initial),
        })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// The currently selected endpoint.
    pub fn current(&self) -> String {
        self.endpoints[self.current.load(Ordering::Acquire)].clone()
    }

    /// Select a member different from `excluding` and make it current.
    ///
    /// Up to three random draws are made; if all of them land on `excluding`,
    /// the member following it is used instead. A single-member pool is left
    /// untouched.
    pub fn rotate(&self, excluding: &str) -> String {
        let len = self.endpoints.len();
        if len <= 1 {
            return self.current();
        }

        let excluded_index = self.endpoints.iter().position(|e| e == excluding);

        let mut chosen = None;
        {
            let mut rng = rand::rng();
            for _ in 0..MAX_ROTATION_DRAWS {
                let candidate = rng.random_range(0..len);
                if Some(candidate) != excluded_index {
                    chosen = Some(candidate);
                    break;
                }
            }
        }
        let next = chosen.unwrap_or_else(|| excluded_index.map_or(0, |i| (i + 1) % len));

        self.current.store(next, Ordering::Release);
        let selected = self.endpoints[next].clone();
        debug!(from = %excluding, to = %selected, "Rotated endpoint");
        selected
    }
}
