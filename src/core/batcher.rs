// src/core/batcher.rs

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs a homogeneous set of probes with a concurrency ceiling.
///
/// Candidates are issued in windows of `concurrency` probes; the next window
/// starts once every probe of the current one has answered or timed out.
/// A probe that returns `None` or exceeds the per-probe timeout simply
/// contributes nothing, so the worst-case latency of a run is
/// `ceil(N / concurrency) * probe_timeout`.
#[derive(Debug, Clone)]
pub struct TechniqueBatcher {
    concurrency: usize,
    probe_timeout: Duration,
    cancel: Option<CancellationToken>,
}

impl TechniqueBatcher {
    pub fn new(concurrency: usize, probe_timeout: Duration) -> Self {
        Self { concurrency: concurrency.max(1), probe_timeout, cancel: None }
    }

    /// Stops issuing new windows once `cancel` is tripped.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Probes every candidate and collects the successful outcomes.
    ///
    /// # Arguments
    ///
    /// * `candidates` - The inputs, one probe each.
    /// * `probe` - The probe. `None` means "nothing found".
    ///
    /// # Returns
    ///
    /// The outcomes in completion order. Duplicates are left to the caller.
    pub async fn run<T, O, F, Fut>(&self, candidates: Vec<T>, probe: F) -> Vec<O>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Option<O>>,
    {
        self.run_with(candidates, probe, |_| {}).await
    }

    /// Like [`run`](Self::run), but hands every outcome to `on_outcome` the
    /// moment its probe completes, before the rest of the window finishes.
    pub async fn run_with<T, O, F, Fut, S>(&self, candidates: Vec<T>, probe: F, mut on_outcome: S) -> Vec<O>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Option<O>>,
        S: FnMut(&O),
    {
        let total = candidates.len();
        let mut outcomes = Vec::new();
        let mut timed_out = 0usize;
        let mut pending = candidates.into_iter().peekable();

        while pending.peek().is_some() {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                debug!(total = %total, done = %outcomes.len(), "Batch cancelled between windows.");
                break;
            }

            let mut window: FuturesUnordered<_> = pending
                .by_ref()
                .take(self.concurrency)
                .map(|candidate| timeout(self.probe_timeout, probe(candidate)))
                .collect();

            while let Some(result) = window.next().await {
                match result {
                    Ok(Some(outcome)) => {
                        on_outcome(&outcome);
                        outcomes.push(outcome);
                    }
                    Ok(None) => {}
                    Err(_) => timed_out += 1,
                }
            }
        }

        debug!(
            total = %total,
            found = %outcomes.len(),
            timed_out = %timed_out,
            concurrency = %self.concurrency,
            "Batch finished."
        );
        outcomes
    }
}
