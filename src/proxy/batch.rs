//! Batch orchestrator for running probes at scale
//!
//! Candidates are probed in fixed-size waves: every candidate in a wave
//! gets its own task, the wave settles as a whole (an individual failure
//! never cancels siblings), settled results are folded into the scope's
//! cache entry, and the entry is persisted before the next wave starts.
//! Crash-recovery loss is therefore bounded to one unpersisted wave, and a
//! re-run against an unchanged scope probes only the candidates the cache
//! has not seen.

use crate::proxy::geo::Enricher;
use crate::proxy::models::{Candidate, EnrichedResult, ProbeResult};
use crate::proxy::probe::Prober;
use crate::store::{CacheEntry, ResultStore};
use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Concurrent probes per wave; bounds the open-connection count
pub const BATCH_SIZE: usize = 20;

/// Drives batched, cached, enriched probing of a candidate set
#[derive(Clone)]
pub struct Orchestrator {
    prober: Prober,
    enricher: Arc<dyn Enricher>,
    store: Arc<dyn ResultStore>,
}

impl Orchestrator {
    pub fn new(prober: Prober, enricher: Arc<dyn Enricher>, store: Arc<dyn ResultStore>) -> Self {
        Self {
            prober,
            enricher,
            store,
        }
    }

    /// Run the candidate set under `scope_key`, streaming working results.
    ///
    /// Cached successes for an unchanged scope are re-emitted before any
    /// fresh probing; fresh successes follow as their batch settles. The
    /// stream closes once every batch has settled and persisted.
    ///
    /// Concurrent runs against the same `scope_key` are not coordinated
    /// here and must be serialized by the caller.
    pub fn run_batches(
        &self,
        candidates: Vec<Candidate>,
        scope_key: impl Into<String>,
        fingerprint: u32,
    ) -> ReceiverStream<EnrichedResult> {
        let (tx, rx) = mpsc::channel(64);
        let this = self.clone();
        let scope_key = scope_key.into();
        tokio::spawn(async move {
            if let Err(e) = this.drive(candidates, &scope_key, fingerprint, tx).await {
                warn!(scope_key, error = %e, "batch run aborted");
            }
        });
        ReceiverStream::new(rx)
    }

    /// Like [`run_batches`](Self::run_batches), collecting the emitted
    /// successes and surfacing store errors to the caller.
    pub async fn run_to_completion(
        &self,
        candidates: Vec<Candidate>,
        scope_key: &str,
        fingerprint: u32,
    ) -> Result<Vec<EnrichedResult>> {
        let (tx, mut rx) = mpsc::channel(64);
        let drive = self.drive(candidates, scope_key, fingerprint, tx);
        let collect = async {
            let mut out = Vec::new();
            while let Some(item) = rx.recv().await {
                out.push(item);
            }
            out
        };
        let (driven, results) = tokio::join!(drive, collect);
        driven?;
        Ok(results)
    }

    async fn drive(
        &self,
        candidates: Vec<Candidate>,
        scope_key: &str,
        fingerprint: u32,
        tx: mpsc::Sender<EnrichedResult>,
    ) -> Result<()> {
        let mut entry = match self.store.get(scope_key).await? {
            Some(entry) if entry.fingerprint == fingerprint => entry,
            Some(_) => {
                info!(scope_key, "scope content changed, discarding cached results");
                CacheEntry::new(fingerprint)
            }
            None => CacheEntry::new(fingerprint),
        };

        // cached hits are reported before any fresh probe runs
        for cached in entry.results.values() {
            if cached.is_success() {
                let _ = tx.send(cached.clone()).await;
            }
        }

        let remaining: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| !entry.results.contains_key(&c.endpoint()))
            .collect();
        debug!(
            scope_key,
            cached = entry.results.len(),
            remaining = remaining.len(),
            "starting batches"
        );

        for batch in remaining.chunks(BATCH_SIZE) {
            let mut tasks = Vec::with_capacity(batch.len());
            for candidate in batch.iter().cloned() {
                let prober = self.prober.clone();
                let enricher = Arc::clone(&self.enricher);
                let task_candidate = candidate.clone();
                let handle = tokio::spawn(async move {
                    let result = prober.probe(&task_candidate).await;
                    if result.is_success() {
                        let geo = enricher.enrich(result.candidate.lookup_ip()).await;
                        EnrichedResult::with_geo(result, geo)
                    } else {
                        EnrichedResult::new(result)
                    }
                });
                tasks.push((candidate, handle));
            }

            // whole-batch settle; each task carries its own deadlines, so
            // none can hang the wave
            let mut settled = Vec::with_capacity(tasks.len());
            for (candidate, handle) in tasks {
                match handle.await {
                    Ok(result) => settled.push(result),
                    Err(e) => {
                        warn!(%candidate, error = %e, "probe task aborted");
                        settled.push(EnrichedResult::new(ProbeResult::failure(
                            candidate,
                            format!("probe task aborted: {}", e),
                        )));
                    }
                }
            }

            for result in &settled {
                entry.results.insert(result.endpoint(), result.clone());
            }
            // persisted before the next wave starts
            self.store.put(scope_key, &entry).await?;

            for result in settled {
                if result.is_success() {
                    let _ = tx.send(result).await;
                }
            }
        }

        Ok(())
    }
}
