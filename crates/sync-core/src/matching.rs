//! One alignment pass driven against an [`AlignmentStore`].
//!
//! The job owns the persistence side of a pass: it invalidates stale results,
//! records the anchor, commits matches in bounded batches under the configured
//! retry policy, and saves the rendered snapshot once the pass completes.

use crate::align::{Aligner, Anchor, MatchProgress, SegmentOutcome, validate};
use crate::cancellation::CancellationToken;
use crate::config::{BatchFailurePolicy, MatchingConfig};
use crate::error::{MatchError, StoreError};
use crate::store::{AlignmentStore, CacheState, MappingEntry};
use serde::Serialize;
use std::thread;
use tracing::{debug, info, warn};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
pub struct MatchSummary {
    pub processed: usize,
    pub matched: usize,
    pub total: usize,
    pub failed_batches: usize,
    pub lost_entries: usize,
    pub snapshot_saved: bool,
}

pub struct MatchingJob<S: AlignmentStore> {
    store: S,
    cfg: MatchingConfig,
    cancel: CancellationToken,
}

impl<S: AlignmentStore> MatchingJob<S> {
    pub fn new(store: S, cfg: &MatchingConfig) -> Self {
        Self {
            store,
            cfg: cfg.clone(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn run(
        &self,
        doc_id: &str,
        anchor: &Anchor,
        mut on_progress: impl FnMut(MatchProgress),
    ) -> Result<MatchSummary, MatchError> {
        let mut loaded = self.store.load_for_alignment(doc_id)?;
        if loaded.cache_state == CacheState::Unprocessed {
            return Err(StoreError::NotImported {
                doc_id: doc_id.to_string(),
            }
            .into());
        }
        // Snapshot blocks keep the raw block ids and order.
        validate(&loaded.blocks, loaded.segments.as_slice(), anchor)?;

        let state = loaded.cache_state;
        if state.needs_invalidation() {
            info!(doc_id, ?state, "Discarding previous alignment before re-matching");
            self.store.invalidate(doc_id)?;
            loaded = self.store.load_for_alignment(doc_id)?;
        }

        let mut aligner = Aligner::new(
            &loaded.blocks,
            loaded.segments.as_slice(),
            anchor,
            self.cfg.min_block_chars,
        )?;
        self.store.save_anchor(doc_id, anchor)?;

        let batch_size = self.cfg.batch_size.max(1);
        let mut pending: Vec<MappingEntry> = Vec::with_capacity(batch_size);
        let mut summary = MatchSummary::default();

        loop {
            self.cancel
                .check(aligner.progress().processed)
                .inspect_err(|_| {
                    warn!(
                        doc_id,
                        discarded = pending.len(),
                        "Matching cancelled; pending batch discarded"
                    )
                })?;
            let Some(outcome) = aligner.step() else {
                break;
            };
            if let SegmentOutcome::Matched { index, block_id } = outcome {
                pending.push(MappingEntry { index, block_id });
                if pending.len() >= batch_size {
                    self.flush(doc_id, &mut pending, &mut summary)?;
                }
            }
            on_progress(aligner.progress());
        }
        self.flush(doc_id, &mut pending, &mut summary)?;

        let progress = aligner.progress();
        let result = aligner.finish();
        summary.processed = progress.processed;
        summary.matched = result.matched_count;
        summary.total = progress.total;

        if summary.lost_entries > 0 {
            warn!(
                doc_id,
                lost = summary.lost_entries,
                "Skipping rendered snapshot; mapping is incomplete"
            );
        } else {
            match self.store.save_rendered_snapshot(doc_id, &result.annotated) {
                Ok(()) => summary.snapshot_saved = true,
                Err(err) => warn!(doc_id, "Rendered snapshot not saved: {err}"),
            }
        }

        info!(
            doc_id,
            matched = summary.matched,
            total = summary.total,
            failed_batches = summary.failed_batches,
            snapshot = summary.snapshot_saved,
            "Matching finished"
        );
        Ok(summary)
    }

    fn flush(
        &self,
        doc_id: &str,
        pending: &mut Vec<MappingEntry>,
        summary: &mut MatchSummary,
    ) -> Result<(), MatchError> {
        if pending.is_empty() {
            return Ok(());
        }
        let attempts = self.cfg.max_batch_retries + 1;
        let mut attempt = 1;
        let last_err = loop {
            match self.store.save_mapping_batch(doc_id, pending) {
                Ok(()) => {
                    debug!(doc_id, entries = pending.len(), attempt, "Mapping batch saved");
                    pending.clear();
                    return Ok(());
                }
                Err(err) => {
                    warn!(doc_id, attempt, attempts, "Mapping batch failed: {err}");
                    if attempt >= attempts {
                        break err;
                    }
                    attempt += 1;
                    thread::sleep(self.cfg.retry_backoff());
                }
            }
        };

        let entries = pending.len();
        pending.clear();
        match self.cfg.on_batch_failure {
            BatchFailurePolicy::Continue => {
                summary.failed_batches += 1;
                summary.lost_entries += entries;
                warn!(doc_id, entries, "Giving up on mapping batch; continuing pass");
                Ok(())
            }
            BatchFailurePolicy::Abort => Err(MatchError::BatchFailed {
                entries,
                attempts,
                source: last_err,
            }),
        }
    }
}
