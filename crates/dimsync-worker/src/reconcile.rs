//! One reconciliation pass over a batch of assets.
//!
//! Each candidate is handled on its own: whatever happens while looking up or
//! writing one asset is logged against that asset and the batch moves on.
//! Assets whose dimensions cannot be determined are tagged
//! `processing-failed`, which keeps them out of every later selection.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dimsync_core::{
    clear_directives, mark_failed, AssetRecord, AssetUpdate, Dimensions, DimsyncError,
    StorageBackend, TagState,
};
use dimsync_db::AssetStore;
use dimsync_processing::{MetadataProbe, RemoteDimensions};
use serde::Serialize;

use crate::selector::{Candidate, Selector};

/// What happened to one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetOutcome {
    /// Dimensions came from the probe or the CDN.
    Dimensioned(Dimensions),
    /// Dimensions came from a `reprocess:WxH` directive.
    Overridden(Dimensions),
    /// Dimensions could not be determined; the asset is now tagged failed.
    MarkedFailed,
    /// Lookup or update failed; the asset is tagged failed if that write went through.
    Errored { marked_failed: bool },
}

/// Summary of one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub selected: usize,
    pub dimensioned: usize,
    pub overridden: usize,
    pub marked_failed: usize,
    pub errors: usize,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            duration_ms: 0,
            selected: 0,
            dimensioned: 0,
            overridden: 0,
            marked_failed: 0,
            errors: 0,
        }
    }

    fn record(&mut self, outcome: AssetOutcome) {
        match outcome {
            AssetOutcome::Dimensioned(_) => self.dimensioned += 1,
            AssetOutcome::Overridden(_) => self.overridden += 1,
            AssetOutcome::MarkedFailed => self.marked_failed += 1,
            AssetOutcome::Errored { marked_failed } => {
                self.errors += 1;
                if marked_failed {
                    self.marked_failed += 1;
                }
            }
        }
    }
}

/// Tags to write when an asset's dimensions cannot be determined.
fn failed_tags(tags: Option<&str>, clear: bool) -> Option<String> {
    if clear {
        mark_failed(clear_directives(tags).as_deref())
    } else {
        mark_failed(tags)
    }
}

pub struct ReconciliationLoop {
    store: Arc<dyn AssetStore>,
    selector: Selector,
    probe: Arc<dyn MetadataProbe>,
    remote: Arc<dyn RemoteDimensions>,
}

impl ReconciliationLoop {
    pub fn new(
        store: Arc<dyn AssetStore>,
        selector: Selector,
        probe: Arc<dyn MetadataProbe>,
        remote: Arc<dyn RemoteDimensions>,
    ) -> Self {
        Self {
            store,
            selector,
            probe,
            remote,
        }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Run one pass. An error means selection failed and nothing was written.
    pub async fn run_tick(&self) -> Result<TickReport, DimsyncError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let candidates = self.selector.select().await.inspect_err(|e| {
            tracing::error!(
                error = %e,
                error_code = e.error_code(),
                "Asset selection failed, skipping tick"
            );
        })?;

        let mut report = TickReport::new(started_at);
        report.selected = candidates.len();

        for candidate in &candidates {
            let outcome = self.process(candidate).await;
            report.record(outcome);
        }

        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        if report.selected > 0 {
            tracing::info!(
                selected = report.selected,
                dimensioned = report.dimensioned,
                overridden = report.overridden,
                marked_failed = report.marked_failed,
                errors = report.errors,
                duration_ms = report.duration_ms,
                "Reconciliation tick completed"
            );
        } else {
            tracing::debug!("Reconciliation tick found no eligible assets");
        }

        Ok(report)
    }

    /// Handle one candidate. Never fails; problems are logged and folded into the outcome.
    #[tracing::instrument(skip(self, candidate), fields(
        asset_id = %candidate.record.id,
        storage = %candidate.record.storage,
        directive = candidate.state.label()
    ))]
    pub async fn process(&self, candidate: &Candidate) -> AssetOutcome {
        let record = &candidate.record;
        let clear = candidate.state.has_directive();

        let lookup = match candidate.state {
            TagState::Override(dims) => Ok(Some(dims)),
            _ => self.lookup(record).await,
        };

        match lookup {
            Ok(Some(dims)) => {
                let mut update = AssetUpdate::dimensions(dims);
                if clear {
                    update = update.with_tags(clear_directives(record.tags.as_deref()));
                }
                match self.store.update(record.id, update).await {
                    Ok(()) => {
                        tracing::info!(width = dims.width, height = dims.height, "Dimensions updated");
                        if matches!(candidate.state, TagState::Override(_)) {
                            AssetOutcome::Overridden(dims)
                        } else {
                            AssetOutcome::Dimensioned(dims)
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, error_code = e.error_code(), "Failed to write dimensions");
                        let marked_failed = self.write_failed(record, clear).await;
                        AssetOutcome::Errored { marked_failed }
                    }
                }
            }
            Ok(None) => {
                tracing::warn!(filename = %record.filename, "Could not determine dimensions");
                if self.write_failed(record, clear).await {
                    AssetOutcome::MarkedFailed
                } else {
                    AssetOutcome::Errored {
                        marked_failed: false,
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    error_code = e.error_code(),
                    filename = %record.filename,
                    "Dimension lookup failed"
                );
                let marked_failed = self.write_failed(record, clear).await;
                AssetOutcome::Errored { marked_failed }
            }
        }
    }

    async fn lookup(&self, record: &AssetRecord) -> Result<Option<Dimensions>, DimsyncError> {
        match record.backend() {
            Some(StorageBackend::Local) => self.probe.probe(&record.filename).await,
            Some(StorageBackend::Cloudinary) => {
                Ok(self.remote.fetch_dimensions(&record.filename).await)
            }
            None => Ok(None),
        }
    }

    /// Tag the asset `processing-failed`. Returns whether the write succeeded.
    async fn write_failed(&self, record: &AssetRecord, clear: bool) -> bool {
        let tags = failed_tags(record.tags.as_deref(), clear);
        match self.store.set_tags(record.id, tags).await {
            Ok(()) => {
                tracing::info!("Marked asset as processing-failed");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, error_code = e.error_code(), "Failed to mark asset as failed");
                false
            }
        }
    }
}
