use std::sync::Arc;

use dimsync_core::{is_eligible, AssetRecord, DimsyncError, SelectionScope, TagSet, TagState};
use dimsync_db::AssetStore;
use serde::Serialize;

/// An eligible asset with its tags parsed and classified once.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: AssetRecord,
    pub tags: TagSet,
    pub state: TagState,
}

impl Candidate {
    fn from_record(record: AssetRecord) -> Self {
        let tags = record.tag_set();
        let state = tags.state();
        Self {
            record,
            tags,
            state,
        }
    }
}

/// Printable view of a candidate for operator tooling.
#[derive(Debug, Serialize)]
pub struct CandidateSummary {
    pub id: String,
    pub storage: String,
    pub filename: String,
    pub directive: &'static str,
    pub override_dimensions: Option<String>,
}

impl From<&Candidate> for CandidateSummary {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.record.id.to_string(),
            storage: candidate.record.storage.clone(),
            filename: candidate.record.filename.clone(),
            directive: candidate.state.label(),
            override_dimensions: match candidate.state {
                TagState::Override(dims) => Some(dims.to_string()),
                _ => None,
            },
        }
    }
}

/// Picks the next batch of assets to reconcile.
pub struct Selector {
    store: Arc<dyn AssetStore>,
    scope: SelectionScope,
    batch_size: usize,
}

impl Selector {
    pub fn new(store: Arc<dyn AssetStore>, scope: SelectionScope, batch_size: usize) -> Self {
        Self {
            store,
            scope,
            batch_size,
        }
    }

    pub fn scope(&self) -> SelectionScope {
        self.scope
    }

    /// Normalize zero dimensions, then fetch and re-check eligible rows.
    ///
    /// Rows the store returns but the in-process predicate rejects are skipped
    /// with a warning and do not count against the batch: selection keeps
    /// paging by id until it has `limit` candidates or the store runs dry.
    #[tracing::instrument(skip(self), fields(batch_size = self.batch_size, include_remote = self.scope.include_remote))]
    pub async fn select(&self) -> Result<Vec<Candidate>, DimsyncError> {
        self.select_with_limit(self.batch_size).await
    }

    pub async fn select_with_limit(&self, limit: usize) -> Result<Vec<Candidate>, DimsyncError> {
        let normalized = self.store.normalize_zero_dimensions().await?;
        if normalized > 0 {
            tracing::info!(rows = normalized, "Reset zero dimensions to NULL");
        }

        let mut candidates = Vec::with_capacity(limit);
        let mut after = None;
        while candidates.len() < limit {
            let rows = self.store.find_candidates(self.scope, after, limit).await?;
            let exhausted = rows.len() < limit;
            after = rows.last().map(|row| row.id);

            for candidate in rows.into_iter().map(Candidate::from_record) {
                if !is_eligible(&candidate.record, &candidate.state, self.scope) {
                    tracing::warn!(
                        asset_id = %candidate.record.id,
                        storage = %candidate.record.storage,
                        tags = ?candidate.record.tags,
                        "Store returned an asset that is not eligible, skipping"
                    );
                    continue;
                }
                if candidates.len() < limit {
                    candidates.push(candidate);
                }
            }

            if exhausted || after.is_none() {
                break;
            }
        }

        Ok(candidates)
    }
}
