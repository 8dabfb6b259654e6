//! In-process asset store.
//!
//! Selection evaluates the same tag patterns the PostgreSQL query binds, on the
//! raw tag text, so callers see the same rows either store would return.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::ops::Bound;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use dimsync_core::tags::{BARE_REPROCESS_PATTERN, FAILED_TAG_PATTERN, OVERRIDE_PATTERN};
use dimsync_core::{AssetRecord, AssetUpdate, DimsyncError, SelectionScope};
use regex::{Regex, RegexBuilder};
use uuid::Uuid;

use super::assets::AssetStore;

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid tag pattern {pattern}: {e}"))
}

static FAILED_RE: LazyLock<Regex> = LazyLock::new(|| case_insensitive(FAILED_TAG_PATTERN));
static OVERRIDE_RE: LazyLock<Regex> = LazyLock::new(|| case_insensitive(OVERRIDE_PATTERN));
static BARE_REPROCESS_RE: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(BARE_REPROCESS_PATTERN));

#[derive(Default)]
struct Inner {
    rows: BTreeMap<Uuid, AssetRecord>,
    updates: Vec<(Uuid, AssetUpdate)>,
    fail_selection: bool,
    fail_updates: HashSet<Uuid>,
}

/// Asset store backed by an ordered map.
#[derive(Clone, Default)]
pub struct MemoryAssetStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(assets: impl IntoIterator<Item = AssetRecord>) -> Self {
        let store = Self::new();
        for asset in assets {
            store.insert(asset);
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, DimsyncError> {
        self.inner
            .lock()
            .map_err(|_| DimsyncError::Store("memory store lock poisoned".to_string()))
    }

    pub fn insert(&self, asset: AssetRecord) {
        if let Ok(mut inner) = self.lock() {
            inner.rows.insert(asset.id, asset);
        }
    }

    /// Current copy of a row, if present.
    pub fn snapshot(&self, id: Uuid) -> Option<AssetRecord> {
        self.lock().ok()?.rows.get(&id).cloned()
    }

    /// Every update applied so far, in order.
    pub fn updates(&self) -> Vec<(Uuid, AssetUpdate)> {
        self.lock().map(|inner| inner.updates.clone()).unwrap_or_default()
    }

    pub fn updates_for(&self, id: Uuid) -> Vec<AssetUpdate> {
        self.updates()
            .into_iter()
            .filter(|(row, _)| *row == id)
            .map(|(_, update)| update)
            .collect()
    }

    /// Make selection (normalize and query) fail until reset.
    pub fn set_fail_selection(&self, fail: bool) {
        if let Ok(mut inner) = self.lock() {
            inner.fail_selection = fail;
        }
    }

    /// Make updates to one row fail.
    pub fn fail_updates_for(&self, id: Uuid) {
        if let Ok(mut inner) = self.lock() {
            inner.fail_updates.insert(id);
        }
    }
}

fn matches_selection(record: &AssetRecord, scope: SelectionScope) -> bool {
    if !record.is_video() {
        return false;
    }
    let tags = record.tags.as_deref().unwrap_or("");
    if FAILED_RE.is_match(tags) {
        return false;
    }
    let in_scope = scope.admits(&record.storage);
    (in_scope && record.has_unknown_dimensions())
        || OVERRIDE_RE.is_match(tags)
        || (in_scope && BARE_REPROCESS_RE.is_match(tags))
}

#[async_trait::async_trait]
impl AssetStore for MemoryAssetStore {
    async fn normalize_zero_dimensions(&self) -> Result<u64, DimsyncError> {
        let mut inner = self.lock()?;
        if inner.fail_selection {
            return Err(DimsyncError::Store("selection unavailable".to_string()));
        }
        let mut changed = 0;
        for record in inner.rows.values_mut() {
            if record.is_video() && (record.width == Some(0) || record.height == Some(0)) {
                record.width = None;
                record.height = None;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn find_candidates(
        &self,
        scope: SelectionScope,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<AssetRecord>, DimsyncError> {
        let inner = self.lock()?;
        if inner.fail_selection {
            return Err(DimsyncError::Store("selection unavailable".to_string()));
        }
        let start = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        Ok(inner
            .rows
            .range((start, Bound::Unbounded))
            .map(|(_, record)| record)
            .filter(|record| matches_selection(record, scope))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update(&self, id: Uuid, update: AssetUpdate) -> Result<(), DimsyncError> {
        let mut inner = self.lock()?;
        if inner.fail_updates.contains(&id) {
            return Err(DimsyncError::Store(format!("update rejected for {}", id)));
        }
        let record = inner
            .rows
            .get_mut(&id)
            .ok_or_else(|| DimsyncError::NotFound(format!("asset {}", id)))?;
        if let Some((width, height)) = update.dimensions.map(|d| d.as_columns()) {
            record.width = Some(width);
            record.height = Some(height);
        }
        if let Some(tags) = update.tags.clone() {
            record.tags = tags;
        }
        inner.updates.push((id, update));
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AssetRecord>, DimsyncError> {
        Ok(self.lock()?.rows.get(&id).cloned())
    }
}
