use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage_types::StorageBackend;
use crate::tags::{TagSet, TagState};

/// Display dimensions of a video, both terms positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Returns `None` when either term is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            None
        } else {
            Some(Self { width, height })
        }
    }

    /// Build from signed values as reported by JSON APIs or the database.
    pub fn from_signed(width: i64, height: i64) -> Option<Self> {
        let width = u32::try_from(width).ok()?;
        let height = u32::try_from(height).ok()?;
        Self::new(width, height)
    }

    /// Column values for the `width`/`height` integer columns.
    pub fn as_columns(&self) -> (i32, i32) {
        (
            i32::try_from(self.width).unwrap_or(i32::MAX),
            i32::try_from(self.height).unwrap_or(i32::MAX),
        )
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One row of the `assets` table, restricted to the columns the worker reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AssetRecord {
    pub id: Uuid,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "type"))]
    #[serde(rename = "type")]
    pub content_type: String,
    pub storage: String,
    pub filename: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub tags: Option<String>,
}

impl AssetRecord {
    pub fn is_video(&self) -> bool {
        self.content_type
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("video/"))
    }

    /// Parsed storage backend, `None` for anything the worker does not handle.
    pub fn backend(&self) -> Option<StorageBackend> {
        self.storage.parse().ok()
    }

    pub fn has_unknown_dimensions(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }

    pub fn tag_set(&self) -> TagSet {
        TagSet::parse(self.tags.as_deref())
    }
}

/// Partial update of one asset row. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetUpdate {
    pub dimensions: Option<Dimensions>,
    /// `Some(None)` clears the column.
    pub tags: Option<Option<String>>,
}

impl AssetUpdate {
    pub fn dimensions(dimensions: Dimensions) -> Self {
        Self {
            dimensions: Some(dimensions),
            tags: None,
        }
    }

    pub fn tags(tags: Option<String>) -> Self {
        Self {
            dimensions: None,
            tags: Some(tags),
        }
    }

    pub fn with_tags(mut self, tags: Option<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_none() && self.tags.is_none()
    }
}

/// Which storage backends take part in source lookups during selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionScope {
    /// Also select CDN-hosted assets with unknown dimensions or a bare
    /// `reprocess` directive.
    pub include_remote: bool,
}

impl SelectionScope {
    /// Storage backends eligible for "unknown dimensions" and bare `reprocess`.
    pub fn lookup_backends(&self) -> Vec<StorageBackend> {
        if self.include_remote {
            vec![StorageBackend::Local, StorageBackend::Cloudinary]
        } else {
            vec![StorageBackend::Local]
        }
    }

    /// Exact match on the stored backend name, as the SQL `storage = ANY(..)` does.
    pub fn admits(&self, storage: &str) -> bool {
        self.lookup_backends()
            .iter()
            .any(|backend| backend.as_str() == storage)
    }
}

/// In-process eligibility check. Must agree with the store's selection query.
pub fn is_eligible(record: &AssetRecord, state: &TagState, scope: SelectionScope) -> bool {
    if !record.is_video() {
        return false;
    }
    match state {
        TagState::Failed => false,
        TagState::Override(_) => true,
        TagState::ReprocessRequested => scope.admits(&record.storage),
        TagState::NoDirective => {
            scope.admits(&record.storage) && record.has_unknown_dimensions()
        }
    }
}
