//! Wiring and operator tag edits behind the `dimsync` binary.

use std::sync::Arc;

use anyhow::Context;
use dimsync_core::tags::{FAILED_TAG, REPROCESS_TAG};
use dimsync_core::{Config, Dimensions, TagSet};
use dimsync_db::AssetStore;
use dimsync_processing::{CdnClient, FfprobeProbe};
use dimsync_worker::{ReconciliationLoop, Selector};

/// Build the reconciliation loop from configuration.
pub fn build_reconciler(
    config: &Config,
    store: Arc<dyn AssetStore>,
) -> anyhow::Result<ReconciliationLoop> {
    let probe = FfprobeProbe::new(config.probe()).context("Invalid probe configuration")?;
    let cdn = CdnClient::new(config.cdn()).context("Invalid CDN configuration")?;
    if config.cdn().credentials.is_none() {
        tracing::warn!("CDN credentials are not set; CDN-hosted assets will be marked failed");
    }

    let selector = Selector::new(store.clone(), config.selection_scope(), config.batch_size());
    Ok(ReconciliationLoop::new(
        store,
        selector,
        Arc::new(probe),
        Arc::new(cdn),
    ))
}

/// Parse `WIDTHxHEIGHT` with both terms positive.
pub fn parse_dimensions(raw: &str) -> Result<Dimensions, String> {
    let (width, height) = raw
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", raw))?;
    let width: u32 = width
        .parse()
        .map_err(|_| format!("invalid width '{}'", width))?;
    let height: u32 = height
        .parse()
        .map_err(|_| format!("invalid height '{}'", height))?;
    Dimensions::new(width, height).ok_or_else(|| "width and height must be positive".to_string())
}

/// Drop the `processing-failed` marker so the asset can be selected again.
pub fn retry_tags(tags: Option<&str>) -> Option<String> {
    let mut set = TagSet::parse(tags);
    set.remove_where(|t| t.eq_ignore_ascii_case(FAILED_TAG));
    set.encode()
}

/// Replace any reprocess directive with a manual override.
pub fn override_tags(tags: Option<&str>, dimensions: Dimensions) -> Option<String> {
    let mut set = TagSet::parse(tags);
    set.remove_directives();
    set.push(format!("reprocess:{}", dimensions));
    set.encode()
}

/// Replace any reprocess directive with a bare `reprocess`.
pub fn reprocess_tags(tags: Option<&str>) -> Option<String> {
    let mut set = TagSet::parse(tags);
    set.remove_directives();
    set.push(REPROCESS_TAG);
    set.encode()
}
