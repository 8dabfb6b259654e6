//! CDN metadata lookups.

use async_trait::async_trait;
use dimsync_core::{CdnConfig, CdnCredentials, Dimensions, DimsyncError};
use serde::Deserialize;

/// Reads stored dimensions of a CDN-hosted video. Never fails: every problem
/// is reported as `None`.
#[async_trait]
pub trait RemoteDimensions: Send + Sync {
    async fn fetch_dimensions(&self, asset_name: &str) -> Option<Dimensions>;
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    width: Option<i64>,
    height: Option<i64>,
}

/// Provider-side identifier: the asset name without its file extension.
pub fn public_id(asset_name: &str) -> &str {
    let file_start = asset_name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match asset_name[file_start..].rfind('.') {
        Some(dot) if dot > 0 => &asset_name[..file_start + dot],
        _ => asset_name,
    }
}

/// [`RemoteDimensions`] client for the Cloudinary metadata API.
#[derive(Clone)]
pub struct CdnClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<CdnCredentials>,
}

impl CdnClient {
    pub fn new(config: &CdnConfig) -> Result<Self, DimsyncError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DimsyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials: config.credentials.clone(),
        })
    }

    fn resource_url(&self, cloud_name: &str, id: &str) -> String {
        format!("{}/v1_1/{}/video/upload/{}", self.base_url, cloud_name, id)
    }

    async fn request(
        &self,
        credentials: &CdnCredentials,
        id: &str,
    ) -> Result<Option<Dimensions>, DimsyncError> {
        let response = self
            .http
            .get(self.resource_url(&credentials.cloud_name, id))
            .basic_auth(&credentials.api_key, Some(&credentials.api_secret))
            .send()
            .await
            .map_err(|e| DimsyncError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), public_id = %id, "CDN metadata request rejected");
            return Ok(None);
        }

        let body: ResourceResponse = response
            .json()
            .await
            .map_err(|e| DimsyncError::Parse(e.to_string()))?;

        Ok(match (body.width, body.height) {
            (Some(width), Some(height)) => Dimensions::from_signed(width, height),
            _ => None,
        })
    }
}

#[async_trait]
impl RemoteDimensions for CdnClient {
    #[tracing::instrument(skip(self), fields(cdn.provider = "cloudinary"))]
    async fn fetch_dimensions(&self, asset_name: &str) -> Option<Dimensions> {
        let Some(credentials) = &self.credentials else {
            tracing::warn!("CDN credentials are not configured, skipping remote lookup");
            return None;
        };

        let id = public_id(asset_name);
        match self.request(credentials, id).await {
            Ok(dimensions) => dimensions,
            Err(e) => {
                tracing::warn!(error = %e, public_id = %id, "CDN metadata lookup failed");
                None
            }
        }
    }
}
