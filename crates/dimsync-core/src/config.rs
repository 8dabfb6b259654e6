//! Configuration module
//!
//! Settings for the reconciliation worker, read from the environment (a `.env`
//! file is honored). Numeric settings fall back to their defaults when unset or
//! unparsable; `validate()` rejects values the worker cannot run with.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::SelectionScope;

const DB_MAX_CONNECTIONS: u32 = 5;
const DB_TIMEOUT_SECS: u64 = 30;
const TICK_INTERVAL_SECS: u64 = 10;
const BATCH_SIZE: usize = 5;
const MAX_BATCH_SIZE: usize = 100;
const PROBE_TIMEOUT_SECS: u64 = 30;
const CDN_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CDN_API_BASE_URL: &str = "https://api.cloudinary.com";
const DEFAULT_LOCAL_STORAGE_PATH: &str = "./uploads";
const DEFAULT_FFPROBE_PATH: &str = "ffprobe";

/// API credentials for the CDN metadata endpoint.
#[derive(Clone)]
pub struct CdnCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for CdnCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdnCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// CDN metadata client settings.
#[derive(Clone, Debug)]
pub struct CdnConfig {
    pub base_url: String,
    pub credentials: Option<CdnCredentials>,
    pub timeout: Duration,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CDN_API_BASE_URL.to_string(),
            credentials: None,
            timeout: Duration::from_secs(CDN_TIMEOUT_SECS),
        }
    }
}

/// Local probe settings.
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    pub ffprobe_path: String,
    pub storage_root: PathBuf,
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: DEFAULT_FFPROBE_PATH.to_string(),
            storage_root: PathBuf::from(DEFAULT_LOCAL_STORAGE_PATH),
            timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
        }
    }
}

/// Reconciliation worker configuration
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    pub tick_interval_secs: u64,
    pub batch_size: usize,
    pub select_remote_assets: bool,
    pub probe: ProbeConfig,
    pub cdn: CdnConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` passes `std::env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let credentials = match (
            var("CLOUDINARY_CLOUD_NAME"),
            var("CLOUDINARY_API_KEY"),
            var("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CdnCredentials {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        let config = Self {
            database_url,
            db_max_connections: var("DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DB_MAX_CONNECTIONS),
            db_timeout_seconds: var("DB_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DB_TIMEOUT_SECS),
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            tick_interval_secs: var("TICK_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(TICK_INTERVAL_SECS),
            batch_size: var("BATCH_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(BATCH_SIZE),
            select_remote_assets: var("SELECT_REMOTE_ASSETS")
                .map(|v| v.parse::<bool>().unwrap_or(false))
                .unwrap_or(false),
            probe: ProbeConfig {
                ffprobe_path: var("FFPROBE_PATH")
                    .unwrap_or_else(|| DEFAULT_FFPROBE_PATH.to_string()),
                storage_root: PathBuf::from(
                    var("LOCAL_STORAGE_PATH")
                        .unwrap_or_else(|| DEFAULT_LOCAL_STORAGE_PATH.to_string()),
                ),
                timeout: Duration::from_secs(
                    var("PROBE_TIMEOUT_SECS")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(PROBE_TIMEOUT_SECS),
                ),
            },
            cdn: CdnConfig {
                base_url: var("CDN_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_CDN_API_BASE_URL.to_string()),
                credentials,
                timeout: Duration::from_secs(
                    var("CDN_TIMEOUT_SECS")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(CDN_TIMEOUT_SECS),
                ),
            },
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.tick_interval_secs == 0 {
            return Err(anyhow::anyhow!("TICK_INTERVAL_SECS must be greater than 0"));
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(anyhow::anyhow!(
                "BATCH_SIZE must be between 1 and {}",
                MAX_BATCH_SIZE
            ));
        }

        if self.db_max_connections == 0 {
            return Err(anyhow::anyhow!("DB_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.probe.timeout.is_zero() || self.cdn.timeout.is_zero() {
            return Err(anyhow::anyhow!(
                "PROBE_TIMEOUT_SECS and CDN_TIMEOUT_SECS must be greater than 0"
            ));
        }

        if !self.cdn.base_url.starts_with("http://") && !self.cdn.base_url.starts_with("https://")
        {
            return Err(anyhow::anyhow!("CDN_API_BASE_URL must be an http(s) URL"));
        }

        Ok(())
    }
}

/// Application configuration (reconciliation worker).
#[derive(Clone, Debug)]
pub struct Config(pub Box<WorkerConfig>);

impl Config {
    fn as_worker(&self) -> &WorkerConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = WorkerConfig::from_env()?;
        config.validate()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_worker().validate()
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.as_worker().environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn database_url(&self) -> &str {
        &self.as_worker().database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_worker().db_max_connections
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.as_worker().db_timeout_seconds)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.as_worker().tick_interval_secs)
    }

    pub fn batch_size(&self) -> usize {
        self.as_worker().batch_size
    }

    pub fn selection_scope(&self) -> SelectionScope {
        SelectionScope {
            include_remote: self.as_worker().select_remote_assets,
        }
    }

    pub fn probe(&self) -> &ProbeConfig {
        &self.as_worker().probe
    }

    pub fn cdn(&self) -> &CdnConfig {
        &self.as_worker().cdn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config =
            WorkerConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/media")]))
                .unwrap();
        config.validate().unwrap();

        assert_eq!(config.tick_interval_secs, 10);
        assert_eq!(config.batch_size, 5);
        assert!(!config.select_remote_assets);
        assert_eq!(config.probe.ffprobe_path, "ffprobe");
        assert_eq!(config.probe.storage_root, PathBuf::from("./uploads"));
        assert_eq!(config.probe.timeout, Duration::from_secs(30));
        assert_eq!(config.cdn.base_url, "https://api.cloudinary.com");
        assert_eq!(config.cdn.timeout, Duration::from_secs(15));
        assert!(config.cdn.credentials.is_none());
    }

    #[test]
    fn database_url_is_required() {
        assert!(WorkerConfig::from_lookup(lookup(&[])).is_err());

        let config =
            WorkerConfig::from_lookup(lookup(&[("DATABASE_URL", "mysql://localhost/media")]))
                .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn credentials_need_all_three_parts() {
        let partial = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/media"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "key"),
        ]))
        .unwrap();
        assert!(partial.cdn.credentials.is_none());

        let full = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/media"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "key"),
            ("CLOUDINARY_API_SECRET", "secret"),
        ]))
        .unwrap();
        let creds = full.cdn.credentials.unwrap();
        assert_eq!(creds.cloud_name, "demo");
        assert!(!format!("{:?}", creds).contains("\"secret\""));
    }

    #[test]
    fn batch_size_is_bounded() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://localhost/media"),
            ("BATCH_SIZE", "500"),
        ]))
        .unwrap();
        assert!(config.validate().is_err());

        let config = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://localhost/media"),
            ("BATCH_SIZE", "not-a-number"),
            ("SELECT_REMOTE_ASSETS", "true"),
        ]))
        .unwrap();
        assert_eq!(config.batch_size, 5);
        assert!(config.select_remote_assets);
    }
}
