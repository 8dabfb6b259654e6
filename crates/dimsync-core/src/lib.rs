//! Dimsync Core Library
//!
//! Domain models, the tag codec, configuration and error types shared by the
//! store, the dimension sources and the reconciliation worker.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod tags;

// Re-export commonly used types
pub use config::{CdnConfig, CdnCredentials, Config, ProbeConfig, WorkerConfig};
pub use error::{DimsyncError, DimsyncResult};
pub use models::{is_eligible, AssetRecord, AssetUpdate, Dimensions, SelectionScope};
pub use storage_types::StorageBackend;
pub use tags::{clear_directives, mark_failed, TagSet, TagShape, TagState};
