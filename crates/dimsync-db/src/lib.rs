//! Asset store access for the reconciliation worker.

pub mod db;

pub use db::{connect_pool, AssetStore, MemoryAssetStore, PgAssetRepository};
