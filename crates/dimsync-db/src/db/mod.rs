//! Asset store repositories
//!
//! [`AssetStore`] is the contract the worker drives. [`PgAssetRepository`]
//! implements it against the `assets` table; [`MemoryAssetStore`] keeps rows in
//! process and evaluates the same selection patterns, for tests and dry runs.

pub mod assets;
pub mod memory;
pub mod pool;

pub use assets::{AssetStore, PgAssetRepository};
pub use memory::MemoryAssetStore;
pub use pool::connect_pool;
