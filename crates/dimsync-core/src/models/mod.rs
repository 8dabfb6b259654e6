pub mod asset;

pub use asset::{is_eligible, AssetRecord, AssetUpdate, Dimensions, SelectionScope};
