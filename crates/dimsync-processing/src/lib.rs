//! Dimension sources: local files through `ffprobe`, CDN-hosted files through
//! the provider's metadata API.

pub mod probe;
pub mod remote;

pub use probe::{FfprobeProbe, MetadataProbe};
pub use remote::{CdnClient, RemoteDimensions};
