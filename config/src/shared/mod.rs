//! Configuration types shared by the syncer and its tests.

mod base;
mod batch;
mod http;
mod syncer;
mod upstream;

pub use base::ValidationError;
pub use batch::BatchConfig;
pub use http::HttpClientConfig;
pub use syncer::SyncerConfig;
pub use upstream::{CustomerListIdentifierType, UpstreamConfig};
