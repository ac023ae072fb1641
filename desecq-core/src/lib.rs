pub mod cache;
pub mod catalogue;
pub mod error;
pub mod facade;
pub mod http;
pub mod model;
pub mod profile;
pub mod queue;
pub mod version;

// re-exports for convenience
pub use error::ApiError;
pub use facade::Facade;
pub use http::ApiClient;
pub use queue::{ApiQueue, Handle, QueueItemSpec};
