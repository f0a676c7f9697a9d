pub mod config;
pub mod error;
mod endpoint;
mod plugins;

pub use config::{RegistryConfig, RetryPolicy, SinkConfig};
pub use endpoint::Endpoint;
pub use error::PipelineError;
