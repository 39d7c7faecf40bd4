//! Data model shared by the affinitygate crates.
pub mod config;
pub use config::*;

pub mod endpoint;
pub use endpoint::*;

pub mod service;
pub use service::*;

pub mod constants;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type BoxResult<T> = Result<T, BoxError>;
