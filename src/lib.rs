pub mod config;
pub mod error;
pub mod export;
pub mod metrics;
pub mod providers;
pub mod server;
pub mod types;

pub use error::DevMasterError;
pub type Result<T> = std::result::Result<T, DevMasterError>;
