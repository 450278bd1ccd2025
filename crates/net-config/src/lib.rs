//! netstate configuration
//!
//! State document parsing/serialization and engine configuration

pub mod document;
pub mod engine_config;
pub mod settings;


pub use document::{format, parse, serialize, DocumentFormat};
pub use engine_config::{EngineConfig, LogSink, DEFAULT_TIMEOUT};
pub use settings::{EngineSettings, DEFAULT_CHECKPOINT_DIR};

use netstate_core::NetstateError;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for NetstateError {
    fn from(err: ConfigError) -> Self {
        NetstateError::InvalidArgument(err.to_string())
    }
}
