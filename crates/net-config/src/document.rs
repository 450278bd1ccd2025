//! State document parsing and serialization
//!
//! Documents are YAML or JSON text in the nmstate key layout. JSON input is
//! detected by its leading brace; anything else is read as YAML.

use netstate_core::{NetstateError, Result};
use netstate_types::NetworkState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    #[default]
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Guess the format of `text`.
    pub fn detect(text: &str) -> Self {
        if text.trim_start().starts_with('{') {
            DocumentFormat::Json
        } else {
            DocumentFormat::Yaml
        }
    }
}

impl std::str::FromStr for DocumentFormat {
    type Err = NetstateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(DocumentFormat::Yaml),
            "json" => Ok(DocumentFormat::Json),
            other => Err(NetstateError::invalid_value("document format", other)),
        }
    }
}

/// Parse a state document. Empty or null documents are the empty state.
pub fn parse(text: &str) -> Result<NetworkState> {
    if text.trim().is_empty() {
        return Ok(NetworkState::new());
    }
    let state = match DocumentFormat::detect(text) {
        DocumentFormat::Json => serde_json::from_str::<Option<NetworkState>>(text)
            .map_err(|e| NetstateError::MalformedDocument(e.to_string()))?,
        DocumentFormat::Yaml => serde_yaml::from_str::<Option<NetworkState>>(text)
            .map_err(|e| NetstateError::MalformedDocument(e.to_string()))?,
    };
    Ok(state.unwrap_or_default())
}

pub fn serialize(state: &NetworkState, format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::Json => serde_json::to_string_pretty(state)
            .map_err(|e| NetstateError::Bug(format!("failed to serialize state: {}", e))),
        DocumentFormat::Yaml => serde_yaml::to_string(state)
            .map_err(|e| NetstateError::Bug(format!("failed to serialize state: {}", e))),
    }
}

/// Re-emit a document in canonical YAML.
pub fn format(text: &str) -> Result<String> {
    serialize(&parse(text)?, DocumentFormat::Yaml)
}
