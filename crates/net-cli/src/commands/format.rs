//! Format command

use std::path::Path;

use anyhow::{Context, Result};

/// Format command implementation
pub struct FormatCommand;

impl FormatCommand {
    /// Re-emit the document in `path` as canonical YAML.
    pub async fn execute(path: &Path) -> Result<String> {
        let document = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read state file {}", path.display()))?;
        netstate_config::format(&document)
            .with_context(|| format!("failed to format {}", path.display()))
    }
}
