//! Checkpoint commands: commit, rollback and listing

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use netstate_api::{Netstate, NetstateContext};

use super::log_writer;

/// Checkpoint command implementation
pub struct CheckpointCommand {
    context: Arc<NetstateContext>,
    quiet: bool,
}

impl CheckpointCommand {
    pub fn new(context: Arc<NetstateContext>, quiet: bool) -> Self {
        Self { context, quiet }
    }

    fn client(&self) -> Netstate {
        Netstate::new(self.context.engine.clone()).with_log_writer(log_writer(self.quiet))
    }

    /// Commit `id`, or the pending checkpoint when none is given.
    pub async fn commit(&self, id: Option<&str>) -> Result<String> {
        let id = self
            .client()
            .commit_checkpoint(id.unwrap_or_default())
            .await
            .context("failed to commit checkpoint")?;
        Ok(format!("committed {}\n", id))
    }

    /// Roll back to `id`, or to the pending checkpoint when none is given.
    pub async fn rollback(&self, id: Option<&str>) -> Result<String> {
        let id = self
            .client()
            .rollback_checkpoint(id.unwrap_or_default())
            .await
            .context("failed to roll back checkpoint")?;
        Ok(format!("rolled back {}\n", id))
    }

    /// Table of known checkpoints.
    pub async fn list(&self) -> Result<String> {
        let checkpoints = self.context.engine.checkpoints().show().await;
        if checkpoints.is_empty() {
            return Ok("no checkpoints\n".to_string());
        }

        let mut output = format!(
            "{:<40} {:<11} {:<21} {}\n",
            "Checkpoint", "Status", "Created", "Expires"
        );
        output.push_str(&format!("{}\n", "-".repeat(96)));
        for info in checkpoints {
            let expires = info
                .expires
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_else(|| "-".to_string());
            output.push_str(&format!(
                "{:<40} {:<11} {:<21} {}\n",
                info.id,
                info.status.to_string(),
                info.created.to_rfc3339_opts(SecondsFormat::Secs, true),
                expires
            ));
        }
        Ok(output)
    }
}
