//! Apply command

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::info;
use netstate_api::{Netstate, NetstateContext};

use super::log_writer;

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub no_verify: bool,
    pub no_commit: bool,
    pub kernel_only: bool,
    /// Seconds, zero uses the configured timeout.
    pub timeout: u64,
    pub quiet: bool,
}

/// Apply command implementation
pub struct ApplyCommand {
    context: Arc<NetstateContext>,
}

impl ApplyCommand {
    pub fn new(context: Arc<NetstateContext>) -> Self {
        Self { context }
    }

    /// Apply the state document in `path`.
    pub async fn execute(&self, path: &Path, options: &ApplyOptions) -> Result<String> {
        let document = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read state file {}", path.display()))?;
        info!("applying {}", path.display());

        let mut client = Netstate::new(self.context.engine.clone())
            .with_log_writer(log_writer(options.quiet))
            .with_timeout(Duration::from_secs(options.timeout));
        if options.no_verify {
            client = client.with_no_verify();
        }
        if options.no_commit {
            client = client.with_no_commit();
        }
        if options.kernel_only {
            client = client.with_kernel_only();
        }

        let applied = client
            .apply_net_state(&document)
            .await
            .context("failed to apply network state")?;
        let mut output = netstate_config::format(&applied)?;

        if options.no_commit {
            if let Some(id) = self.context.engine.checkpoints().current().await {
                output.push_str(&format!(
                    "# checkpoint {} is pending, commit or roll back before it expires\n",
                    id
                ));
            }
        }
        Ok(output)
    }
}
