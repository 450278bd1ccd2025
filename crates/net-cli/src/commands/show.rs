//! Show command

use std::sync::Arc;

use anyhow::{Context, Result};
use netstate_api::{Netstate, NetstateContext};

use super::log_writer;

#[derive(Debug, Clone, Default)]
pub struct ShowOptions {
    pub json: bool,
    pub kernel_only: bool,
    pub include_status_data: bool,
    pub include_secrets: bool,
    pub quiet: bool,
}

/// Show command implementation
pub struct ShowCommand {
    context: Arc<NetstateContext>,
}

impl ShowCommand {
    pub fn new(context: Arc<NetstateContext>) -> Self {
        Self { context }
    }

    /// Current state as YAML, or JSON with `json` set.
    pub async fn execute(&self, options: &ShowOptions) -> Result<String> {
        let mut client =
            Netstate::new(self.context.engine.clone()).with_log_writer(log_writer(options.quiet));
        if options.kernel_only {
            client = client.with_kernel_only();
        }
        if options.include_status_data {
            client = client.with_include_status_data();
        }
        if options.include_secrets {
            client = client.with_include_secrets();
        }

        let state = client
            .retrieve_net_state()
            .await
            .context("failed to retrieve network state")?;
        if options.json {
            return Ok(state);
        }
        netstate_config::format(&state)
            .context("failed to render state as YAML")
    }
}
