use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use netstate_apply::{IpCommandBackend, NetstateEngine};
use netstate_config::{EngineConfig, EngineSettings, LogSink};
use netstate_core::{BackendDriver, MemoryBackend};

/// Backend selection for [`NetstateContext::bootstrap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverKind {
    #[default]
    IpCommand,
    Memory,
}

/// Shared engine plus the driver it runs on.
#[derive(Clone)]
pub struct NetstateContext {
    pub driver: Arc<dyn BackendDriver>,
    pub engine: Arc<NetstateEngine>,
}

impl NetstateContext {
    /// Build an engine from loaded settings. Call logs are handed back to
    /// clients instead of going to the engine sink.
    pub async fn bootstrap(settings: EngineSettings, kind: DriverKind) -> Result<Self> {
        let config = settings
            .into_engine_config()
            .context("invalid engine settings")?
            .with_log_sink(LogSink::Discard);
        Self::with_config(config, kind).await
    }

    pub async fn with_config(config: EngineConfig, kind: DriverKind) -> Result<Self> {
        let driver: Arc<dyn BackendDriver> = match kind {
            DriverKind::IpCommand => Arc::new(IpCommandBackend::new()),
            DriverKind::Memory => Arc::new(MemoryBackend::new()),
        };
        info!("using {} driver", driver.name());

        let engine = NetstateEngine::new(Arc::clone(&driver), config)
            .await
            .map_err(|err| anyhow::anyhow!(err))
            .context("failed to start engine")?;

        Ok(Self {
            driver,
            engine: Arc::new(engine),
        })
    }
}
