//! Engine entry points
//!
//! One [`NetstateEngine`] per driver. Every entry point returns a
//! [`CallOutput`] carrying the result text, the accumulated log and, on
//! failure, the error kind and message. The log is written to the configured
//! sink before returning.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use serde::Serialize;
use tokio::sync::Mutex;

use netstate_config::{parse, serialize, DocumentFormat, EngineConfig};
use netstate_core::{ApplyFlags, BackendDriver, NetstateError, NetworkState, OperationLog, Result};
use netstate_validate::Verifier;

use crate::checkpoint::{CheckpointInfo, CheckpointManager};
use crate::transaction::ApplyOrchestrator;

/// Result of one engine call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallOutput {
    /// 0 on success, 1 on failure.
    pub rc: i32,
    pub output: String,
    pub log: String,
    pub err_kind: String,
    pub err_msg: String,
}

impl CallOutput {
    pub fn is_success(&self) -> bool {
        self.rc == 0
    }

    fn new(result: Result<String>, log: String) -> Self {
        match result {
            Ok(output) => Self {
                rc: 0,
                output,
                log,
                ..Default::default()
            },
            Err(err) => Self {
                rc: 1,
                output: String::new(),
                log,
                err_kind: err.kind().to_string(),
                err_msg: err.to_string(),
            },
        }
    }
}

pub struct NetstateEngine {
    driver: Arc<dyn BackendDriver>,
    checkpoints: Arc<CheckpointManager>,
    orchestrator: ApplyOrchestrator,
    config: EngineConfig,
    /// Serializes apply, commit and rollback.
    call_lock: Mutex<()>,
}

impl NetstateEngine {
    pub async fn new(driver: Arc<dyn BackendDriver>, config: EngineConfig) -> Result<Self> {
        let config = config.build()?;

        let mut checkpoints = CheckpointManager::new(Arc::clone(&driver), config.timeout);
        if let Some(dir) = &config.checkpoint_dir {
            checkpoints = checkpoints.with_store(dir).await?;
        }
        let checkpoints = Arc::new(checkpoints);

        let verifier = Verifier::new(config.verify_retries, config.verify_interval);
        let orchestrator =
            ApplyOrchestrator::new(Arc::clone(&driver), Arc::clone(&checkpoints), verifier)?
                .with_auto_rollback(config.auto_rollback);

        Ok(Self {
            driver,
            checkpoints,
            orchestrator,
            config,
            call_lock: Mutex::new(()),
        })
    }

    pub fn driver(&self) -> &Arc<dyn BackendDriver> {
        &self.driver
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read the live state as a JSON document.
    pub async fn net_state_retrieve(&self, flags: ApplyFlags) -> CallOutput {
        let flags = flags | self.config.flags();
        let mut log = OperationLog::new();
        let result = self.retrieve(flags, &mut log).await;
        self.finish(result, log)
    }

    /// Apply a YAML or JSON state document. A zero timeout uses the
    /// configured one.
    pub async fn net_state_apply(
        &self,
        flags: ApplyFlags,
        document: &str,
        timeout_seconds: u32,
    ) -> CallOutput {
        let flags = flags | self.config.flags();
        let _guard = self.call_lock.lock().await;
        let mut log = OperationLog::new();
        let result = self.apply(flags, document, timeout_seconds, &mut log).await;
        self.finish(result, log)
    }

    /// Commit a checkpoint, an empty id commits the pending one.
    pub async fn checkpoint_commit(&self, checkpoint_id: &str) -> CallOutput {
        let _guard = self.call_lock.lock().await;
        let mut log = OperationLog::new();
        let result = self.checkpoints.commit(checkpoint_id).await;
        if let Ok(id) = &result {
            log.info(format!("committed checkpoint {}", id));
        }
        self.finish(result, log)
    }

    /// Roll back to a checkpoint, an empty id selects the pending one.
    pub async fn checkpoint_rollback(&self, checkpoint_id: &str) -> CallOutput {
        let _guard = self.call_lock.lock().await;
        let mut log = OperationLog::new();
        let result = self.checkpoints.rollback(checkpoint_id, &mut log).await;
        self.finish(result, log)
    }

    /// List known checkpoints as JSON.
    pub async fn checkpoint_show(&self) -> CallOutput {
        let infos: Vec<CheckpointInfo> = self.checkpoints.show().await;
        let result = serde_json::to_string_pretty(&infos)
            .map_err(|e| NetstateError::Bug(format!("failed to serialize checkpoints: {}", e)));
        self.finish(result, OperationLog::new())
    }

    async fn retrieve(&self, flags: ApplyFlags, log: &mut OperationLog) -> Result<String> {
        let state = self.orchestrator.retrieve(flags, log).await?;
        serialize(&state, DocumentFormat::Json)
    }

    async fn apply(
        &self,
        flags: ApplyFlags,
        document: &str,
        timeout_seconds: u32,
        log: &mut OperationLog,
    ) -> Result<String> {
        let timeout = if timeout_seconds == 0 {
            self.config.timeout
        } else {
            Duration::from_secs(u64::from(timeout_seconds))
        };
        let desired = parse(document)?;
        let outcome = self.orchestrator.apply(&desired, flags, timeout, log).await?;
        log.info(format!(
            "apply finished with {} operations, checkpoint {}",
            outcome.changes.len(),
            outcome.checkpoint
        ));

        let desired: NetworkState = if flags.include_secrets() {
            desired
        } else {
            desired.redact_secrets()
        };
        serialize(&desired, DocumentFormat::Json)
    }

    /// Flush the call log to the sink and build the output.
    fn finish(&self, result: Result<String>, log: OperationLog) -> CallOutput {
        let text = log.render();
        let result = match (write_log(&self.config, &text), result) {
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(err)) => {
                warn!("{}", e);
                Err(err)
            }
            (Ok(()), result) => result,
        };
        CallOutput::new(result, text)
    }
}

fn write_log(config: &EngineConfig, text: &str) -> Result<()> {
    let sink_error = |e: std::io::Error| NetstateError::LogSink(format!("{:?}: {}", config.log_sink, e));
    let mut sink = config.log_sink.open().map_err(sink_error)?;
    sink.write_all(text.as_bytes()).map_err(sink_error)?;
    sink.flush().map_err(sink_error)
}
