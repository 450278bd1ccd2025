//! Binding style client
//!
//! Mirrors the language bindings: options are set once on the client, each
//! call writes the engine log to the client's writer and turns a non-zero
//! return code into a [`ClientError`].

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use netstate_apply::{CallOutput, NetstateEngine};
use netstate_core::ApplyFlags;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed writing logs: {0}")]
    LogWrite(#[from] io::Error),

    #[error("{action} with rc: {rc}, err_msg: {err_msg}, err_kind: {err_kind}")]
    Call {
        action: String,
        rc: i32,
        err_msg: String,
        err_kind: String,
    },
}

impl ClientError {
    /// Engine error kind, empty for log write failures.
    pub fn kind(&self) -> &str {
        match self {
            ClientError::LogWrite(_) => "",
            ClientError::Call { err_kind, .. } => err_kind,
        }
    }
}

pub struct Netstate {
    engine: Arc<NetstateEngine>,
    flags: ApplyFlags,
    timeout: u32,
    log_writer: Box<dyn Write + Send>,
}

impl fmt::Debug for Netstate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Netstate")
            .field("flags", &self.flags)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Netstate {
    pub fn new(engine: Arc<NetstateEngine>) -> Self {
        Self {
            engine,
            flags: ApplyFlags::empty(),
            timeout: 0,
            log_writer: Box::new(io::stderr()),
        }
    }

    /// Apply timeout, truncated to whole seconds. Zero uses the engine default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX);
        self
    }

    pub fn with_log_writer<W: Write + Send + 'static>(mut self, writer: W) -> Self {
        self.log_writer = Box::new(writer);
        self
    }

    pub fn with_kernel_only(mut self) -> Self {
        self.flags |= ApplyFlags::KERNEL_ONLY;
        self
    }

    pub fn with_no_verify(mut self) -> Self {
        self.flags |= ApplyFlags::NO_VERIFY;
        self
    }

    pub fn with_include_status_data(mut self) -> Self {
        self.flags |= ApplyFlags::INCLUDE_STATUS_DATA;
        self
    }

    pub fn with_include_secrets(mut self) -> Self {
        self.flags |= ApplyFlags::INCLUDE_SECRETS;
        self
    }

    pub fn with_no_commit(mut self) -> Self {
        self.flags |= ApplyFlags::NO_COMMIT;
        self
    }

    pub fn flags(&self) -> ApplyFlags {
        self.flags
    }

    /// Current network state as JSON.
    pub async fn retrieve_net_state(&mut self) -> Result<String, ClientError> {
        let out = self.engine.net_state_retrieve(self.flags).await;
        self.finish(out, || "failed retrieving net state".to_string())
    }

    /// Apply a YAML or JSON document, returning the applied state as JSON.
    pub async fn apply_net_state(&mut self, document: &str) -> Result<String, ClientError> {
        let out = self
            .engine
            .net_state_apply(self.flags, document, self.timeout)
            .await;
        self.finish(out, || format!("failed applying net state {}", document))
    }

    /// Commit a checkpoint, an empty id commits the pending one.
    pub async fn commit_checkpoint(&mut self, checkpoint: &str) -> Result<String, ClientError> {
        let out = self.engine.checkpoint_commit(checkpoint).await;
        self.finish(out, || format!("failed committing checkpoint {}", checkpoint))
    }

    /// Roll back to a checkpoint, an empty id selects the pending one.
    pub async fn rollback_checkpoint(&mut self, checkpoint: &str) -> Result<String, ClientError> {
        let out = self.engine.checkpoint_rollback(checkpoint).await;
        self.finish(out, || {
            format!("failed when doing rollback checkpoint {}", checkpoint)
        })
    }

    fn finish(
        &mut self,
        out: CallOutput,
        action: impl FnOnce() -> String,
    ) -> Result<String, ClientError> {
        self.log_writer.write_all(out.log.as_bytes())?;
        self.log_writer.flush()?;
        if out.is_success() {
            return Ok(out.output);
        }
        Err(ClientError::Call {
            action: action(),
            rc: out.rc,
            err_msg: out.err_msg,
            err_kind: out.err_kind,
        })
    }
}
