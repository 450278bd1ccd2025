//! Backend driver abstraction
//!
//! A driver reads the live network state and applies single operations of a
//! [`ChangeSet`](crate::change::ChangeSet). The engine only talks to drivers
//! through `Arc<dyn BackendDriver>`.

use async_trait::async_trait;

use netstate_types::NetworkState;

use crate::change::Operation;
use crate::error::{ErrorKind, NetstateError};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Success,
    Failure { kind: ErrorKind, message: String },
}

/// Outcome of one operation plus the log lines the driver produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub log: Vec<String>,
}

impl OperationResult {
    pub fn success(log: Vec<String>) -> Self {
        Self {
            status: OperationStatus::Success,
            log,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>, log: Vec<String>) -> Self {
        Self {
            status: OperationStatus::Failure {
                kind,
                message: message.into(),
            },
            log,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    /// Turn a failure into an error naming the operation.
    pub fn into_error(self, operation: &Operation) -> Option<NetstateError> {
        match self.status {
            OperationStatus::Success => None,
            OperationStatus::Failure { kind, message } => Some(NetstateError::from_result(
                kind,
                &operation.description(),
                &message,
            )),
        }
    }
}

/// Capability surface of a network backend.
#[async_trait]
pub trait BackendDriver: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Read the live state including status data and secrets.
    async fn read_current_state(&self) -> Result<NetworkState>;

    /// Apply one operation. Failures are reported in the result, never
    /// panicked or swallowed.
    async fn apply_operation(&self, operation: &Operation) -> OperationResult;

    fn supports_kernel_only(&self) -> bool {
        true
    }

    fn supports_no_verify(&self) -> bool {
        true
    }
}
