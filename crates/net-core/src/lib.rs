//! netstate core
//!
//! Error taxonomy, option flags, change sets, comparison rules and the
//! backend driver abstraction shared by the reconciliation engine.

pub mod backend;
pub mod bond;
pub mod bridge;
pub mod change;
pub mod compare;
pub mod error;
pub mod flags;
pub mod interface;
pub mod memory;
pub mod oplog;
pub mod types;
pub mod vlan;

pub use backend::{BackendDriver, OperationResult, OperationStatus};
pub use change::{ChangeSet, Operation, OperationKind, OperationTarget};
pub use compare::{CompareMode, CompareOptions, Mismatch};
pub use error::{ErrorKind, NetstateError};
pub use flags::ApplyFlags;
pub use memory::MemoryBackend;
pub use oplog::OperationLog;
pub use types::*;

/// Result type for network state operations
pub type Result<T> = std::result::Result<T, NetstateError>;
