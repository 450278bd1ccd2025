//! netstate apply
//!
//! Transactional application of desired network state with checkpoint
//! commit and rollback

pub mod checkpoint;
pub mod differ;
pub mod engine;
pub mod iproute;
pub mod store;
pub mod transaction;


pub use checkpoint::{CheckpointInfo, CheckpointManager, CheckpointStatus, CHECKPOINT_PREFIX};
pub use differ::{diff, diff_replace};
pub use engine::{CallOutput, NetstateEngine};
pub use iproute::IpCommandBackend;
pub use store::{CheckpointStore, StoredCheckpoint};
pub use transaction::{ApplyOrchestrator, ApplyOutcome, ApplyStage};
