//! Apply orchestrator
//!
//! Runs one apply as a small state machine:
//!
//! ```text
//! Idle -> CheckpointCreated -> Diffing -> Applying -> Verifying -> Succeeded
//!                                  \__________\___________\______> Failed
//! ```
//!
//! A failure after the checkpoint was taken rolls back automatically unless
//! auto rollback is disabled. The whole pipeline runs under one deadline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use netstate_core::{
    ApplyFlags, BackendDriver, ChangeSet, CompareOptions, NetstateError, NetworkState,
    OperationLog, Result,
};
use netstate_validate::{NetworkValidator, Verifier};

use crate::checkpoint::CheckpointManager;
use crate::differ::diff;

/// Apply transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStage {
    Idle,
    CheckpointCreated,
    Diffing,
    Applying,
    Verifying,
    Succeeded,
    Failed,
}

impl fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of a successful apply.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub checkpoint: String,
    pub changes: ChangeSet,
    /// False when the checkpoint was left pending.
    pub committed: bool,
}

/// Hand each operation to the driver in order, stopping at the first
/// failure. Driver calls are bounded by `deadline`.
pub(crate) async fn apply_operations(
    driver: &dyn BackendDriver,
    changes: &ChangeSet,
    deadline: Option<Instant>,
    include_secrets: bool,
    log: &mut OperationLog,
) -> Result<()> {
    for operation in changes {
        log.info(format!("applying: {}", operation.description()));
        log.debug(format!("payload: {}", operation.render_payload(include_secrets)));

        let result = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, driver.apply_operation(operation))
                .await
                .map_err(|_| {
                    NetstateError::Timeout(format!(
                        "deadline reached while running '{}'",
                        operation.description()
                    ))
                })?,
            None => driver.apply_operation(operation).await,
        };

        log.extend_driver(driver.name(), &result.log);
        if let Some(err) = result.into_error(operation) {
            log.error(err.to_string());
            return Err(err);
        }
    }
    Ok(())
}

/// Sequences differ, driver, verifier and checkpoints for one engine.
pub struct ApplyOrchestrator {
    driver: Arc<dyn BackendDriver>,
    checkpoints: Arc<CheckpointManager>,
    validator: NetworkValidator,
    verifier: Verifier,
    auto_rollback: bool,
}

impl ApplyOrchestrator {
    pub fn new(
        driver: Arc<dyn BackendDriver>,
        checkpoints: Arc<CheckpointManager>,
        verifier: Verifier,
    ) -> Result<Self> {
        Ok(Self {
            driver,
            checkpoints,
            validator: NetworkValidator::new()?,
            verifier,
            auto_rollback: true,
        })
    }

    pub fn with_auto_rollback(mut self, enabled: bool) -> Self {
        self.auto_rollback = enabled;
        self
    }

    /// Live state, without status data or secrets unless requested.
    pub async fn retrieve(&self, flags: ApplyFlags, log: &mut OperationLog) -> Result<NetworkState> {
        log.info(format!("reading state from {}", self.driver.name()));
        let mut state = self.driver.read_current_state().await?;
        if !flags.include_status_data() {
            state = state.without_status();
        }
        if !flags.include_secrets() {
            state = state.redact_secrets();
        }
        log.info(format!("retrieved {} interfaces", state.interfaces().len()));
        Ok(state)
    }

    /// Apply `desired` on top of the live state.
    pub async fn apply(
        &self,
        desired: &NetworkState,
        flags: ApplyFlags,
        timeout: Duration,
        log: &mut OperationLog,
    ) -> Result<ApplyOutcome> {
        let deadline = Instant::now() + timeout;
        let mut stage = ApplyStage::Idle;
        log.info(format!("apply started with flags {:?}, timeout {:?}", flags, timeout));

        self.check_capabilities(flags)?;

        let current = tokio::time::timeout_at(deadline, self.driver.read_current_state())
            .await
            .map_err(|_| NetstateError::Timeout("deadline reached reading live state".to_string()))??;
        let desired = &self.restore_secrets(desired, &current, log);
        self.validator.validate(desired, &current)?;

        let lease = self
            .checkpoints
            .begin(current.without_status(), timeout, flags.no_commit())
            .await?;
        transition(&mut stage, ApplyStage::CheckpointCreated, log);
        if lease.joined {
            log.info(format!("joined pending checkpoint {}", lease.id));
        } else {
            log.info(format!("created checkpoint {}", lease.id));
        }

        let result = self
            .run(&current, desired, flags, deadline, &mut stage, log)
            .await;

        match result {
            Ok(changes) => {
                let committed = !flags.no_commit();
                if committed {
                    self.checkpoints.commit_held(&lease.id).await?;
                    log.info(format!("committed checkpoint {}", lease.id));
                } else {
                    self.checkpoints.release(&lease.id).await?;
                    log.info(format!("checkpoint {} left pending", lease.id));
                }
                transition(&mut stage, ApplyStage::Succeeded, log);
                Ok(ApplyOutcome {
                    checkpoint: lease.id.clone(),
                    changes,
                    committed,
                })
            }
            Err(err) => {
                log.error(format!("apply failed in {}: {}", stage, err));
                transition(&mut stage, ApplyStage::Failed, log);
                Err(self.recover(&lease.id, err, log).await)
            }
        }
    }

    async fn run(
        &self,
        current: &NetworkState,
        desired: &NetworkState,
        flags: ApplyFlags,
        deadline: Instant,
        stage: &mut ApplyStage,
        log: &mut OperationLog,
    ) -> Result<ChangeSet> {
        transition(stage, ApplyStage::Diffing, log);
        let changes = diff(current, desired, flags)?;
        if changes.is_empty() {
            log.info("desired state already in place");
        } else {
            log.info(format!(
                "planned {} operations:\n{}",
                changes.len(),
                changes.render(flags.include_secrets())
            ));
        }

        transition(stage, ApplyStage::Applying, log);
        apply_operations(
            self.driver.as_ref(),
            &changes,
            Some(deadline),
            flags.include_secrets(),
            log,
        )
        .await?;

        if flags.no_verify() {
            log.info("verification skipped");
        } else {
            transition(stage, ApplyStage::Verifying, log);
            let opts = CompareOptions::from(flags);
            tokio::time::timeout_at(
                deadline,
                self.verifier.verify(self.driver.as_ref(), desired, &opts, log),
            )
            .await
            .map_err(|_| NetstateError::Timeout("deadline reached during verification".to_string()))??;
        }

        Ok(changes)
    }

    /// Documents handed out by retrieve carry the hidden marker instead of
    /// credentials; swap the live values back in before diffing.
    fn restore_secrets(
        &self,
        desired: &NetworkState,
        current: &NetworkState,
        log: &mut OperationLog,
    ) -> NetworkState {
        if !desired.has_secrets() {
            return desired.clone();
        }
        log.debug("restoring hidden credentials from the live state");
        desired.restore_secrets(current)
    }

    /// Roll back after a failure and annotate the error with the outcome.
    async fn recover(&self, id: &str, err: NetstateError, log: &mut OperationLog) -> NetstateError {
        if !self.auto_rollback {
            let note = match self.checkpoints.release(id).await {
                Ok(()) => format!("automatic rollback disabled, checkpoint {} left pending", id),
                Err(e) => format!("automatic rollback disabled, releasing checkpoint failed: {}", e),
            };
            log.warn(note.clone());
            return err.annotate(note);
        }

        let note = match self.checkpoints.rollback_held(id, log).await {
            Ok(_) => format!("rolled back to checkpoint {}", id),
            Err(rollback_err) => {
                log.error(rollback_err.to_string());
                format!("rollback failed: {}", rollback_err)
            }
        };
        err.annotate(note)
    }

    fn check_capabilities(&self, flags: ApplyFlags) -> Result<()> {
        if flags.kernel_only() && flags.no_commit() {
            return Err(NetstateError::InvalidArgument(
                "kernel-only mode cannot be combined with no-commit".to_string(),
            ));
        }
        if flags.kernel_only() && !self.driver.supports_kernel_only() {
            return Err(NetstateError::NotSupported(format!(
                "driver {} does not support kernel-only mode",
                self.driver.name()
            )));
        }
        if flags.no_verify() && !self.driver.supports_no_verify() {
            return Err(NetstateError::NotSupported(format!(
                "driver {} does not support skipping verification",
                self.driver.name()
            )));
        }
        Ok(())
    }
}

fn transition(stage: &mut ApplyStage, next: ApplyStage, log: &mut OperationLog) {
    debug!("apply stage {} -> {}", stage, next);
    log.debug(format!("stage {} -> {}", stage, next));
    *stage = next;
}
