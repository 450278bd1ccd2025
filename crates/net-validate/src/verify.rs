//! Post-apply verification
//!
//! Reads the live state back from the driver and compares it with the
//! desired state. The kernel may take a moment to settle, so a mismatch is
//! retried before it is reported.

use std::time::Duration;

use netstate_core::compare::state_mismatches;
use netstate_core::{BackendDriver, CompareMode, CompareOptions, NetstateError, OperationLog, Result};
use netstate_types::NetworkState;

#[derive(Debug, Clone)]
pub struct Verifier {
    retries: u32,
    interval: Duration,
}

impl Verifier {
    pub fn new(retries: u32, interval: Duration) -> Self {
        Self { retries, interval }
    }

    /// Verify once, without retries.
    pub fn once() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub async fn verify(
        &self,
        driver: &dyn BackendDriver,
        desired: &NetworkState,
        opts: &CompareOptions,
        log: &mut OperationLog,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            let current = driver.read_current_state().await?;
            let mismatches = state_mismatches(desired, &current, opts, CompareMode::Merge);
            if mismatches.is_empty() {
                log.info("verification passed");
                return Ok(());
            }

            if attempt >= self.retries {
                for mismatch in &mismatches {
                    log.error(format!("verification mismatch: {}", mismatch));
                }
                return Err(NetstateError::VerificationMismatch(mismatches));
            }

            attempt += 1;
            log.debug(format!(
                "verification found {} mismatches, retry {}/{} in {:?}",
                mismatches.len(),
                attempt,
                self.retries,
                self.interval
            ));
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstate_core::{ErrorKind, MemoryBackend};
    use netstate_types::{Interface, InterfaceType};

    fn desired() -> NetworkState {
        NetworkState::new().with_interface(Interface::new("eth1", InterfaceType::Ethernet).with_mtu(9000))
    }

    #[tokio::test]
    async fn test_verify_matching_state() {
        let driver = MemoryBackend::with_state(desired());
        let mut log = OperationLog::new();
        Verifier::once()
            .verify(&driver, &desired(), &CompareOptions::default(), &mut log)
            .await
            .unwrap();
        assert!(log.contains("verification passed"));
    }

    #[tokio::test]
    async fn test_verify_reports_mismatch() {
        let live = NetworkState::new()
            .with_interface(Interface::new("eth1", InterfaceType::Ethernet).with_mtu(1500));
        let driver = MemoryBackend::with_state(live);
        let mut log = OperationLog::new();
        let err = Verifier::new(2, Duration::from_millis(1))
            .verify(&driver, &desired(), &CompareOptions::default(), &mut log)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VerificationMismatch);
        let NetstateError::VerificationMismatch(mismatches) = err else {
            panic!("unexpected error");
        };
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].target, "eth1");
        assert!(log.contains("retry 2/2"));
    }
}
