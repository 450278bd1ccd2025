//! Option flags accepted by retrieve and apply.

use bitflags::bitflags;

bitflags! {
    /// Behaviour flags, bit-compatible with the binding constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ApplyFlags: u32 {
        /// Only touch and compare kernel visible attributes.
        const KERNEL_ONLY = 1;
        /// Skip post-apply verification.
        const NO_VERIFY = 2;
        /// Include backend reported status data.
        const INCLUDE_STATUS_DATA = 4;
        /// Include credentials instead of redacting them.
        const INCLUDE_SECRETS = 8;
        /// Leave the checkpoint pending after a successful apply.
        const NO_COMMIT = 16;
    }
}

impl ApplyFlags {
    pub fn kernel_only(&self) -> bool {
        self.contains(ApplyFlags::KERNEL_ONLY)
    }

    pub fn no_verify(&self) -> bool {
        self.contains(ApplyFlags::NO_VERIFY)
    }

    pub fn include_status_data(&self) -> bool {
        self.contains(ApplyFlags::INCLUDE_STATUS_DATA)
    }

    pub fn include_secrets(&self) -> bool {
        self.contains(ApplyFlags::INCLUDE_SECRETS)
    }

    pub fn no_commit(&self) -> bool {
        self.contains(ApplyFlags::NO_COMMIT)
    }
}
