//! netstate validation
//!
//! Syntax and semantic validation of desired states, and verification of
//! the live state after an apply.

pub mod semantic;
pub mod syntax;
pub mod verify;

pub use semantic::SemanticValidator;
pub use syntax::SyntaxValidator;
pub use verify::Verifier;

use netstate_core::{Interface, NetstateError, NetworkState, Result};

/// Comprehensive desired state validator
pub struct NetworkValidator {
    syntax_validator: SyntaxValidator,
    semantic_validator: SemanticValidator,
}

impl NetworkValidator {
    /// Create new network validator
    pub fn new() -> Result<Self> {
        Ok(Self {
            syntax_validator: SyntaxValidator::new()?,
            semantic_validator: SemanticValidator::new(),
        })
    }

    /// Validate `desired` in isolation and against the live state.
    pub fn validate(&self, desired: &NetworkState, current: &NetworkState) -> Result<()> {
        let mut errors = Vec::new();

        // Syntax validation
        if let Err(e) = self.syntax_validator.validate_state(desired) {
            errors.push(format!("syntax validation failed: {}", e));
        }

        // Semantic validation (only if syntax is valid)
        if errors.is_empty() {
            if let Err(e) = self.semantic_validator.validate(desired, current) {
                errors.push(format!("semantic validation failed: {}", e));
            }
        }

        if !errors.is_empty() {
            return Err(NetstateError::InvalidArgument(errors.join("; ")));
        }

        log::debug!("desired state validation passed");
        Ok(())
    }

    /// Validate desired state syntax only
    pub fn validate_syntax(&self, desired: &NetworkState) -> Result<()> {
        self.syntax_validator.validate_state(desired)
    }

    /// Validate desired state semantics only
    pub fn validate_semantics(&self, desired: &NetworkState, current: &NetworkState) -> Result<()> {
        self.semantic_validator.validate(desired, current)
    }

    /// Validate individual interface
    pub fn validate_interface(&self, iface: &Interface) -> Result<()> {
        self.syntax_validator.validate_interface(iface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstate_core::{ErrorKind, InterfaceType};

    #[test]
    fn test_empty_state_validation() {
        let validator = NetworkValidator::new().unwrap();
        let state = NetworkState::new();
        assert!(validator.validate_syntax(&state).is_ok());
        assert!(validator.validate_semantics(&state, &state).is_ok());
        assert!(validator.validate(&state, &state).is_ok());
    }

    #[test]
    fn test_syntax_failure_skips_semantics() {
        let validator = NetworkValidator::new().unwrap();
        let desired = NetworkState::new()
            .with_interface(Interface::new("eth1", InterfaceType::Ethernet).with_mtu(10));
        let err = validator.validate(&desired, &NetworkState::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("syntax validation failed"));
        assert!(!err.to_string().contains("semantic"));
    }
}
