//! VLAN interface validation and naming helpers

use netstate_types::{Interface, VlanConfig};

use crate::error::NetstateError;
use crate::interface::InterfaceValidator;
use crate::Result;

pub const MAX_VLAN_ID: u16 = 4094;

/// VLAN management operations
pub struct VlanManager;

impl VlanManager {
    /// Validate VLAN configuration
    pub fn validate_config(name: &str, config: &VlanConfig) -> Result<()> {
        InterfaceValidator::validate_name(&config.base_iface)?;

        if config.base_iface == name {
            return Err(NetstateError::InvalidArgument(format!(
                "vlan {} cannot use itself as base interface",
                name
            )));
        }

        if config.id > MAX_VLAN_ID {
            return Err(NetstateError::invalid_value(format!("{}.vlan.id", name), config.id));
        }

        Ok(())
    }

    /// Conventional name of a VLAN on `base`.
    pub fn generate_name(base: &str, id: u16) -> String {
        format!("{}.{}", base, id)
    }

    /// Parse VLAN interface name to extract base and id
    pub fn parse_vlan_name(name: &str) -> Option<(String, u16)> {
        let (base, id) = name.rsplit_once('.')?;
        let id = id.parse::<u16>().ok().filter(|id| *id <= MAX_VLAN_ID)?;
        Some((base.to_string(), id))
    }

    /// Whether another VLAN with the same base and id already exists.
    pub fn is_id_used<'a>(
        ifaces: impl IntoIterator<Item = &'a Interface>,
        name: &str,
        config: &VlanConfig,
    ) -> bool {
        ifaces.into_iter().any(|iface| {
            iface.name != name
                && !iface.is_absent()
                && matches!(
                    &iface.config,
                    Some(netstate_types::IfaceConfig::Vlan(other))
                        if other.base_iface == config.base_iface && other.id == config.id
                )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstate_types::{IfaceConfig, InterfaceType};

    fn vlan(base: &str, id: u16) -> VlanConfig {
        VlanConfig {
            base_iface: base.to_string(),
            id,
            protocol: None,
        }
    }

    #[test]
    fn test_vlan_validation() {
        assert!(VlanManager::validate_config("eth0.100", &vlan("eth0", 100)).is_ok());
        assert!(VlanManager::validate_config("eth0.5000", &vlan("eth0", 5000)).is_err());
        assert!(VlanManager::validate_config("eth0", &vlan("eth0", 100)).is_err());
    }

    #[test]
    fn test_vlan_names() {
        assert_eq!(VlanManager::generate_name("eth0", 100), "eth0.100");
        assert_eq!(
            VlanManager::parse_vlan_name("eth0.100"),
            Some(("eth0".to_string(), 100))
        );
        assert_eq!(VlanManager::parse_vlan_name("eth0"), None);
    }

    #[test]
    fn test_id_used() {
        let existing = Interface::new("vlan100", InterfaceType::Vlan)
            .with_config(IfaceConfig::Vlan(vlan("eth0", 100)));
        assert!(VlanManager::is_id_used([&existing], "eth0.100", &vlan("eth0", 100)));
        assert!(!VlanManager::is_id_used([&existing], "vlan100", &vlan("eth0", 100)));
    }
}
