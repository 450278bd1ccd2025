//! Linux bridge validation

use std::collections::HashSet;

use netstate_types::BridgeConfig;

use crate::error::NetstateError;
use crate::interface::InterfaceValidator;
use crate::Result;

/// Kernel range for bridge port priority.
pub const MAX_PORT_PRIORITY: u16 = 63;
/// Accepted range for `mac-ageing-time`, 0 disables ageing.
pub const MAC_AGEING_RANGE: std::ops::RangeInclusive<u32> = 10..=1_000_000;

/// Bridge management operations
pub struct BridgeManager;

impl BridgeManager {
    /// Validate bridge configuration
    pub fn validate_config(name: &str, config: &BridgeConfig) -> Result<()> {
        let mut seen = HashSet::new();
        for port in config.port.iter().flatten() {
            InterfaceValidator::validate_name(&port.name)?;
            if port.name == name {
                return Err(NetstateError::InvalidArgument(format!(
                    "bridge {} cannot be its own port",
                    name
                )));
            }
            if !seen.insert(port.name.as_str()) {
                return Err(NetstateError::InvalidArgument(format!(
                    "bridge {} lists port {} twice",
                    name, port.name
                )));
            }
            if let Some(priority) = port.stp_priority {
                if priority > MAX_PORT_PRIORITY {
                    return Err(NetstateError::invalid_value(
                        format!("{}.bridge.port.{}.stp-priority", name, port.name),
                        priority,
                    ));
                }
            }
            if port.stp_path_cost == Some(0) {
                return Err(NetstateError::invalid_value(
                    format!("{}.bridge.port.{}.stp-path-cost", name, port.name),
                    0,
                ));
            }
        }

        if let Some(ageing) = config.options.as_ref().and_then(|o| o.mac_ageing_time) {
            if ageing != 0 && !MAC_AGEING_RANGE.contains(&ageing) {
                return Err(NetstateError::invalid_value(
                    format!("{}.bridge.options.mac-ageing-time", name),
                    ageing,
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstate_types::{BridgeOptions, BridgePortConfig};

    #[test]
    fn test_bridge_validation() {
        let config = BridgeConfig {
            port: Some(vec![BridgePortConfig::new("eth0"), BridgePortConfig::new("eth1")]),
            options: Some(BridgeOptions {
                stp: Some(true),
                mac_ageing_time: Some(300),
                ..Default::default()
            }),
        };
        assert!(BridgeManager::validate_config("br0", &config).is_ok());

        let own_port = BridgeConfig {
            port: Some(vec![BridgePortConfig::new("br0")]),
            options: None,
        };
        assert!(BridgeManager::validate_config("br0", &own_port).is_err());
    }

    #[test]
    fn test_port_priority_range() {
        let mut port = BridgePortConfig::new("eth0");
        port.stp_priority = Some(64);
        let config = BridgeConfig {
            port: Some(vec![port]),
            options: None,
        };
        assert!(BridgeManager::validate_config("br0", &config).is_err());
    }

    #[test]
    fn test_mac_ageing_range() {
        let config = |ageing| BridgeConfig {
            port: None,
            options: Some(BridgeOptions {
                mac_ageing_time: Some(ageing),
                ..Default::default()
            }),
        };
        assert!(BridgeManager::validate_config("br0", &config(0)).is_ok());
        assert!(BridgeManager::validate_config("br0", &config(5)).is_err());
    }
}
