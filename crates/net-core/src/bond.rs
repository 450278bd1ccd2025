//! Bond interface validation

use std::collections::HashSet;

use netstate_types::{BondConfig, BondMode};

use crate::error::NetstateError;
use crate::interface::InterfaceValidator;
use crate::Result;

/// Bond management operations
pub struct BondManager;

impl BondManager {
    /// Validate bond configuration
    pub fn validate_config(name: &str, config: &BondConfig) -> Result<()> {
        let ports = config.port.as_deref().unwrap_or_default();

        let mut seen = HashSet::new();
        for port in ports {
            InterfaceValidator::validate_name(port)?;
            if port == name {
                return Err(NetstateError::invalid_value(
                    format!("{}.link-aggregation.port", name),
                    port,
                ));
            }
            if !seen.insert(port.as_str()) {
                return Err(NetstateError::InvalidArgument(format!(
                    "bond {} lists port {} twice",
                    name, port
                )));
            }
        }

        let Some(options) = &config.options else {
            return Ok(());
        };

        if let Some(primary) = &options.primary {
            if config.mode != Some(BondMode::ActiveBackup)
                && config.mode != Some(BondMode::BalanceTlb)
                && config.mode != Some(BondMode::BalanceAlb)
            {
                return Err(NetstateError::InvalidArgument(format!(
                    "bond {}: primary is only valid in active-backup, balance-tlb and balance-alb mode",
                    name
                )));
            }
            if config.port.is_some() && !ports.contains(primary) {
                return Err(NetstateError::invalid_value(
                    format!("{}.link-aggregation.options.primary", name),
                    format!("{} is not a port of the bond", primary),
                ));
            }
        }

        if options.xmit_hash_policy.is_some()
            && !matches!(
                config.mode,
                None | Some(BondMode::Xor) | Some(BondMode::Ieee8023ad) | Some(BondMode::BalanceTlb)
            )
        {
            return Err(NetstateError::InvalidArgument(format!(
                "bond {}: xmit-hash-policy requires balance-xor, 802.3ad or balance-tlb mode",
                name
            )));
        }

        // updelay/downdelay are rounded to miimon by the kernel
        if let Some(miimon) = options.miimon.filter(|m| *m > 0) {
            for (field, delay) in [("updelay", options.updelay), ("downdelay", options.downdelay)] {
                if let Some(delay) = delay {
                    if delay % miimon != 0 {
                        return Err(NetstateError::invalid_value(
                            format!("{}.link-aggregation.options.{}", name, field),
                            format!("{} is not a multiple of miimon {}", delay, miimon),
                        ));
                    }
                }
            }
        } else if options.updelay.unwrap_or(0) > 0 || options.downdelay.unwrap_or(0) > 0 {
            return Err(NetstateError::missing_field(format!(
                "{}.link-aggregation.options.miimon",
                name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstate_types::BondOptions;

    fn bond(mode: BondMode, ports: &[&str], options: Option<BondOptions>) -> BondConfig {
        BondConfig {
            mode: Some(mode),
            port: Some(ports.iter().map(|p| p.to_string()).collect()),
            options,
        }
    }

    #[test]
    fn test_bond_validation() {
        let config = bond(BondMode::ActiveBackup, &["eth1", "eth2"], None);
        assert!(BondManager::validate_config("bond0", &config).is_ok());

        let duplicate = bond(BondMode::ActiveBackup, &["eth1", "eth1"], None);
        assert!(BondManager::validate_config("bond0", &duplicate).is_err());

        let itself = bond(BondMode::ActiveBackup, &["bond0"], None);
        assert!(BondManager::validate_config("bond0", &itself).is_err());
    }

    #[test]
    fn test_primary_must_be_port() {
        let options = BondOptions {
            primary: Some("eth3".to_string()),
            ..Default::default()
        };
        let config = bond(BondMode::ActiveBackup, &["eth1", "eth2"], Some(options.clone()));
        assert!(BondManager::validate_config("bond0", &config).is_err());

        let rr = bond(BondMode::RoundRobin, &["eth3"], Some(options));
        assert!(BondManager::validate_config("bond0", &rr).is_err());
    }

    #[test]
    fn test_delays_follow_miimon() {
        let options = BondOptions {
            miimon: Some(100),
            updelay: Some(250),
            ..Default::default()
        };
        let config = bond(BondMode::Ieee8023ad, &["eth1"], Some(options));
        assert!(BondManager::validate_config("bond0", &config).is_err());

        let options = BondOptions {
            miimon: Some(100),
            updelay: Some(200),
            downdelay: Some(300),
            ..Default::default()
        };
        let config = bond(BondMode::Ieee8023ad, &["eth1"], Some(options));
        assert!(BondManager::validate_config("bond0", &config).is_ok());
    }
}
