//! Interface level validation and dependency relationships

use std::collections::BTreeSet;

use netstate_types::{IfaceConfig, Interface, InterfaceType};

use crate::bond::BondManager;
use crate::bridge::BridgeManager;
use crate::error::NetstateError;
use crate::vlan::VlanManager;
use crate::Result;

/// Kernel limit for interface names (IFNAMSIZ - 1).
pub const MAX_NAME_LEN: usize = 15;

/// Interface validation functions
pub struct InterfaceValidator;

impl InterfaceValidator {
    /// Validate interface name
    pub fn validate_name(name: &str) -> Result<()> {
        let valid = !name.is_empty()
            && name.len() <= MAX_NAME_LEN
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
        if !valid {
            return Err(NetstateError::invalid_value("interface name", name));
        }
        Ok(())
    }

    /// Validate a single interface in isolation.
    pub fn validate_interface(iface: &Interface) -> Result<()> {
        Self::validate_name(&iface.name)?;

        if iface.is_absent() {
            return Ok(());
        }

        if let Some(mtu) = iface.mtu {
            if mtu < 68 {
                return Err(NetstateError::invalid_value(
                    format!("{}.mtu", iface.name),
                    mtu,
                ));
            }
        }

        for (family, ip) in [("ipv4", &iface.ipv4), ("ipv6", &iface.ipv6)] {
            let Some(ip) = ip else { continue };
            if ip.enabled == Some(false) && (ip.dhcp == Some(true) || ip.address.is_some()) {
                return Err(NetstateError::InvalidArgument(format!(
                    "{}: {} is disabled but carries dhcp or addresses",
                    iface.name, family
                )));
            }
            let want_v4 = family == "ipv4";
            if let Some(addr) = ip
                .address
                .iter()
                .flatten()
                .find(|addr| addr.is_ipv4() != want_v4)
            {
                return Err(NetstateError::invalid_value(
                    format!("{}.{}.address", iface.name, family),
                    addr,
                ));
            }
        }

        match &iface.config {
            Some(IfaceConfig::Bond(bond)) => BondManager::validate_config(&iface.name, bond)?,
            Some(IfaceConfig::LinuxBridge(bridge)) => {
                BridgeManager::validate_config(&iface.name, bridge)?
            }
            Some(IfaceConfig::Vlan(vlan)) => VlanManager::validate_config(&iface.name, vlan)?,
            Some(IfaceConfig::Veth(veth)) => {
                Self::validate_name(&veth.peer)?;
                if veth.peer == iface.name {
                    return Err(NetstateError::invalid_value(
                        format!("{}.veth.peer", iface.name),
                        &veth.peer,
                    ));
                }
            }
            Some(IfaceConfig::Vrf(vrf)) => {
                if vrf.route_table_id == 0 {
                    return Err(NetstateError::invalid_value(
                        format!("{}.vrf.route-table-id", iface.name),
                        0,
                    ));
                }
                for port in vrf.port.iter().flatten() {
                    Self::validate_name(port)?;
                }
            }
            Some(IfaceConfig::Ethernet(_)) | None => {}
        }

        if iface.iface_type == InterfaceType::Veth && iface.veth_peer().is_none() {
            log::debug!("veth {} without peer section, peer must already exist", iface.name);
        }

        Ok(())
    }
}

/// Names `iface` needs to exist before it can be created: its VLAN base.
/// Controller/port relationships are derived from the controller side, see
/// [`dependency_edges`].
pub fn parents_of(iface: &Interface) -> Vec<String> {
    iface.vlan_base().map(str::to_string).into_iter().collect()
}

/// Ordering edges `(before, after)` implied by a set of interfaces.
///
/// - a VLAN comes after its base
/// - a port comes after its controller (bond, bridge, VRF)
/// - the peer of a veth comes after the veth declaring it; when both ends
///   declare each other, the lexically smaller name goes first
pub fn dependency_edges<'a>(
    ifaces: impl IntoIterator<Item = &'a Interface>,
) -> BTreeSet<(String, String)> {
    let ifaces: Vec<&Interface> = ifaces.into_iter().filter(|i| !i.is_absent()).collect();
    let mut edges = BTreeSet::new();
    for iface in &ifaces {
        for base in parents_of(iface) {
            edges.insert((base, iface.name.clone()));
        }
        for port in iface.ports().into_iter().flatten() {
            edges.insert((iface.name.clone(), port.to_string()));
        }
        if let Some(peer) = iface.veth_peer() {
            let mutual = ifaces
                .iter()
                .any(|other| other.name == peer && other.veth_peer() == Some(iface.name.as_str()));
            if !mutual || iface.name.as_str() < peer {
                edges.insert((iface.name.clone(), peer.to_string()));
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstate_types::{BridgeConfig, BridgePortConfig, VethConfig, VlanConfig};

    #[test]
    fn test_interface_name_validation() {
        assert!(InterfaceValidator::validate_name("eth0").is_ok());
        assert!(InterfaceValidator::validate_name("br-test").is_ok());
        assert!(InterfaceValidator::validate_name("bond_0").is_ok());
        assert!(InterfaceValidator::validate_name("eth1.101").is_ok());

        assert!(InterfaceValidator::validate_name("").is_err());
        assert!(InterfaceValidator::validate_name("0eth").is_err());
        assert!(InterfaceValidator::validate_name("eth@0").is_err());
        assert!(InterfaceValidator::validate_name("very-long-interface-name").is_err());
    }

    #[test]
    fn test_address_family_checked() {
        let iface = Interface::new("eth0", InterfaceType::Ethernet).with_ipv4(
            netstate_types::InterfaceIp::with_addresses(vec!["2001:db8::1/64".parse().unwrap()]),
        );
        assert!(InterfaceValidator::validate_interface(&iface).is_err());
    }

    #[test]
    fn test_low_mtu_rejected() {
        let iface = Interface::new("eth0", InterfaceType::Ethernet).with_mtu(67);
        assert!(InterfaceValidator::validate_interface(&iface).is_err());
    }

    #[test]
    fn test_dependency_edges() {
        let bridge = Interface::new("br0", InterfaceType::LinuxBridge).with_config(
            IfaceConfig::LinuxBridge(BridgeConfig {
                port: Some(vec![BridgePortConfig::new("eth1")]),
                options: None,
            }),
        );
        let vlan = Interface::new("eth1.10", InterfaceType::Vlan).with_config(IfaceConfig::Vlan(
            VlanConfig {
                base_iface: "eth1".to_string(),
                id: 10,
                protocol: None,
            },
        ));
        let veth_a = Interface::new("veth-a", InterfaceType::Veth).with_config(IfaceConfig::Veth(
            VethConfig {
                peer: "veth-b".to_string(),
            },
        ));
        let veth_b = Interface::new("veth-b", InterfaceType::Veth).with_config(IfaceConfig::Veth(
            VethConfig {
                peer: "veth-a".to_string(),
            },
        ));

        let edges = dependency_edges([&bridge, &vlan, &veth_a, &veth_b]);
        assert!(edges.contains(&("br0".to_string(), "eth1".to_string())));
        assert!(edges.contains(&("eth1".to_string(), "eth1.10".to_string())));
        assert!(edges.contains(&("veth-a".to_string(), "veth-b".to_string())));
        assert!(!edges.contains(&("veth-b".to_string(), "veth-a".to_string())));
    }
}
