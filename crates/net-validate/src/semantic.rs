//! Semantic validation of a desired state against the live state
//!
//! The desired state is partial, so relationships are checked on the
//! effective view: every live interface, overlaid with what the desired
//! state says about it.

use std::collections::{BTreeMap, HashMap, HashSet};

use netstate_core::vlan::VlanManager;
use netstate_core::{NetstateError, Result};
use netstate_types::{IfaceConfig, Interface, InterfaceType, NetworkState};

/// Semantic validator for desired states
pub struct SemanticValidator {}

/// One interface of the effective view.
struct Effective<'a> {
    iface: &'a Interface,
    /// Ports taken from desired if it lists them, else from the live entry.
    ports: Vec<&'a str>,
}

impl SemanticValidator {
    /// Create new semantic validator
    pub fn new() -> Self {
        Self {}
    }

    /// Validate `desired` as it would apply on top of `current`.
    pub fn validate(&self, desired: &NetworkState, current: &NetworkState) -> Result<()> {
        let view = effective_view(desired, current);
        let mut errors = Vec::new();

        if let Err(e) = self.validate_ip_conflicts(desired) {
            errors.push(format!("IP conflicts: {}", e));
        }

        if let Err(e) = self.validate_references(desired, &view) {
            errors.push(format!("Interface dependencies: {}", e));
        }

        if let Err(e) = self.validate_interface_usage(&view) {
            errors.push(format!("Interface usage: {}", e));
        }

        if let Err(e) = self.validate_circular_dependencies(&view) {
            errors.push(format!("Circular dependencies: {}", e));
        }

        if let Err(e) = self.validate_port_types(&view) {
            errors.push(format!("Controller/port conflicts: {}", e));
        }

        if let Err(e) = self.validate_vlan_ids(&view) {
            errors.push(format!("VLAN conflicts: {}", e));
        }

        if !errors.is_empty() {
            return Err(NetstateError::InvalidArgument(errors.join("; ")));
        }

        Ok(())
    }

    /// The same address may not be assigned to two interfaces.
    fn validate_ip_conflicts(&self, desired: &NetworkState) -> Result<()> {
        let mut used = HashMap::new();

        for iface in desired.interfaces().iter().filter(|i| !i.is_absent()) {
            let addresses = [&iface.ipv4, &iface.ipv6]
                .into_iter()
                .flatten()
                .flat_map(|ip| ip.address.iter().flatten());
            for addr in addresses {
                if let Some(existing) = used.insert(addr.addr, iface.name.as_str()) {
                    if existing != iface.name {
                        return Err(NetstateError::InvalidArgument(format!(
                            "duplicate IP address {} on interfaces '{}' and '{}'",
                            addr.addr, existing, iface.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Referenced interfaces must exist after the apply.
    fn validate_references(
        &self,
        desired: &NetworkState,
        view: &BTreeMap<&str, Effective<'_>>,
    ) -> Result<()> {
        let exists = |name: &str| view.contains_key(name);

        for (name, entry) in view {
            if let Some(base) = entry.iface.vlan_base() {
                if !exists(base) {
                    return Err(NetstateError::InvalidArgument(format!(
                        "{}: VLAN base interface '{}' not defined",
                        name, base
                    )));
                }
            }
            for port in &entry.ports {
                if desired.interface(*port).is_some_and(Interface::is_absent) {
                    return Err(NetstateError::InvalidArgument(format!(
                        "{}: port '{}' is marked absent",
                        name, port
                    )));
                }
                if !exists(*port) {
                    return Err(NetstateError::InvalidArgument(format!(
                        "{}: port '{}' not defined",
                        name, port
                    )));
                }
            }
        }

        for route in desired.routes().iter().filter(|r| !r.is_absent()) {
            if let Some(dev) = &route.next_hop_interface {
                if !exists(dev.as_str()) {
                    return Err(NetstateError::InvalidArgument(format!(
                        "route {}: next-hop interface '{}' not defined",
                        route, dev
                    )));
                }
            }
        }

        Ok(())
    }

    /// An interface can be the port of one controller only.
    fn validate_interface_usage(&self, view: &BTreeMap<&str, Effective<'_>>) -> Result<()> {
        let mut used_interfaces: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (name, entry) in view {
            for port in &entry.ports {
                used_interfaces.entry(*port).or_default().push(*name);
            }
        }

        for (iface, users) in used_interfaces {
            if users.len() > 1 {
                return Err(NetstateError::InvalidArgument(format!(
                    "interface '{}' used by multiple controllers: {}",
                    iface,
                    users.join(", ")
                )));
            }
        }

        Ok(())
    }

    /// Validate circular dependencies
    fn validate_circular_dependencies(&self, view: &BTreeMap<&str, Effective<'_>>) -> Result<()> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for name in view.keys() {
            if !visited.contains(name)
                && has_circular_dependency(view, *name, &mut visited, &mut rec_stack)
            {
                return Err(NetstateError::InvalidArgument(format!(
                    "circular dependency detected involving interface '{}'",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Bridges and loopback cannot be bridge ports, bond ports must be
    /// plain links.
    fn validate_port_types(&self, view: &BTreeMap<&str, Effective<'_>>) -> Result<()> {
        for (name, entry) in view {
            for port in &entry.ports {
                let Some(port_entry) = view.get(port) else {
                    continue;
                };
                let port_type = &port_entry.iface.iface_type;
                let rejected = match entry.iface.iface_type {
                    InterfaceType::LinuxBridge => matches!(
                        port_type,
                        InterfaceType::LinuxBridge | InterfaceType::Loopback
                    ),
                    InterfaceType::Bond => matches!(
                        port_type,
                        InterfaceType::LinuxBridge
                            | InterfaceType::Bond
                            | InterfaceType::Loopback
                            | InterfaceType::Vrf
                    ),
                    InterfaceType::Vrf => matches!(port_type, InterfaceType::Loopback),
                    _ => false,
                };
                if rejected {
                    return Err(NetstateError::InvalidArgument(format!(
                        "{}: cannot add {} interface '{}' as port",
                        name, port_type, port
                    )));
                }
            }
        }
        Ok(())
    }

    /// Two VLANs cannot share base and id.
    fn validate_vlan_ids(&self, view: &BTreeMap<&str, Effective<'_>>) -> Result<()> {
        for (name, entry) in view {
            if let Some(IfaceConfig::Vlan(vlan)) = &entry.iface.config {
                if VlanManager::is_id_used(view.values().map(|e| e.iface), name, vlan) {
                    return Err(NetstateError::InvalidArgument(format!(
                        "{}: VLAN id {} already used on '{}'",
                        name, vlan.id, vlan.base_iface
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for SemanticValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Live interfaces overlaid with desired ones, absent entries removed.
fn effective_view<'a>(
    desired: &'a NetworkState,
    current: &'a NetworkState,
) -> BTreeMap<&'a str, Effective<'a>> {
    let mut view = BTreeMap::new();

    for live in current.interfaces() {
        view.insert(
            live.name.as_str(),
            Effective {
                iface: live,
                ports: live.ports().unwrap_or_default(),
            },
        );
    }

    for want in desired.interfaces() {
        if want.is_absent() {
            view.remove(want.name.as_str());
            continue;
        }
        let ports = match want.ports() {
            Some(ports) => ports,
            None => current
                .interface(&want.name)
                .and_then(Interface::ports)
                .unwrap_or_default(),
        };
        let iface = match (&want.config, current.interface(&want.name)) {
            // keep the live section so VLAN base and peer stay visible
            (None, Some(live)) if live.config.is_some() => live,
            _ => want,
        };
        view.insert(want.name.as_str(), Effective { iface, ports });
    }

    view
}

/// Dependencies of an interface: its ports and its VLAN base.
fn dependencies<'a>(entry: &Effective<'a>) -> Vec<&'a str> {
    let mut deps = entry.ports.clone();
    deps.extend(entry.iface.vlan_base());
    deps
}

/// Check for circular dependency using DFS
fn has_circular_dependency<'a>(
    view: &BTreeMap<&'a str, Effective<'a>>,
    name: &'a str,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
) -> bool {
    visited.insert(name);
    rec_stack.insert(name);

    if let Some(entry) = view.get(name) {
        for dep in dependencies(entry) {
            if !visited.contains(dep) {
                if has_circular_dependency(view, dep, visited, rec_stack) {
                    return true;
                }
            } else if rec_stack.contains(dep) {
                return true;
            }
        }
    }

    rec_stack.remove(name);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstate_types::{
        BondConfig, BridgeConfig, BridgePortConfig, InterfaceIp, VlanConfig,
    };

    fn bridge(name: &str, ports: &[&str]) -> Interface {
        Interface::new(name, InterfaceType::LinuxBridge).with_config(IfaceConfig::LinuxBridge(
            BridgeConfig {
                port: Some(ports.iter().map(|p| BridgePortConfig::new(*p)).collect()),
                options: None,
            },
        ))
    }

    fn bond(name: &str, ports: &[&str]) -> Interface {
        Interface::new(name, InterfaceType::Bond).with_config(IfaceConfig::Bond(BondConfig {
            mode: None,
            port: Some(ports.iter().map(|p| p.to_string()).collect()),
            options: None,
        }))
    }

    fn vlan(name: &str, base: &str, id: u16) -> Interface {
        Interface::new(name, InterfaceType::Vlan).with_config(IfaceConfig::Vlan(VlanConfig {
            base_iface: base.to_string(),
            id,
            protocol: None,
        }))
    }

    fn ethernet(name: &str) -> Interface {
        Interface::new(name, InterfaceType::Ethernet)
    }

    fn state(ifaces: Vec<Interface>) -> NetworkState {
        let mut builder = NetworkState::builder();
        for iface in ifaces {
            builder = builder.interface(iface);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_ip_conflict_detection() {
        let addr = || InterfaceIp::with_addresses(vec!["192.168.1.10/24".parse().unwrap()]);
        let desired = state(vec![
            ethernet("eth0").with_ipv4(addr()),
            ethernet("eth1").with_ipv4(addr()),
        ]);
        let err = SemanticValidator::new()
            .validate(&desired, &NetworkState::new())
            .unwrap_err();
        assert!(err.to_string().contains("duplicate IP address 192.168.1.10"));
    }

    #[test]
    fn test_missing_port_rejected() {
        let desired = state(vec![bridge("br0", &["nonexistent"])]);
        assert!(SemanticValidator::new()
            .validate(&desired, &NetworkState::new())
            .is_err());
    }

    #[test]
    fn test_port_from_live_state_accepted() {
        let current = state(vec![ethernet("eth1")]);
        let desired = state(vec![bridge("br0", &["eth1"])]);
        assert!(SemanticValidator::new().validate(&desired, &current).is_ok());
    }

    #[test]
    fn test_absent_port_rejected() {
        let current = state(vec![ethernet("eth1")]);
        let desired = state(vec![
            bridge("br0", &["eth1"]),
            Interface::absent("eth1", InterfaceType::Ethernet),
        ]);
        assert!(SemanticValidator::new().validate(&desired, &current).is_err());
    }

    #[test]
    fn test_port_shared_between_controllers() {
        let current = state(vec![ethernet("eth1"), bridge("br0", &["eth1"])]);
        let desired = state(vec![bond("bond0", &["eth1"])]);
        let err = SemanticValidator::new()
            .validate(&desired, &current)
            .unwrap_err();
        assert!(err.to_string().contains("used by multiple controllers"));
    }

    #[test]
    fn test_circular_dependency() {
        let desired = state(vec![bond("bond0", &["bond1"]), bond("bond1", &["bond0"])]);
        let err = SemanticValidator::new()
            .validate(&desired, &NetworkState::new())
            .unwrap_err();
        assert!(err.to_string().contains("circular dependency"));
    }

    #[test]
    fn test_bridge_as_bridge_port() {
        let desired = state(vec![bridge("br0", &["br1"]), bridge("br1", &[])]);
        assert!(SemanticValidator::new()
            .validate(&desired, &NetworkState::new())
            .is_err());
    }

    #[test]
    fn test_vlan_base_and_id() {
        let current = state(vec![ethernet("eth0"), vlan("eth0.100", "eth0", 100)]);

        let desired = state(vec![vlan("vlan100", "eth0", 100)]);
        assert!(SemanticValidator::new().validate(&desired, &current).is_err());

        let desired = state(vec![vlan("eth0.101", "eth0", 101)]);
        assert!(SemanticValidator::new().validate(&desired, &current).is_ok());

        let desired = state(vec![vlan("eth9.101", "eth9", 101)]);
        assert!(SemanticValidator::new().validate(&desired, &current).is_err());
    }

    #[test]
    fn test_route_device_must_exist() {
        let desired = NetworkState::builder()
            .route(netstate_types::RouteEntry::new(
                "198.51.100.0/24".parse().unwrap(),
                "eth7",
            ))
            .build()
            .unwrap();
        assert!(SemanticValidator::new()
            .validate(&desired, &NetworkState::new())
            .is_err());
    }
}
