//! Syntax validation for desired state documents
//!
//! Checks every entry of a document in isolation: names, value ranges,
//! address families and the type specific sections. Problems are collected
//! and reported together.

use std::collections::HashSet;

use regex::Regex;

use netstate_core::interface::{InterfaceValidator, MAX_NAME_LEN};
use netstate_core::types::{INTERFACE_NAME_REGEX, SEARCH_DOMAIN_REGEX};
use netstate_core::vlan::VlanManager;
use netstate_core::{NetstateError, Result};
use netstate_types::{DnsConfig, IfaceConfig, Interface, NetworkState, RouteEntry, RouteRuleEntry};

/// Syntax validator for desired states
pub struct SyntaxValidator {
    /// Valid interface name pattern
    interface_name_regex: Regex,
    /// Valid DNS search domain pattern
    search_domain_regex: Regex,
    /// Valid MTU range
    mtu_range: std::ops::RangeInclusive<u32>,
}

impl SyntaxValidator {
    /// Create new syntax validator
    pub fn new() -> Result<Self> {
        Ok(Self {
            interface_name_regex: compile(INTERFACE_NAME_REGEX)?,
            search_domain_regex: compile(SEARCH_DOMAIN_REGEX)?,
            mtu_range: 68..=65535,
        })
    }

    /// Validate a complete desired state
    pub fn validate_state(&self, state: &NetworkState) -> Result<()> {
        let mut errors = Vec::new();

        for iface in state.interfaces() {
            if let Err(e) = self.validate_interface(iface) {
                errors.push(format!("interface '{}': {}", iface.name, e));
            }
        }

        for route in state.routes() {
            self.validate_route(route, &mut errors);
        }

        for rule in state.route_rules() {
            self.validate_route_rule(rule, &mut errors);
        }

        if let Some(dns) = state.dns() {
            self.validate_dns(dns, &mut errors);
        }

        if !errors.is_empty() {
            return Err(NetstateError::InvalidArgument(errors.join("; ")));
        }

        self.log_naming_conventions(state);
        Ok(())
    }

    /// Validate individual interface syntax
    pub fn validate_interface(&self, iface: &Interface) -> Result<()> {
        let mut errors = Vec::new();

        if !self.interface_name_regex.is_match(&iface.name) {
            errors.push("invalid interface name format".to_string());
        }
        if iface.name.len() > MAX_NAME_LEN {
            errors.push(format!(
                "interface name too long (max {} characters)",
                MAX_NAME_LEN
            ));
        }

        if let Some(mtu) = iface.mtu {
            if !self.mtu_range.contains(&mtu) {
                errors.push(format!(
                    "invalid MTU value: {} (must be between {} and {})",
                    mtu,
                    self.mtu_range.start(),
                    self.mtu_range.end()
                ));
            }
        }

        if let Some(config) = &iface.config {
            self.validate_config_section(config, &mut errors);
        }

        if errors.is_empty() {
            if let Err(e) = InterfaceValidator::validate_interface(iface) {
                errors.push(e.to_string());
            }
        }

        if !errors.is_empty() {
            return Err(NetstateError::InvalidArgument(errors.join("; ")));
        }

        Ok(())
    }

    fn validate_config_section(&self, config: &IfaceConfig, errors: &mut Vec<String>) {
        match config {
            IfaceConfig::Bond(bond) => {
                for port in bond.port.iter().flatten() {
                    if !self.interface_name_regex.is_match(port) {
                        errors.push(format!("invalid bond port name: {}", port));
                    }
                }
            }
            IfaceConfig::LinuxBridge(bridge) => {
                for port in bridge.port.iter().flatten() {
                    if !self.interface_name_regex.is_match(&port.name) {
                        errors.push(format!("invalid bridge port name: {}", port.name));
                    }
                }
            }
            IfaceConfig::Vlan(vlan) => {
                if !self.interface_name_regex.is_match(&vlan.base_iface) {
                    errors.push(format!("invalid VLAN base interface name: {}", vlan.base_iface));
                }
            }
            IfaceConfig::Vrf(vrf) => {
                for port in vrf.port.iter().flatten() {
                    if !self.interface_name_regex.is_match(port) {
                        errors.push(format!("invalid VRF port name: {}", port));
                    }
                }
            }
            IfaceConfig::Veth(veth) => {
                if !self.interface_name_regex.is_match(&veth.peer) {
                    errors.push(format!("invalid veth peer name: {}", veth.peer));
                }
            }
            IfaceConfig::Ethernet(_) => {}
        }
    }

    fn validate_route(&self, route: &RouteEntry, errors: &mut Vec<String>) {
        if let Some(dev) = &route.next_hop_interface {
            if !self.interface_name_regex.is_match(dev) || dev.len() > MAX_NAME_LEN {
                errors.push(format!("route {}: invalid next-hop interface {}", route, dev));
            }
        }

        if route.is_absent() {
            return;
        }

        let Some(destination) = route.destination else {
            errors.push(format!("route {}: destination is required", route));
            return;
        };
        if route.next_hop_interface.is_none() && route.next_hop_address.is_none() {
            errors.push(format!(
                "route {}: next-hop interface or next-hop address is required",
                route
            ));
        }
        if let Some(gateway) = route.next_hop_address {
            if gateway.is_ipv4() != destination.addr().is_ipv4() {
                errors.push(format!(
                    "route {}: next-hop address family differs from destination",
                    route
                ));
            }
        }
    }

    fn validate_route_rule(&self, rule: &RouteRuleEntry, errors: &mut Vec<String>) {
        if !rule.is_absent() && rule.ip_from.is_none() && rule.ip_to.is_none() {
            errors.push(format!("{}: ip-from or ip-to is required", rule));
        }
        if let (Some(from), Some(to)) = (&rule.ip_from, &rule.ip_to) {
            if from.addr().is_ipv4() != to.addr().is_ipv4() {
                errors.push(format!("{}: ip-from and ip-to address families differ", rule));
            }
        }
        if rule.route_table == Some(0) {
            errors.push(format!("{}: route-table 0 is reserved", rule));
        }
    }

    fn validate_dns(&self, dns: &DnsConfig, errors: &mut Vec<String>) {
        let mut seen = HashSet::new();
        for server in dns.server.iter().flatten() {
            if !seen.insert(server) {
                errors.push(format!("duplicate DNS server {}", server));
            }
        }
        for domain in dns.search.iter().flatten() {
            if !self.search_domain_regex.is_match(domain) {
                errors.push(format!("invalid DNS search domain: {}", domain));
            }
        }
    }

    /// Unconventional names are allowed, only reported.
    fn log_naming_conventions(&self, state: &NetworkState) {
        for iface in state.interfaces() {
            if let Some(IfaceConfig::Vlan(vlan)) = &iface.config {
                let expected = VlanManager::generate_name(&vlan.base_iface, vlan.id);
                if iface.name != expected
                    && VlanManager::parse_vlan_name(&iface.name).is_some()
                {
                    log::warn!(
                        "VLAN interface '{}' looks like a VLAN name but is configured as {}",
                        iface.name,
                        expected
                    );
                }
            }
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| NetstateError::Bug(format!("invalid pattern {}: {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstate_core::ErrorKind;
    use netstate_types::{InterfaceType, VlanConfig};

    fn validator() -> SyntaxValidator {
        SyntaxValidator::new().unwrap()
    }

    #[test]
    fn test_valid_interface_validation() {
        let iface = Interface::new("eth0", InterfaceType::Ethernet).with_mtu(1500);
        assert!(validator().validate_interface(&iface).is_ok());
    }

    #[test]
    fn test_invalid_interface_name() {
        for name in ["0eth", "eth@0", "a-very-long-interface-name"] {
            let iface = Interface::new(name, InterfaceType::Ethernet);
            let err = validator().validate_interface(&iface).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", name);
        }
    }

    #[test]
    fn test_invalid_mtu() {
        let iface = Interface::new("eth0", InterfaceType::Ethernet).with_mtu(70000);
        assert!(validator().validate_interface(&iface).is_err());
        let iface = Interface::new("eth0", InterfaceType::Ethernet).with_mtu(50);
        assert!(validator().validate_interface(&iface).is_err());
    }

    #[test]
    fn test_invalid_vlan_id() {
        let iface = Interface::new("eth0.5000", InterfaceType::Vlan).with_config(IfaceConfig::Vlan(
            VlanConfig {
                base_iface: "eth0".to_string(),
                id: 5000,
                protocol: None,
            },
        ));
        assert!(validator().validate_interface(&iface).is_err());
    }

    #[test]
    fn test_route_syntax() {
        let mut errors = Vec::new();
        let route = RouteEntry::new("198.51.100.0/24".parse().unwrap(), "eth0")
            .with_gateway("2001:db8::1".parse().unwrap());
        validator().validate_route(&route, &mut errors);
        assert_eq!(errors.len(), 1);

        let mut errors = Vec::new();
        let route = RouteEntry {
            destination: Some("198.51.100.0/24".parse().unwrap()),
            ..Default::default()
        };
        validator().validate_route(&route, &mut errors);
        assert_eq!(errors.len(), 1);

        // absent routes act as filters and need no destination
        let mut errors = Vec::new();
        let route = RouteEntry {
            next_hop_interface: Some("eth0".to_string()),
            ..Default::default()
        }
        .absent();
        validator().validate_route(&route, &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_route_rule_syntax() {
        let mut errors = Vec::new();
        let rule = RouteRuleEntry {
            ip_from: Some("192.0.2.0/24".parse().unwrap()),
            ip_to: Some("2001:db8::/32".parse().unwrap()),
            route_table: Some(0),
            ..Default::default()
        };
        validator().validate_route_rule(&rule, &mut errors);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_dns_syntax() {
        let dns = DnsConfig::new(
            vec!["192.0.2.53".parse().unwrap(), "192.0.2.53".parse().unwrap()],
            vec!["example.org".to_string(), "bad domain".to_string()],
        );
        let state = NetworkState::new().with_dns(Some(dns));
        let err = validator().validate_state(&state).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("duplicate DNS server 192.0.2.53"));
        assert!(message.contains("bad domain"));
    }

    #[test]
    fn test_empty_state_is_valid() {
        assert!(validator().validate_state(&NetworkState::new()).is_ok());
    }
}
