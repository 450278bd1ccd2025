//! State differ
//!
//! Computes the ordered [`ChangeSet`] that turns a current state into a
//! desired one. Operations are emitted in this order:
//!
//! 1. route and route rule removals
//! 2. interface deletions, dependents first
//! 3. interface creations and modifications, dependencies first
//! 4. route additions, route rule additions, DNS
//!
//! Ties are broken by interface name so the result is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use netstate_core::compare::{
    dns_mismatches, interface_mismatches, kernel_view, route_present, rule_present,
};
use netstate_core::interface::dependency_edges;
use netstate_core::{
    ApplyFlags, ChangeSet, CompareMode, CompareOptions, DnsConfig, Interface, InterfaceType,
    NetstateError, NetworkState, Operation, OperationKind, OperationTarget, Result, RouteEntry,
    RouteRuleEntry,
};

/// Changes needed to bring `current` to the partial `desired` state.
pub fn diff(current: &NetworkState, desired: &NetworkState, flags: ApplyFlags) -> Result<ChangeSet> {
    let opts = CompareOptions::from(flags);
    let mut plan = Plan::new(false);

    for want in desired.interfaces() {
        match current.interface(&want.name) {
            Some(have) if want.is_absent() => plan.delete(have),
            None if want.is_absent() => {}
            None => {
                if want.iface_type == InterfaceType::Unknown {
                    return Err(NetstateError::InvalidArgument(format!(
                        "interface {}: type is required to create it",
                        want.name
                    )));
                }
                plan.update(OperationKind::Create, payload(want, flags));
            }
            Some(have) => {
                let mismatches = interface_mismatches(want, have, &opts, CompareMode::Merge);
                if !mismatches.is_empty() {
                    for mismatch in &mismatches {
                        debug!("{}", mismatch);
                    }
                    plan.update(OperationKind::Modify, payload(want, flags));
                }
            }
        }
    }

    for want in desired.routes() {
        if want.is_absent() {
            for have in current.routes().iter().filter(|have| want.matches(have)) {
                plan.remove_route(have);
            }
        } else if !route_present(current.routes(), want) {
            plan.add_route(want);
        }
    }

    for want in desired.route_rules() {
        if want.is_absent() {
            for have in current.route_rules().iter().filter(|have| want.matches(have)) {
                plan.remove_rule(have);
            }
        } else if !rule_present(current.route_rules(), want) {
            plan.add_rule(want);
        }
    }

    if !flags.kernel_only() {
        if let Some(dns) = desired.dns() {
            let mut mismatches = Vec::new();
            dns_mismatches(Some(dns), current.dns(), CompareMode::Merge, &mut mismatches);
            if !mismatches.is_empty() {
                plan.set_dns(dns.clone(), current.dns().is_some());
            }
        }
    }

    plan.into_change_set(current, desired)
}

/// Changes that make `current` identical to `target`, used for rollback.
///
/// Interfaces, routes and rules missing from `target` are removed and
/// differing interfaces are replaced wholesale.
pub fn diff_replace(current: &NetworkState, target: &NetworkState) -> Result<ChangeSet> {
    let opts = CompareOptions {
        include_secrets: true,
        ..Default::default()
    };
    let mut plan = Plan::new(true);

    for have in current.interfaces() {
        if target.interface(&have.name).map_or(true, Interface::is_absent) {
            plan.delete(have);
        }
    }

    for want in target.interfaces().iter().filter(|i| !i.is_absent()) {
        let mut want = want.clone();
        want.strip_status();
        match current.interface(&want.name) {
            None => plan.update(OperationKind::Create, want),
            Some(have) => {
                if !interface_mismatches(&want, have, &opts, CompareMode::Replace).is_empty() {
                    plan.update(OperationKind::Modify, want);
                }
            }
        }
    }

    for have in current.routes() {
        if !route_present(target.routes(), have) {
            plan.remove_route(have);
        }
    }
    for want in target.routes() {
        if !route_present(current.routes(), want) {
            plan.add_route(want);
        }
    }

    for have in current.route_rules() {
        if !rule_present(target.route_rules(), have) {
            plan.remove_rule(have);
        }
    }
    for want in target.route_rules() {
        if !rule_present(current.route_rules(), want) {
            plan.add_rule(want);
        }
    }

    let mut mismatches = Vec::new();
    dns_mismatches(target.dns(), current.dns(), CompareMode::Replace, &mut mismatches);
    if !mismatches.is_empty() {
        plan.set_dns(target.dns().cloned().unwrap_or_default(), true);
    }

    plan.into_change_set(current, target)
}

/// Interface payload handed to the driver.
fn payload(want: &Interface, flags: ApplyFlags) -> Interface {
    let mut iface = if flags.kernel_only() {
        kernel_view(want)
    } else {
        want.clone()
    };
    iface.strip_status();
    iface
}

/// Unordered operations collected while walking both states.
struct Plan {
    replace: bool,
    route_removals: Vec<Operation>,
    rule_removals: Vec<Operation>,
    deletes: BTreeMap<String, Interface>,
    updates: BTreeMap<String, (OperationKind, Interface)>,
    route_additions: Vec<Operation>,
    rule_additions: Vec<Operation>,
    dns: Option<Operation>,
}

impl Plan {
    fn new(replace: bool) -> Self {
        Self {
            replace,
            route_removals: Vec::new(),
            rule_removals: Vec::new(),
            deletes: BTreeMap::new(),
            updates: BTreeMap::new(),
            route_additions: Vec::new(),
            rule_additions: Vec::new(),
            dns: None,
        }
    }

    fn delete(&mut self, have: &Interface) {
        self.deletes.insert(
            have.name.clone(),
            Interface::absent(have.name.clone(), have.iface_type),
        );
    }

    fn update(&mut self, kind: OperationKind, iface: Interface) {
        self.updates.insert(iface.name.clone(), (kind, iface));
    }

    fn remove_route(&mut self, route: &RouteEntry) {
        let op = Operation::new(OperationKind::Delete, OperationTarget::Route(route.present()));
        if !self.route_removals.contains(&op) {
            self.route_removals.push(op);
        }
    }

    fn add_route(&mut self, route: &RouteEntry) {
        let depends_on = route.next_hop_interface.iter().cloned().collect();
        self.route_additions.push(
            Operation::new(OperationKind::Create, OperationTarget::Route(route.present()))
                .with_depends_on(depends_on),
        );
    }

    fn remove_rule(&mut self, rule: &RouteRuleEntry) {
        let op = Operation::new(OperationKind::Delete, OperationTarget::RouteRule(rule.present()));
        if !self.rule_removals.contains(&op) {
            self.rule_removals.push(op);
        }
    }

    fn add_rule(&mut self, rule: &RouteRuleEntry) {
        self.rule_additions.push(Operation::new(
            OperationKind::Create,
            OperationTarget::RouteRule(rule.present()),
        ));
    }

    fn set_dns(&mut self, dns: DnsConfig, exists: bool) {
        let kind = if exists {
            OperationKind::Modify
        } else {
            OperationKind::Create
        };
        self.dns = Some(Operation::new(kind, OperationTarget::Dns(dns)).with_replace(self.replace));
    }

    fn into_change_set(self, current: &NetworkState, desired: &NetworkState) -> Result<ChangeSet> {
        let mut changes = ChangeSet::new();
        changes.extend(self.route_removals);
        changes.extend(self.rule_removals);

        // Deletions run against the live relationships, reversed.
        let live_edges: BTreeSet<(String, String)> = dependency_edges(current.interfaces())
            .into_iter()
            .map(|(before, after)| (after, before))
            .collect();
        let delete_names: BTreeSet<String> = self.deletes.keys().cloned().collect();
        let mut deletes = self.deletes;
        for name in topological_order(&delete_names, &live_edges)? {
            if let Some(iface) = deletes.remove(&name) {
                let depends_on = predecessors(&name, &delete_names, &live_edges);
                changes.push(
                    Operation::new(OperationKind::Delete, OperationTarget::Interface(iface))
                        .with_depends_on(depends_on),
                );
            }
        }

        let edges = dependency_edges(desired.interfaces());
        let update_names: BTreeSet<String> = self.updates.keys().cloned().collect();
        let mut updates = self.updates;
        // veth peers created as a side effect of their other end
        let mut implicit = BTreeSet::new();
        for name in topological_order(&update_names, &edges)? {
            let Some((mut kind, iface)) = updates.remove(&name) else {
                continue;
            };
            if kind == OperationKind::Create {
                if implicit.contains(&name) {
                    kind = OperationKind::Modify;
                } else if let Some(peer) = iface.veth_peer() {
                    if !current.interfaces().contains(peer) {
                        implicit.insert(peer.to_string());
                    }
                }
            }
            let depends_on = edges
                .iter()
                .filter(|(_, after)| *after == name)
                .map(|(before, _)| before.clone())
                .filter(|before| {
                    update_names.contains(before) || current.interfaces().contains(before)
                })
                .collect();
            changes.push(
                Operation::new(kind, OperationTarget::Interface(iface))
                    .with_depends_on(depends_on)
                    .with_replace(self.replace),
            );
        }

        changes.extend(self.route_additions);
        changes.extend(self.rule_additions);
        changes.extend(self.dns);

        for operation in &changes {
            debug!("planned: {}", operation);
        }
        Ok(changes)
    }
}

fn predecessors(name: &str, nodes: &BTreeSet<String>, edges: &BTreeSet<(String, String)>) -> Vec<String> {
    edges
        .iter()
        .filter(|(before, after)| after == name && nodes.contains(before))
        .map(|(before, _)| before.clone())
        .collect()
}

/// Kahn's algorithm over `nodes`, considering only edges between them.
/// Among ready nodes the smallest name goes first.
fn topological_order(
    nodes: &BTreeSet<String>,
    edges: &BTreeSet<(String, String)>,
) -> Result<Vec<String>> {
    let edges: Vec<(&str, &str)> = edges
        .iter()
        .filter(|(before, after)| before != after && nodes.contains(before) && nodes.contains(after))
        .map(|(before, after)| (before.as_str(), after.as_str()))
        .collect();

    let mut indegree: BTreeMap<&str, usize> = nodes.iter().map(|n| (n.as_str(), 0)).collect();
    for (_, after) in &edges {
        if let Some(degree) = indegree.get_mut(after) {
            *degree += 1;
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(node) = ready.pop_first() {
        order.push(node.to_string());
        for (before, after) in &edges {
            if *before != node {
                continue;
            }
            if let Some(degree) = indegree.get_mut(after) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*after);
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck: Vec<&str> = indegree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(name, _)| *name)
            .collect();
        return Err(NetstateError::InvalidArgument(format!(
            "dependency cycle between interfaces: {}",
            stuck.join(", ")
        )));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstate_core::ErrorKind;
    use netstate_types::{
        BondConfig, BridgeConfig, BridgePortConfig, IfaceConfig, Ieee8021xConfig, VethConfig,
        VlanConfig,
    };

    fn eth(name: &str) -> Interface {
        Interface::new(name, InterfaceType::Ethernet)
    }

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

    fn veth(name: &str, peer: &str) -> Interface {
        Interface::new(name, InterfaceType::Veth).with_config(IfaceConfig::Veth(VethConfig {
            peer: peer.to_string(),
        }))
    }

    fn state(ifaces: Vec<Interface>) -> NetworkState {
        let mut builder = NetworkState::builder();
        for iface in ifaces {
            builder = builder.interface(iface);
        }
        builder.build().unwrap()
    }

    fn names(changes: &ChangeSet) -> Vec<String> {
        changes.iter().map(|op| op.description()).collect()
    }

    #[test]
    fn test_diff_of_identical_states_is_empty() {
        let s = state(vec![eth("eth1").with_mtu(1500), bridge("br0", &["eth1"])]);
        assert!(diff(&s, &s, ApplyFlags::empty()).unwrap().is_empty());
        assert!(diff_replace(&s, &s).unwrap().is_empty());
    }

    #[test]
    fn test_create_single_interface() {
        let desired = state(vec![eth("eth1")]);
        let changes = diff(&NetworkState::new(), &desired, ApplyFlags::empty()).unwrap();
        assert_eq!(names(&changes), vec!["create interface eth1 (ethernet)"]);
    }

    #[test]
    fn test_unknown_type_cannot_be_created() {
        let desired = state(vec![Interface::new("eth1", InterfaceType::Unknown)]);
        let err = diff(&NetworkState::new(), &desired, ApplyFlags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_absent_and_missing_is_noop() {
        let desired = state(vec![Interface::absent("eth9", InterfaceType::Ethernet)]);
        assert!(diff(&NetworkState::new(), &desired, ApplyFlags::empty())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_controller_before_ports_and_base_before_vlan() {
        let desired = state(vec![
            vlan("eth1.10", "eth1", 10),
            eth("eth2"),
            eth("eth1"),
            bridge("br0", &["eth2"]),
        ]);
        let changes = diff(&NetworkState::new(), &desired, ApplyFlags::empty()).unwrap();
        assert_eq!(
            names(&changes),
            vec![
                "create interface br0 (linux-bridge)",
                "create interface eth1 (ethernet)",
                "create interface eth1.10 (vlan)",
                "create interface eth2 (ethernet)",
            ]
        );
        let vlan_op = &changes.operations()[2];
        assert_eq!(vlan_op.depends_on, vec!["eth1".to_string()]);
    }

    #[test]
    fn test_deletes_are_reversed() {
        let current = state(vec![eth("eth1"), vlan("eth1.10", "eth1", 10), bridge("br0", &["eth1"])]);
        let desired = state(vec![
            Interface::absent("eth1", InterfaceType::Ethernet),
            Interface::absent("eth1.10", InterfaceType::Vlan),
            Interface::absent("br0", InterfaceType::LinuxBridge),
        ]);
        let changes = diff(&current, &desired, ApplyFlags::empty()).unwrap();
        assert_eq!(
            names(&changes),
            vec![
                "delete interface eth1.10 (vlan)",
                "delete interface eth1 (ethernet)",
                "delete interface br0 (linux-bridge)",
            ]
        );
    }

    #[test]
    fn test_dependency_cycle() {
        let desired = state(vec![bond("bond0", &["bond1"]), bond("bond1", &["bond0"])]);
        let err = diff(&NetworkState::new(), &desired, ApplyFlags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("bond0, bond1"));
    }

    #[test]
    fn test_veth_peer_becomes_modify() {
        let desired = state(vec![veth("veth-b", "veth-a"), veth("veth-a", "veth-b")]);
        let changes = diff(&NetworkState::new(), &desired, ApplyFlags::empty()).unwrap();
        assert_eq!(
            names(&changes),
            vec!["create interface veth-a (veth)", "modify interface veth-b (veth)"]
        );
    }

    #[test]
    fn test_partial_desired_keeps_current() {
        let current = state(vec![eth("eth1").with_mtu(1500).with_description("uplink")]);
        let desired = state(vec![eth("eth1").with_mtu(1500)]);
        assert!(diff(&current, &desired, ApplyFlags::empty()).unwrap().is_empty());

        let desired = state(vec![eth("eth1").with_mtu(9000)]);
        let changes = diff(&current, &desired, ApplyFlags::empty()).unwrap();
        assert_eq!(names(&changes), vec!["modify interface eth1 (ethernet)"]);
    }

    #[test]
    fn test_kernel_only_ignores_dns_and_description() {
        let current = state(vec![eth("eth1")]);
        let desired = state(vec![eth("eth1").with_description("uplink")]).with_dns(Some(
            DnsConfig::new(vec!["192.0.2.53".parse().unwrap()], vec![]),
        ));
        assert!(diff(&current, &desired, ApplyFlags::KERNEL_ONLY)
            .unwrap()
            .is_empty());
        assert_eq!(diff(&current, &desired, ApplyFlags::empty()).unwrap().len(), 2);
    }

    #[test]
    fn test_secrets_redacted_in_rendering() {
        let mut iface = eth("eth1");
        iface.ieee8021x = Some(Ieee8021xConfig {
            identity: Some("host".to_string()),
            password: Some("s3cret".to_string()),
            ..Default::default()
        });
        let desired = state(vec![iface]);
        let changes = diff(&NetworkState::new(), &desired, ApplyFlags::empty()).unwrap();
        assert!(!changes.to_string().contains("s3cret"));
        assert!(changes.render(true).contains("s3cret"));
        // the driver payload keeps the credential
        let payload = changes.operations()[0].interface().unwrap();
        assert_eq!(
            payload.ieee8021x.as_ref().unwrap().password.as_deref(),
            Some("s3cret")
        );
    }

    #[test]
    fn test_routes_removed_first_and_added_last() {
        let route_old = RouteEntry::new("198.51.100.0/24".parse().unwrap(), "eth1");
        let route_new = RouteEntry::new("203.0.113.0/24".parse().unwrap(), "eth2");
        let current = NetworkState::builder()
            .interface(eth("eth1"))
            .route(route_old.clone())
            .build()
            .unwrap();
        let desired = NetworkState::builder()
            .interface(eth("eth2"))
            .route(route_old.clone().absent())
            .route(route_new.clone())
            .build()
            .unwrap();
        let changes = diff(&current, &desired, ApplyFlags::empty()).unwrap();
        let ops = changes.operations();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].kind, OperationKind::Delete);
        assert_eq!(ops[0].target, OperationTarget::Route(route_old));
        assert_eq!(ops[1].description(), "create interface eth2 (ethernet)");
        assert_eq!(ops[2].target, OperationTarget::Route(route_new));
        assert_eq!(ops[2].depends_on, vec!["eth2".to_string()]);
    }

    #[test]
    fn test_replace_diff_restores_target() {
        let target = state(vec![eth("eth1").with_mtu(1500)]);
        let current = state(vec![eth("eth1").with_mtu(9000), vlan("eth1.10", "eth1", 10)])
            .with_dns(Some(DnsConfig::new(vec!["192.0.2.53".parse().unwrap()], vec![])));
        let changes = diff_replace(&current, &target).unwrap();
        assert_eq!(
            names(&changes),
            vec![
                "delete interface eth1.10 (vlan)",
                "modify interface eth1 (ethernet)",
                "modify dns dns-resolver",
            ]
        );
        assert!(changes.iter().skip(1).all(|op| op.replace));
    }
}
