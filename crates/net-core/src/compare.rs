//! Comparison rules shared by the differ and the verifier.
//!
//! Interfaces are compared through their document form: each side is
//! serialized, normalized according to the active flags, and then walked
//! key by key. In merge mode only the keys present on the desired side are
//! checked; in replace mode both sides must be identical.

use std::fmt;

use serde_json::{Map, Value};

use netstate_types::{DnsConfig, Interface, NetworkState, RouteEntry, RouteRuleEntry};

use crate::flags::ApplyFlags;

const STATUS_KEYS: &[&str] = &["ifindex", "driver", "permanent-mac-address", "oper-state"];
const NON_KERNEL_KEYS: &[&str] = &["description", "802.1x"];
const UNORDERED_LISTS: &[(&str, &str)] = &[
    ("ipv4", "address"),
    ("ipv6", "address"),
    ("link-aggregation", "port"),
    ("bridge", "port"),
    ("vrf", "port"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    /// Desired is partial, unspecified fields keep their current value.
    Merge,
    /// Desired is authoritative.
    Replace,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    pub kernel_only: bool,
    pub include_status_data: bool,
    pub include_secrets: bool,
}

impl From<ApplyFlags> for CompareOptions {
    fn from(flags: ApplyFlags) -> Self {
        Self {
            kernel_only: flags.kernel_only(),
            include_status_data: flags.include_status_data(),
            include_secrets: flags.include_secrets(),
        }
    }
}

/// One diverged field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub target: String,
    pub field: String,
    pub desired: String,
    pub current: String,
}

impl Mismatch {
    fn new(target: &str, field: &str, desired: String, current: String) -> Self {
        Self {
            target: target.to_string(),
            field: field.to_string(),
            desired,
            current,
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: desired {}, current {}",
            self.target, self.field, self.desired, self.current
        )
    }
}

/// Copy of `iface` restricted to kernel visible attributes.
pub fn kernel_view(iface: &Interface) -> Interface {
    let mut iface = iface.clone();
    iface.description = None;
    iface.ieee8021x = None;
    for ip in [iface.ipv4.as_mut(), iface.ipv6.as_mut()].into_iter().flatten() {
        ip.dhcp = None;
    }
    iface
}

/// Document form of an interface with the flag-dependent fields removed and
/// unordered lists sorted.
pub fn normalize_interface(iface: &Interface, opts: &CompareOptions) -> Value {
    let mut value = match serde_json::to_value(iface) {
        Ok(Value::Object(map)) => map,
        _ => return Value::Null,
    };
    value.remove("name");
    value.remove("type");

    if !opts.include_status_data {
        for key in STATUS_KEYS {
            value.remove(*key);
        }
    }
    if opts.kernel_only {
        for key in NON_KERNEL_KEYS {
            value.remove(*key);
        }
        for family in ["ipv4", "ipv6"] {
            if let Some(Value::Object(ip)) = value.get_mut(family) {
                ip.remove("dhcp");
            }
        }
    } else if !opts.include_secrets {
        if let Some(Value::Object(conf)) = value.get_mut("802.1x") {
            conf.remove("password");
        }
    }

    for key in ["mac-address", "permanent-mac-address"] {
        if let Some(Value::String(mac)) = value.get_mut(key) {
            *mac = mac.to_lowercase();
        }
    }
    for (section, list) in UNORDERED_LISTS {
        if let Some(Value::Array(items)) = value
            .get_mut(*section)
            .and_then(|s| s.as_object_mut())
            .and_then(|s| s.get_mut(*list))
        {
            items.sort_by_key(|item| item.to_string());
        }
    }

    Value::Object(value)
}

/// Fields of one interface that differ between desired and current.
pub fn interface_mismatches(
    desired: &Interface,
    current: &Interface,
    opts: &CompareOptions,
    mode: CompareMode,
) -> Vec<Mismatch> {
    let mut out = Vec::new();
    let type_ok = match mode {
        CompareMode::Merge => desired.iface_type.is_compatible_with(&current.iface_type),
        CompareMode::Replace => desired.iface_type == current.iface_type,
    };
    if !type_ok {
        out.push(Mismatch::new(
            &desired.name,
            "type",
            desired.iface_type.to_string(),
            current.iface_type.to_string(),
        ));
    }

    let desired_value = normalize_interface(desired, opts);
    let current_value = normalize_interface(current, opts);
    match mode {
        CompareMode::Merge => {
            merge_walk(&desired.name, "", &desired_value, &current_value, &mut out)
        }
        CompareMode::Replace => {
            replace_walk(&desired.name, "", &desired_value, &current_value, &mut out)
        }
    }
    out
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn merge_walk(target: &str, path: &str, desired: &Value, current: &Value, out: &mut Vec<Mismatch>) {
    match (desired, current) {
        (Value::Object(want), Value::Object(have)) => {
            for (key, want_value) in want {
                let field = join_path(path, key);
                match have.get(key) {
                    Some(have_value) => merge_walk(target, &field, want_value, have_value, out),
                    None => out.push(Mismatch::new(
                        target,
                        &field,
                        want_value.to_string(),
                        "null".to_string(),
                    )),
                }
            }
        }
        (want, have) if want != have => out.push(Mismatch::new(
            target,
            if path.is_empty() { "<root>" } else { path },
            want.to_string(),
            have.to_string(),
        )),
        _ => {}
    }
}

fn replace_walk(
    target: &str,
    path: &str,
    desired: &Value,
    current: &Value,
    out: &mut Vec<Mismatch>,
) {
    match (desired, current) {
        (Value::Object(want), Value::Object(have)) => {
            let empty = Map::new();
            let mut keys: Vec<&String> = want.keys().chain(have.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let field = join_path(path, key);
                let want_value = want.get(key).unwrap_or(&Value::Null);
                let have_value = have.get(key).unwrap_or(&Value::Null);
                if want_value.is_object() || have_value.is_object() {
                    let want_value = match want_value {
                        Value::Null => Value::Object(empty.clone()),
                        other => other.clone(),
                    };
                    let have_value = match have_value {
                        Value::Null => Value::Object(empty.clone()),
                        other => other.clone(),
                    };
                    replace_walk(target, &field, &want_value, &have_value, out);
                } else if want_value != have_value {
                    out.push(Mismatch::new(
                        target,
                        &field,
                        want_value.to_string(),
                        have_value.to_string(),
                    ));
                }
            }
        }
        (want, have) if want != have => out.push(Mismatch::new(
            target,
            if path.is_empty() { "<root>" } else { path },
            want.to_string(),
            have.to_string(),
        )),
        _ => {}
    }
}

/// Whether `routes` holds `wanted`, ignoring its `state`.
pub fn route_present(routes: &[RouteEntry], wanted: &RouteEntry) -> bool {
    let wanted = wanted.present();
    routes.iter().any(|r| r.present() == wanted)
}

pub fn rule_present(rules: &[RouteRuleEntry], wanted: &RouteRuleEntry) -> bool {
    let wanted = wanted.present();
    rules.iter().any(|r| r.present() == wanted)
}

fn dns_list<T: fmt::Debug>(list: &Option<Vec<T>>) -> String {
    match list {
        Some(items) => format!("{:?}", items),
        None => "[]".to_string(),
    }
}

/// DNS divergences; in merge mode an unset list keeps the current one.
pub fn dns_mismatches(
    desired: Option<&DnsConfig>,
    current: Option<&DnsConfig>,
    mode: CompareMode,
    out: &mut Vec<Mismatch>,
) {
    let empty = DnsConfig::default();
    let current = current.unwrap_or(&empty);
    let desired = match (desired, mode) {
        (Some(dns), _) => dns,
        (None, CompareMode::Replace) => &empty,
        (None, CompareMode::Merge) => return,
    };
    let servers_differ = match (&desired.server, mode) {
        (None, CompareMode::Merge) => false,
        (wanted, _) => {
            wanted.clone().unwrap_or_default() != current.server.clone().unwrap_or_default()
        }
    };
    if servers_differ {
        out.push(Mismatch::new(
            "dns-resolver",
            "server",
            dns_list(&desired.server),
            dns_list(&current.server),
        ));
    }
    let search_differs = match (&desired.search, mode) {
        (None, CompareMode::Merge) => false,
        (wanted, _) => {
            wanted.clone().unwrap_or_default() != current.search.clone().unwrap_or_default()
        }
    };
    if search_differs {
        out.push(Mismatch::new(
            "dns-resolver",
            "search",
            dns_list(&desired.search),
            dns_list(&current.search),
        ));
    }
}

/// Every divergence between a desired state and the live state.
pub fn state_mismatches(
    desired: &NetworkState,
    current: &NetworkState,
    opts: &CompareOptions,
    mode: CompareMode,
) -> Vec<Mismatch> {
    let mut out = Vec::new();

    for want in desired.interfaces() {
        match current.interface(&want.name) {
            Some(_) if want.is_absent() => out.push(Mismatch::new(
                &want.name,
                "state",
                "absent".to_string(),
                "present".to_string(),
            )),
            Some(have) => out.extend(interface_mismatches(want, have, opts, mode)),
            None if want.is_absent() => {}
            None => out.push(Mismatch::new(
                &want.name,
                "state",
                want.state.to_string(),
                "missing".to_string(),
            )),
        }
    }
    if mode == CompareMode::Replace {
        for have in current.interfaces() {
            if !desired.interfaces().contains(&have.name) {
                out.push(Mismatch::new(
                    &have.name,
                    "state",
                    "missing".to_string(),
                    have.state.to_string(),
                ));
            }
        }
    }

    for want in desired.routes() {
        let target = format!("route {}", want);
        if want.is_absent() {
            if current.routes().iter().any(|r| want.matches(r)) {
                out.push(Mismatch::new(
                    &target,
                    "state",
                    "absent".to_string(),
                    "present".to_string(),
                ));
            }
        } else if !route_present(current.routes(), want) {
            out.push(Mismatch::new(
                &target,
                "state",
                "present".to_string(),
                "missing".to_string(),
            ));
        }
    }
    if mode == CompareMode::Replace {
        for have in current.routes() {
            if !route_present(desired.routes(), have) {
                out.push(Mismatch::new(
                    &format!("route {}", have),
                    "state",
                    "missing".to_string(),
                    "present".to_string(),
                ));
            }
        }
    }

    for want in desired.route_rules() {
        let target = want.to_string();
        if want.is_absent() {
            if current.route_rules().iter().any(|r| want.matches(r)) {
                out.push(Mismatch::new(
                    &target,
                    "state",
                    "absent".to_string(),
                    "present".to_string(),
                ));
            }
        } else if !rule_present(current.route_rules(), want) {
            out.push(Mismatch::new(
                &target,
                "state",
                "present".to_string(),
                "missing".to_string(),
            ));
        }
    }
    if mode == CompareMode::Replace {
        for have in current.route_rules() {
            if !rule_present(desired.route_rules(), have) {
                out.push(Mismatch::new(
                    &have.to_string(),
                    "state",
                    "missing".to_string(),
                    "present".to_string(),
                ));
            }
        }
    }

    if !opts.kernel_only {
        dns_mismatches(desired.dns(), current.dns(), mode, &mut out);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstate_types::{
        BondConfig, IfaceConfig, Ieee8021xConfig, InterfaceIp, InterfaceType, IpAddress,
    };

    fn eth(name: &str) -> Interface {
        Interface::new(name, InterfaceType::Ethernet)
    }

    #[test]
    fn test_merge_ignores_unspecified_fields() {
        let desired = eth("eth1");
        let current = eth("eth1").with_mtu(1500).with_description("uplink");
        let opts = CompareOptions::default();
        assert!(interface_mismatches(&desired, &current, &opts, CompareMode::Merge).is_empty());
        assert!(!interface_mismatches(&desired, &current, &opts, CompareMode::Replace).is_empty());
    }

    #[test]
    fn test_address_order_is_irrelevant() {
        let a: IpAddress = "192.0.2.1/24".parse().unwrap();
        let b: IpAddress = "192.0.2.2/24".parse().unwrap();
        let desired = eth("eth1").with_ipv4(InterfaceIp::with_addresses(vec![a.clone(), b.clone()]));
        let current = eth("eth1").with_ipv4(InterfaceIp::with_addresses(vec![b, a]));
        let opts = CompareOptions::default();
        assert!(interface_mismatches(&desired, &current, &opts, CompareMode::Merge).is_empty());
    }

    #[test]
    fn test_bond_port_order_is_irrelevant() {
        let bond = |ports: &[&str]| {
            Interface::new("bond0", InterfaceType::Bond).with_config(IfaceConfig::Bond(BondConfig {
                port: Some(ports.iter().map(|p| p.to_string()).collect()),
                ..Default::default()
            }))
        };
        let opts = CompareOptions::default();
        assert!(interface_mismatches(
            &bond(&["eth1", "eth2"]),
            &bond(&["eth2", "eth1"]),
            &opts,
            CompareMode::Replace
        )
        .is_empty());
    }

    #[test]
    fn test_kernel_only_ignores_description() {
        let desired = eth("eth1").with_description("new");
        let current = eth("eth1").with_description("old");
        let kernel = CompareOptions {
            kernel_only: true,
            ..Default::default()
        };
        assert!(interface_mismatches(&desired, &current, &kernel, CompareMode::Merge).is_empty());
        let mismatches =
            interface_mismatches(&desired, &current, &CompareOptions::default(), CompareMode::Merge);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].field, "description");
    }

    #[test]
    fn test_secrets_only_compared_when_included() {
        let with_password = |password: &str| {
            let mut iface = eth("eth0");
            iface.ieee8021x = Some(Ieee8021xConfig {
                identity: Some("node".to_string()),
                password: Some(password.to_string()),
                ..Default::default()
            });
            iface
        };
        let desired = with_password("new");
        let current = with_password("old");
        assert!(interface_mismatches(
            &desired,
            &current,
            &CompareOptions::default(),
            CompareMode::Merge
        )
        .is_empty());
        let secrets = CompareOptions {
            include_secrets: true,
            ..Default::default()
        };
        assert_eq!(
            interface_mismatches(&desired, &current, &secrets, CompareMode::Merge).len(),
            1
        );
    }

    #[test]
    fn test_kernel_only_ignores_dns() {
        let desired = NetworkState::new().with_dns(Some(DnsConfig::new(
            vec!["192.0.2.53".parse().unwrap()],
            vec![],
        )));
        let current = NetworkState::new();
        let kernel = CompareOptions {
            kernel_only: true,
            ..Default::default()
        };
        assert!(state_mismatches(&desired, &current, &kernel, CompareMode::Merge).is_empty());
        assert_eq!(
            state_mismatches(&desired, &current, &CompareOptions::default(), CompareMode::Merge)
                .len(),
            1
        );
    }

    #[test]
    fn test_missing_and_absent_interfaces() {
        let desired = NetworkState::new()
            .with_interface(eth("eth1"))
            .with_interface(Interface::absent("eth2", InterfaceType::Ethernet));
        let current = NetworkState::new().with_interface(eth("eth2"));
        let mismatches = state_mismatches(
            &desired,
            &current,
            &CompareOptions::default(),
            CompareMode::Merge,
        );
        let targets: Vec<&str> = mismatches.iter().map(|m| m.target.as_str()).collect();
        assert_eq!(targets, vec!["eth1", "eth2"]);
    }
}
