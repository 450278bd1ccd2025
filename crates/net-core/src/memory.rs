//! In-memory backend driver
//!
//! Keeps the live state in memory and applies operations with the same
//! preconditions the kernel enforces for the relationships the engine cares
//! about. Used by tests and dry runs; supports failure injection, slow
//! operations and simulated drift between what was applied and what is read
//! back.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use tokio::sync::Mutex;

use netstate_types::{
    DnsConfig, IfaceConfig, Interface, InterfaceStatus, InterfaceType, NetworkState, VethConfig,
};

use crate::backend::{BackendDriver, OperationResult};
use crate::change::{Operation, OperationKind, OperationTarget};
use crate::error::{ErrorKind, NetstateError};
use crate::Result;

#[derive(Debug, Default)]
struct MemoryInner {
    state: NetworkState,
    live_override: Option<NetworkState>,
    applied: Vec<Operation>,
    op_count: usize,
    fail_on_nth: Option<usize>,
    fail_on_target: Option<String>,
}

pub struct MemoryBackend {
    inner: Mutex<MemoryInner>,
    apply_delay: Option<Duration>,
    kernel_only: bool,
    no_verify: bool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            apply_delay: None,
            kernel_only: true,
            no_verify: true,
        }
    }

    /// Start from `state`; status data in it is ignored.
    pub fn with_state(state: NetworkState) -> Self {
        let mut backend = Self::new();
        backend.inner.get_mut().state = state.without_status();
        backend
    }

    /// Fail the `n`th operation (1-based) applied from now on.
    pub fn with_fail_on_nth(mut self, n: usize) -> Self {
        self.inner.get_mut().fail_on_nth = Some(n);
        self
    }

    /// Fail every operation targeting `name`.
    pub fn with_fail_on_target(mut self, name: impl Into<String>) -> Self {
        self.inner.get_mut().fail_on_target = Some(name.into());
        self
    }

    pub fn with_apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = Some(delay);
        self
    }

    pub fn with_capabilities(mut self, kernel_only: bool, no_verify: bool) -> Self {
        self.kernel_only = kernel_only;
        self.no_verify = no_verify;
        self
    }

    /// State as last applied, without drift.
    pub async fn state(&self) -> NetworkState {
        self.inner.lock().await.state.clone()
    }

    pub async fn set_state(&self, state: NetworkState) {
        self.inner.lock().await.state = state.without_status();
    }

    /// Make reads return `state` regardless of what gets applied.
    pub async fn set_live_override(&self, state: Option<NetworkState>) {
        self.inner.lock().await.live_override = state;
    }

    pub async fn clear_failures(&self) {
        let mut inner = self.inner.lock().await;
        inner.fail_on_nth = None;
        inner.fail_on_target = None;
    }

    pub async fn set_fail_on_target(&self, name: Option<String>) {
        self.inner.lock().await.fail_on_target = name;
    }

    pub async fn applied_operations(&self) -> Vec<Operation> {
        self.inner.lock().await.applied.clone()
    }
}

fn with_status(state: &NetworkState) -> NetworkState {
    let mut out = state.clone();
    for (idx, iface) in state.interfaces().iter().enumerate() {
        let mut iface = iface.clone();
        iface.status = Some(InterfaceStatus {
            ifindex: Some(idx as u32 + 1),
            driver: Some(iface.iface_type.as_str().to_string()),
            permanent_mac_address: None,
            oper_state: Some(iface.state.to_string()),
        });
        out = out.with_interface(iface);
    }
    out
}

fn merge_value(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_value(existing, value)
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

/// Overlay the fields set in `desired` on `current`.
fn merge_interface(current: &Interface, desired: &Interface) -> Result<Interface> {
    let to_value = |iface: &Interface| {
        serde_json::to_value(iface).map_err(|e| NetstateError::Bug(e.to_string()))
    };
    let mut base = to_value(current)?;
    let mut patch = to_value(desired)?;
    if desired.iface_type == InterfaceType::Unknown {
        if let Value::Object(map) = &mut patch {
            map.remove("type");
        }
    }
    merge_value(&mut base, patch);
    serde_json::from_value(base).map_err(|e| NetstateError::InvalidArgument(e.to_string()))
}

fn remove_port(iface: &mut Interface, port: &str) -> bool {
    let before = iface.ports().map(|p| p.len());
    match iface.config.as_mut() {
        Some(IfaceConfig::Bond(bond)) => {
            if let Some(ports) = bond.port.as_mut() {
                ports.retain(|p| p != port);
            }
        }
        Some(IfaceConfig::LinuxBridge(bridge)) => {
            if let Some(ports) = bridge.port.as_mut() {
                ports.retain(|p| p.name != port);
            }
        }
        Some(IfaceConfig::Vrf(vrf)) => {
            if let Some(ports) = vrf.port.as_mut() {
                ports.retain(|p| p != port);
            }
        }
        _ => {}
    }
    iface.ports().map(|p| p.len()) != before
}

impl MemoryInner {
    fn exists(&self, name: &str) -> bool {
        self.state.interfaces().contains(name)
    }

    fn apply(&mut self, op: &Operation) -> std::result::Result<Vec<String>, String> {
        for dep in &op.depends_on {
            if op.kind != OperationKind::Delete && !self.exists(dep) {
                return Err(format!("dependency {} does not exist", dep));
            }
        }
        match &op.target {
            OperationTarget::Interface(iface) => self.apply_interface(op, iface),
            OperationTarget::Route(route) => {
                let mut routes = self.state.routes().to_vec();
                let log = match op.kind {
                    OperationKind::Delete => {
                        routes.retain(|r| r.present() != route.present());
                        format!("removed route {}", route)
                    }
                    _ => {
                        if let Some(dev) = &route.next_hop_interface {
                            if !self.exists(dev) {
                                return Err(format!("next hop interface {} does not exist", dev));
                            }
                        }
                        let entry = route.present();
                        if !routes.contains(&entry) {
                            routes.push(entry);
                        }
                        format!("added route {}", route)
                    }
                };
                self.state = self.state.with_routes(routes);
                Ok(vec![log])
            }
            OperationTarget::RouteRule(rule) => {
                let mut rules = self.state.route_rules().to_vec();
                let log = match op.kind {
                    OperationKind::Delete => {
                        rules.retain(|r| r.present() != rule.present());
                        format!("removed {}", rule)
                    }
                    _ => {
                        let entry = rule.present();
                        if !rules.contains(&entry) {
                            rules.push(entry);
                        }
                        format!("added {}", rule)
                    }
                };
                self.state = self.state.with_route_rules(rules);
                Ok(vec![log])
            }
            OperationTarget::Dns(dns) => {
                let merged = if op.replace {
                    dns.clone()
                } else {
                    let current = self.state.dns().cloned().unwrap_or_default();
                    DnsConfig {
                        server: dns.server.clone().or(current.server),
                        search: dns.search.clone().or(current.search),
                    }
                };
                let merged = (!merged.is_empty()).then_some(merged);
                self.state = self.state.with_dns(merged);
                Ok(vec!["updated dns resolver".to_string()])
            }
        }
    }

    fn apply_interface(
        &mut self,
        op: &Operation,
        iface: &Interface,
    ) -> std::result::Result<Vec<String>, String> {
        let mut log = Vec::new();
        match op.kind {
            OperationKind::Create => {
                if self.exists(&iface.name) {
                    return Err(format!("interface {} already exists", iface.name));
                }
                if let Some(base) = iface.vlan_base() {
                    if !self.exists(base) {
                        return Err(format!("vlan base {} does not exist", base));
                    }
                }
                let mut stored = iface.clone();
                stored.strip_status();
                self.state = self.state.with_interface(stored);
                log.push(format!("created {} interface {}", iface.iface_type, iface.name));

                if let Some(peer) = iface.veth_peer() {
                    if !self.exists(peer) {
                        let peer_iface = Interface::new(peer, InterfaceType::Veth).with_config(
                            IfaceConfig::Veth(VethConfig {
                                peer: iface.name.clone(),
                            }),
                        );
                        self.state = self.state.with_interface(peer_iface);
                        log.push(format!("created veth peer {}", peer));
                    }
                }
            }
            OperationKind::Modify => {
                let current = self
                    .state
                    .interface(&iface.name)
                    .cloned()
                    .ok_or_else(|| format!("interface {} does not exist", iface.name))?;
                if let Some(base) = iface.vlan_base() {
                    if !self.exists(base) {
                        return Err(format!("vlan base {} does not exist", base));
                    }
                }
                let mut updated = if op.replace {
                    iface.clone()
                } else {
                    merge_interface(&current, iface).map_err(|e| e.to_string())?
                };
                updated.strip_status();
                self.state = self.state.with_interface(updated);
                log.push(format!("modified interface {}", iface.name));
            }
            OperationKind::Delete => {
                if !self.exists(&iface.name) {
                    log.push(format!("interface {} already gone", iface.name));
                    return Ok(log);
                }
                if let Some(vlan) = self
                    .state
                    .interfaces()
                    .iter()
                    .find(|i| i.vlan_base() == Some(iface.name.as_str()))
                {
                    return Err(format!(
                        "interface {} is still the base of vlan {}",
                        iface.name, vlan.name
                    ));
                }
                let peer = self
                    .state
                    .interface(&iface.name)
                    .and_then(|i| i.veth_peer().map(str::to_string));
                let mut state = self.state.without_interface(&iface.name);
                if let Some(peer) = peer {
                    state = state.without_interface(&peer);
                    log.push(format!("removed veth peer {}", peer));
                }

                let controllers: Vec<Interface> = state
                    .interfaces()
                    .iter()
                    .filter_map(|c| {
                        let mut c = c.clone();
                        remove_port(&mut c, &iface.name).then_some(c)
                    })
                    .collect();
                for controller in controllers {
                    log.push(format!("released {} from {}", iface.name, controller.name));
                    state = state.with_interface(controller);
                }

                let routes: Vec<_> = state
                    .routes()
                    .iter()
                    .filter(|r| r.next_hop_interface.as_deref() != Some(iface.name.as_str()))
                    .cloned()
                    .collect();
                self.state = state.with_routes(routes);
                log.push(format!("deleted interface {}", iface.name));
            }
        }
        Ok(log)
    }
}

#[async_trait]
impl BackendDriver for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read_current_state(&self) -> Result<NetworkState> {
        let inner = self.inner.lock().await;
        let state = inner.live_override.as_ref().unwrap_or(&inner.state);
        Ok(with_status(state))
    }

    async fn apply_operation(&self, operation: &Operation) -> OperationResult {
        if let Some(delay) = self.apply_delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().await;
        inner.op_count += 1;
        let description = operation.description();

        let injected = inner.fail_on_nth == Some(inner.op_count)
            || inner
                .fail_on_target
                .as_deref()
                .map(|t| t == operation.target.name())
                .unwrap_or(false);
        if injected {
            debug!("memory backend: injected failure on '{}'", description);
            return OperationResult::failure(
                ErrorKind::BackendApplyError,
                "injected failure",
                vec![format!("failed: {}", description)],
            );
        }

        match inner.apply(operation) {
            Ok(log) => {
                inner.applied.push(operation.clone());
                OperationResult::success(log)
            }
            Err(message) => OperationResult::failure(
                ErrorKind::BackendApplyError,
                message.clone(),
                vec![format!("failed: {}: {}", description, message)],
            ),
        }
    }

    fn supports_kernel_only(&self) -> bool {
        self.kernel_only
    }

    fn supports_no_verify(&self) -> bool {
        self.no_verify
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstate_types::{RouteEntry, VlanConfig};

    fn create(iface: Interface) -> Operation {
        Operation::new(OperationKind::Create, OperationTarget::Interface(iface))
    }

    fn vlan(name: &str, base: &str, id: u16) -> Interface {
        Interface::new(name, InterfaceType::Vlan).with_config(IfaceConfig::Vlan(VlanConfig {
            base_iface: base.to_string(),
            id,
            protocol: None,
        }))
    }

    #[tokio::test]
    async fn test_vlan_requires_base() {
        let backend = MemoryBackend::new();
        let result = backend
            .apply_operation(&create(vlan("eth1.10", "eth1", 10)))
            .await;
        assert!(!result.is_success());

        assert!(backend
            .apply_operation(&create(Interface::new("eth1", InterfaceType::Ethernet)))
            .await
            .is_success());
        assert!(backend
            .apply_operation(&create(vlan("eth1.10", "eth1", 10)))
            .await
            .is_success());

        let delete_base = Operation::new(
            OperationKind::Delete,
            OperationTarget::Interface(Interface::absent("eth1", InterfaceType::Ethernet)),
        );
        assert!(!backend.apply_operation(&delete_base).await.is_success());
    }

    #[tokio::test]
    async fn test_veth_creates_peer() {
        let backend = MemoryBackend::new();
        let veth = Interface::new("veth0", InterfaceType::Veth).with_config(IfaceConfig::Veth(
            VethConfig {
                peer: "veth0p".to_string(),
            },
        ));
        assert!(backend.apply_operation(&create(veth)).await.is_success());
        let state = backend.state().await;
        assert_eq!(state.interface("veth0p").and_then(|i| i.veth_peer()), Some("veth0"));
    }

    #[tokio::test]
    async fn test_modify_merges_fields() {
        let backend = MemoryBackend::with_state(
            NetworkState::new()
                .with_interface(Interface::new("eth1", InterfaceType::Ethernet).with_mtu(1500)),
        );
        let patch = Interface::new("eth1", InterfaceType::Unknown).with_description("uplink");
        let op = Operation::new(OperationKind::Modify, OperationTarget::Interface(patch));
        assert!(backend.apply_operation(&op).await.is_success());

        let eth1 = backend.state().await.interface("eth1").cloned().unwrap();
        assert_eq!(eth1.mtu, Some(1500));
        assert_eq!(eth1.description.as_deref(), Some("uplink"));
        assert_eq!(eth1.iface_type, InterfaceType::Ethernet);
    }

    #[tokio::test]
    async fn test_failure_injection_counts_operations() {
        let backend = MemoryBackend::new().with_fail_on_nth(2);
        let first = backend
            .apply_operation(&create(Interface::new("eth1", InterfaceType::Ethernet)))
            .await;
        let second = backend
            .apply_operation(&create(Interface::new("eth2", InterfaceType::Ethernet)))
            .await;
        assert!(first.is_success());
        assert!(!second.is_success());
        assert_eq!(backend.applied_operations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_route_needs_next_hop_interface() {
        let backend = MemoryBackend::new();
        let route = RouteEntry::new("198.51.100.0/24".parse().unwrap(), "eth1");
        let op = Operation::new(OperationKind::Create, OperationTarget::Route(route));
        assert!(!backend.apply_operation(&op).await.is_success());
    }

    #[tokio::test]
    async fn test_read_reports_status() {
        let backend = MemoryBackend::with_state(
            NetworkState::new().with_interface(Interface::new("eth0", InterfaceType::Ethernet)),
        );
        let live = backend.read_current_state().await.unwrap();
        let status = live.interface("eth0").and_then(|i| i.status.clone()).unwrap();
        assert_eq!(status.ifindex, Some(1));
        assert!(backend.state().await.interface("eth0").unwrap().status.is_none());
    }
}
