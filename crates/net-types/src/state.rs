use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::dns::DnsConfig;
use crate::error::{TypeError, TypeResult};
use crate::iface::Interface;
use crate::route::RouteEntry;
use crate::route_rule::RouteRuleEntry;

/// Interfaces keyed by name, keeping document order.
#[derive(Debug, Clone, Default)]
pub struct Interfaces(IndexMap<String, Interface>);

impl Interfaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, failing on a repeated name.
    pub fn from_vec(ifaces: Vec<Interface>) -> TypeResult<Self> {
        let mut map = IndexMap::with_capacity(ifaces.len());
        for iface in ifaces {
            if map.contains_key(&iface.name) {
                return Err(TypeError::DuplicateInterface(iface.name));
            }
            map.insert(iface.name.clone(), iface);
        }
        Ok(Self(map))
    }

    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.0.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert or replace by name; a replaced entry keeps its position.
    pub fn upsert(&mut self, iface: Interface) -> Option<Interface> {
        self.0.insert(iface.name.clone(), iface)
    }

    pub fn remove(&mut self, name: &str) -> Option<Interface> {
        self.0.shift_remove(name)
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut Interface> {
        self.0.values_mut()
    }
}

impl PartialEq for Interfaces {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .all(|(name, iface)| other.0.get(name) == Some(iface))
    }
}

impl Serialize for Interfaces {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.0.values())
    }
}

impl<'de> Deserialize<'de> for Interfaces {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Option::<Vec<Interface>>::deserialize(deserializer)?.unwrap_or_default();
        Interfaces::from_vec(list).map_err(serde::de::Error::custom)
    }
}

impl<'a> IntoIterator for &'a Interfaces {
    type Item = &'a Interface;
    type IntoIter = indexmap::map::Values<'a, String, Interface>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.values()
    }
}

/// Declarative description of host networking.
///
/// Values are immutable; the `with_*`/`without_*` helpers return a modified
/// copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NetworkState {
    #[serde(default, skip_serializing_if = "Interfaces::is_empty")]
    interfaces: Interfaces,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    routes: Vec<RouteEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    route_rules: Vec<RouteRuleEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dns_resolver: Option<DnsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<serde_json::Value>,
}

impl NetworkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> StateBuilder {
        StateBuilder::default()
    }

    pub fn interfaces(&self) -> &Interfaces {
        &self.interfaces
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn route_rules(&self) -> &[RouteRuleEntry] {
        &self.route_rules
    }

    pub fn dns(&self) -> Option<&DnsConfig> {
        self.dns_resolver.as_ref()
    }

    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
            && self.routes.is_empty()
            && self.route_rules.is_empty()
            && self.dns_resolver.is_none()
    }

    pub fn with_interface(&self, iface: Interface) -> Self {
        let mut state = self.clone();
        state.interfaces.upsert(iface);
        state
    }

    pub fn without_interface(&self, name: &str) -> Self {
        let mut state = self.clone();
        state.interfaces.remove(name);
        state
    }

    pub fn with_routes(&self, routes: Vec<RouteEntry>) -> Self {
        Self {
            routes,
            ..self.clone()
        }
    }

    pub fn with_route_rules(&self, route_rules: Vec<RouteRuleEntry>) -> Self {
        Self {
            route_rules,
            ..self.clone()
        }
    }

    pub fn with_dns(&self, dns: Option<DnsConfig>) -> Self {
        Self {
            dns_resolver: dns,
            ..self.clone()
        }
    }

    pub fn with_metadata(&self, metadata: Option<serde_json::Value>) -> Self {
        Self {
            metadata,
            ..self.clone()
        }
    }

    /// Copy without backend reported status data.
    pub fn without_status(&self) -> Self {
        let mut state = self.clone();
        state.interfaces.values_mut().for_each(Interface::strip_status);
        state.metadata = None;
        state
    }

    /// Copy with every credential replaced by the hidden marker.
    pub fn redact_secrets(&self) -> Self {
        let mut state = self.clone();
        state.interfaces.values_mut().for_each(Interface::hide_secrets);
        state
    }

    pub fn has_secrets(&self) -> bool {
        self.interfaces.iter().any(Interface::has_secrets)
    }

    /// Copy with hidden credentials replaced by the ones in `current`.
    pub fn restore_secrets(&self, current: &NetworkState) -> Self {
        let mut state = self.clone();
        state
            .interfaces
            .values_mut()
            .for_each(|iface| iface.restore_secrets(current.interface(&iface.name)));
        state
    }
}

#[derive(Debug, Default)]
pub struct StateBuilder {
    interfaces: Vec<Interface>,
    routes: Vec<RouteEntry>,
    route_rules: Vec<RouteRuleEntry>,
    dns: Option<DnsConfig>,
    metadata: Option<serde_json::Value>,
}

impl StateBuilder {
    pub fn interface(mut self, iface: Interface) -> Self {
        self.interfaces.push(iface);
        self
    }

    pub fn route(mut self, route: RouteEntry) -> Self {
        self.routes.push(route);
        self
    }

    pub fn route_rule(mut self, rule: RouteRuleEntry) -> Self {
        self.route_rules.push(rule);
        self
    }

    pub fn dns(mut self, dns: DnsConfig) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = (!metadata.is_null()).then_some(metadata);
        self
    }

    pub fn build(self) -> TypeResult<NetworkState> {
        Ok(NetworkState {
            interfaces: Interfaces::from_vec(self.interfaces)?,
            routes: self.routes,
            route_rules: self.route_rules,
            dns_resolver: self.dns,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::{Ieee8021xConfig, InterfaceStatus, InterfaceType, HIDDEN_SECRET};

    #[test]
    fn test_duplicate_names_rejected() {
        let result = NetworkState::builder()
            .interface(Interface::new("eth0", InterfaceType::Ethernet))
            .interface(Interface::new("eth0", InterfaceType::Ethernet))
            .build();
        assert_eq!(
            result.unwrap_err(),
            TypeError::DuplicateInterface("eth0".to_string())
        );

        let doc = r#"{"interfaces": [{"name": "eth0"}, {"name": "eth0"}]}"#;
        assert!(serde_json::from_str::<NetworkState>(doc).is_err());
    }

    #[test]
    fn test_interface_order_does_not_affect_equality() {
        let a = NetworkState::builder()
            .interface(Interface::new("eth0", InterfaceType::Ethernet))
            .interface(Interface::new("eth1", InterfaceType::Ethernet))
            .build()
            .unwrap();
        let b = NetworkState::builder()
            .interface(Interface::new("eth1", InterfaceType::Ethernet))
            .interface(Interface::new("eth0", InterfaceType::Ethernet))
            .build()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_with_and_without_leave_original_untouched() {
        let base = NetworkState::new();
        let added = base.with_interface(Interface::new("eth1", InterfaceType::Ethernet));
        assert!(base.is_empty());
        assert!(added.interface("eth1").is_some());
        assert!(added.without_interface("eth1").is_empty());
    }

    #[test]
    fn test_without_status() {
        let mut iface = Interface::new("eth0", InterfaceType::Ethernet);
        iface.status = Some(InterfaceStatus {
            ifindex: Some(2),
            ..Default::default()
        });
        let state = NetworkState::new()
            .with_interface(iface)
            .with_metadata(Some(serde_json::json!({"hostname": "node1"})));
        let stripped = state.without_status();
        assert!(stripped.interface("eth0").unwrap().status.is_none());
        assert!(stripped.metadata().is_none());
    }

    #[test]
    fn test_yaml_document() {
        let doc = r#"
interfaces:
  - name: eth1
    type: ethernet
    state: up
    mtu: 9000
    ipv4:
      enabled: true
      dhcp: false
      address:
        - ip: 192.0.2.251
          prefix-length: 24
dns-resolver:
  server:
    - 192.0.2.53
  search:
    - example.org
"#;
        let state: NetworkState = serde_yaml::from_str(doc).unwrap();
        let eth1 = state.interface("eth1").unwrap();
        assert_eq!(eth1.mtu, Some(9000));
        assert_eq!(
            state.dns().unwrap().search.as_deref(),
            Some(&["example.org".to_string()][..])
        );
    }

    fn with_password(name: &str, password: &str) -> Interface {
        let mut iface = Interface::new(name, InterfaceType::Ethernet);
        iface.ieee8021x = Some(Ieee8021xConfig {
            identity: Some("host".to_string()),
            password: Some(password.to_string()),
            ..Default::default()
        });
        iface
    }

    fn password(state: &NetworkState, name: &str) -> Option<String> {
        state
            .interface(name)
            .and_then(|iface| iface.ieee8021x.as_ref())
            .and_then(|conf| conf.password.clone())
    }

    #[test]
    fn test_restore_secrets_from_current() {
        let current = NetworkState::builder()
            .interface(with_password("eth0", "s3cret"))
            .build()
            .unwrap();
        let retrieved = current.redact_secrets();
        assert_eq!(password(&retrieved, "eth0").as_deref(), Some(HIDDEN_SECRET));

        let restored = retrieved.restore_secrets(&current);
        assert_eq!(password(&restored, "eth0").as_deref(), Some("s3cret"));
        assert_eq!(password(&retrieved, "eth0").as_deref(), Some(HIDDEN_SECRET));
    }

    #[test]
    fn test_restore_secrets_keeps_new_values() {
        let current = NetworkState::builder()
            .interface(with_password("eth0", "s3cret"))
            .build()
            .unwrap();
        let desired = NetworkState::builder()
            .interface(with_password("eth0", "changed"))
            .interface(with_password("eth1", HIDDEN_SECRET))
            .build()
            .unwrap();

        let restored = desired.restore_secrets(&current);
        assert_eq!(password(&restored, "eth0").as_deref(), Some("changed"));
        assert!(restored.has_secrets());
        // nothing to restore from, the placeholder is dropped
        assert_eq!(password(&restored, "eth1"), None);
    }
}
