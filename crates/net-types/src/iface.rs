use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::network::{InterfaceIp, MacAddr};

/// Placeholder written in place of credentials when secrets are not requested.
pub const HIDDEN_SECRET: &str = "<_password_hid_by_netstate>";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterfaceType {
    Ethernet,
    Bond,
    LinuxBridge,
    Vlan,
    Veth,
    Vrf,
    Dummy,
    Loopback,
    #[default]
    Unknown,
}

impl InterfaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceType::Ethernet => "ethernet",
            InterfaceType::Bond => "bond",
            InterfaceType::LinuxBridge => "linux-bridge",
            InterfaceType::Vlan => "vlan",
            InterfaceType::Veth => "veth",
            InterfaceType::Vrf => "vrf",
            InterfaceType::Dummy => "dummy",
            InterfaceType::Loopback => "loopback",
            InterfaceType::Unknown => "unknown",
        }
    }

    /// Software interfaces are created and deleted by the engine, hardware
    /// ones can only be reconfigured.
    pub fn is_virtual(&self) -> bool {
        !matches!(
            self,
            InterfaceType::Ethernet | InterfaceType::Loopback | InterfaceType::Unknown
        )
    }

    pub fn is_controller(&self) -> bool {
        matches!(
            self,
            InterfaceType::Bond | InterfaceType::LinuxBridge | InterfaceType::Vrf
        )
    }

    /// Whether a desired type is satisfied by a live type. A veth endpoint is
    /// reported as veth even when it was requested as plain ethernet.
    pub fn is_compatible_with(&self, live: &InterfaceType) -> bool {
        self == live
            || *self == InterfaceType::Unknown
            || (*self == InterfaceType::Ethernet && *live == InterfaceType::Veth)
    }
}

impl std::fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ethernet" => Ok(InterfaceType::Ethernet),
            "bond" => Ok(InterfaceType::Bond),
            "linux-bridge" | "bridge" => Ok(InterfaceType::LinuxBridge),
            "vlan" => Ok(InterfaceType::Vlan),
            "veth" => Ok(InterfaceType::Veth),
            "vrf" => Ok(InterfaceType::Vrf),
            "dummy" => Ok(InterfaceType::Dummy),
            "loopback" => Ok(InterfaceType::Loopback),
            "unknown" => Ok(InterfaceType::Unknown),
            other => Err(TypeError::Unsupported(other.to_string())),
        }
    }
}

/// Administrative state of an interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceState {
    #[default]
    Up,
    Down,
    Absent,
}

impl std::fmt::Display for InterfaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceState::Up => write!(f, "up"),
            InterfaceState::Down => write!(f, "down"),
            InterfaceState::Absent => write!(f, "absent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Duplex {
    Full,
    Half,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EthernetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplex: Option<Duplex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_negotiation: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondMode {
    #[serde(rename = "balance-rr")]
    RoundRobin,
    #[serde(rename = "active-backup")]
    ActiveBackup,
    #[serde(rename = "balance-xor")]
    Xor,
    #[serde(rename = "broadcast")]
    Broadcast,
    #[serde(rename = "802.3ad")]
    Ieee8023ad,
    #[serde(rename = "balance-tlb")]
    BalanceTlb,
    #[serde(rename = "balance-alb")]
    BalanceAlb,
}

impl BondMode {
    /// Modes which need the partner switch to cooperate on every port.
    pub fn requires_lacp(&self) -> bool {
        matches!(self, BondMode::Ieee8023ad)
    }
}

impl FromStr for BondMode {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" | "balance-rr" => Ok(BondMode::RoundRobin),
            "1" | "active-backup" => Ok(BondMode::ActiveBackup),
            "2" | "balance-xor" => Ok(BondMode::Xor),
            "3" | "broadcast" => Ok(BondMode::Broadcast),
            "4" | "802.3ad" => Ok(BondMode::Ieee8023ad),
            "5" | "balance-tlb" => Ok(BondMode::BalanceTlb),
            "6" | "balance-alb" => Ok(BondMode::BalanceAlb),
            other => Err(TypeError::Unsupported(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BondOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miimon: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updelay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downdelay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmit_hash_policy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BondConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<BondMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BondOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BridgePortConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stp_priority: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stp_path_cost: Option<u32>,
}

impl BridgePortConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stp_priority: None,
            stp_path_cost: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BridgeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stp: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_filtering: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_ageing_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multicast_snooping: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<Vec<BridgePortConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BridgeOptions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VlanProtocol {
    #[serde(rename = "802.1q")]
    Ieee8021Q,
    #[serde(rename = "802.1ad")]
    Ieee8021Ad,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VlanConfig {
    pub base_iface: String,
    pub id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<VlanProtocol>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VethConfig {
    pub peer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VrfConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<Vec<String>>,
    pub route_table_id: u32,
}

/// Type specific configuration, one variant per interface type that has any.
#[derive(Debug, Clone, PartialEq)]
pub enum IfaceConfig {
    Ethernet(EthernetConfig),
    Bond(BondConfig),
    LinuxBridge(BridgeConfig),
    Vlan(VlanConfig),
    Veth(VethConfig),
    Vrf(VrfConfig),
}

impl IfaceConfig {
    pub fn iface_type(&self) -> InterfaceType {
        match self {
            IfaceConfig::Ethernet(_) => InterfaceType::Ethernet,
            IfaceConfig::Bond(_) => InterfaceType::Bond,
            IfaceConfig::LinuxBridge(_) => InterfaceType::LinuxBridge,
            IfaceConfig::Vlan(_) => InterfaceType::Vlan,
            IfaceConfig::Veth(_) => InterfaceType::Veth,
            IfaceConfig::Vrf(_) => InterfaceType::Vrf,
        }
    }

    /// Document key of the section holding this configuration.
    pub fn section(&self) -> &'static str {
        match self {
            IfaceConfig::Ethernet(_) => "ethernet",
            IfaceConfig::Bond(_) => "link-aggregation",
            IfaceConfig::LinuxBridge(_) => "bridge",
            IfaceConfig::Vlan(_) => "vlan",
            IfaceConfig::Veth(_) => "veth",
            IfaceConfig::Vrf(_) => "vrf",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Ieee8021xConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eap_methods: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Read-only data reported by the backend, never applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceStatus {
    pub ifindex: Option<u32>,
    pub driver: Option<String>,
    pub permanent_mac_address: Option<MacAddr>,
    pub oper_state: Option<String>,
}

impl InterfaceStatus {
    fn is_empty(&self) -> bool {
        self.ifindex.is_none()
            && self.driver.is_none()
            && self.permanent_mac_address.is_none()
            && self.oper_state.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInterface", into = "RawInterface")]
pub struct Interface {
    pub name: String,
    pub iface_type: InterfaceType,
    pub state: InterfaceState,
    pub description: Option<String>,
    pub mtu: Option<u32>,
    pub mac_address: Option<MacAddr>,
    pub ipv4: Option<InterfaceIp>,
    pub ipv6: Option<InterfaceIp>,
    pub ieee8021x: Option<Ieee8021xConfig>,
    pub status: Option<InterfaceStatus>,
    pub config: Option<IfaceConfig>,
}

impl Interface {
    pub fn new(name: impl Into<String>, iface_type: InterfaceType) -> Self {
        Self {
            name: name.into(),
            iface_type,
            state: InterfaceState::Up,
            description: None,
            mtu: None,
            mac_address: None,
            ipv4: None,
            ipv6: None,
            ieee8021x: None,
            status: None,
            config: None,
        }
    }

    /// Interface marked for removal.
    pub fn absent(name: impl Into<String>, iface_type: InterfaceType) -> Self {
        Self::new(name, iface_type).with_state(InterfaceState::Absent)
    }

    pub fn with_state(mut self, state: InterfaceState) -> Self {
        self.state = state;
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_ipv4(mut self, ipv4: InterfaceIp) -> Self {
        self.ipv4 = Some(ipv4);
        self
    }

    pub fn with_ipv6(mut self, ipv6: InterfaceIp) -> Self {
        self.ipv6 = Some(ipv6);
        self
    }

    pub fn with_config(mut self, config: IfaceConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn is_absent(&self) -> bool {
        self.state == InterfaceState::Absent
    }

    /// Ports enslaved to this interface when it is a controller.
    pub fn ports(&self) -> Option<Vec<&str>> {
        match &self.config {
            Some(IfaceConfig::Bond(bond)) => bond
                .port
                .as_ref()
                .map(|ports| ports.iter().map(String::as_str).collect()),
            Some(IfaceConfig::LinuxBridge(bridge)) => bridge
                .port
                .as_ref()
                .map(|ports| ports.iter().map(|p| p.name.as_str()).collect()),
            Some(IfaceConfig::Vrf(vrf)) => vrf
                .port
                .as_ref()
                .map(|ports| ports.iter().map(String::as_str).collect()),
            _ => None,
        }
    }

    pub fn vlan_base(&self) -> Option<&str> {
        match &self.config {
            Some(IfaceConfig::Vlan(vlan)) => Some(vlan.base_iface.as_str()),
            _ => None,
        }
    }

    pub fn veth_peer(&self) -> Option<&str> {
        match &self.config {
            Some(IfaceConfig::Veth(veth)) => Some(veth.peer.as_str()),
            _ => None,
        }
    }

    pub fn has_secrets(&self) -> bool {
        self.ieee8021x
            .as_ref()
            .map(|conf| conf.password.is_some())
            .unwrap_or(false)
    }

    /// Replace every credential with [`HIDDEN_SECRET`].
    pub fn hide_secrets(&mut self) {
        if let Some(password) = self.ieee8021x.as_mut().and_then(|c| c.password.as_mut()) {
            *password = HIDDEN_SECRET.to_string();
        }
    }

    /// Drop every credential field.
    pub fn remove_secrets(&mut self) {
        if let Some(conf) = self.ieee8021x.as_mut() {
            conf.password = None;
        }
    }

    /// Put back credentials that were handed out as [`HIDDEN_SECRET`].
    ///
    /// The value comes from `current`; without one the placeholder is
    /// dropped so the existing credential is left untouched.
    pub fn restore_secrets(&mut self, current: Option<&Interface>) {
        let hidden = self
            .ieee8021x
            .as_ref()
            .and_then(|conf| conf.password.as_deref())
            == Some(HIDDEN_SECRET);
        if !hidden {
            return;
        }
        let password = current
            .and_then(|iface| iface.ieee8021x.as_ref())
            .and_then(|conf| conf.password.clone())
            .filter(|password| password != HIDDEN_SECRET);
        match (password, self.ieee8021x.as_mut()) {
            (Some(password), Some(conf)) => conf.password = Some(password),
            _ => self.remove_secrets(),
        }
    }

    pub fn strip_status(&mut self) {
        self.status = None;
    }

    fn carries_config(&self) -> bool {
        self.description.is_some()
            || self.mtu.is_some()
            || self.mac_address.is_some()
            || self.ipv4.is_some()
            || self.ipv6.is_some()
            || self.ieee8021x.is_some()
            || self.status.is_some()
            || self.config.is_some()
    }
}

/// Document layout of an interface: one optional section per type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawInterface {
    name: String,
    #[serde(rename = "type", default)]
    iface_type: InterfaceType,
    #[serde(default)]
    state: InterfaceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mac_address: Option<MacAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ipv4: Option<InterfaceIp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ipv6: Option<InterfaceIp>,
    #[serde(rename = "802.1x", default, skip_serializing_if = "Option::is_none")]
    ieee8021x: Option<Ieee8021xConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ifindex: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permanent_mac_address: Option<MacAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    oper_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ethernet: Option<EthernetConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link_aggregation: Option<BondConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bridge: Option<BridgeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vlan: Option<VlanConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    veth: Option<VethConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vrf: Option<VrfConfig>,
}

impl TryFrom<RawInterface> for Interface {
    type Error = TypeError;

    fn try_from(raw: RawInterface) -> Result<Self, Self::Error> {
        let invalid = |reason: String| TypeError::InvalidInterface {
            name: raw.name.clone(),
            reason,
        };

        if raw.name.is_empty() {
            return Err(TypeError::InvalidValue {
                field: "name",
                value: String::new(),
            });
        }

        let mut sections = Vec::new();
        if let Some(conf) = raw.ethernet.clone() {
            sections.push(IfaceConfig::Ethernet(conf));
        }
        if let Some(conf) = raw.link_aggregation.clone() {
            sections.push(IfaceConfig::Bond(conf));
        }
        if let Some(conf) = raw.bridge.clone() {
            sections.push(IfaceConfig::LinuxBridge(conf));
        }
        if let Some(conf) = raw.vlan.clone() {
            sections.push(IfaceConfig::Vlan(conf));
        }
        if let Some(conf) = raw.veth.clone() {
            sections.push(IfaceConfig::Veth(conf));
        }
        if let Some(conf) = raw.vrf.clone() {
            sections.push(IfaceConfig::Vrf(conf));
        }
        if sections.len() > 1 {
            let names: Vec<&str> = sections.iter().map(IfaceConfig::section).collect();
            return Err(invalid(format!(
                "only one type section allowed, found {}",
                names.join(", ")
            )));
        }
        let config = sections.pop();
        if let Some(conf) = &config {
            if conf.iface_type() != raw.iface_type {
                return Err(invalid(format!(
                    "section '{}' does not match interface type {}",
                    conf.section(),
                    raw.iface_type
                )));
            }
        }

        let status = InterfaceStatus {
            ifindex: raw.ifindex,
            driver: raw.driver.clone(),
            permanent_mac_address: raw.permanent_mac_address.clone(),
            oper_state: raw.oper_state.clone(),
        };

        let iface = Interface {
            name: raw.name.clone(),
            iface_type: raw.iface_type,
            state: raw.state,
            description: raw.description.clone(),
            mtu: raw.mtu,
            mac_address: raw.mac_address.clone(),
            ipv4: raw.ipv4.clone(),
            ipv6: raw.ipv6.clone(),
            ieee8021x: raw.ieee8021x.clone(),
            status: (!status.is_empty()).then_some(status),
            config,
        };

        if iface.is_absent() && iface.carries_config() {
            return Err(invalid(
                "absent interface must not carry configuration".to_string(),
            ));
        }

        Ok(iface)
    }
}

impl From<Interface> for RawInterface {
    fn from(iface: Interface) -> Self {
        let status = iface.status.unwrap_or_default();
        let mut raw = RawInterface {
            name: iface.name,
            iface_type: iface.iface_type,
            state: iface.state,
            description: iface.description,
            mtu: iface.mtu,
            mac_address: iface.mac_address,
            ipv4: iface.ipv4,
            ipv6: iface.ipv6,
            ieee8021x: iface.ieee8021x,
            ifindex: status.ifindex,
            driver: status.driver,
            permanent_mac_address: status.permanent_mac_address,
            oper_state: status.oper_state,
            ..Default::default()
        };
        match iface.config {
            Some(IfaceConfig::Ethernet(conf)) => raw.ethernet = Some(conf),
            Some(IfaceConfig::Bond(conf)) => raw.link_aggregation = Some(conf),
            Some(IfaceConfig::LinuxBridge(conf)) => raw.bridge = Some(conf),
            Some(IfaceConfig::Vlan(conf)) => raw.vlan = Some(conf),
            Some(IfaceConfig::Veth(conf)) => raw.veth = Some(conf),
            Some(IfaceConfig::Vrf(conf)) => raw.vrf = Some(conf),
            None => {}
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bond_mode_parsing() {
        assert_eq!(
            "active-backup".parse::<BondMode>().unwrap(),
            BondMode::ActiveBackup
        );
        assert_eq!("1".parse::<BondMode>().unwrap(), BondMode::ActiveBackup);
        assert_eq!("802.3ad".parse::<BondMode>().unwrap(), BondMode::Ieee8023ad);
        assert!("mystery".parse::<BondMode>().is_err());
    }

    #[test]
    fn test_type_section_must_match_type() {
        let doc = serde_json::json!({
            "name": "eth1",
            "type": "ethernet",
            "state": "up",
            "veth": {"peer": "veth1peer"}
        });
        let err = serde_json::from_value::<Interface>(doc).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_absent_interface_rejects_config() {
        let doc = serde_json::json!({
            "name": "eth1",
            "type": "ethernet",
            "state": "absent",
            "mtu": 1500
        });
        assert!(serde_json::from_value::<Interface>(doc).is_err());

        let doc = serde_json::json!({"name": "eth1", "state": "absent"});
        let iface: Interface = serde_json::from_value(doc).unwrap();
        assert!(iface.is_absent());
        assert_eq!(iface.iface_type, InterfaceType::Unknown);
    }

    #[test]
    fn test_vlan_section_layout() {
        let iface = Interface::new("eth1.101", InterfaceType::Vlan).with_config(IfaceConfig::Vlan(
            VlanConfig {
                base_iface: "eth1".to_string(),
                id: 101,
                protocol: None,
            },
        ));
        let value = serde_json::to_value(&iface).unwrap();
        assert_eq!(value["vlan"]["base-iface"], "eth1");
        assert_eq!(value["type"], "vlan");
        assert_eq!(iface.vlan_base(), Some("eth1"));
    }

    #[test]
    fn test_hide_secrets() {
        let mut iface = Interface::new("eth0", InterfaceType::Ethernet);
        iface.ieee8021x = Some(Ieee8021xConfig {
            identity: Some("host".to_string()),
            password: Some("hunter2".to_string()),
            ..Default::default()
        });
        assert!(iface.has_secrets());
        iface.hide_secrets();
        assert_eq!(
            iface.ieee8021x.as_ref().unwrap().password.as_deref(),
            Some(HIDDEN_SECRET)
        );
    }

    #[test]
    fn test_veth_is_compatible_with_ethernet() {
        assert!(InterfaceType::Ethernet.is_compatible_with(&InterfaceType::Veth));
        assert!(InterfaceType::Unknown.is_compatible_with(&InterfaceType::Bond));
        assert!(!InterfaceType::Bond.is_compatible_with(&InterfaceType::LinuxBridge));
    }
}
