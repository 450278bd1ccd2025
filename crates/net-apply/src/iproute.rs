//! iproute2 backend driver
//!
//! Reads the live state with `ip -j` and maps operations onto
//! `ip link/addr/route/rule` invocations. Every command runs under a
//! timeout and its child process is killed when the command is dropped.
//!
//! The driver only attaches ports listed in a payload; ports removed from a
//! controller are left attached. DNS is read from and written to a
//! resolv.conf file.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use ipnet::IpNet;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;

use netstate_core::{
    BackendDriver, DnsConfig, ErrorKind, IfaceConfig, Interface, InterfaceState, InterfaceType,
    IpAddress, MacAddr, NetstateError, NetworkState, Operation, OperationKind, OperationResult,
    OperationTarget, Result, RouteEntry, RouteRuleEntry,
};
use netstate_types::{
    BondConfig, BondMode, BondOptions, BridgeConfig, BridgeOptions, BridgePortConfig,
    InterfaceIp, InterfaceStatus, VethConfig, VlanConfig, VlanProtocol, VrfConfig,
};

const DEFAULT_IP_PATH: &str = "/sbin/ip";
const DEFAULT_RESOLV_CONF: &str = "/etc/resolv.conf";
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Rule priorities the kernel installs by itself.
const DEFAULT_RULE_PRIORITIES: [u32; 3] = [0, 32766, 32767];
const MAIN_TABLE: u32 = 254;

/// Output of one `ip` invocation.
#[derive(Debug, Clone)]
struct CommandOutput {
    success: bool,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

/// Backend driving the host through the `ip` command.
pub struct IpCommandBackend {
    ip_path: String,
    resolv_conf: PathBuf,
    command_timeout: Duration,
}

impl Default for IpCommandBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IpCommandBackend {
    pub fn new() -> Self {
        Self {
            ip_path: DEFAULT_IP_PATH.to_string(),
            resolv_conf: PathBuf::from(DEFAULT_RESOLV_CONF),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_ip_path(mut self, path: impl Into<String>) -> Self {
        self.ip_path = path.into();
        self
    }

    pub fn with_resolv_conf(mut self, path: impl Into<PathBuf>) -> Self {
        self.resolv_conf = path.into();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    async fn execute(&self, args: &[String]) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.ip_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let command = format!("ip {}", args.join(" "));
        debug!("executing {}", command);

        match timeout(self.command_timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let result = CommandOutput {
                    success: output.status.success(),
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                };
                if !result.success {
                    warn!(
                        "{} failed with exit code {:?}: {}",
                        command, result.exit_code, result.stderr
                    );
                }
                Ok(result)
            }
            Ok(Err(e)) => Err(NetstateError::BackendApply {
                operation: command,
                message: format!("failed to execute: {}", e),
            }),
            Err(_) => Err(NetstateError::Timeout(format!(
                "{} did not finish within {:?}",
                command, self.command_timeout
            ))),
        }
    }

    async fn query<T: DeserializeOwned>(&self, args: &[&str]) -> Result<Vec<T>> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let output = self.execute(&args).await?;
        if !output.success {
            return Err(NetstateError::BackendApply {
                operation: format!("ip {}", args.join(" ")),
                message: output.stderr,
            });
        }
        parse_json(&output.stdout)
    }

    async fn read_dns(&self) -> Option<DnsConfig> {
        match tokio::fs::read_to_string(&self.resolv_conf).await {
            Ok(text) => Some(parse_resolv_conf(&text)),
            Err(e) => {
                debug!("cannot read {:?}: {}", self.resolv_conf, e);
                None
            }
        }
    }

    async fn write_dns(&self, dns: &DnsConfig) -> std::result::Result<(), String> {
        tokio::fs::write(&self.resolv_conf, render_resolv_conf(dns))
            .await
            .map_err(|e| format!("cannot write {:?}: {}", self.resolv_conf, e))
    }
}

#[async_trait]
impl BackendDriver for IpCommandBackend {
    fn name(&self) -> &str {
        "iproute"
    }

    async fn read_current_state(&self) -> Result<NetworkState> {
        let links: Vec<IpLink> = self.query(&["-j", "-d", "addr", "show"]).await?;
        let mut routes: Vec<IpRoute> = self.query(&["-j", "-4", "route", "show", "table", "all"]).await?;
        routes.extend(self.query::<IpRoute>(&["-j", "-6", "route", "show", "table", "all"]).await?);
        let mut rules: Vec<IpRule> = self.query(&["-j", "-4", "rule", "show"]).await?;
        rules.extend(self.query::<IpRule>(&["-j", "-6", "rule", "show"]).await?);

        let mut builder = NetworkState::builder();
        for iface in interfaces_from_links(&links) {
            builder = builder.interface(iface);
        }
        for route in routes.iter().filter_map(IpRoute::to_entry) {
            builder = builder.route(route);
        }
        for rule in rules.iter().filter_map(IpRule::to_entry) {
            builder = builder.route_rule(rule);
        }
        if let Some(dns) = self.read_dns().await {
            builder = builder.dns(dns);
        }
        Ok(builder.build()?)
    }

    async fn apply_operation(&self, operation: &Operation) -> OperationResult {
        if let OperationTarget::Dns(dns) = &operation.target {
            return match self.write_dns(dns).await {
                Ok(()) => OperationResult::success(vec![format!(
                    "wrote {}",
                    self.resolv_conf.display()
                )]),
                Err(message) => {
                    OperationResult::failure(ErrorKind::BackendApplyError, message, Vec::new())
                }
            };
        }

        let commands = match commands_for(operation) {
            Ok(commands) => commands,
            Err((kind, message)) => return OperationResult::failure(kind, message, Vec::new()),
        };

        let mut log = Vec::new();
        for args in commands {
            let command = format!("ip {}", args.join(" "));
            match self.execute(&args).await {
                Ok(output) if output.success => log.push(command),
                Ok(output) => {
                    log.push(format!("{}: {}", command, output.stderr));
                    return OperationResult::failure(
                        ErrorKind::BackendApplyError,
                        format!("{} failed: {}", command, output.stderr),
                        log,
                    );
                }
                Err(e) => return OperationResult::failure(e.kind(), e.to_string(), log),
            }
        }
        OperationResult::success(log)
    }
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text)
        .map_err(|e| NetstateError::Bug(format!("unexpected ip json output: {}", e)))
}

#[derive(Debug, Deserialize)]
struct IpLink {
    ifname: String,
    ifindex: Option<u32>,
    #[serde(default)]
    flags: Vec<String>,
    mtu: Option<u32>,
    operstate: Option<String>,
    link_type: Option<String>,
    address: Option<String>,
    permaddr: Option<String>,
    master: Option<String>,
    link: Option<String>,
    ifalias: Option<String>,
    linkinfo: Option<IpLinkInfo>,
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpLinkInfo {
    info_kind: Option<String>,
    #[serde(default)]
    info_data: Value,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
    family: String,
    local: IpAddr,
    prefixlen: u8,
    scope: Option<String>,
    #[serde(default)]
    dynamic: bool,
}

#[derive(Debug, Deserialize)]
struct IpRoute {
    dst: String,
    gateway: Option<IpAddr>,
    dev: Option<String>,
    metric: Option<u32>,
    table: Option<Value>,
    protocol: Option<String>,
    #[serde(rename = "type")]
    route_type: Option<String>,
}

impl IpRoute {
    fn to_entry(&self) -> Option<RouteEntry> {
        if self.protocol.as_deref() == Some("kernel")
            || self.route_type.as_deref().map_or(false, |t| t != "unicast")
        {
            return None;
        }
        let table = table_id(self.table.as_ref())?;
        let destination = match self.dst.as_str() {
            "default" if self.gateway.map_or(false, |gw| gw.is_ipv6()) => {
                IpNet::from_str("::/0").ok()?
            }
            "default" => IpNet::from_str("0.0.0.0/0").ok()?,
            dst => parse_prefix(dst)?,
        };
        Some(RouteEntry {
            destination: Some(destination),
            next_hop_interface: self.dev.clone(),
            next_hop_address: self.gateway,
            metric: self.metric,
            table_id: (table != MAIN_TABLE).then_some(table),
            ..Default::default()
        })
    }
}

#[derive(Debug, Deserialize)]
struct IpRule {
    priority: Option<u32>,
    src: Option<String>,
    srclen: Option<u8>,
    dst: Option<String>,
    dstlen: Option<u8>,
    table: Option<Value>,
}

impl IpRule {
    fn to_entry(&self) -> Option<RouteRuleEntry> {
        if DEFAULT_RULE_PRIORITIES.contains(&self.priority.unwrap_or(0)) {
            return None;
        }
        let prefix = |addr: &Option<String>, len: Option<u8>| {
            addr.as_deref()
                .filter(|a| *a != "all")
                .and_then(|a| parse_prefix(&format!("{}/{}", a, len.unwrap_or(if a.contains(':') { 128 } else { 32 }))))
        };
        Some(RouteRuleEntry {
            ip_from: prefix(&self.src, self.srclen),
            ip_to: prefix(&self.dst, self.dstlen),
            priority: self.priority,
            route_table: table_id(self.table.as_ref()),
            ..Default::default()
        })
    }
}

/// Numeric table id, `None` for the local table.
fn table_id(table: Option<&Value>) -> Option<u32> {
    match table {
        None => Some(MAIN_TABLE),
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(name)) => match name.as_str() {
            "main" => Some(MAIN_TABLE),
            "default" => Some(253),
            "local" => None,
            other => other.parse().ok(),
        },
        Some(_) => None,
    }
}

fn parse_prefix(text: &str) -> Option<IpNet> {
    if text.contains('/') {
        return text.parse().ok();
    }
    let addr: IpAddr = text.parse().ok()?;
    Some(IpNet::from(addr))
}

fn info_str<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn info_u64(data: &Value, key: &str) -> Option<u64> {
    data.get(key).and_then(Value::as_u64)
}

fn link_type(link: &IpLink) -> InterfaceType {
    match link.linkinfo.as_ref().and_then(|i| i.info_kind.as_deref()) {
        Some("bond") => InterfaceType::Bond,
        Some("bridge") => InterfaceType::LinuxBridge,
        Some("vlan") => InterfaceType::Vlan,
        Some("veth") => InterfaceType::Veth,
        Some("vrf") => InterfaceType::Vrf,
        Some("dummy") => InterfaceType::Dummy,
        Some(_) => InterfaceType::Unknown,
        None => match link.link_type.as_deref() {
            Some("loopback") => InterfaceType::Loopback,
            Some("ether") => InterfaceType::Ethernet,
            _ => InterfaceType::Unknown,
        },
    }
}

fn addresses(link: &IpLink, family: &str) -> Option<InterfaceIp> {
    let infos: Vec<&IpAddrInfo> = link
        .addr_info
        .iter()
        .filter(|a| a.family == family && a.scope.as_deref() != Some("link"))
        .collect();
    let dhcp = infos.iter().any(|a| a.dynamic);
    let address: Vec<IpAddress> = infos
        .iter()
        .filter(|a| !a.dynamic)
        .map(|a| IpAddress::new(a.local, a.prefixlen))
        .collect();
    Some(InterfaceIp {
        enabled: Some(!infos.is_empty()),
        dhcp: Some(dhcp),
        address: Some(address),
    })
}

fn interfaces_from_links(links: &[IpLink]) -> Vec<Interface> {
    let mut ports: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for link in links {
        if let Some(master) = &link.master {
            ports.entry(master.as_str()).or_default().push(link.ifname.clone());
        }
    }

    links
        .iter()
        .map(|link| {
            let iface_type = link_type(link);
            let data = link
                .linkinfo
                .as_ref()
                .map(|i| &i.info_data)
                .unwrap_or(&Value::Null);
            let port_list = || ports.get(link.ifname.as_str()).cloned().unwrap_or_default();

            let config = match iface_type {
                InterfaceType::Bond => Some(IfaceConfig::Bond(BondConfig {
                    mode: info_str(data, "mode").and_then(|m| BondMode::from_str(m).ok()),
                    port: Some(port_list()),
                    options: info_u64(data, "miimon").map(|miimon| BondOptions {
                        miimon: u32::try_from(miimon).ok(),
                        ..Default::default()
                    }),
                })),
                InterfaceType::LinuxBridge => Some(IfaceConfig::LinuxBridge(BridgeConfig {
                    port: Some(port_list().into_iter().map(BridgePortConfig::new).collect()),
                    options: Some(BridgeOptions {
                        stp: info_u64(data, "stp_state").map(|s| s != 0),
                        vlan_filtering: info_u64(data, "vlan_filtering").map(|v| v != 0),
                        mac_ageing_time: info_u64(data, "ageing_time")
                            .and_then(|t| u32::try_from(t / 100).ok()),
                        multicast_snooping: info_u64(data, "mcast_snooping").map(|v| v != 0),
                    }),
                })),
                InterfaceType::Vlan => link.link.as_ref().and_then(|base| {
                    let id = u16::try_from(info_u64(data, "id")?).ok()?;
                    Some(IfaceConfig::Vlan(VlanConfig {
                        base_iface: base.clone(),
                        id,
                        protocol: match info_str(data, "protocol") {
                            Some("802.1ad") => Some(VlanProtocol::Ieee8021Ad),
                            Some(_) => Some(VlanProtocol::Ieee8021Q),
                            None => None,
                        },
                    }))
                }),
                InterfaceType::Veth => link
                    .link
                    .as_ref()
                    .map(|peer| IfaceConfig::Veth(VethConfig { peer: peer.clone() })),
                InterfaceType::Vrf => info_u64(data, "table").and_then(|table| {
                    Some(IfaceConfig::Vrf(VrfConfig {
                        port: Some(port_list()),
                        route_table_id: u32::try_from(table).ok()?,
                    }))
                }),
                _ => None,
            };

            let up = link.flags.iter().any(|f| f == "UP");
            Interface {
                description: link.ifalias.clone(),
                mtu: link.mtu,
                mac_address: link
                    .address
                    .as_deref()
                    .filter(|_| iface_type != InterfaceType::Loopback)
                    .and_then(|a| MacAddr::from_str(a).ok()),
                ipv4: addresses(link, "inet"),
                ipv6: addresses(link, "inet6"),
                status: Some(InterfaceStatus {
                    ifindex: link.ifindex,
                    driver: None,
                    permanent_mac_address: link
                        .permaddr
                        .as_deref()
                        .and_then(|a| MacAddr::from_str(a).ok()),
                    oper_state: link.operstate.clone(),
                }),
                config,
                ..Interface::new(link.ifname.clone(), iface_type)
                    .with_state(if up { InterfaceState::Up } else { InterfaceState::Down })
            }
        })
        .collect()
}

fn parse_resolv_conf(text: &str) -> DnsConfig {
    let mut server = Vec::new();
    let mut search = Vec::new();
    for line in text.lines() {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("nameserver") => server.extend(words.next().and_then(|w| w.parse::<IpAddr>().ok())),
            Some("search") => search = words.map(str::to_string).collect(),
            _ => {}
        }
    }
    DnsConfig::new(server, search)
}

fn render_resolv_conf(dns: &DnsConfig) -> String {
    let mut out = String::from("# Generated by netstate\n");
    let search = dns.search.as_deref().unwrap_or_default();
    if !search.is_empty() {
        out.push_str(&format!("search {}\n", search.join(" ")));
    }
    for server in dns.server.iter().flatten() {
        out.push_str(&format!("nameserver {}\n", server));
    }
    out
}

type CommandPlan = std::result::Result<Vec<Vec<String>>, (ErrorKind, String)>;

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// `ip` invocations implementing one operation.
fn commands_for(operation: &Operation) -> CommandPlan {
    match &operation.target {
        OperationTarget::Interface(iface) => match operation.kind {
            OperationKind::Delete => Ok(delete_interface(iface)),
            OperationKind::Create => {
                let mut commands = vec![create_interface(iface)?];
                commands.extend(configure_interface(iface, true));
                Ok(commands)
            }
            OperationKind::Modify => Ok(configure_interface(iface, operation.replace)),
        },
        OperationTarget::Route(route) => {
            let verb = match operation.kind {
                OperationKind::Delete => "del",
                _ => "replace",
            };
            route_command(route, verb).map(|c| vec![c])
        }
        OperationTarget::RouteRule(rule) => {
            let verb = match operation.kind {
                OperationKind::Delete => "del",
                _ => "add",
            };
            Ok(vec![rule_command(rule, verb)])
        }
        OperationTarget::Dns(_) => Ok(Vec::new()),
    }
}

fn create_interface(iface: &Interface) -> std::result::Result<Vec<String>, (ErrorKind, String)> {
    let name = iface.name.as_str();
    let mut cmd = args(&["link", "add"]);
    match (&iface.iface_type, &iface.config) {
        (InterfaceType::Vlan, Some(IfaceConfig::Vlan(vlan))) => {
            cmd.extend(args(&["link", &vlan.base_iface, "name", name, "type", "vlan"]));
            cmd.extend(args(&["id", &vlan.id.to_string()]));
            if vlan.protocol == Some(VlanProtocol::Ieee8021Ad) {
                cmd.extend(args(&["protocol", "802.1ad"]));
            }
        }
        (InterfaceType::Veth, Some(IfaceConfig::Veth(veth))) => {
            cmd.extend(args(&[name, "type", "veth", "peer", "name", &veth.peer]));
        }
        (InterfaceType::Vrf, Some(IfaceConfig::Vrf(vrf))) => {
            cmd.extend(args(&[name, "type", "vrf", "table", &vrf.route_table_id.to_string()]));
        }
        (InterfaceType::Bond, config) => {
            cmd.extend(args(&[name, "type", "bond"]));
            if let Some(IfaceConfig::Bond(BondConfig { mode: Some(mode), .. })) = config {
                let mode = serde_json::to_value(mode)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                cmd.extend(args(&["mode", &mode]));
            }
        }
        (InterfaceType::LinuxBridge, _) => cmd.extend(args(&[name, "type", "bridge"])),
        (InterfaceType::Dummy, _) => cmd.extend(args(&[name, "type", "dummy"])),
        (InterfaceType::Vlan | InterfaceType::Veth | InterfaceType::Vrf, _) => {
            return Err((
                ErrorKind::InvalidArgument,
                format!("{} {} needs its type section", iface.iface_type, name),
            ));
        }
        (other, _) => {
            return Err((
                ErrorKind::NotSupported,
                format!("cannot create {} interface {}", other, name),
            ));
        }
    }
    Ok(cmd)
}

fn delete_interface(iface: &Interface) -> Vec<Vec<String>> {
    let name = iface.name.as_str();
    if iface.iface_type.is_virtual() {
        vec![args(&["link", "del", "dev", name])]
    } else {
        vec![
            args(&["addr", "flush", "dev", name]),
            args(&["link", "set", "dev", name, "down"]),
        ]
    }
}

fn configure_interface(iface: &Interface, replace: bool) -> Vec<Vec<String>> {
    let name = iface.name.as_str();
    let mut commands = Vec::new();

    if let Some(mtu) = iface.mtu {
        commands.push(args(&["link", "set", "dev", name, "mtu", &mtu.to_string()]));
    }
    if let Some(mac) = &iface.mac_address {
        commands.push(args(&["link", "set", "dev", name, "address", &mac.to_string()]));
    }
    if let Some(description) = &iface.description {
        commands.push(args(&["link", "set", "dev", name, "alias", description]));
    }
    for port in iface.ports().into_iter().flatten() {
        commands.push(args(&["link", "set", "dev", port, "master", name]));
    }
    for (family, ip) in [("-4", &iface.ipv4), ("-6", &iface.ipv6)] {
        let Some(ip) = ip else {
            if replace {
                commands.push(args(&[family, "addr", "flush", "dev", name, "scope", "global"]));
            }
            continue;
        };
        if ip.address.is_some() || ip.enabled == Some(false) || replace {
            commands.push(args(&[family, "addr", "flush", "dev", name, "scope", "global"]));
        }
        if ip.enabled != Some(false) {
            for address in ip.address.iter().flatten() {
                commands.push(args(&[family, "addr", "add", &address.to_string(), "dev", name]));
            }
        }
    }
    match iface.state {
        InterfaceState::Up => commands.push(args(&["link", "set", "dev", name, "up"])),
        InterfaceState::Down => commands.push(args(&["link", "set", "dev", name, "down"])),
        InterfaceState::Absent => {}
    }
    commands
}

fn route_command(route: &RouteEntry, verb: &str) -> std::result::Result<Vec<String>, (ErrorKind, String)> {
    let destination = route.destination.ok_or_else(|| {
        (
            ErrorKind::InvalidArgument,
            format!("route {} has no destination", route),
        )
    })?;
    let family = if destination.addr().is_ipv4() { "-4" } else { "-6" };
    let mut cmd = args(&[family, "route", verb, &destination.to_string()]);
    if let Some(gateway) = route.next_hop_address {
        cmd.extend(args(&["via", &gateway.to_string()]));
    }
    if let Some(dev) = &route.next_hop_interface {
        cmd.extend(args(&["dev", dev]));
    }
    if let Some(metric) = route.metric {
        cmd.extend(args(&["metric", &metric.to_string()]));
    }
    if let Some(table) = route.table_id {
        cmd.extend(args(&["table", &table.to_string()]));
    }
    Ok(cmd)
}

fn rule_command(rule: &RouteRuleEntry, verb: &str) -> Vec<String> {
    let ipv6 = rule
        .ip_from
        .or(rule.ip_to)
        .map_or(false, |net| net.addr().is_ipv6());
    let mut cmd = args(&[if ipv6 { "-6" } else { "-4" }, "rule", verb]);
    if let Some(from) = rule.ip_from {
        cmd.extend(args(&["from", &from.to_string()]));
    }
    if let Some(to) = rule.ip_to {
        cmd.extend(args(&["to", &to.to_string()]));
    }
    if let Some(priority) = rule.priority {
        cmd.extend(args(&["priority", &priority.to_string()]));
    }
    if let Some(table) = rule.route_table {
        cmd.extend(args(&["table", &table.to_string()]));
    }
    cmd
}
