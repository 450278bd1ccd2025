use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Only `absent` can be requested explicitly; a route without state is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteState {
    Absent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RouteEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RouteState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<IpNet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop_interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop_address: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<u32>,
}

impl RouteEntry {
    pub fn new(destination: IpNet, next_hop_interface: impl Into<String>) -> Self {
        Self {
            destination: Some(destination),
            next_hop_interface: Some(next_hop_interface.into()),
            ..Default::default()
        }
    }

    pub fn with_gateway(mut self, gateway: IpAddr) -> Self {
        self.next_hop_address = Some(gateway);
        self
    }

    pub fn with_metric(mut self, metric: u32) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn with_table(mut self, table_id: u32) -> Self {
        self.table_id = Some(table_id);
        self
    }

    pub fn absent(mut self) -> Self {
        self.state = Some(RouteState::Absent);
        self
    }

    pub fn is_absent(&self) -> bool {
        self.state == Some(RouteState::Absent)
    }

    /// Whether an absent entry selects `other`. Unset fields act as wildcards.
    pub fn matches(&self, other: &RouteEntry) -> bool {
        fn field<T: PartialEq>(wanted: &Option<T>, actual: &Option<T>) -> bool {
            wanted.is_none() || wanted == actual
        }
        field(&self.destination, &other.destination)
            && field(&self.next_hop_interface, &other.next_hop_interface)
            && field(&self.next_hop_address, &other.next_hop_address)
            && field(&self.metric, &other.metric)
            && field(&self.table_id, &other.table_id)
    }

    /// Entry without the state marker, as it would appear live.
    pub fn present(&self) -> RouteEntry {
        RouteEntry {
            state: None,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.destination {
            Some(dest) => write!(f, "{}", dest)?,
            None => write!(f, "*")?,
        }
        if let Some(gw) = &self.next_hop_address {
            write!(f, " via {}", gw)?;
        }
        if let Some(dev) = &self.next_hop_interface {
            write!(f, " dev {}", dev)?;
        }
        if let Some(metric) = self.metric {
            write!(f, " metric {}", metric)?;
        }
        if let Some(table) = self.table_id {
            write!(f, " table {}", table)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_route_matches_by_set_fields() {
        let live = RouteEntry::new("198.51.100.0/24".parse().unwrap(), "eth1")
            .with_gateway("192.0.2.1".parse().unwrap())
            .with_metric(100);
        let selector = RouteEntry {
            next_hop_interface: Some("eth1".to_string()),
            ..Default::default()
        }
        .absent();
        assert!(selector.matches(&live));

        let other = RouteEntry {
            next_hop_interface: Some("eth2".to_string()),
            ..Default::default()
        };
        assert!(!other.matches(&live));
    }

    #[test]
    fn route_display() {
        let route = RouteEntry::new("0.0.0.0/0".parse().unwrap(), "eth0")
            .with_gateway("192.0.2.1".parse().unwrap());
        assert_eq!(route.to_string(), "0.0.0.0/0 via 192.0.2.1 dev eth0");
    }
}
