use std::net::IpAddr;
use std::str::FromStr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// IP address assigned to an interface, always carrying a prefix length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct IpAddress {
    #[serde(rename = "ip")]
    pub addr: IpAddr,
    #[serde(rename = "prefix-length")]
    pub prefix_len: u8,
}

impl IpAddress {
    pub fn new(addr: IpAddr, prefix_len: u8) -> Self {
        Self { addr, prefix_len }
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    pub fn to_ipnet(&self) -> Option<IpNet> {
        match self.addr {
            IpAddr::V4(addr) => Ipv4Net::new(addr, self.prefix_len).ok().map(IpNet::V4),
            IpAddr::V6(addr) => Ipv6Net::new(addr, self.prefix_len).ok().map(IpNet::V6),
        }
    }

    pub fn same_network(&self, other: &IpAddress) -> bool {
        match (self.to_ipnet(), other.to_ipnet()) {
            (Some(net1), Some(net2)) => net1.contains(&other.addr) || net2.contains(&self.addr),
            _ => false,
        }
    }
}

impl FromStr for IpAddress {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let addr = addr
            .parse::<IpAddr>()
            .map_err(|_| TypeError::InvalidValue {
                field: "ip_address",
                value: s.to_string(),
            })?;
        let max_prefix = if addr.is_ipv4() { 32 } else { 128 };
        let prefix_len = match prefix {
            Some(prefix) => prefix
                .parse::<u8>()
                .ok()
                .filter(|len| *len <= max_prefix)
                .ok_or_else(|| TypeError::InvalidValue {
                    field: "prefix_length",
                    value: prefix.to_string(),
                })?,
            None => max_prefix,
        };
        Ok(IpAddress::new(addr, prefix_len))
    }
}

impl std::fmt::Display for IpAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// IPv4 or IPv6 settings of an interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct InterfaceIp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Vec<IpAddress>>,
}

impl InterfaceIp {
    pub fn with_addresses(addresses: Vec<IpAddress>) -> Self {
        Self {
            enabled: Some(true),
            dhcp: Some(false),
            address: Some(addresses),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: Some(false),
            dhcp: None,
            address: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacAddr(pub MacAddress);

struct MacAddrVisitor;

impl<'de> serde::de::Visitor<'de> for MacAddrVisitor {
    type Value = MacAddr;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a MAC address string")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse::<MacAddress>()
            .map(MacAddr)
            .map_err(|_| E::custom(format!("invalid MAC address: {}", v)))
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(MacAddrVisitor)
    }
}

impl Serialize for MacAddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl FromStr for MacAddr {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<MacAddress>()
            .map(MacAddr)
            .map_err(|_| TypeError::InvalidValue {
                field: "mac_address",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ip() {
        let ip: IpAddress = "192.168.1.10/24".parse().unwrap();
        assert_eq!(ip.prefix_len, 24);
        assert!(ip.same_network(&"192.168.1.20/24".parse().unwrap()));
        assert!(!ip.same_network(&"192.168.2.20/24".parse().unwrap()));
    }

    #[test]
    fn parse_ip_without_prefix_uses_host_length() {
        let v4: IpAddress = "192.0.2.1".parse().unwrap();
        let v6: IpAddress = "2001:db8::1".parse().unwrap();
        assert_eq!(v4.prefix_len, 32);
        assert_eq!(v6.prefix_len, 128);
        assert!("192.0.2.1/33".parse::<IpAddress>().is_err());
    }

    #[test]
    fn ip_address_document_layout() {
        let ip: IpAddress = "192.0.2.251/24".parse().unwrap();
        let value = serde_json::to_value(&ip).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"ip": "192.0.2.251", "prefix-length": 24})
        );
    }

    #[test]
    fn parse_mac() {
        let mac: MacAddr = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(mac.to_string().to_lowercase(), "aa:bb:cc:dd:ee:ff");
        assert!("not-a-mac".parse::<MacAddr>().is_err());
    }
}
