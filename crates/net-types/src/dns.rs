use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Resolver configuration. An unset list keeps the current value, an empty
/// list clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DnsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Vec<IpAddr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<Vec<String>>,
}

impl DnsConfig {
    pub fn new(server: Vec<IpAddr>, search: Vec<String>) -> Self {
        Self {
            server: Some(server),
            search: Some(search),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.server.as_ref().map_or(true, Vec::is_empty)
            && self.search.as_ref().map_or(true, Vec::is_empty)
    }
}
