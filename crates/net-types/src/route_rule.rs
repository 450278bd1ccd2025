use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::route::RouteState;

/// Policy routing rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RouteRuleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RouteState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_from: Option<IpNet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_to: Option<IpNet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_table: Option<u32>,
}

impl RouteRuleEntry {
    pub fn is_absent(&self) -> bool {
        self.state == Some(RouteState::Absent)
    }

    pub fn matches(&self, other: &RouteRuleEntry) -> bool {
        fn field<T: PartialEq>(wanted: &Option<T>, actual: &Option<T>) -> bool {
            wanted.is_none() || wanted == actual
        }
        field(&self.ip_from, &other.ip_from)
            && field(&self.ip_to, &other.ip_to)
            && field(&self.priority, &other.priority)
            && field(&self.route_table, &other.route_table)
    }

    pub fn present(&self) -> RouteRuleEntry {
        RouteRuleEntry {
            state: None,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for RouteRuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(priority) = self.priority {
            parts.push(format!("priority {}", priority));
        }
        if let Some(from) = &self.ip_from {
            parts.push(format!("from {}", from));
        }
        if let Some(to) = &self.ip_to {
            parts.push(format!("to {}", to));
        }
        if let Some(table) = self.route_table {
            parts.push(format!("lookup {}", table));
        }
        if parts.is_empty() {
            write!(f, "rule *")
        } else {
            write!(f, "rule {}", parts.join(" "))
        }
    }
}
