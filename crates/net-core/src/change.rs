//! Ordered change sets produced by the differ and consumed by drivers

use std::fmt;

use netstate_types::{DnsConfig, Interface, RouteEntry, RouteRuleEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Modify,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Modify => write!(f, "modify"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// What an operation acts on, carrying the payload handed to the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationTarget {
    Interface(Interface),
    Route(RouteEntry),
    RouteRule(RouteRuleEntry),
    Dns(DnsConfig),
}

impl OperationTarget {
    pub fn category(&self) -> &'static str {
        match self {
            OperationTarget::Interface(_) => "interface",
            OperationTarget::Route(_) => "route",
            OperationTarget::RouteRule(_) => "route-rule",
            OperationTarget::Dns(_) => "dns",
        }
    }

    pub fn name(&self) -> String {
        match self {
            OperationTarget::Interface(iface) => iface.name.clone(),
            OperationTarget::Route(route) => route.to_string(),
            OperationTarget::RouteRule(rule) => rule.to_string(),
            OperationTarget::Dns(_) => "dns-resolver".to_string(),
        }
    }
}

/// One atomic step of a change set.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub target: OperationTarget,
    /// Interfaces that have to be handled before this operation.
    pub depends_on: Vec<String>,
    /// Payload replaces the live object instead of being merged into it.
    pub replace: bool,
}

impl Operation {
    pub fn new(kind: OperationKind, target: OperationTarget) -> Self {
        Self {
            kind,
            target,
            depends_on: Vec::new(),
            replace: false,
        }
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn interface(&self) -> Option<&Interface> {
        match &self.target {
            OperationTarget::Interface(iface) => Some(iface),
            _ => None,
        }
    }

    /// Human readable summary; never contains credentials.
    pub fn description(&self) -> String {
        match &self.target {
            OperationTarget::Interface(iface) => {
                format!("{} interface {} ({})", self.kind, iface.name, iface.iface_type)
            }
            target => format!("{} {} {}", self.kind, target.category(), target.name()),
        }
    }

    /// Payload as JSON, credentials hidden unless `include_secrets`.
    pub fn render_payload(&self, include_secrets: bool) -> String {
        let rendered = match &self.target {
            OperationTarget::Interface(iface) => {
                let mut iface = iface.clone();
                if !include_secrets {
                    iface.hide_secrets();
                }
                serde_json::to_string(&iface)
            }
            OperationTarget::Route(route) => serde_json::to_string(route),
            OperationTarget::RouteRule(rule) => serde_json::to_string(rule),
            OperationTarget::Dns(dns) => serde_json::to_string(dns),
        };
        rendered.unwrap_or_else(|err| format!("<unserializable payload: {}>", err))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    operations: Vec<Operation>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn extend(&mut self, operations: impl IntoIterator<Item = Operation>) {
        self.operations.extend(operations);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.operations.iter().map(Operation::description).collect()
    }

    /// Multi-line listing with payloads, for logs.
    pub fn render(&self, include_secrets: bool) -> String {
        self.operations
            .iter()
            .enumerate()
            .map(|(idx, op)| {
                format!(
                    "{}. {}: {}",
                    idx + 1,
                    op.description(),
                    op.render_payload(include_secrets)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}
