//! Core type re-exports and conversions

use crate::error::NetstateError;
use netstate_types::TypeError;

pub use netstate_types::{
    DnsConfig, IfaceConfig, Interface, InterfaceState, InterfaceType, IpAddress, MacAddr,
    NetworkState, RouteEntry, RouteRuleEntry,
};

impl From<TypeError> for NetstateError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidValue { field, value } => {
                NetstateError::MalformedDocument(format!("invalid value for {}: {}", field, value))
            }
            TypeError::ParseError(message) => NetstateError::MalformedDocument(message),
            TypeError::Unsupported(value) => {
                NetstateError::MalformedDocument(format!("unsupported value: {}", value))
            }
            TypeError::DuplicateInterface(name) => {
                NetstateError::MalformedDocument(format!("duplicate interface: {}", name))
            }
            TypeError::InvalidInterface { name, reason } => {
                NetstateError::MalformedDocument(format!("interface {}: {}", name, reason))
            }
        }
    }
}

/// Regex for valid interface names
pub const INTERFACE_NAME_REGEX: &str = r"^[a-zA-Z][a-zA-Z0-9_.-]*$";

/// Regex for DNS search domains
pub const SEARCH_DOMAIN_REGEX: &str =
    r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)*[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.?$";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_type_errors_are_malformed_documents() {
        let err: NetstateError = TypeError::DuplicateInterface("eth0".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::MalformedDocument);
        assert!(err.to_string().contains("eth0"));
    }

    #[test]
    fn test_bond_mode_parse_error_converts() {
        let err = "bogus".parse::<netstate_types::BondMode>().unwrap_err();
        let err: NetstateError = err.into();
        assert_eq!(err.kind(), ErrorKind::MalformedDocument);
    }
}
