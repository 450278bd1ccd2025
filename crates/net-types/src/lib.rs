pub mod dns;
pub mod error;
pub mod iface;
pub mod network;
pub mod route;
pub mod route_rule;
pub mod state;

pub use dns::DnsConfig;
pub use error::{TypeError, TypeResult};
pub use iface::{
    BondConfig, BondMode, BondOptions, BridgeConfig, BridgeOptions, BridgePortConfig, Duplex,
    EthernetConfig, IfaceConfig, Ieee8021xConfig, Interface, InterfaceState, InterfaceStatus,
    InterfaceType, VethConfig, VlanConfig, VlanProtocol, VrfConfig, HIDDEN_SECRET,
};
pub use network::{InterfaceIp, IpAddress, MacAddr};
pub use route::{RouteEntry, RouteState};
pub use route_rule::RouteRuleEntry;
pub use state::{Interfaces, NetworkState, StateBuilder};
