//! netstate API
//!
//! Binding style client over the reconciliation engine

pub mod client;
pub mod context;

#[cfg(test)]
mod tests;

pub use client::{ClientError, Netstate};
pub use context::{DriverKind, NetstateContext};
