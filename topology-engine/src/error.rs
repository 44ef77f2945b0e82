use crate::network::ip::Ipv4Subnet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;

/// Structural problems with the topology definition
///
/// All of these abort the run: the topology cannot be compiled until the definition is fixed.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("invalid name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("element name `{name}` is used more than once")]
    DuplicateElement { name: String },
    #[error("element `{element}` has no interfaces")]
    NoInterfaces { element: String },
    #[error("malformed interface `{interface}` on element `{element}`: {reason}")]
    MalformedInterface {
        element: String,
        interface: String,
        reason: String,
    },
    #[error(
        "address `{address}` is assigned to both `{first_element}:{first_interface}` and `{second_element}:{second_interface}`"
    )]
    DuplicateAddress {
        address: Ipv4Addr,
        first_element: Arc<str>,
        first_interface: Arc<str>,
        second_element: Arc<str>,
        second_interface: Arc<str>,
    },
    #[error(
        "subnet `{first}` of `{first_element}:{first_interface}` conflicts with subnet `{second}` of `{second_element}:{second_interface}`"
    )]
    AddressConflict {
        first: Ipv4Subnet,
        first_element: Arc<str>,
        first_interface: Arc<str>,
        second: Ipv4Subnet,
        second_element: Arc<str>,
        second_interface: Arc<str>,
    },
    #[error("the default link capacity must be a positive number, got {capacity_mbps}")]
    InvalidDefaultCapacity { capacity_mbps: f64 },
    #[error("demand #{index} references element `{name}`, which does not exist")]
    UnknownElementReference { index: usize, name: String },
    #[error("demand #{index} is invalid: {reason}")]
    InvalidDemand { index: usize, reason: String },
}
