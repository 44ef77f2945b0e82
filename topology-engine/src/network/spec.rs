use std::net::Ipv4Addr;

/// Raw topology description, as decoded from the user's definition file
///
/// Nothing in here has been validated yet; see [`crate::network::topology::Topology::from_spec`].
#[derive(Clone, Debug, Default)]
pub struct TopologySpec {
    pub routers: Vec<ElementSpec>,
    pub hosts: Vec<ElementSpec>,
    pub demands: Vec<DemandSpec>,
}

#[derive(Clone, Debug)]
pub struct ElementSpec {
    pub name: String,
    pub interfaces: Vec<InterfaceSpec>,
}

#[derive(Clone, Debug)]
pub struct InterfaceSpec {
    pub name: String,
    pub address: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub cost: u32,
    /// The capacity of the link attached to this interface, in Mbps
    pub capacity_mbps: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct DemandSpec {
    pub source: String,
    pub destination: String,
    /// The desired goodput, in Mbps
    pub rate_mbps: f64,
}

pub const DEFAULT_INTERFACE_COST: u32 = 1;
