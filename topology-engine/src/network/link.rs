use crate::network::ip::Ipv4Subnet;
use crate::network::node::{InterfaceRef, NodeId};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) usize);

impl LinkId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A physical connection between exactly two endpoints
///
/// Either both endpoints are interfaces (direct link), or one of them is an auto-inserted switch.
#[derive(Clone, Debug)]
pub struct Link {
    pub(crate) id: Arc<str>,
    pub(crate) a: Endpoint,
    pub(crate) b: Endpoint,
    pub(crate) subnet: Ipv4Subnet,
    pub(crate) capacity_mbps: f64,
    pub(crate) cost: u32,
}

impl Link {
    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn endpoints(&self) -> (Endpoint, Endpoint) {
        (self.a, self.b)
    }

    pub fn subnet(&self) -> Ipv4Subnet {
        self.subnet
    }

    /// The link's capacity in Mbps, shared by both directions
    pub fn capacity_mbps(&self) -> f64 {
        self.capacity_mbps
    }

    /// Outbound cost from endpoint `a` (zero for switch attachments)
    pub fn cost(&self) -> u32 {
        self.cost
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Interface(InterfaceRef),
    Switch(NodeId),
}

/// What the resolver did with a specific interface
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Attachment {
    /// Endpoint of a direct link
    Link(LinkId),
    /// Attached to a switch through the given link
    Switch { switch: NodeId, link: LinkId },
    /// No other interface shares its subnet
    Down,
}

/// A single element-to-element step, leaving `from` through one of its interfaces
///
/// Switches are never the source or target of a hop: a hop through a switch goes straight from
/// one attached element to another.
#[derive(Clone, Debug)]
pub struct Hop {
    pub from: NodeId,
    pub interface: usize,
    pub to: NodeId,
    pub to_interface: usize,
    pub via: HopVia,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HopVia {
    Direct(LinkId),
    Switch {
        switch: NodeId,
        ingress: LinkId,
        egress: LinkId,
    },
}

impl HopVia {
    /// The physical links traversed by the hop
    pub fn links(&self) -> impl Iterator<Item = LinkId> + use<> {
        let (first, second) = match *self {
            HopVia::Direct(link) => (link, None),
            HopVia::Switch {
                ingress, egress, ..
            } => (ingress, Some(egress)),
        };

        std::iter::once(first).chain(second)
    }
}
