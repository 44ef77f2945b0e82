use crate::network::ip::{Ipv4Cidr, Ipv4Subnet};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Index of a node inside a [`crate::network::topology::Topology`] or [`crate::network::Graph`]
///
/// Elements keep the same id once the graph is resolved; switches are appended after them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Host,
    Router,
    Switch,
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            NodeKind::Host => "host",
            NodeKind::Router => "router",
            NodeKind::Switch => "switch",
        };
        f.write_str(kind)
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) id: Arc<str>,
    pub(crate) kind: NodeKind,
    pub(crate) interfaces: Vec<Interface>,
}

impl Node {
    pub(crate) fn element(id: Arc<str>, kind: NodeKind, interfaces: Vec<Interface>) -> Self {
        debug_assert!(kind != NodeKind::Switch);
        Self {
            id,
            kind,
            interfaces,
        }
    }

    pub(crate) fn switch(id: Arc<str>) -> Self {
        Self {
            id,
            kind: NodeKind::Switch,
            interfaces: Vec::new(),
        }
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The node's interfaces, in declaration order (switches have none)
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn interface(&self, index: usize) -> &Interface {
        &self.interfaces[index]
    }
}

#[derive(Clone, Debug)]
pub struct Interface {
    pub(crate) name: Arc<str>,
    pub(crate) cidr: Ipv4Cidr,
    pub(crate) cost: u32,
    pub(crate) capacity_mbps: Option<f64>,
}

impl Interface {
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn address(&self) -> Ipv4Addr {
        self.cidr.address()
    }

    pub fn subnet(&self) -> Ipv4Subnet {
        self.cidr.subnet()
    }

    /// The outbound cost of sending traffic through this interface
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// The declared capacity, in Mbps
    pub fn capacity_mbps(&self) -> Option<f64> {
        self.capacity_mbps
    }
}

/// Points at a specific interface of a specific node
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceRef {
    pub node: NodeId,
    pub index: usize,
}
