//! Resolved network graph
//!
//! Nodes and links live in flat collections and refer to each other through [`NodeId`] and
//! [`LinkId`]. Neighbour lookups go through the precomputed [`Hop`] lists.

pub mod ip;
pub mod link;
pub mod node;
pub mod resolver;
pub mod route;
pub mod spec;
pub mod topology;

use crate::network::link::{Attachment, Endpoint, Hop, HopVia, Link, LinkId};
use crate::network::node::{InterfaceRef, Node, NodeId, NodeKind};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    links: Vec<Link>,
    attachments: HashMap<InterfaceRef, Attachment>,
    node_index: HashMap<Arc<str>, NodeId>,
    /// Outgoing hops of each node, sorted by local interface name and then by neighbour name
    hops: Vec<Vec<Hop>>,
    /// Connected component of each node, computed on first use
    components: OnceLock<Vec<usize>>,
}

impl Graph {
    pub(crate) fn new(
        nodes: Vec<Node>,
        links: Vec<Link>,
        attachments: HashMap<InterfaceRef, Attachment>,
    ) -> Self {
        let node_index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), NodeId(i)))
            .collect();

        let mut graph = Self {
            nodes,
            links,
            attachments,
            node_index,
            hops: Vec::new(),
            components: OnceLock::new(),
        };
        graph.hops = graph.compute_hops();
        graph
    }

    fn compute_hops(&self) -> Vec<Vec<Hop>> {
        let mut hops = vec![Vec::new(); self.nodes.len()];
        let mut switch_ports: HashMap<NodeId, Vec<(InterfaceRef, LinkId)>> = HashMap::new();

        for (i, link) in self.links.iter().enumerate() {
            let link_id = LinkId(i);
            match (link.a, link.b) {
                (Endpoint::Interface(a), Endpoint::Interface(b)) => {
                    hops[a.node.0].push(Hop {
                        from: a.node,
                        interface: a.index,
                        to: b.node,
                        to_interface: b.index,
                        via: HopVia::Direct(link_id),
                    });
                    hops[b.node.0].push(Hop {
                        from: b.node,
                        interface: b.index,
                        to: a.node,
                        to_interface: a.index,
                        via: HopVia::Direct(link_id),
                    });
                }
                (Endpoint::Interface(port), Endpoint::Switch(switch))
                | (Endpoint::Switch(switch), Endpoint::Interface(port)) => {
                    switch_ports.entry(switch).or_default().push((port, link_id));
                }
                (Endpoint::Switch(_), Endpoint::Switch(_)) => {
                    unreachable!("the resolver never connects two switches")
                }
            }
        }

        for (switch, ports) in switch_ports {
            for &(from, ingress) in &ports {
                for &(to, egress) in &ports {
                    if from == to {
                        continue;
                    }

                    hops[from.node.0].push(Hop {
                        from: from.node,
                        interface: from.index,
                        to: to.node,
                        to_interface: to.index,
                        via: HopVia::Switch {
                            switch,
                            ingress,
                            egress,
                        },
                    });
                }
            }
        }

        for node_hops in &mut hops {
            node_hops.sort_by(|h1, h2| {
                self.interface_name(h1.from, h1.interface)
                    .cmp(self.interface_name(h2.from, h2.interface))
                    .then_with(|| self.nodes[h1.to.0].id.cmp(&self.nodes[h2.to.0].id))
                    .then_with(|| {
                        self.interface_name(h1.to, h1.to_interface)
                            .cmp(self.interface_name(h2.to, h2.to_interface))
                    })
            });
        }

        hops
    }

    fn interface_name(&self, node: NodeId, index: usize) -> &Arc<str> {
        &self.nodes[node.0].interfaces[index].name
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_index.get(name).copied()
    }

    pub fn routers(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes().filter(|(_, n)| n.kind == NodeKind::Router)
    }

    pub fn hosts(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes().filter(|(_, n)| n.kind == NodeKind::Host)
    }

    pub fn switches(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes().filter(|(_, n)| n.kind == NodeKind::Switch)
    }

    pub fn links(&self) -> impl Iterator<Item = (LinkId, &Link)> {
        self.links.iter().enumerate().map(|(i, l)| (LinkId(i), l))
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    /// The element-to-element hops leaving `node`
    pub fn hops(&self, node: NodeId) -> &[Hop] {
        &self.hops[node.0]
    }

    pub fn attachment(&self, interface: InterfaceRef) -> Attachment {
        self.attachments
            .get(&interface)
            .copied()
            .unwrap_or(Attachment::Down)
    }

    /// Interfaces that ended up without any link
    pub fn down_interfaces(&self) -> impl Iterator<Item = InterfaceRef> + '_ {
        self.interface_refs()
            .filter(|&i| self.attachment(i) == Attachment::Down)
    }

    pub fn interface_refs(&self) -> impl Iterator<Item = InterfaceRef> + '_ {
        self.nodes().flat_map(|(id, node)| {
            (0..node.interfaces.len()).map(move |index| InterfaceRef { node: id, index })
        })
    }

    /// Human-readable `element:interface` label
    pub fn interface_label(&self, interface: InterfaceRef) -> String {
        let node = &self.nodes[interface.node.0];
        format!("{}:{}", node.id, node.interfaces[interface.index].name)
    }

    pub fn component_count(&self) -> usize {
        self.components()
            .iter()
            .max()
            .map(|max| max + 1)
            .unwrap_or(0)
    }

    fn components(&self) -> &[usize] {
        self.components.get_or_init(|| {
            let mut adjacency = vec![Vec::new(); self.nodes.len()];
            for link in &self.links {
                let a = endpoint_node(link.a);
                let b = endpoint_node(link.b);
                adjacency[a.0].push(b);
                adjacency[b.0].push(a);
            }

            let mut components = vec![usize::MAX; self.nodes.len()];
            let mut next_component = 0;
            for start in 0..self.nodes.len() {
                if components[start] != usize::MAX {
                    continue;
                }

                let mut stack = vec![start];
                components[start] = next_component;
                while let Some(current) = stack.pop() {
                    for neighbour in &adjacency[current] {
                        if components[neighbour.0] == usize::MAX {
                            components[neighbour.0] = next_component;
                            stack.push(neighbour.0);
                        }
                    }
                }

                next_component += 1;
            }

            components
        })
    }

    /// Pure data description of the graph, for rendering collaborators
    pub fn describe(&self) -> GraphDescription {
        let nodes = self
            .nodes
            .iter()
            .map(|n| NodeDescription {
                id: n.id.clone(),
                kind: n.kind,
            })
            .collect();

        let edges = self
            .links
            .iter()
            .map(|l| EdgeDescription {
                id: l.id.clone(),
                a: self.endpoint_label(l.a),
                b: self.endpoint_label(l.b),
                cost: l.cost,
                capacity_mbps: l.capacity_mbps,
            })
            .collect();

        GraphDescription { nodes, edges }
    }

    fn endpoint_label(&self, endpoint: Endpoint) -> String {
        match endpoint {
            Endpoint::Interface(interface) => self.interface_label(interface),
            Endpoint::Switch(switch) => self.nodes[switch.0].id.to_string(),
        }
    }
}

fn endpoint_node(endpoint: Endpoint) -> NodeId {
    match endpoint {
        Endpoint::Interface(interface) => interface.node,
        Endpoint::Switch(switch) => switch,
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct GraphDescription {
    pub nodes: Vec<NodeDescription>,
    pub edges: Vec<EdgeDescription>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NodeDescription {
    #[serde(with = "crate::util::serde_arc_str")]
    pub id: Arc<str>,
    pub kind: NodeKind,
}

#[derive(Clone, Debug, Serialize)]
pub struct EdgeDescription {
    #[serde(with = "crate::util::serde_arc_str")]
    pub id: Arc<str>,
    pub a: String,
    pub b: String,
    pub cost: u32,
    pub capacity_mbps: f64,
}
