//! Centralized shortest-path routing
//!
//! Every router runs one Dijkstra search over the element-to-element hops of the [`Graph`]. Labels
//! are compared lexicographically as `(distance, first hop rank)`, where the rank orders the
//! router's own hops according to the [`TieBreak`] policy. Since extending a path never changes its
//! first hop, this keeps the search exact while making equal-cost choices deterministic.

use crate::context::{RunContext, TieBreak};
use crate::network::Graph;
use crate::network::ip::Ipv4Subnet;
use crate::network::link::{Attachment, Hop};
use crate::network::node::{InterfaceRef, NodeId, NodeKind};
use crate::network::route::{Gateway, RouteEntry, RoutingTable};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::sync::Arc;

/// Routing tables of all routers plus the default gateway of every host
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoutingState {
    #[serde(serialize_with = "serialize_tables")]
    tables: BTreeMap<Arc<str>, RoutingTable>,
    host_gateways: BTreeMap<Arc<str>, HostGateway>,
}

fn serialize_tables<S>(
    tables: &BTreeMap<Arc<str>, RoutingTable>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(tables.values())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HostGateway {
    /// The host's own interface facing the gateway
    #[serde(with = "crate::util::serde_arc_str")]
    pub interface: Arc<str>,
    pub gateway: Gateway,
}

impl RoutingState {
    /// Routing tables, ordered by router name
    pub fn tables(&self) -> impl Iterator<Item = &RoutingTable> {
        self.tables.values()
    }

    pub fn table(&self, router: &str) -> Option<&RoutingTable> {
        self.tables.get(router)
    }

    pub fn host_gateway(&self, host: &str) -> Option<&HostGateway> {
        self.host_gateways.get(host)
    }

    /// Hosts that have a default gateway, ordered by host name
    pub fn host_gateways(&self) -> impl Iterator<Item = (&Arc<str>, &HostGateway)> {
        self.host_gateways.iter()
    }

    /// Adds tagged entries on top of the base tables
    ///
    /// Entries for routers without a table are ignored, since only routers forward traffic.
    pub fn apply_overlay(&mut self, overlay: &[(Arc<str>, RouteEntry)]) {
        for (router, entry) in overlay {
            debug_assert!(entry.tag.is_some());
            match self.tables.get_mut(router) {
                Some(table) => {
                    table.insert(entry.clone());
                }
                None => tracing::warn!("ignoring overlay entry for unknown router {router}"),
            }
        }
    }
}

/// Computes the routing table of every router in the graph
pub fn compute_routing(ctx: &RunContext, graph: &Graph) -> RoutingState {
    let all_subnets: BTreeSet<Ipv4Subnet> = graph.links().map(|(_, l)| l.subnet()).collect();

    let mut tables = BTreeMap::new();
    for (router, node) in graph.routers() {
        let table = compute_table(ctx.tie_break, graph, router);

        for subnet in &all_subnets {
            if table.route(*subnet).is_none() {
                tracing::warn!("router {} has no route to subnet {subnet}", node.id());
            }
        }

        tracing::debug!(
            "computed {} routes for router {}",
            table.default_entries().count(),
            node.id()
        );
        tables.insert(node.id().clone(), table);
    }

    let host_gateways = compute_host_gateways(graph);
    tracing::info!(
        "computed routing tables for {} routers and default gateways for {} hosts",
        tables.len(),
        host_gateways.len()
    );

    RoutingState {
        tables,
        host_gateways,
    }
}

/// `(distance, rank of the first hop)`, compared lexicographically
type Label = (u64, usize);

fn compute_table(tie_break: TieBreak, graph: &Graph, router: NodeId) -> RoutingTable {
    let source = graph.node(router);
    let first_hops = graph.hops(router);
    let by_rank = first_hops_by_rank(tie_break, graph, first_hops);
    let mut ranks = vec![0; first_hops.len()];
    for (rank, &hop_index) in by_rank.iter().enumerate() {
        ranks[hop_index] = rank;
    }

    let mut best: Vec<Option<Label>> = vec![None; graph.nodes().count()];
    let mut settled = vec![false; best.len()];
    let mut queue = BinaryHeap::new();

    // The source never gets a label of its own: its hops seed the queue directly
    settled[router.index()] = true;
    for (i, hop) in first_hops.iter().enumerate() {
        let label = (departure_cost(graph, hop), ranks[i]);
        relax(&mut best, &mut queue, hop.to, label);
    }

    while let Some(Reverse((label, node))) = queue.pop() {
        let node = NodeId(node);
        if settled[node.index()] || best[node.index()] != Some(label) {
            continue;
        }
        settled[node.index()] = true;

        // Hosts are leaves, they never forward traffic
        if graph.node(node).kind() != NodeKind::Router {
            continue;
        }

        for hop in graph.hops(node) {
            if settled[hop.to.index()] {
                continue;
            }

            let (distance, rank) = label;
            let next = (distance + departure_cost(graph, hop), rank);
            relax(&mut best, &mut queue, hop.to, next);
        }
    }

    // The best label of each subnet, along with the first hop leading to it
    let mut candidates: BTreeMap<Ipv4Subnet, Label> = BTreeMap::new();
    for (node, label) in best.iter().enumerate() {
        let Some(label) = *label else {
            continue;
        };

        for (index, interface) in graph.node(NodeId(node)).interfaces().iter().enumerate() {
            let interface_ref = InterfaceRef {
                node: NodeId(node),
                index,
            };
            if graph.attachment(interface_ref) == Attachment::Down {
                continue;
            }

            candidates
                .entry(interface.subnet())
                .and_modify(|current| *current = (*current).min(label))
                .or_insert(label);
        }
    }

    let mut table = RoutingTable::new(source.id().clone());
    for (index, interface) in source.interfaces().iter().enumerate() {
        let interface_ref = InterfaceRef {
            node: router,
            index,
        };
        if graph.attachment(interface_ref) == Attachment::Down {
            continue;
        }

        table.insert(RouteEntry {
            destination: interface.subnet(),
            interface: interface.name().clone(),
            gateway: None,
            metric: 0,
            tag: None,
        });
    }

    for (subnet, (distance, rank)) in candidates {
        if table.route(subnet).is_some() {
            // Directly connected
            continue;
        }

        let hop = &first_hops[by_rank[rank]];
        table.insert(RouteEntry {
            destination: subnet,
            interface: source.interface(hop.interface).name().clone(),
            gateway: Some(gateway(graph, hop)),
            metric: distance,
            tag: None,
        });
    }

    table
}

fn relax(
    best: &mut [Option<Label>],
    queue: &mut BinaryHeap<Reverse<(Label, usize)>>,
    node: NodeId,
    label: Label,
) {
    let current = &mut best[node.index()];
    if current.is_none_or(|current| label < current) {
        *current = Some(label);
        queue.push(Reverse((label, node.index())));
    }
}

/// Indices of the router's hops, from most to least preferred on equal cost
fn first_hops_by_rank(tie_break: TieBreak, graph: &Graph, hops: &[Hop]) -> Vec<usize> {
    // Hops are already sorted by local interface name, then by neighbour name
    let mut order: Vec<usize> = (0..hops.len()).collect();
    if tie_break == TieBreak::NeighbourFirst {
        order.sort_by(|&i, &j| {
            let (h1, h2) = (&hops[i], &hops[j]);
            graph
                .node(h1.to)
                .id()
                .cmp(graph.node(h2.to).id())
                .then_with(|| {
                    let from = graph.node(h1.from);
                    from.interface(h1.interface)
                        .name()
                        .cmp(from.interface(h2.interface).name())
                })
                .then(i.cmp(&j))
        });
    }

    order
}

/// The cost of leaving `hop.from` through the hop's interface
pub(crate) fn departure_cost(graph: &Graph, hop: &Hop) -> u64 {
    graph.node(hop.from).interface(hop.interface).cost() as u64
}

/// The neighbour's side of a hop, as seen by the sender
pub(crate) fn gateway(graph: &Graph, hop: &Hop) -> Gateway {
    let neighbour = graph.node(hop.to);
    let interface = neighbour.interface(hop.to_interface);
    Gateway {
        element: neighbour.id().clone(),
        interface: interface.name().clone(),
        address: interface.address(),
    }
}

/// Picks the smallest router on the first host interface that has any router neighbour
fn compute_host_gateways(graph: &Graph) -> BTreeMap<Arc<str>, HostGateway> {
    let mut gateways = BTreeMap::new();
    for (host, node) in graph.hosts() {
        let chosen = (0..node.interfaces().len()).find_map(|index| {
            graph
                .hops(host)
                .iter()
                .filter(|hop| hop.interface == index)
                .filter(|hop| graph.node(hop.to).kind() == NodeKind::Router)
                .min_by(|h1, h2| graph.node(h1.to).id().cmp(graph.node(h2.to).id()))
        });

        match chosen {
            Some(hop) => {
                gateways.insert(
                    node.id().clone(),
                    HostGateway {
                        interface: node.interface(hop.interface).name().clone(),
                        gateway: gateway(graph, hop),
                    },
                );
            }
            None => tracing::warn!("host {} has no router neighbour to use as gateway", node.id()),
        }
    }

    gateways
}
