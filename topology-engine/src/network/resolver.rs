//! Infers links and switches from the subnets interfaces belong to

use crate::context::RunContext;
use crate::error::TopologyError;
use crate::network::Graph;
use crate::network::ip::Ipv4Subnet;
use crate::network::link::{Attachment, Endpoint, Link, LinkId};
use crate::network::node::{InterfaceRef, Node, NodeId};
use crate::network::topology::Topology;
use std::collections::{BTreeMap, HashMap};

/// Groups interfaces by subnet and connects the members of each group
///
/// * One member: the interface is down.
/// * Two members: a direct link.
/// * Three or more: a switch, with one link per member.
pub fn resolve(ctx: &RunContext, topology: &Topology) -> Result<Graph, TopologyError> {
    let default_capacity = ctx.default_capacity_mbps;
    if !default_capacity.is_finite() || default_capacity <= 0.0 {
        return Err(TopologyError::InvalidDefaultCapacity {
            capacity_mbps: default_capacity,
        });
    }

    let mut nodes = topology.elements.clone();
    let groups = group_by_subnet(&nodes)?;

    let mut links = Vec::new();
    let mut attachments = HashMap::new();
    let mut switch_count = 0;
    for (subnet, mut members) in groups {
        members.sort_by(|i1, i2| {
            let n1 = &nodes[i1.node.0];
            let n2 = &nodes[i2.node.0];
            n1.id
                .cmp(&n2.id)
                .then_with(|| n1.interfaces[i1.index].name.cmp(&n2.interfaces[i2.index].name))
        });

        match members.as_slice() {
            [] => {}
            [single] => {
                let node = &nodes[single.node.0];
                tracing::warn!(
                    "interface {}:{} is down, no other interface belongs to subnet {subnet}",
                    node.id,
                    node.interfaces[single.index].name,
                );
                attachments.insert(*single, Attachment::Down);
            }
            &[a, b] => {
                let a_interface = &nodes[a.node.0].interfaces[a.index];
                let b_interface = &nodes[b.node.0].interfaces[b.index];
                let capacity_mbps = match (a_interface.capacity_mbps, b_interface.capacity_mbps) {
                    (Some(a), Some(b)) => a.min(b),
                    (Some(c), None) | (None, Some(c)) => c,
                    (None, None) => default_capacity,
                };

                let link_id = LinkId(links.len());
                let link = Link {
                    id: format!(
                        "{}_{}_{}_{}",
                        nodes[a.node.0].id,
                        a_interface.name,
                        nodes[b.node.0].id,
                        b_interface.name
                    )
                    .into(),
                    a: Endpoint::Interface(a),
                    b: Endpoint::Interface(b),
                    subnet,
                    capacity_mbps,
                    cost: a_interface.cost,
                };
                tracing::debug!("created link {} in subnet {subnet}", link.id);

                links.push(link);
                attachments.insert(a, Attachment::Link(link_id));
                attachments.insert(b, Attachment::Link(link_id));
            }
            members => {
                let switch = NodeId(nodes.len());
                let switch_name = format!("s{switch_count}");
                switch_count += 1;

                for &member in members {
                    let node = &nodes[member.node.0];
                    let interface = &node.interfaces[member.index];
                    let link_id = LinkId(links.len());
                    links.push(Link {
                        id: format!("{}_{}_{switch_name}", node.id, interface.name).into(),
                        a: Endpoint::Interface(member),
                        b: Endpoint::Switch(switch),
                        subnet,
                        capacity_mbps: interface.capacity_mbps.unwrap_or(default_capacity),
                        cost: 0,
                    });
                    attachments.insert(member, Attachment::Switch { switch, link: link_id });
                }

                tracing::debug!(
                    "created switch {switch_name} for {} interfaces in subnet {subnet}",
                    members.len()
                );
                nodes.push(Node::switch(switch_name.into()));
            }
        }
    }

    let graph = Graph::new(nodes, links, attachments);
    tracing::info!(
        "resolved {} links and {} switches",
        graph.links().count(),
        switch_count
    );

    Ok(graph)
}

/// Groups interfaces by subnet, in ascending (network, prefix length) order
///
/// Fails when two groups share a network address under different prefix lengths, since it would
/// be ambiguous which interfaces are supposed to be connected. Other overlapping subnets stay
/// separate groups.
fn group_by_subnet(
    nodes: &[Node],
) -> Result<BTreeMap<Ipv4Subnet, Vec<InterfaceRef>>, TopologyError> {
    let mut groups: BTreeMap<Ipv4Subnet, Vec<InterfaceRef>> = BTreeMap::new();
    for (i, node) in nodes.iter().enumerate() {
        for (index, interface) in node.interfaces.iter().enumerate() {
            groups.entry(interface.subnet()).or_default().push(InterfaceRef {
                node: NodeId(i),
                index,
            });
        }
    }

    let label = |interface: InterfaceRef| {
        let node = &nodes[interface.node.0];
        (node.id.clone(), node.interfaces[interface.index].name.clone())
    };

    let firsts: Vec<_> = groups.iter().map(|(&subnet, members)| (subnet, members[0])).collect();
    for (i, &(first, first_member)) in firsts.iter().enumerate() {
        // Groups are sorted by network address, so only the following ones can start inside
        for &(second, second_member) in &firsts[i + 1..] {
            if !first.overlaps(&second) {
                break;
            }

            let (first_element, first_interface) = label(first_member);
            let (second_element, second_interface) = label(second_member);
            if first.network() == second.network() {
                return Err(TopologyError::AddressConflict {
                    first,
                    first_element,
                    first_interface,
                    second,
                    second_element,
                    second_interface,
                });
            }

            tracing::warn!(
                "subnet {first} of {first_element}:{first_interface} overlaps subnet {second} of \
                 {second_element}:{second_interface}, their interfaces are not connected"
            );
        }
    }

    Ok(groups)
}
