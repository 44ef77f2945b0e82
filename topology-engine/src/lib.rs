pub mod cancellation;
pub mod context;
pub mod error;
pub mod network;
pub mod routing;
pub mod traffic_engineering;
pub mod util;

#[cfg(test)]
mod test_util;

use crate::context::RunContext;
use crate::error::TopologyError;
use crate::network::Graph;
use crate::network::ip::Ipv4Subnet;
use crate::network::resolver::resolve;
use crate::network::spec::TopologySpec;
use crate::network::topology::Topology;
use crate::routing::{RoutingState, compute_routing};
use crate::traffic_engineering::solver::Solver;
use crate::traffic_engineering::{TrafficEngineering, optimize};
use std::collections::BTreeSet;

/// Everything produced by a compilation run
pub struct CompiledNetwork {
    pub topology: Topology,
    pub graph: Graph,
    /// Base routing tables, with the tagged traffic engineering entries merged in
    pub routing: RoutingState,
    /// Present only when the topology declares demands
    pub traffic_engineering: Option<TrafficEngineering>,
}

impl CompiledNetwork {
    pub fn summary(&self) -> TopologySummary {
        summarize(&self.topology, &self.graph)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopologySummary {
    pub routers: usize,
    pub hosts: usize,
    pub switches: usize,
    pub links: usize,
    pub subnets: usize,
    pub down_interfaces: usize,
    pub demands: usize,
    pub components: usize,
}

pub fn summarize(topology: &Topology, graph: &Graph) -> TopologySummary {
    let subnets: BTreeSet<Ipv4Subnet> = graph.links().map(|(_, l)| l.subnet()).collect();
    TopologySummary {
        routers: graph.routers().count(),
        hosts: graph.hosts().count(),
        switches: graph.switches().count(),
        links: graph.links().count(),
        subnets: subnets.len(),
        down_interfaces: graph.down_interfaces().count(),
        demands: topology.demands().len(),
        components: graph.component_count(),
    }
}

/// Validates the definition and resolves its links, without computing any routes
pub fn prepare(ctx: &RunContext, spec: TopologySpec) -> Result<(Topology, Graph), TopologyError> {
    let topology = Topology::from_spec(spec)?;
    let graph = resolve(ctx, &topology)?;
    Ok((topology, graph))
}

/// Runs the whole pipeline: validation, link resolution, routing and traffic engineering
///
/// Only structural problems with the definition are errors. Solver failures degrade to an
/// unoptimized result, and the base routing stays valid.
pub fn compile(
    ctx: &RunContext,
    spec: TopologySpec,
    solver: &dyn Solver,
) -> Result<CompiledNetwork, TopologyError> {
    let (topology, graph) = prepare(ctx, spec)?;
    let mut routing = compute_routing(ctx, &graph);

    let traffic_engineering = if topology.demands().is_empty() {
        None
    } else {
        let te = optimize(ctx, &graph, topology.demands(), solver);
        routing.apply_overlay(&te.overlay);
        Some(te)
    };

    Ok(CompiledNetwork {
        topology,
        graph,
        routing,
        traffic_engineering,
    })
}
