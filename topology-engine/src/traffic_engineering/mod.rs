//! Max-min fair traffic engineering
//!
//! All demands are encoded in one multi-commodity flow program. Each demand selects a single simple
//! path through binary edge variables, allocates bandwidth on the selected edges, and shares the
//! capacity of every physical link with the other demands. The objective maximizes the smallest
//! effectiveness ratio, with the sum of all ratios as a secondary term.

pub mod model;
pub mod solver;

use crate::context::RunContext;
use crate::network::Graph;
use crate::network::link::{Hop, LinkId};
use crate::network::node::{NodeId, NodeKind};
use crate::network::route::{FlowTag, RouteEntry};
use crate::network::topology::Demand;
use crate::routing::{departure_cost, gateway};
use model::{LpModel, Sense, Term};
use serde::Serialize;
use solver::{SolveStatus, Solution, Solver, SolverError};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// How the optimization run as a whole ended
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SolveOutcome {
    Optimal,
    Feasible,
    /// The joint model has no feasible solution
    Infeasible,
    /// No demand could be connected, so there was nothing to solve
    Skipped,
    Timeout,
    SolverUnavailable,
    SolverFailed,
    Cancelled,
}

impl Display for SolveOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let outcome = match self {
            SolveOutcome::Optimal => "optimal",
            SolveOutcome::Feasible => "feasible (not proven optimal)",
            SolveOutcome::Infeasible => "infeasible",
            SolveOutcome::Skipped => "skipped",
            SolveOutcome::Timeout => "solver timed out",
            SolveOutcome::SolverUnavailable => "solver unavailable",
            SolveOutcome::SolverFailed => "solver failed",
            SolveOutcome::Cancelled => "cancelled",
        };
        f.write_str(outcome)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowStatus {
    /// The demand got a path and a rate from the solver
    Optimized,
    /// Source and destination are not connected
    Infeasible,
    /// The solver produced no usable assignment for this demand
    NotOptimized,
}

/// One step of an optimized path
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PathHop {
    #[serde(with = "crate::util::serde_arc_str")]
    pub from: Arc<str>,
    #[serde(with = "crate::util::serde_arc_str")]
    pub interface: Arc<str>,
    #[serde(with = "crate::util::serde_arc_str")]
    pub to: Arc<str>,
    #[serde(with = "crate::util::serde_arc_str")]
    pub to_interface: Arc<str>,
    /// Ids of the physical links traversed by this step
    pub links: Vec<Arc<str>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowSolution {
    #[serde(with = "crate::util::serde_arc_str")]
    pub demand: Arc<str>,
    #[serde(with = "crate::util::serde_arc_str")]
    pub source: Arc<str>,
    #[serde(with = "crate::util::serde_arc_str")]
    pub destination: Arc<str>,
    pub desired_mbps: f64,
    pub achieved_mbps: f64,
    pub status: FlowStatus,
    pub tag: Option<FlowTag>,
    pub path: Vec<PathHop>,
}

impl FlowSolution {
    /// Achieved rate over desired rate, in `[0, 1]`
    pub fn effectiveness(&self) -> f64 {
        self.achieved_mbps / self.desired_mbps
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrafficEngineering {
    pub outcome: SolveOutcome,
    /// One entry per demand, in declaration order
    pub flows: Vec<FlowSolution>,
    /// Tagged routing entries steering each optimized flow along its path, keyed by router
    #[serde(skip)]
    pub overlay: Vec<(Arc<str>, RouteEntry)>,
}

impl TrafficEngineering {
    /// The smallest effectiveness ratio over all demands
    pub fn min_effectiveness(&self) -> Option<f64> {
        self.flows
            .iter()
            .map(|f| f.effectiveness())
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// The edges a single demand may use, along with their variables
struct Commodity {
    demand: usize,
    edges: Vec<CommodityEdge>,
    lambda: Arc<str>,
}

struct CommodityEdge {
    hop: Hop,
    selected: Arc<str>,
    allocation: Arc<str>,
}

/// The joint program for all connected demands
pub struct DemandModel {
    model: LpModel,
    commodities: Vec<Commodity>,
    /// Demands whose endpoints are not connected, which are left out of the program
    disconnected: BTreeSet<usize>,
}

impl DemandModel {
    pub fn lp(&self) -> &LpModel {
        &self.model
    }

    pub fn is_empty(&self) -> bool {
        self.commodities.is_empty()
    }
}

/// Builds the multi-commodity flow program for the demands
pub fn build_model(graph: &Graph, demands: &[Demand]) -> DemandModel {
    let mut model = LpModel::new();
    let mut commodities = Vec::new();
    let mut disconnected = BTreeSet::new();
    let mut link_usage: BTreeMap<LinkId, Vec<Term>> = BTreeMap::new();

    let min_r = model.add_continuous("min_r".to_string(), 0.0, None);
    model.add_objective_term(1.0, &min_r);

    for (index, demand) in demands.iter().enumerate() {
        let allowed = allowed_hops(graph, demand);
        if !is_connected(demand, &allowed) {
            tracing::warn!(
                "demand {} from {} to {} is infeasible, the endpoints are not connected",
                demand.id,
                graph.node(demand.source).id(),
                graph.node(demand.destination).id(),
            );
            disconnected.insert(index);
            continue;
        }

        let id = &demand.id;
        let mut edges = Vec::with_capacity(allowed.len());
        for hop in allowed {
            let from = graph.node(hop.from).id();
            let to = graph.node(hop.to).id();
            let to_interface = graph.node(hop.to).interface(hop.to_interface).name();

            let mut suffix = format!("{from}_{to}_{to_interface}");
            if model.has_variable(&format!("{id}_{suffix}")) {
                // Parallel hops into the same interface, disambiguated by the local interface
                let interface = graph.node(hop.from).interface(hop.interface).name();
                suffix = format!("{suffix}_{interface}");
            }

            let selected = model.add_binary(format!("{id}_{suffix}"));
            let allocation = model.add_continuous(format!("{id}_cap_{suffix}"), 0.0, None);
            edges.push(CommodityEdge {
                hop: hop.clone(),
                selected,
                allocation,
            });
        }

        let lambda = model.add_continuous(format!("lambda_{id}"), 0.0, Some(demand.rate_mbps));
        let ratio = model.add_continuous(format!("r_{id}"), 0.0, Some(1.0));
        model.add_objective_term(1.0, &ratio);

        add_path_constraints(&mut model, graph, demand, &edges, &lambda);

        // Allocations only exist on selected edges and never exceed the edge's capacity
        for edge in &edges {
            let capacity = hop_capacity(graph, &edge.hop);
            model.add_constraint(
                format!("alloc_{}", edge.selected),
                vec![
                    Term::new(1.0, &edge.allocation),
                    Term::new(-capacity, &edge.selected),
                ],
                Sense::LessEq,
                0.0,
            );

            for link in edge.hop.via.links() {
                link_usage
                    .entry(link)
                    .or_default()
                    .push(Term::new(1.0, &edge.allocation));
            }
        }

        model.add_constraint(
            format!("ratio_{id}"),
            vec![
                Term::new(demand.rate_mbps, &ratio),
                Term::new(-1.0, &lambda),
            ],
            Sense::Eq,
            0.0,
        );
        model.add_constraint(
            format!("minr_{id}"),
            vec![Term::new(1.0, &min_r), Term::new(-1.0, &ratio)],
            Sense::LessEq,
            0.0,
        );

        commodities.push(Commodity {
            demand: index,
            edges,
            lambda,
        });
    }

    for (link, terms) in link_usage {
        let link = graph.link(link);
        model.add_constraint(
            format!("capacity_{}", link.id()),
            terms,
            Sense::LessEq,
            link.capacity_mbps(),
        );
    }

    tracing::debug!(
        "built traffic engineering model with {} variables and {} constraints",
        model.variables().count(),
        model.constraints().len()
    );

    DemandModel {
        model,
        commodities,
        disconnected,
    }
}

/// Flow conservation, single in/out edge per node, allocation continuity and rate coupling
fn add_path_constraints(
    model: &mut LpModel,
    graph: &Graph,
    demand: &Demand,
    edges: &[CommodityEdge],
    lambda: &Arc<str>,
) {
    let id = &demand.id;
    let nodes: BTreeSet<NodeId> = edges
        .iter()
        .flat_map(|e| [e.hop.from, e.hop.to])
        .collect();

    for node in nodes {
        let name = graph.node(node).id();
        let incoming: Vec<_> = edges.iter().filter(|e| e.hop.to == node).collect();
        let outgoing: Vec<_> = edges.iter().filter(|e| e.hop.from == node).collect();

        let balance = if node == demand.destination {
            1.0
        } else if node == demand.source {
            -1.0
        } else {
            0.0
        };

        let flow_terms = incoming
            .iter()
            .map(|e| Term::new(1.0, &e.selected))
            .chain(outgoing.iter().map(|e| Term::new(-1.0, &e.selected)))
            .collect();
        model.add_constraint(format!("flow_{id}_{name}"), flow_terms, Sense::Eq, balance);

        model.add_constraint(
            format!("in_{id}_{name}"),
            incoming.iter().map(|e| Term::new(1.0, &e.selected)).collect(),
            Sense::LessEq,
            1.0,
        );
        model.add_constraint(
            format!("out_{id}_{name}"),
            outgoing.iter().map(|e| Term::new(1.0, &e.selected)).collect(),
            Sense::LessEq,
            1.0,
        );

        if node == demand.source {
            let mut terms: Vec<_> = outgoing
                .iter()
                .map(|e| Term::new(1.0, &e.allocation))
                .collect();
            terms.push(Term::new(-1.0, lambda));
            model.add_constraint(format!("src_{id}"), terms, Sense::Eq, 0.0);
        } else if node == demand.destination {
            let mut terms: Vec<_> = incoming
                .iter()
                .map(|e| Term::new(1.0, &e.allocation))
                .collect();
            terms.push(Term::new(-1.0, lambda));
            model.add_constraint(format!("dst_{id}"), terms, Sense::Eq, 0.0);
        } else {
            let terms = incoming
                .iter()
                .map(|e| Term::new(1.0, &e.allocation))
                .chain(outgoing.iter().map(|e| Term::new(-1.0, &e.allocation)))
                .collect();
            model.add_constraint(format!("cont_{id}_{name}"), terms, Sense::Eq, 0.0);
        }
    }
}

/// The hops a demand may use: anything between routers, plus the hops leaving the source and the
/// hops entering the destination
fn allowed_hops<'a>(graph: &'a Graph, demand: &Demand) -> Vec<&'a Hop> {
    let is_router = |node: NodeId| graph.node(node).kind() == NodeKind::Router;

    graph
        .nodes()
        .flat_map(|(id, _)| graph.hops(id))
        .filter(|hop| hop.to != demand.source && hop.from != demand.destination)
        .filter(|hop| hop.from == demand.source || is_router(hop.from))
        .filter(|hop| hop.to == demand.destination || is_router(hop.to))
        .collect()
}

fn is_connected(demand: &Demand, allowed: &[&Hop]) -> bool {
    let mut visited = HashSet::from([demand.source]);
    let mut queue = VecDeque::from([demand.source]);
    while let Some(node) = queue.pop_front() {
        if node == demand.destination {
            return true;
        }

        for hop in allowed.iter().filter(|h| h.from == node) {
            if visited.insert(hop.to) {
                queue.push_back(hop.to);
            }
        }
    }

    false
}

/// The bottleneck capacity of the links a hop traverses
fn hop_capacity(graph: &Graph, hop: &Hop) -> f64 {
    hop.via
        .links()
        .map(|link| graph.link(link).capacity_mbps())
        .fold(f64::INFINITY, f64::min)
}

/// Computes paths and rates for every demand, degrading gracefully when solving fails
pub fn optimize(
    ctx: &RunContext,
    graph: &Graph,
    demands: &[Demand],
    solver: &dyn Solver,
) -> TrafficEngineering {
    let model = build_model(graph, demands);
    if model.is_empty() {
        tracing::info!("no demand can be routed, skipping the solver");
        return unsolved(graph, demands, &model, SolveOutcome::Skipped);
    }

    if ctx.is_cancelled() {
        tracing::warn!("traffic engineering cancelled before solving");
        return unsolved(graph, demands, &model, SolveOutcome::Cancelled);
    }

    tracing::info!(
        "solving traffic engineering model for {} demands",
        model.commodities.len()
    );
    let result = solver.solve(&model.model, ctx.solver_timeout);

    if ctx.is_cancelled() {
        tracing::warn!("traffic engineering cancelled while solving, discarding the solution");
        return unsolved(graph, demands, &model, SolveOutcome::Cancelled);
    }

    let solution = match result {
        Ok(solution) => solution,
        Err(e) => {
            tracing::warn!("{e}, no traffic engineering applied");
            let outcome = match e {
                SolverError::Timeout(_) => SolveOutcome::Timeout,
                SolverError::Unavailable { .. } => SolveOutcome::SolverUnavailable,
                SolverError::Failed(_) => SolveOutcome::SolverFailed,
            };
            return unsolved(graph, demands, &model, outcome);
        }
    };

    let outcome = match solution.status() {
        SolveStatus::Optimal => SolveOutcome::Optimal,
        SolveStatus::Feasible => SolveOutcome::Feasible,
        SolveStatus::Infeasible => {
            tracing::warn!("the traffic engineering model is infeasible, reporting zero rates");
            return unsolved(graph, demands, &model, SolveOutcome::Infeasible);
        }
    };

    interpret(graph, demands, &model, &solution, outcome)
}

/// Every demand without a path or rate
fn unsolved(
    graph: &Graph,
    demands: &[Demand],
    model: &DemandModel,
    outcome: SolveOutcome,
) -> TrafficEngineering {
    let flows = demands
        .iter()
        .enumerate()
        .map(|(index, demand)| {
            let status = if model.disconnected.contains(&index) {
                FlowStatus::Infeasible
            } else {
                FlowStatus::NotOptimized
            };
            empty_flow(graph, demand, status)
        })
        .collect();

    TrafficEngineering {
        outcome,
        flows,
        overlay: Vec::new(),
    }
}

fn empty_flow(graph: &Graph, demand: &Demand, status: FlowStatus) -> FlowSolution {
    FlowSolution {
        demand: demand.id.clone(),
        source: graph.node(demand.source).id().clone(),
        destination: graph.node(demand.destination).id().clone(),
        desired_mbps: demand.rate_mbps,
        achieved_mbps: 0.0,
        status,
        tag: None,
        path: Vec::new(),
    }
}

fn interpret(
    graph: &Graph,
    demands: &[Demand],
    model: &DemandModel,
    solution: &Solution,
    outcome: SolveOutcome,
) -> TrafficEngineering {
    let mut flows: Vec<_> = demands
        .iter()
        .map(|demand| empty_flow(graph, demand, FlowStatus::Infeasible))
        .collect();
    let mut overlay = Vec::new();
    let mut next_tag = 1;

    for commodity in &model.commodities {
        let demand = &demands[commodity.demand];
        let flow = &mut flows[commodity.demand];

        let Some(path) = walk_path(demand, commodity, solution) else {
            tracing::warn!(
                "the solution does not contain a path for demand {}",
                demand.id
            );
            flow.status = FlowStatus::NotOptimized;
            continue;
        };

        let tag = FlowTag(next_tag);
        next_tag += 1;

        let lambda = solution.value(&commodity.lambda);
        flow.achieved_mbps = lambda.clamp(0.0, demand.rate_mbps);
        flow.status = FlowStatus::Optimized;
        flow.tag = Some(tag);
        flow.path = path.iter().map(|hop| path_hop(graph, hop)).collect();

        tracing::debug!(
            "demand {} gets {} of {} Mbps with tag {tag}",
            demand.id,
            flow.achieved_mbps,
            demand.rate_mbps
        );
        overlay.extend(overlay_entries(graph, &path, tag));
    }

    TrafficEngineering {
        outcome,
        flows,
        overlay,
    }
}

/// Follows the selected edges from the source to the destination
fn walk_path<'a>(
    demand: &Demand,
    commodity: &'a Commodity,
    solution: &Solution,
) -> Option<Vec<&'a Hop>> {
    let mut path = Vec::new();
    let mut visited = HashSet::from([demand.source]);
    let mut current = demand.source;

    while current != demand.destination {
        let edge = commodity
            .edges
            .iter()
            .find(|e| e.hop.from == current && solution.is_selected(&e.selected))?;

        if !visited.insert(edge.hop.to) {
            return None;
        }

        path.push(&edge.hop);
        current = edge.hop.to;
    }

    Some(path)
}

fn path_hop(graph: &Graph, hop: &Hop) -> PathHop {
    let from = graph.node(hop.from);
    let to = graph.node(hop.to);
    PathHop {
        from: from.id().clone(),
        interface: from.interface(hop.interface).name().clone(),
        to: to.id().clone(),
        to_interface: to.interface(hop.to_interface).name().clone(),
        links: hop.via.links().map(|l| graph.link(l).id().clone()).collect(),
    }
}

/// One tagged entry for every router along the path, pointing at the next hop
fn overlay_entries(graph: &Graph, path: &[&Hop], tag: FlowTag) -> Vec<(Arc<str>, RouteEntry)> {
    let Some(last) = path.last() else {
        return Vec::new();
    };
    let destination = graph
        .node(last.to)
        .interface(last.to_interface)
        .subnet();

    let mut entries = Vec::new();
    for (i, hop) in path.iter().enumerate() {
        let from = graph.node(hop.from);
        if from.kind() != NodeKind::Router {
            continue;
        }

        // Up to the element attached to the destination subnet, like the untagged routes
        let metric: u64 = path[i..path.len() - 1]
            .iter()
            .map(|h| departure_cost(graph, h))
            .sum();
        entries.push((
            from.id().clone(),
            RouteEntry {
                destination,
                interface: from.interface(hop.interface).name().clone(),
                gateway: Some(gateway(graph, hop)),
                metric,
                tag: Some(tag),
            },
        ));
    }

    entries
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::network::resolver::resolve;
    use crate::network::spec::TopologySpec;
    use crate::network::topology::Topology;
    use crate::test_util::{demand, element, four_routers, interface, two_routers};
    use std::cell::Cell;
    use std::time::Duration;

    /// Returns a fixed solution, checking that it only mentions variables of the model
    struct StaticSolver {
        solution: Solution,
        values: Vec<(&'static str, f64)>,
    }

    impl StaticSolver {
        fn new(status: SolveStatus, values: Vec<(&'static str, f64)>) -> Self {
            let mut solution = Solution::new(status);
            for &(name, value) in &values {
                solution.set_value(name, value);
            }
            Self { solution, values }
        }
    }

    impl Solver for StaticSolver {
        fn solve(&self, model: &LpModel, _: Duration) -> Result<Solution, SolverError> {
            for (name, _) in &self.values {
                assert!(model.has_variable(name), "unknown variable {name}");
            }
            Ok(self.solution.clone())
        }
    }

    struct FailingSolver<F: Fn() -> SolverError> {
        error: F,
        calls: Cell<usize>,
    }

    impl<F: Fn() -> SolverError> Solver for FailingSolver<F> {
        fn solve(&self, _: &LpModel, _: Duration) -> Result<Solution, SolverError> {
            self.calls.set(self.calls.get() + 1);
            Err((self.error)())
        }
    }

    fn failing<F: Fn() -> SolverError>(error: F) -> FailingSolver<F> {
        FailingSolver {
            error,
            calls: Cell::new(0),
        }
    }

    fn setup(spec: TopologySpec) -> (Graph, Topology) {
        let topology = Topology::from_spec(spec).unwrap();
        let graph = resolve(&RunContext::default(), &topology).unwrap();
        (graph, topology)
    }

    /// The optimal assignment for [`four_routers`]
    fn four_routers_assignment() -> Vec<(&'static str, f64)> {
        let r2 = 10.0 / 15.0;
        vec![
            ("d0_h1_r1_eth0", 1.0),
            ("d0_r1_r4_eth1", 1.0),
            ("d0_r4_h4_eth0", 1.0),
            ("d0_cap_h1_r1_eth0", 8.0),
            ("d0_cap_r1_r4_eth1", 8.0),
            ("d0_cap_r4_h4_eth0", 8.0),
            ("lambda_d0", 8.0),
            ("r_d0", 0.8),
            ("d1_h4_r4_eth0", 1.0),
            ("d1_r4_r2_eth2", 1.0),
            ("d1_r2_h2_eth0", 1.0),
            ("d1_cap_h4_r4_eth0", 2.0),
            ("d1_cap_r4_r2_eth2", 2.0),
            ("d1_cap_r2_h2_eth0", 2.0),
            ("lambda_d1", 2.0),
            ("r_d1", 1.0),
            ("d2_h3_r3_eth0", 1.0),
            ("d2_r3_r4_eth3", 1.0),
            ("d2_r4_h4_eth0", 1.0),
            ("d2_cap_h3_r3_eth0", 10.0),
            ("d2_cap_r3_r4_eth3", 10.0),
            ("d2_cap_r4_h4_eth0", 10.0),
            ("lambda_d2", 10.0),
            ("r_d2", r2),
            ("min_r", r2),
        ]
    }

    fn four_routers_solution() -> StaticSolver {
        StaticSolver::new(SolveStatus::Optimal, four_routers_assignment())
    }

    /// The optimal assignment for [`four_routers`], with some values replaced
    fn four_routers_assignment_with(overrides: &[(&str, f64)]) -> Solution {
        let mut solution = Solution::new(SolveStatus::Optimal);
        for (name, value) in four_routers_assignment() {
            solution.set_value(name, value);
        }
        for &(name, value) in overrides {
            solution.set_value(name, value);
        }
        solution
    }

    #[test]
    fn test_four_routers_fair_allocation() {
        let (graph, topology) = setup(four_routers().call());
        let solver = four_routers_solution();

        let model = build_model(&graph, topology.demands());
        let violations = model.lp().violations(&solver.solution);
        assert!(violations.is_empty(), "{violations:#?}");

        let te = optimize(&RunContext::default(), &graph, topology.demands(), &solver);
        assert_eq!(te.outcome, SolveOutcome::Optimal);

        let rates: Vec<_> = te.flows.iter().map(|f| f.achieved_mbps).collect();
        assert_eq!(rates, vec![8.0, 2.0, 10.0]);

        let ratios: Vec<_> = te
            .flows
            .iter()
            .map(|f| (f.effectiveness() * 10000.0).round() / 100.0)
            .collect();
        assert_eq!(ratios, vec![80.0, 100.0, 66.67]);
        assert!((te.min_effectiveness().unwrap() - 10.0 / 15.0).abs() < 1e-9);

        let tags: Vec<_> = te.flows.iter().map(|f| f.tag).collect();
        assert_eq!(tags, vec![Some(FlowTag(1)), Some(FlowTag(2)), Some(FlowTag(3))]);

        let path: Vec<_> = te.flows[0].path.iter().map(|h| h.to.to_string()).collect();
        assert_eq!(path, vec!["r1", "r4", "h4"]);
        assert_eq!(
            te.flows[0].path[1].links,
            vec![Arc::<str>::from("r1_eth1_r4_eth1")]
        );
    }

    #[test]
    fn test_higher_minimum_for_d2_exceeds_its_uplink() {
        let (graph, topology) = setup(four_routers().call());
        let model = build_model(&graph, topology.demands());
        let lp = model.lp();
        let fair = four_routers_assignment_with(&[]);

        // h3 only reaches h4 through the 10 Mbps r3 uplink, so d2 cannot exceed 10 / 15
        for lambda in [10.5, 12.0] {
            let ratio = lambda / 15.0;
            let solution = four_routers_assignment_with(&[
                ("d2_cap_h3_r3_eth0", lambda),
                ("d2_cap_r3_r4_eth3", lambda),
                ("d2_cap_r4_h4_eth0", lambda),
                ("lambda_d2", lambda),
                ("r_d2", ratio),
                ("min_r", ratio),
            ]);

            assert!(lp.objective_value(&solution) > lp.objective_value(&fair));
            let violations = lp.violations(&solution);
            assert!(
                violations
                    .iter()
                    .any(|v| v.starts_with("capacity_r3_eth1_r4_eth3:")),
                "{violations:#?}"
            );
        }
    }

    #[test]
    fn test_d0_is_capped_by_the_links_it_can_use() {
        let (graph, topology) = setup(four_routers().call());
        let model = build_model(&graph, topology.demands());
        let lp = model.lp();

        // The direct r1 - r4 link only carries 8 Mbps
        let direct = four_routers_assignment_with(&[
            ("d0_cap_h1_r1_eth0", 9.0),
            ("d0_cap_r1_r4_eth1", 9.0),
            ("d0_cap_r4_h4_eth0", 9.0),
            ("lambda_d0", 9.0),
            ("r_d0", 0.9),
        ]);
        let violations = lp.violations(&direct);
        assert!(
            violations
                .iter()
                .any(|v| v.starts_with("capacity_r1_eth1_r4_eth1:")),
            "{violations:#?}"
        );

        // Going around through r2 hits the 3 Mbps r2 - r4 link, which d1 also uses
        let detour = |lambda: f64, min_r: f64| {
            four_routers_assignment_with(&[
                ("d0_r1_r4_eth1", 0.0),
                ("d0_cap_r1_r4_eth1", 0.0),
                ("d0_r1_r2_eth1", 1.0),
                ("d0_r2_r4_eth2", 1.0),
                ("d0_cap_h1_r1_eth0", lambda),
                ("d0_cap_r1_r2_eth1", lambda),
                ("d0_cap_r2_r4_eth2", lambda),
                ("d0_cap_r4_h4_eth0", lambda),
                ("lambda_d0", lambda),
                ("r_d0", lambda / 10.0),
                ("min_r", min_r),
            ])
        };

        let violations = lp.violations(&detour(9.0, 10.0 / 15.0));
        assert!(
            violations
                .iter()
                .any(|v| v.starts_with("capacity_r2_eth2_r4_eth2:")),
            "{violations:#?}"
        );

        // Only 1 Mbps is left for d0 on the detour, which lowers the minimum ratio
        let feasible_detour = detour(1.0, 0.1);
        let violations = lp.violations(&feasible_detour);
        assert!(violations.is_empty(), "{violations:#?}");
        assert!(
            lp.objective_value(&feasible_detour)
                < lp.objective_value(&four_routers_assignment_with(&[]))
        );
    }

    #[test]
    fn test_four_routers_overlay() {
        let (graph, topology) = setup(four_routers().call());
        let te = optimize(
            &RunContext::default(),
            &graph,
            topology.demands(),
            &four_routers_solution(),
        );

        // Every router on every path gets exactly one entry (h1 and h3 are hosts)
        let routers: Vec<_> = te
            .overlay
            .iter()
            .map(|(router, e)| format!("{router}/{}", e.tag.unwrap()))
            .collect();
        assert_eq!(routers, vec!["r1/1", "r4/1", "r4/2", "r2/2", "r3/3", "r4/3"]);

        let (_, r1) = &te.overlay[0];
        assert_eq!(r1.destination.to_string(), "10.0.4.0/24");
        assert_eq!(r1.interface.as_ref(), "eth1");
        assert_eq!(r1.metric, 1);
        let gateway = r1.gateway.as_ref().unwrap();
        assert_eq!(gateway.element.as_ref(), "r4");
        assert_eq!(gateway.address.to_string(), "10.1.14.2");

        let (_, r4) = &te.overlay[1];
        assert_eq!(r4.interface.as_ref(), "eth0");
        assert_eq!(r4.metric, 0);
        assert!(r4.gateway.is_some());
    }

    #[test]
    fn test_model_structure() {
        let (graph, topology) = setup(four_routers().call());
        let model = build_model(&graph, topology.demands());
        let lp = model.lp();

        // Hosts only show up as the endpoints of their own demands
        assert!(lp.has_variable("d0_h1_r1_eth0"));
        assert!(!lp.has_variable("d0_r1_h1_eth0"));
        assert!(!lp.has_variable("d0_r2_h2_eth0"));
        assert!(!lp.has_variable("d0_h4_r4_eth0"));
        assert!(lp.has_variable("d1_r2_h2_eth0"));

        // Router to router hops go both ways
        assert!(lp.has_variable("d0_r4_r1_eth1"));
        assert!(lp.has_variable("d0_r1_r4_eth1"));

        let capacity = lp.constraint("capacity_r1_eth1_r4_eth1").unwrap();
        assert_eq!(capacity.rhs, 8.0);
        // Three demands, two directions each
        assert_eq!(capacity.terms.len(), 6);

        let src = lp.constraint("src_d0").unwrap();
        assert_eq!(src.terms.len(), 2);
        assert!(lp.constraint("flow_d0_h1").is_some());
        assert!(lp.constraint("cont_d0_r2").is_some());
        assert!(lp.constraint("ratio_d2").is_some());
        assert!(lp.constraint("minr_d1").is_some());

        let text = lp.to_lp_string();
        assert!(text.starts_with("\\ Traffic engineering model\nMaximize\n obj: min_r + r_d0 + r_d1 + r_d2\n"));
        assert!(text.contains("\n 0 <= lambda_d2 <= 15\n"));
        assert!(text.contains("\n 0 <= r_d0 <= 1\n"));
        assert!(text.contains("\nBinary\n d0_r1_r4_eth1\n"));
        assert!(text.contains("\n d0_h1_r1_eth0\n"));
        assert!(text.ends_with("End\n"));
    }

    #[test]
    fn test_switch_hops_use_both_attachment_links() {
        let spec = TopologySpec {
            routers: vec![
                element(
                    "r1",
                    vec![
                        interface("eth0", "10.0.1.1/24").call(),
                        interface("eth1", "10.0.0.1/24").capacity_mbps(5.0).call(),
                    ],
                ),
                element(
                    "r2",
                    vec![
                        interface("eth0", "10.0.2.1/24").call(),
                        interface("eth1", "10.0.0.2/24").capacity_mbps(7.0).call(),
                    ],
                ),
                element("r3", vec![interface("eth0", "10.0.0.3/24").call()]),
            ],
            hosts: vec![
                element("h1", vec![interface("eth0", "10.0.1.2/24").call()]),
                element("h2", vec![interface("eth0", "10.0.2.2/24").call()]),
            ],
            demands: vec![demand("h1", "h2", 10.0)],
        };

        let (graph, topology) = setup(spec);
        let model = build_model(&graph, topology.demands());
        let lp = model.lp();

        let alloc = lp.constraint("alloc_d0_r1_r2_eth1").unwrap();
        assert_eq!(alloc.terms[1].coefficient, -5.0);
        assert_eq!(lp.constraint("capacity_r1_eth1_s0").unwrap().rhs, 5.0);
        assert_eq!(lp.constraint("capacity_r2_eth1_s0").unwrap().rhs, 7.0);
        assert!(
            lp.constraint("capacity_r1_eth1_s0")
                .unwrap()
                .terms
                .iter()
                .any(|t| &*t.variable == "d0_cap_r1_r2_eth1")
        );
    }

    #[test]
    fn test_disconnected_demand_is_infeasible() {
        let mut spec = two_routers()
            .demands(vec![demand("h1", "h2", 5.0), demand("h1", "h3", 5.0)])
            .call();
        spec.hosts
            .push(element("h3", vec![interface("eth0", "192.168.0.2/24").call()]));

        let (graph, topology) = setup(spec);
        let solver = StaticSolver::new(
            SolveStatus::Optimal,
            vec![
                ("d0_h1_r1_eth0", 1.0),
                ("d0_r1_r2_eth1", 1.0),
                ("d0_r2_h2_eth0", 1.0),
                ("d0_cap_h1_r1_eth0", 5.0),
                ("d0_cap_r1_r2_eth1", 5.0),
                ("d0_cap_r2_h2_eth0", 5.0),
                ("lambda_d0", 5.0),
                ("r_d0", 1.0),
                ("min_r", 1.0),
            ],
        );

        let model = build_model(&graph, topology.demands());
        assert!(!model.lp().has_variable("lambda_d1"));
        assert!(model.lp().violations(&solver.solution).is_empty());

        let te = optimize(&RunContext::default(), &graph, topology.demands(), &solver);
        assert_eq!(te.flows[0].status, FlowStatus::Optimized);
        assert_eq!(te.flows[0].achieved_mbps, 5.0);
        assert_eq!(te.flows[1].status, FlowStatus::Infeasible);
        assert_eq!(te.flows[1].achieved_mbps, 0.0);
        assert_eq!(te.flows[1].tag, None);
        assert_eq!(te.flows[0].tag, Some(FlowTag(1)));
    }

    #[test]
    fn test_only_disconnected_demands_skip_the_solver() {
        let mut spec = two_routers().demands(vec![demand("h1", "h3", 5.0)]).call();
        // h3 only shares a segment with h4
        spec.hosts
            .push(element("h3", vec![interface("eth0", "192.168.0.2/24").call()]));
        spec.hosts
            .push(element("h4", vec![interface("eth0", "192.168.0.3/24").call()]));

        let (graph, topology) = setup(spec);
        let solver = failing(|| SolverError::Failed("unreachable".to_string()));
        let te = optimize(&RunContext::default(), &graph, topology.demands(), &solver);

        assert_eq!(te.outcome, SolveOutcome::Skipped);
        assert_eq!(solver.calls.get(), 0);
        assert_eq!(te.flows[0].status, FlowStatus::Infeasible);
    }

    #[test]
    fn test_solver_errors_degrade_gracefully() {
        let (graph, topology) = setup(four_routers().call());
        let ctx = RunContext::default();

        let cases: Vec<(Box<dyn Solver>, SolveOutcome)> = vec![
            (
                Box::new(failing(|| SolverError::Timeout(Duration::from_secs(1)))),
                SolveOutcome::Timeout,
            ),
            (
                Box::new(failing(|| SolverError::Unavailable {
                    program: "cbc".to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })),
                SolveOutcome::SolverUnavailable,
            ),
            (
                Box::new(failing(|| SolverError::Failed("boom".to_string()))),
                SolveOutcome::SolverFailed,
            ),
            (
                Box::new(StaticSolver::new(SolveStatus::Infeasible, Vec::new())),
                SolveOutcome::Infeasible,
            ),
        ];

        for (solver, expected) in cases {
            let te = optimize(&ctx, &graph, topology.demands(), solver.as_ref());
            assert_eq!(te.outcome, expected);
            assert!(te.overlay.is_empty());
            for flow in &te.flows {
                assert_eq!(flow.status, FlowStatus::NotOptimized);
                assert_eq!(flow.achieved_mbps, 0.0);
                assert_eq!(flow.tag, None);
            }
        }
    }

    #[test]
    fn test_cancellation() {
        let (graph, topology) = setup(four_routers().call());
        let (token, signal) = CancellationToken::new();
        let ctx = RunContext {
            cancellation: Some(token),
            ..RunContext::default()
        };
        signal.cancel();

        let solver = failing(|| SolverError::Failed("unreachable".to_string()));
        let te = optimize(&ctx, &graph, topology.demands(), &solver);
        assert_eq!(te.outcome, SolveOutcome::Cancelled);
        assert_eq!(solver.calls.get(), 0);
        assert!(te.flows.iter().all(|f| f.status == FlowStatus::NotOptimized));
    }

    #[test]
    fn test_broken_solution_is_not_optimized() {
        let (graph, topology) = setup(two_routers().demands(vec![demand("h1", "h2", 5.0)]).call());

        // The selected edges stop at r1
        let solver = StaticSolver::new(
            SolveStatus::Feasible,
            vec![("d0_h1_r1_eth0", 1.0), ("lambda_d0", 5.0)],
        );
        let te = optimize(&RunContext::default(), &graph, topology.demands(), &solver);
        assert_eq!(te.outcome, SolveOutcome::Feasible);
        assert_eq!(te.flows[0].status, FlowStatus::NotOptimized);
        assert_eq!(te.flows[0].tag, None);
    }
}
