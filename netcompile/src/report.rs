use topology_engine::CompiledNetwork;
use topology_engine::network::route::RouteEntry;
use topology_engine::traffic_engineering::{FlowSolution, FlowStatus, TrafficEngineering};
use topology_engine::util::format_mbps;

pub fn print_report(compiled: &CompiledNetwork, print_goodput: bool) {
    let summary = compiled.summary();
    println!("--- Topology ---");
    println!("* Routers: {}", summary.routers);
    println!("* Hosts: {}", summary.hosts);
    println!("* Switches: {}", summary.switches);
    println!("* Links: {}", summary.links);
    println!("* Subnets: {}", summary.subnets);
    println!("* Down interfaces: {}", summary.down_interfaces);
    println!("* Demands: {}", summary.demands);
    println!("* Connected components: {}", summary.components);

    println!("--- Links ---");
    for edge in compiled.graph.describe().edges {
        println!(
            "* {}: {} <-> {} (cost {}, capacity {} Mbps)",
            edge.id,
            edge.a,
            edge.b,
            edge.cost,
            format_mbps(edge.capacity_mbps)
        );
    }

    println!("--- Routing tables ---");
    for table in compiled.routing.tables() {
        println!("* {}:", table.router());
        for entry in table.entries() {
            println!("  * {}", format_route(entry));
        }
    }

    println!("--- Host gateways ---");
    for (host, gateway) in compiled.routing.host_gateways() {
        println!(
            "* {host}: default via {} ({}:{}) dev {}",
            gateway.gateway.address,
            gateway.gateway.element,
            gateway.gateway.interface,
            gateway.interface
        );
    }

    if let Some(te) = &compiled.traffic_engineering {
        print_traffic_engineering(te);
        if print_goodput {
            print_goodput_report(te);
        }
    }
}

fn format_route(entry: &RouteEntry) -> String {
    let mut route = entry.destination.to_string();
    if let Some(gateway) = &entry.gateway {
        route.push_str(&format!(
            " via {} ({}:{})",
            gateway.address, gateway.element, gateway.interface
        ));
    }
    route.push_str(&format!(" dev {} metric {}", entry.interface, entry.metric));
    if let Some(tag) = entry.tag {
        route.push_str(&format!(" tag {tag}"));
    }
    route
}

fn print_traffic_engineering(te: &TrafficEngineering) {
    println!("--- Traffic engineering ---");
    println!("* Outcome: {}", te.outcome);
    for flow in &te.flows {
        let tag = match flow.tag {
            Some(tag) => format!("tag {tag}"),
            None => "untagged".to_string(),
        };
        println!(
            "* {} ({} -> {}): {}, {tag}",
            flow.demand,
            flow.source,
            flow.destination,
            status_label(flow.status)
        );
        if !flow.path.is_empty() {
            println!("  * Path: {}", format_path(flow));
        }
    }
}

fn print_goodput_report(te: &TrafficEngineering) {
    println!("--- Goodput ---");
    for flow in &te.flows {
        println!(
            "* {} ({} -> {}): {} / {} Mbps ({:.2}%)",
            flow.demand,
            flow.source,
            flow.destination,
            format_mbps(flow.achieved_mbps),
            format_mbps(flow.desired_mbps),
            flow.effectiveness() * 100.0
        );
    }

    if let Some(min) = te.min_effectiveness() {
        println!("* Minimum effectiveness: {:.2}%", min * 100.0);
    }
}

fn status_label(status: FlowStatus) -> &'static str {
    match status {
        FlowStatus::Optimized => "optimized",
        FlowStatus::Infeasible => "infeasible (endpoints not connected)",
        FlowStatus::NotOptimized => "not optimized",
    }
}

/// `h1:eth0 > r1:eth1 > r4:eth0 > h4`
fn format_path(flow: &FlowSolution) -> String {
    let mut path: Vec<_> = flow
        .path
        .iter()
        .map(|hop| format!("{}:{}", hop.from, hop.interface))
        .collect();
    if let Some(last) = flow.path.last() {
        path.push(last.to.to_string());
    }
    path.join(" > ")
}
