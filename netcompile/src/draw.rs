use std::fmt::Write;
use topology_engine::network::GraphDescription;
use topology_engine::network::node::NodeKind;
use topology_engine::util::format_mbps;

/// Renders the resolved graph in Graphviz DOT syntax
///
/// Edges carry the link's cost and capacity, and the interface names at their ends.
pub fn render_dot(graph: &GraphDescription) -> String {
    let mut out = String::from("graph network {\n");
    for node in &graph.nodes {
        let shape = match node.kind {
            NodeKind::Router => "box",
            NodeKind::Host => "ellipse",
            NodeKind::Switch => "diamond",
        };
        _ = writeln!(out, "    \"{}\" [shape={shape}];", node.id);
    }

    for edge in &graph.edges {
        let (a, a_interface) = split_endpoint(&edge.a);
        let (b, b_interface) = split_endpoint(&edge.b);

        let mut attributes = vec![format!(
            "label=\"cost {}, {} Mbps\"",
            edge.cost,
            format_mbps(edge.capacity_mbps)
        )];
        if let Some(interface) = a_interface {
            attributes.push(format!("taillabel=\"{interface}\""));
        }
        if let Some(interface) = b_interface {
            attributes.push(format!("headlabel=\"{interface}\""));
        }

        _ = writeln!(out, "    \"{a}\" -- \"{b}\" [{}];", attributes.join(", "));
    }

    out.push_str("}\n");
    out
}

/// `r1:eth0` is an interface of `r1`, a bare id is a switch
fn split_endpoint(endpoint: &str) -> (&str, Option<&str>) {
    match endpoint.split_once(':') {
        Some((node, interface)) => (node, Some(interface)),
        None => (endpoint, None),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use topology_engine::network::{EdgeDescription, NodeDescription};

    #[test]
    fn test_render_dot() {
        let graph = GraphDescription {
            nodes: vec![
                NodeDescription {
                    id: "r1".into(),
                    kind: NodeKind::Router,
                },
                NodeDescription {
                    id: "r2".into(),
                    kind: NodeKind::Router,
                },
                NodeDescription {
                    id: "s0".into(),
                    kind: NodeKind::Switch,
                },
            ],
            edges: vec![
                EdgeDescription {
                    id: "r1_eth1_r2_eth0".into(),
                    a: "r1:eth1".to_string(),
                    b: "r2:eth0".to_string(),
                    cost: 2,
                    capacity_mbps: 2.5,
                },
                EdgeDescription {
                    id: "r1_eth0_s0".into(),
                    a: "r1:eth0".to_string(),
                    b: "s0".to_string(),
                    cost: 0,
                    capacity_mbps: 1000.0,
                },
            ],
        };

        let expected = r#"graph network {
    "r1" [shape=box];
    "r2" [shape=box];
    "s0" [shape=diamond];
    "r1" -- "r2" [label="cost 2, 2.5 Mbps", taillabel="eth1", headlabel="eth0"];
    "r1" -- "s0" [label="cost 0, 1000 Mbps", taillabel="eth0"];
}
"#;
        assert_eq!(render_dot(&graph), expected);
    }
}
