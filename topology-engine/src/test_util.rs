//! Fixtures shared by the unit tests

use crate::network::spec::{DemandSpec, ElementSpec, InterfaceSpec, TopologySpec};
use bon::builder;
use std::net::Ipv4Addr;

#[builder]
pub fn interface(
    #[builder(start_fn)] name: &str,
    #[builder(start_fn)] cidr: &str,
    cost: Option<u32>,
    capacity_mbps: Option<f64>,
) -> InterfaceSpec {
    let (address, prefix) = cidr.split_once('/').unwrap();
    let prefix: u32 = prefix.parse().unwrap();
    InterfaceSpec {
        name: name.to_string(),
        address: address.parse().unwrap(),
        mask: Ipv4Addr::from_bits(u32::MAX << (32 - prefix)),
        cost: cost.unwrap_or(1),
        capacity_mbps,
    }
}

pub fn element(name: &str, interfaces: Vec<InterfaceSpec>) -> ElementSpec {
    ElementSpec {
        name: name.to_string(),
        interfaces,
    }
}

pub fn demand(source: &str, destination: &str, rate_mbps: f64) -> DemandSpec {
    DemandSpec {
        source: source.to_string(),
        destination: destination.to_string(),
        rate_mbps,
    }
}

/// Two routers joined by a /30, with one host behind each of them
#[builder]
pub fn two_routers(
    #[builder(default = 1)] link_cost: u32,
    #[builder(default)] demands: Vec<DemandSpec>,
) -> TopologySpec {
    TopologySpec {
        routers: vec![
            element(
                "r1",
                vec![
                    interface("eth0", "10.0.1.1/24").call(),
                    interface("eth1", "10.0.0.1/30").cost(link_cost).call(),
                ],
            ),
            element(
                "r2",
                vec![
                    interface("eth0", "10.0.2.1/24").call(),
                    interface("eth1", "10.0.0.2/30").cost(link_cost).call(),
                ],
            ),
        ],
        hosts: vec![
            element("h1", vec![interface("eth0", "10.0.1.2/24").call()]),
            element("h2", vec![interface("eth0", "10.0.2.2/24").call()]),
        ],
        demands,
    }
}

/// Four routers, each with one host, and three demands competing for the links around r4
///
/// ```text
/// r1 --10-- r2
/// r1 --8--- r4
/// r2 --3--- r4
/// r3 --10-- r4
/// ```
///
/// Host `hN` hangs off router `rN`.
#[builder]
pub fn four_routers(#[builder(default = true)] with_demands: bool) -> TopologySpec {
    let routers = vec![
        element(
            "r1",
            vec![
                interface("eth0", "10.0.1.1/24").call(),
                interface("eth1", "10.1.14.1/30").capacity_mbps(8.0).call(),
                interface("eth2", "10.1.12.1/30").capacity_mbps(10.0).call(),
            ],
        ),
        element(
            "r2",
            vec![
                interface("eth0", "10.0.2.1/24").call(),
                interface("eth1", "10.1.12.2/30").capacity_mbps(10.0).call(),
                interface("eth2", "10.1.24.1/30").capacity_mbps(3.0).call(),
            ],
        ),
        element(
            "r3",
            vec![
                interface("eth0", "10.0.3.1/24").call(),
                interface("eth1", "10.1.34.1/30").capacity_mbps(10.0).call(),
            ],
        ),
        element(
            "r4",
            vec![
                interface("eth0", "10.0.4.1/24").call(),
                interface("eth1", "10.1.14.2/30").capacity_mbps(8.0).call(),
                interface("eth2", "10.1.24.2/30").capacity_mbps(3.0).call(),
                interface("eth3", "10.1.34.2/30").capacity_mbps(10.0).call(),
            ],
        ),
    ];

    let hosts = (1..=4)
        .map(|i| {
            element(
                &format!("h{i}"),
                vec![interface("eth0", &format!("10.0.{i}.2/24")).call()],
            )
        })
        .collect();

    let demands = if with_demands {
        vec![
            demand("h1", "h4", 10.0),
            demand("h4", "h2", 2.0),
            demand("h3", "h4", 15.0),
        ]
    } else {
        Vec::new()
    };

    TopologySpec {
        routers,
        hosts,
        demands,
    }
}
