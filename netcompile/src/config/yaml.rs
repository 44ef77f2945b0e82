use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use topology_engine::network::spec::{
    DEFAULT_INTERFACE_COST, DemandSpec, ElementSpec, InterfaceSpec, TopologySpec,
};

/// The network definition file
///
/// ```yaml
/// routers:
///   r1:
///     eth0: { address: 10.0.0.1, mask: 255.255.255.252, cost: 2, capacity: 10 }
/// hosts:
///   h1:
///     eth0: { address: 10.0.1.2, mask: 255.255.255.0 }
/// demands:
///   - { source: h1, destination: h2, rate: 5 }
/// ```
#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct TopologyYaml {
    #[serde(default)]
    routers: BTreeMap<String, BTreeMap<String, InterfaceYaml>>,
    #[serde(default)]
    hosts: BTreeMap<String, BTreeMap<String, InterfaceYaml>>,
    #[serde(default)]
    demands: Vec<DemandYaml>,
}

#[serde_as]
#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
struct InterfaceYaml {
    #[serde_as(as = "DisplayFromStr")]
    address: Ipv4Addr,
    #[serde_as(as = "DisplayFromStr")]
    mask: Ipv4Addr,
    #[serde(default = "default_cost")]
    cost: u32,
    /// The capacity of the attached link, in Mbps
    capacity: Option<f64>,
}

fn default_cost() -> u32 {
    DEFAULT_INTERFACE_COST
}

#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
struct DemandYaml {
    source: String,
    destination: String,
    /// The desired goodput, in Mbps
    rate: f64,
}

impl From<TopologyYaml> for TopologySpec {
    fn from(yaml: TopologyYaml) -> Self {
        Self {
            routers: yaml.routers.into_iter().map(element).collect(),
            hosts: yaml.hosts.into_iter().map(element).collect(),
            demands: yaml
                .demands
                .into_iter()
                .map(|d| DemandSpec {
                    source: d.source,
                    destination: d.destination,
                    rate_mbps: d.rate,
                })
                .collect(),
        }
    }
}

fn element((name, interfaces): (String, BTreeMap<String, InterfaceYaml>)) -> ElementSpec {
    ElementSpec {
        name,
        interfaces: interfaces
            .into_iter()
            .map(|(name, i)| InterfaceSpec {
                name,
                address: i.address,
                mask: i.mask,
                cost: i.cost,
                capacity_mbps: i.capacity,
            })
            .collect(),
    }
}
