use crate::error::TopologyError;
use crate::network::ip::Ipv4Cidr;
use crate::network::node::{Interface, Node, NodeId, NodeKind};
use crate::network::spec::{DemandSpec, ElementSpec, TopologySpec};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Validated, immutable view of the user's network definition
///
/// Routers come first (in declaration order), followed by hosts. Their position in
/// [`Topology::elements`] is their [`NodeId`].
#[derive(Clone, Debug)]
pub struct Topology {
    pub(crate) elements: Vec<Node>,
    pub(crate) demands: Vec<Demand>,
    element_index: HashMap<Arc<str>, NodeId>,
}

/// A traffic requirement between two elements
#[derive(Clone, Debug)]
pub struct Demand {
    pub id: Arc<str>,
    pub source: NodeId,
    pub destination: NodeId,
    /// The desired goodput, in Mbps
    pub rate_mbps: f64,
}

impl Topology {
    pub fn from_spec(spec: TopologySpec) -> Result<Self, TopologyError> {
        let mut elements = Vec::with_capacity(spec.routers.len() + spec.hosts.len());
        let mut element_index = HashMap::new();
        let mut addresses: HashMap<Ipv4Addr, (Arc<str>, Arc<str>)> = HashMap::new();

        let routers = spec.routers.into_iter().map(|r| (r, NodeKind::Router));
        let hosts = spec.hosts.into_iter().map(|h| (h, NodeKind::Host));
        for (element_spec, kind) in routers.chain(hosts) {
            let node = validate_element(element_spec, kind)?;

            for interface in &node.interfaces {
                if let Some((element, name)) = addresses.get(&interface.address()) {
                    return Err(TopologyError::DuplicateAddress {
                        address: interface.address(),
                        first_element: element.clone(),
                        first_interface: name.clone(),
                        second_element: node.id.clone(),
                        second_interface: interface.name.clone(),
                    });
                }

                addresses.insert(
                    interface.address(),
                    (node.id.clone(), interface.name.clone()),
                );
            }

            let id = NodeId(elements.len());
            if element_index.insert(node.id.clone(), id).is_some() {
                return Err(TopologyError::DuplicateElement {
                    name: node.id.to_string(),
                });
            }

            elements.push(node);
        }

        let mut topology = Self {
            elements,
            demands: Vec::with_capacity(spec.demands.len()),
            element_index,
        };

        for (index, demand) in spec.demands.into_iter().enumerate() {
            let demand = topology.validate_demand(index, demand)?;
            topology.demands.push(demand);
        }

        Ok(topology)
    }

    fn validate_demand(&self, index: usize, demand: DemandSpec) -> Result<Demand, TopologyError> {
        let lookup = |name: &str| {
            self.element_id(name)
                .ok_or_else(|| TopologyError::UnknownElementReference {
                    index,
                    name: name.to_string(),
                })
        };

        let source = lookup(&demand.source)?;
        let destination = lookup(&demand.destination)?;
        if source == destination {
            return Err(TopologyError::InvalidDemand {
                index,
                reason: format!("source and destination are both `{}`", demand.source),
            });
        }

        if !demand.rate_mbps.is_finite() || demand.rate_mbps <= 0.0 {
            return Err(TopologyError::InvalidDemand {
                index,
                reason: format!("rate must be a positive number, got {}", demand.rate_mbps),
            });
        }

        Ok(Demand {
            id: format!("d{index}").into(),
            source,
            destination,
            rate_mbps: demand.rate_mbps,
        })
    }

    pub fn demands(&self) -> &[Demand] {
        &self.demands
    }

    pub fn element_id(&self, name: &str) -> Option<NodeId> {
        self.element_index.get(name).copied()
    }

    pub fn routers(&self) -> impl Iterator<Item = &Node> {
        self.elements.iter().filter(|e| e.kind == NodeKind::Router)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Node> {
        self.elements.iter().filter(|e| e.kind == NodeKind::Host)
    }
}

fn validate_element(spec: ElementSpec, kind: NodeKind) -> Result<Node, TopologyError> {
    validate_element_name(&spec.name)?;
    if spec.interfaces.is_empty() {
        return Err(TopologyError::NoInterfaces { element: spec.name });
    }

    let mut names = HashSet::new();
    let mut interfaces = Vec::with_capacity(spec.interfaces.len());
    for interface in spec.interfaces {
        let malformed = |reason: String| TopologyError::MalformedInterface {
            element: spec.name.clone(),
            interface: interface.name.clone(),
            reason,
        };

        if interface.name.is_empty() || !interface.name.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(malformed(
                "interface names must be non-empty and alphanumeric".to_string(),
            ));
        }

        if !names.insert(interface.name.clone()) {
            return Err(malformed("duplicate interface name".to_string()));
        }

        let cidr = Ipv4Cidr::from_address_and_mask(interface.address, interface.mask)
            .ok_or_else(|| malformed(format!("`{}` is not a valid subnet mask", interface.mask)))?;

        if let Some(capacity) = interface.capacity_mbps {
            if !capacity.is_finite() || capacity <= 0.0 {
                return Err(malformed(format!(
                    "capacity must be a positive number, got {capacity}"
                )));
            }
        }

        interfaces.push(Interface {
            name: interface.name.into(),
            cidr,
            cost: interface.cost,
            capacity_mbps: interface.capacity_mbps,
        });
    }

    Ok(Node::element(spec.name.into(), kind, interfaces))
}

fn validate_element_name(name: &str) -> Result<(), TopologyError> {
    let invalid = |reason| TopologyError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("names cannot be empty"));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid("names must be alphanumeric"));
    }

    if is_switch_name(name) {
        return Err(invalid("names matching `s<number>` are reserved for switches"));
    }

    Ok(())
}

fn is_switch_name(name: &str) -> bool {
    name.strip_prefix('s')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::spec::InterfaceSpec;

    fn interface(name: &str, address: &str, mask: &str) -> InterfaceSpec {
        InterfaceSpec {
            name: name.to_string(),
            address: address.parse().unwrap(),
            mask: mask.parse().unwrap(),
            cost: 1,
            capacity_mbps: None,
        }
    }

    fn element(name: &str, interfaces: Vec<InterfaceSpec>) -> ElementSpec {
        ElementSpec {
            name: name.to_string(),
            interfaces,
        }
    }

    fn base_spec() -> TopologySpec {
        TopologySpec {
            routers: vec![element(
                "r1",
                vec![interface("eth0", "10.0.0.1", "255.255.255.0")],
            )],
            hosts: vec![element(
                "h1",
                vec![interface("eth0", "10.0.0.2", "255.255.255.0")],
            )],
            demands: Vec::new(),
        }
    }

    #[test]
    fn test_routers_come_before_hosts() {
        let topology = Topology::from_spec(base_spec()).unwrap();
        assert_eq!(topology.element_id("r1"), Some(NodeId(0)));
        assert_eq!(topology.element_id("h1"), Some(NodeId(1)));
        assert_eq!(topology.routers().count(), 1);
        assert_eq!(topology.hosts().count(), 1);
    }

    #[test]
    fn test_invalid_mask_is_malformed_interface() {
        let mut spec = base_spec();
        spec.hosts[0].interfaces[0].mask = "255.0.255.0".parse().unwrap();

        let err = Topology::from_spec(spec).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::MalformedInterface { ref element, ref interface, .. }
                if element == "h1" && interface == "eth0"
        ));
    }

    #[test]
    fn test_duplicate_interface_name() {
        let mut spec = base_spec();
        spec.routers[0]
            .interfaces
            .push(interface("eth0", "10.0.1.1", "255.255.255.0"));

        let err = Topology::from_spec(spec).unwrap_err();
        assert!(matches!(err, TopologyError::MalformedInterface { .. }));
    }

    #[test]
    fn test_duplicate_element_name() {
        let mut spec = base_spec();
        spec.hosts[0].name = "r1".to_string();

        let err = Topology::from_spec(spec).unwrap_err();
        assert!(matches!(err, TopologyError::DuplicateElement { .. }));
    }

    #[test]
    fn test_duplicate_address() {
        let mut spec = base_spec();
        spec.hosts[0].interfaces[0].address = "10.0.0.1".parse().unwrap();

        let err = Topology::from_spec(spec).unwrap_err();
        assert!(matches!(err, TopologyError::DuplicateAddress { .. }));
    }

    #[test]
    fn test_reserved_and_invalid_names() {
        for name in ["s0", "s12", "", "r-1"] {
            let mut spec = base_spec();
            spec.routers[0].name = name.to_string();
            let err = Topology::from_spec(spec).unwrap_err();
            assert!(matches!(err, TopologyError::InvalidName { .. }), "{name}");
        }

        // Names that merely start with an `s` are fine
        let mut spec = base_spec();
        spec.routers[0].name = "spine1a".to_string();
        Topology::from_spec(spec).unwrap();
    }

    #[test]
    fn test_non_positive_capacity() {
        let mut spec = base_spec();
        spec.routers[0].interfaces[0].capacity_mbps = Some(0.0);

        let err = Topology::from_spec(spec).unwrap_err();
        assert!(matches!(err, TopologyError::MalformedInterface { .. }));
    }

    #[test]
    fn test_demand_validation() {
        let demand = |source: &str, destination: &str, rate_mbps: f64| DemandSpec {
            source: source.to_string(),
            destination: destination.to_string(),
            rate_mbps,
        };

        let mut spec = base_spec();
        spec.demands.push(demand("h1", "r1", 10.0));
        let topology = Topology::from_spec(spec).unwrap();
        assert_eq!(&*topology.demands()[0].id, "d0");
        assert_eq!(topology.demands()[0].source, NodeId(1));

        let mut spec = base_spec();
        spec.demands.push(demand("h1", "h9", 10.0));
        let err = Topology::from_spec(spec).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::UnknownElementReference { index: 0, ref name } if name == "h9"
        ));

        let mut spec = base_spec();
        spec.demands.push(demand("h1", "h1", 10.0));
        let err = Topology::from_spec(spec).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidDemand { .. }));

        let mut spec = base_spec();
        spec.demands.push(demand("h1", "r1", -1.0));
        let err = Topology::from_spec(spec).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidDemand { .. }));
    }
}
