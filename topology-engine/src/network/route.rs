use crate::network::ip::Ipv4Subnet;
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Marker carried by the packets of one optimized demand
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FlowTag(pub u32);

impl Display for FlowTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteEntry {
    #[serde_as(as = "DisplayFromStr")]
    pub destination: Ipv4Subnet,
    /// Local interface the traffic leaves through
    #[serde(with = "crate::util::serde_arc_str")]
    pub interface: Arc<str>,
    /// Next hop, or `None` if the destination is directly connected
    pub gateway: Option<Gateway>,
    pub metric: u64,
    pub tag: Option<FlowTag>,
}

impl RouteEntry {
    pub(crate) fn matches(&self, address: Ipv4Addr) -> bool {
        self.destination.contains(address)
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Gateway {
    #[serde(with = "crate::util::serde_arc_str")]
    pub element: Arc<str>,
    #[serde(with = "crate::util::serde_arc_str")]
    pub interface: Arc<str>,
    #[serde_as(as = "DisplayFromStr")]
    pub address: Ipv4Addr,
}

/// Forwarding state of a single router
///
/// Holds at most one untagged entry per destination subnet. Tagged entries live next to them
/// and win over the untagged ones for packets carrying the matching tag.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoutingTable {
    #[serde(with = "crate::util::serde_arc_str")]
    router: Arc<str>,
    #[serde(rename = "entries", serialize_with = "serialize_default_routes")]
    default_routes: BTreeMap<Ipv4Subnet, RouteEntry>,
    #[serde(rename = "tagged_entries")]
    tagged_routes: Vec<RouteEntry>,
}

fn serialize_default_routes<S>(
    routes: &BTreeMap<Ipv4Subnet, RouteEntry>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(routes.values())
}

impl RoutingTable {
    pub fn new(router: Arc<str>) -> Self {
        Self {
            router,
            default_routes: BTreeMap::new(),
            tagged_routes: Vec::new(),
        }
    }

    pub fn router(&self) -> &Arc<str> {
        &self.router
    }

    /// Adds an entry, replacing the untagged entry for the same subnet if there was one
    pub fn insert(&mut self, entry: RouteEntry) -> Option<RouteEntry> {
        match entry.tag {
            None => self.default_routes.insert(entry.destination, entry),
            Some(tag) => {
                let existing = self
                    .tagged_routes
                    .iter()
                    .position(|r| r.tag == Some(tag) && r.destination == entry.destination);
                match existing {
                    Some(i) => Some(std::mem::replace(&mut self.tagged_routes[i], entry)),
                    None => {
                        self.tagged_routes.push(entry);
                        self.tagged_routes
                            .sort_by_key(|r| (r.tag, r.destination));
                        None
                    }
                }
            }
        }
    }

    /// The untagged entry for exactly this subnet
    pub fn route(&self, destination: Ipv4Subnet) -> Option<&RouteEntry> {
        self.default_routes.get(&destination)
    }

    /// Untagged entries in subnet order, followed by tagged entries in tag order
    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.default_routes.values().chain(self.tagged_routes.iter())
    }

    pub fn default_entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.default_routes.values()
    }

    pub fn tagged_entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.tagged_routes.iter()
    }

    /// Longest-prefix match, preferring entries carrying `tag` when one is given
    pub fn lookup(&self, address: Ipv4Addr, tag: Option<FlowTag>) -> Option<&RouteEntry> {
        let tagged = tag.and_then(|tag| {
            self.tagged_routes
                .iter()
                .filter(|r| r.tag == Some(tag) && r.matches(address))
                .max_by_key(|r| r.destination.prefix_len())
        });

        tagged.or_else(|| {
            self.default_routes
                .values()
                .filter(|r| r.matches(address))
                .max_by_key(|r| r.destination.prefix_len())
        })
    }
}
