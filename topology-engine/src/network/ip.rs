use anyhow::{Context, anyhow, bail};
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// An interface address together with its network prefix (e.g. `10.0.0.1/24`)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    pub(crate) address: Ipv4Addr,
    pub(crate) network_prefix: u8,
}

impl Ipv4Cidr {
    /// Builds a CIDR out of a dotted-quad address and mask
    ///
    /// Returns `None` if the mask is not contiguous or selects no bits at all.
    pub fn from_address_and_mask(address: Ipv4Addr, mask: Ipv4Addr) -> Option<Self> {
        let network_prefix = prefix_len_from_mask(mask)?;
        Some(Self {
            address,
            network_prefix,
        })
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn subnet(&self) -> Ipv4Subnet {
        Ipv4Subnet::new(self.address, self.network_prefix)
    }
}

impl Display for Ipv4Cidr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.network_prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, network_prefix) = parse_cidr(s)?;
        Ok(Self {
            address,
            network_prefix,
        })
    }
}

/// An IPv4 network in canonical form (host bits cleared)
///
/// Ordering is by network address first and prefix length second, which is the order used
/// everywhere a stable iteration over subnets is required.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv4Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Subnet {
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Self {
        let mask = mask_bits(prefix_len);
        Self {
            network: Ipv4Addr::from_bits(address.to_bits() & mask),
            prefix_len,
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(mask_bits(self.prefix_len))
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.network.to_bits() | !mask_bits(self.prefix_len))
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        address.to_bits() & mask_bits(self.prefix_len) == self.network.to_bits()
    }

    /// Whether the address ranges of both subnets share at least one address
    pub fn overlaps(&self, other: &Ipv4Subnet) -> bool {
        self.contains(other.network) || other.contains(self.network)
    }
}

impl Display for Ipv4Subnet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Ipv4Subnet {
    type Err = anyhow::Error;

    // Parse ranges in CIDR syntax (e.g. 10.0.0.0/24), clearing any host bits
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix_len) = parse_cidr(s)?;
        Ok(Self::new(address, prefix_len))
    }
}

fn parse_cidr(s: &str) -> anyhow::Result<(Ipv4Addr, u8)> {
    let mut parts = s.split('/');
    let base_ip: IpAddr = parts
        .next()
        .ok_or(anyhow!("empty string"))?
        .parse()
        .context("invalid ip address in ip range")?;

    let IpAddr::V4(base_ip) = base_ip else {
        bail!("only IPv4 is supported");
    };

    // A missing network prefix is interpreted as /32 (i.e. singleton ip range)
    let network_prefix: u8 = parts
        .next()
        .unwrap_or("32")
        .parse()
        .context("the provided network prefix is not a valid unsigned integer")?;
    if network_prefix == 0 {
        bail!("network prefix cannot be 0");
    }
    if network_prefix > 32 {
        bail!("network prefix cannot be higher than 32");
    }

    if parts.next().is_some() {
        bail!("ip range contains trailing characters");
    }

    Ok((base_ip, network_prefix))
}

fn mask_bits(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    }
}

/// Converts a dotted-quad mask into a prefix length, rejecting non-contiguous and empty masks
pub fn prefix_len_from_mask(mask: Ipv4Addr) -> Option<u8> {
    let bits = mask.to_bits();
    let prefix_len = bits.leading_ones();
    if prefix_len == 0 || bits.count_ones() != prefix_len {
        return None;
    }

    Some(prefix_len as u8)
}

#[test]
fn test_subnet_from_str() {
    let cases = [
        ("10.0.0.0/24", "10.0.0.0", "10.0.0.255"),
        ("10.0.0.123/24", "10.0.0.0", "10.0.0.255"),
        ("10.0.0.0/8", "10.0.0.0", "10.255.255.255"),
        ("20.0.0.0/12", "20.0.0.0", "20.15.255.255"),
        ("192.168.1.7/30", "192.168.1.4", "192.168.1.7"),
    ];

    for (input, network, broadcast) in cases {
        let subnet = Ipv4Subnet::from_str(input).unwrap();
        assert_eq!(subnet.network().to_string(), network);
        assert_eq!(subnet.broadcast().to_string(), broadcast);
    }
}

#[test]
fn test_prefix_len_from_mask() {
    let cases = [
        ("255.255.255.0", Some(24)),
        ("255.255.255.252", Some(30)),
        ("255.0.0.0", Some(8)),
        ("255.255.255.255", Some(32)),
        ("0.0.0.0", None),
        ("255.0.255.0", None),
        ("0.255.255.255", None),
    ];

    for (mask, expected) in cases {
        let mask: Ipv4Addr = mask.parse().unwrap();
        assert_eq!(prefix_len_from_mask(mask), expected, "{mask}");
    }
}

#[test]
fn test_subnet_overlap() {
    let a: Ipv4Subnet = "10.0.0.0/24".parse().unwrap();
    let b: Ipv4Subnet = "10.0.0.0/16".parse().unwrap();
    let c: Ipv4Subnet = "10.0.1.0/24".parse().unwrap();
    let d: Ipv4Subnet = "10.1.0.0/16".parse().unwrap();

    assert!(a.overlaps(&b));
    assert!(b.overlaps(&a));
    assert!(c.overlaps(&b));
    assert!(!a.overlaps(&c));
    assert!(!b.overlaps(&d));
    assert_eq!(a.mask().to_string(), "255.255.255.0");
}

#[test]
fn test_cidr_display() {
    let cidr = Ipv4Cidr::from_address_and_mask(
        "10.0.0.7".parse().unwrap(),
        "255.255.255.0".parse().unwrap(),
    )
    .unwrap();
    assert_eq!(cidr.to_string(), "10.0.0.7/24");
    assert_eq!(cidr.subnet().to_string(), "10.0.0.0/24");
    assert!("10.0.0.7/33".parse::<Ipv4Cidr>().is_err());
    assert!("::1/64".parse::<Ipv4Cidr>().is_err());
}
