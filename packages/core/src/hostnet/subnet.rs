//! Private /24 walk used when allocating a cluster network

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// First subnet tried for a new cluster network
pub const FIRST_SUBNET: Ipv4Addr = Ipv4Addr::new(192, 168, 49, 0);

/// Upper bound on subnets tried before giving up
///
/// The third octet runs out first: from [`FIRST_SUBNET`] the walk yields
/// 13 candidates (ending at octet 235), and even a start at octet 0 yields
/// only 15.
pub const SUBNET_ATTEMPTS: usize = 20;

/// An IPv4 network in CIDR form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    pub ip: Ipv4Addr,
    pub prefix: u8,
}

impl Subnet {
    pub fn new(ip: Ipv4Addr, prefix: u8) -> Self {
        Self { ip, prefix }
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix)
    }
}

impl FromStr for Subnet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("{s:?} is not in CIDR form"))?;
        let ip = ip
            .parse::<Ipv4Addr>()
            .map_err(|e| format!("{s:?}: {e}"))?;
        let prefix = prefix
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| format!("{s:?}: invalid prefix length"))?;
        Ok(Self { ip, prefix })
    }
}

/// Candidate /24s starting at `start`
///
/// Retry `n` advances the third octet by `9 + n`, giving 49, 59, 70, 82
/// and so on from the default start. The walk ends early rather than pass
/// octet 254.
pub fn candidate_subnets(start: Ipv4Addr, attempts: usize) -> Vec<Subnet> {
    let [a, b, c, _] = start.octets();
    let mut third = u32::from(c);
    let mut out = Vec::with_capacity(attempts);
    for attempt in 0..attempts {
        if attempt > 0 {
            third += 9 + attempt as u32;
        }
        if third > 254 {
            break;
        }
        out.push(Subnet::new(Ipv4Addr::new(a, b, third as u8, 0), 24));
    }
    out
}

/// First host address of `subnet`, used as its gateway
pub fn gateway_of(subnet: &Subnet) -> Ipv4Addr {
    let [a, b, c, d] = subnet.ip.octets();
    Ipv4Addr::new(a, b, c, d.wrapping_add(1))
}
