//! Trusted proxy address list

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Single address or CIDR network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    #[must_use]
    pub const fn host(addr: IpAddr) -> Self {
        let prefix = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Self { addr, prefix }
    }

    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether `ip` lies inside this network
    ///
    /// IPv4-mapped IPv6 addresses are compared as IPv4.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix))
                    .unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for IpNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some((addr, prefix)) = s.split_once('/') else {
            let addr = s
                .parse::<IpAddr>()
                .map_err(|e| format!("invalid IP address '{s}': {e}"))?;
            return Ok(Self::host(addr.to_canonical()));
        };

        let addr = addr
            .parse::<IpAddr>()
            .map_err(|e| format!("invalid network address '{s}': {e}"))?
            .to_canonical();
        let prefix = prefix
            .parse::<u8>()
            .map_err(|e| format!("invalid prefix length in '{s}': {e}"))?;
        let max = Self::host(addr).prefix;
        if prefix > max {
            return Err(format!("prefix length {prefix} exceeds {max} in '{s}'"));
        }

        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Parse a comma or whitespace separated list of addresses and networks
pub fn parse_allow_list(value: &str) -> Result<Vec<IpNetwork>, String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Empty list allows every peer
#[must_use]
pub fn is_allowed(list: &[IpNetwork], peer: IpAddr) -> bool {
    list.is_empty() || list.iter().any(|net| net.contains(peer))
}
