//! Peer address parsing and private-range classification

use crate::error::LookupError;
use ipnetwork::IpNetwork;
use once_cell::sync::Lazy;
use std::net::{IpAddr, SocketAddr};

/// Ranges that are never expected in a public geolocation database
static RESERVED_NETWORKS: Lazy<Vec<IpNetwork>> = Lazy::new(|| {
    [
        // IPv4
        "0.0.0.0/8",
        "10.0.0.0/8",
        "100.64.0.0/10",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "172.16.0.0/12",
        "192.0.0.0/24",
        "192.0.2.0/24",
        "192.168.0.0/16",
        "198.18.0.0/15",
        "198.51.100.0/24",
        "203.0.113.0/24",
        "240.0.0.0/4",
        "255.255.255.255/32",
        // IPv6
        "::/128",
        "::1/128",
        "100::/64",
        "2001::/23",
        "2001:db8::/32",
        "fc00::/7",
        "fe80::/10",
    ]
    .iter()
    .filter_map(|cidr| cidr.parse().ok())
    .collect()
});

/// Parse a peer address: a literal IP, a bracketed IPv6 or `ip:port`
pub fn parse_address(address: &str) -> Result<IpAddr, LookupError> {
    let trimmed = address.trim();

    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return Ok(ip);
    }
    if let Ok(socket) = trimmed.parse::<SocketAddr>() {
        return Ok(socket.ip());
    }
    if let Some(inner) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        if let Ok(ip) = inner.parse::<IpAddr>() {
            return Ok(ip);
        }
    }

    Err(LookupError::InvalidAddress(address.to_string()))
}

/// Whether `ip` lies in a private or reserved range
pub fn is_private(ip: IpAddr) -> bool {
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    };
    RESERVED_NETWORKS.iter().any(|network| network.contains(ip))
}
