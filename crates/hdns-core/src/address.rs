//! Public IPv4 validation
//!
//! Shared by the public IP resolvers and the reconciliation engine so that
//! both sides agree on what counts as a usable address.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::{Error, Result};

/// Parse `raw` and accept it only if it is a globally routable IPv4 address
///
/// Rejected: unparsable text, any IPv6 literal, the unspecified address,
/// RFC 1918 private ranges, loopback and multicast.
pub fn validate_public_ipv4(raw: &str) -> Result<Ipv4Addr> {
    let ip: IpAddr = raw
        .trim()
        .parse()
        .map_err(|_| Error::invalid_address(format!("'{}' is not an IP address", raw)))?;

    let IpAddr::V4(v4) = ip else {
        return Err(Error::invalid_address(format!("{} is not an IPv4 address", ip)));
    };

    if v4.is_unspecified() {
        return Err(Error::invalid_address(format!("{} is unspecified", v4)));
    }
    if v4.is_private() {
        return Err(Error::invalid_address(format!("{} is a private address", v4)));
    }
    if v4.is_loopback() {
        return Err(Error::invalid_address(format!("{} is a loopback address", v4)));
    }
    if v4.is_multicast() {
        return Err(Error::invalid_address(format!("{} is a multicast address", v4)));
    }

    Ok(v4)
}

/// Parse `raw` as IPv4 without the public-range checks
///
/// DNS answers are compared against stored addresses as-is; only the shape
/// is checked here.
pub fn parse_ipv4(raw: &str) -> Result<Ipv4Addr> {
    raw.trim()
        .parse()
        .map_err(|_| Error::invalid_address(format!("'{}' is not an IPv4 address", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_public() {
        for raw in ["0.0.0.0", "127.0.0.1", "10.0.0.5", "192.168.1.1", "172.16.4.2", "224.0.0.1"] {
            assert!(
                matches!(validate_public_ipv4(raw), Err(Error::InvalidAddress(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_rejects_ipv6_and_garbage() {
        assert!(validate_public_ipv4("2001:db8::1").is_err());
        assert!(validate_public_ipv4("::1").is_err());
        assert!(validate_public_ipv4("not an ip").is_err());
        assert!(validate_public_ipv4("").is_err());
    }

    #[test]
    fn test_accepts_public_with_whitespace() {
        assert_eq!(
            validate_public_ipv4(" 203.0.113.7\n").unwrap(),
            Ipv4Addr::new(203, 0, 113, 7)
        );
    }

    #[test]
    fn test_parse_ipv4_shape_only() {
        assert_eq!(parse_ipv4("10.0.0.1").unwrap(), Ipv4Addr::new(10, 0, 0, 1));
        assert!(parse_ipv4("2001:db8::1").is_err());
        assert!(parse_ipv4("1.2.3").is_err());
    }
}
