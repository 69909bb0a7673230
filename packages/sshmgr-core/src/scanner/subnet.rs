//! IPv4 subnet enumeration

use crate::error::ProbeError;
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

/// Expand a CIDR into its usable host addresses, ascending.
///
/// Network and broadcast addresses are excluded, so `/31` and `/32` yield an
/// empty list. Host bits in the input are ignored (`10.0.0.9/30` expands the
/// same as `10.0.0.8/30`).
pub fn enumerate_hosts(cidr: &str) -> Result<Vec<Ipv4Addr>, ProbeError> {
    let input = cidr.trim();
    let invalid = |reason: String| ProbeError::InvalidSubnet {
        input: input.to_string(),
        reason,
    };

    if !input.contains('/') {
        return Err(invalid("missing prefix length".to_string()));
    }
    let net: Ipv4Network = input.parse().map_err(|e| invalid(format!("{}", e)))?;

    let mask = u32::from(net.mask());
    let start = u32::from(net.ip()) & mask;
    let end = start | !mask;

    if end.saturating_sub(start) < 2 {
        return Ok(Vec::new());
    }

    let hosts: Vec<Ipv4Addr> = ((start + 1)..end).map(Ipv4Addr::from).collect();
    tracing::debug!("Subnet {} expands to {} hosts", input, hosts.len());
    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slash_30() {
        let hosts = enumerate_hosts("10.0.0.0/30").unwrap();
        assert_eq!(
            hosts,
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );
    }

    #[test]
    fn test_slash_31_and_32_are_empty() {
        assert!(enumerate_hosts("10.0.0.0/31").unwrap().is_empty());
        assert!(enumerate_hosts("10.0.0.7/32").unwrap().is_empty());
    }

    #[test]
    fn test_lengths_match_prefix() {
        for prefix in 20..=32u32 {
            let hosts = enumerate_hosts(&format!("192.168.0.0/{}", prefix)).unwrap();
            let expected = if prefix >= 31 {
                0
            } else {
                (1usize << (32 - prefix)) - 2
            };
            assert_eq!(hosts.len(), expected, "prefix /{}", prefix);
        }
    }

    #[test]
    fn test_excludes_network_and_broadcast() {
        let hosts = enumerate_hosts("192.168.1.77/24").unwrap();
        assert_eq!(hosts.first(), Some(&Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(hosts.last(), Some(&Ipv4Addr::new(192, 168, 1, 254)));
        assert!(!hosts.contains(&Ipv4Addr::new(192, 168, 1, 0)));
        assert!(!hosts.contains(&Ipv4Addr::new(192, 168, 1, 255)));
        assert!(hosts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_invalid_inputs() {
        for input in [
            "",
            "10.0.0.0",
            "10.0.0.0/33",
            "not-a-subnet/24",
            "fd00::/64",
            "10.0.0.0/24x",
        ] {
            assert!(
                matches!(enumerate_hosts(input), Err(ProbeError::InvalidSubnet { .. })),
                "{:?} should be rejected",
                input
            );
        }
    }
}
