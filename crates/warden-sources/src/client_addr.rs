//! Client-address normalization.
//!
//! Surfaces sit behind proxies, so the client address arrives as an ordered
//! chain of forwarding-header values, each possibly a comma-separated list.
//! The first candidate that parses as a public IP wins; anything private,
//! loopback, link-local, or otherwise non-routable is skipped rather than
//! trusted. When nothing in the chain qualifies, the transport remote
//! address is used, never a wildcard placeholder.

use std::net::IpAddr;

/// Forwarding headers in trust order, for hosts assembling the value chain.
pub const FORWARDED_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "client-ip",
    "x-forwarded-for",
    "x-forwarded",
    "x-cluster-client-ip",
    "forwarded-for",
    "forwarded",
];

/// Whether `addr` is routable on the public internet.
pub fn is_public(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            !(v4.is_unspecified()
                || v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_multicast())
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            let unique_local = (segments[0] & 0xfe00) == 0xfc00;
            let link_local = (segments[0] & 0xffc0) == 0xfe80;
            !(v6.is_unspecified() || v6.is_loopback() || v6.is_multicast() || unique_local
                || link_local)
        }
    }
}

/// Picks the client address out of an ordered chain of header values,
/// falling back to the transport remote address.
pub fn normalize_client_addr<'a, I>(header_values: I, remote_addr: IpAddr) -> IpAddr
where
    I: IntoIterator<Item = &'a str>,
{
    for value in header_values {
        for candidate in value.split(',') {
            let candidate = candidate.trim();
            if candidate.is_empty() {
                continue;
            }
            if let Ok(addr) = candidate.parse::<IpAddr>() {
                if is_public(&addr) {
                    return addr;
                }
            }
        }
    }
    remote_addr
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const REMOTE: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

    #[test]
    fn first_public_candidate_wins() {
        let addr = normalize_client_addr(["203.0.113.5", "198.51.100.9"], REMOTE);
        assert_eq!(addr, "203.0.113.5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn comma_separated_proxy_chain_is_split() {
        let addr = normalize_client_addr(["10.0.0.1, 203.0.113.5, 198.51.100.9"], REMOTE);
        assert_eq!(addr, "203.0.113.5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn private_and_garbage_candidates_are_skipped() {
        let addr = normalize_client_addr(
            ["10.1.2.3", "not-an-ip", "127.0.0.1", "169.254.0.9"],
            REMOTE,
        );
        assert_eq!(addr, REMOTE);
    }

    #[test]
    fn empty_chain_falls_back_to_remote() {
        let addr = normalize_client_addr(std::iter::empty(), REMOTE);
        assert_eq!(addr, REMOTE);
    }

    #[test]
    fn ipv6_scopes_are_filtered() {
        assert!(is_public(&"2001:db8::1".parse().unwrap()));
        assert!(!is_public(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(!is_public(&"fe80::1".parse().unwrap()));
        assert!(!is_public(&"fd00::1".parse().unwrap()));
        assert!(!is_public(&"ff02::1".parse().unwrap()));
    }
}
