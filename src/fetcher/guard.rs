//! Outbound address policy for page fetches.
//!
//! URLs reach the fetcher from retailer links and from model tool calls, so
//! every connection target is checked. Hostnames are resolved through
//! [`GuardedResolver`] and literal IPs are checked before the request is sent.
//! Redirect hops are checked the same way.

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use url::{Host, Url};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The target resolved only to loopback, private, link-local or otherwise
/// non-public addresses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("blocked non-public address for host {0}")]
pub struct BlockedHost(pub String);

/// Hosts exempt from the public-address check, matched case-insensitively
/// against the URL host (`127.0.0.1`, `localhost`, `[::1]` as written).
#[derive(Debug, Clone, Default)]
pub struct AddressPolicy {
    allowed_hosts: Arc<HashSet<String>>,
}

impl AddressPolicy {
    pub fn allowing<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_hosts = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self {
            allowed_hosts: Arc::new(allowed_hosts),
        }
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        self.allowed_hosts.contains(&host.to_ascii_lowercase())
    }

    /// Check a URL whose host is an IP literal. Domain names are left to the
    /// resolver.
    pub fn check_url(&self, url: &Url) -> Result<(), BlockedHost> {
        let ip = match url.host() {
            Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
            Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
            Some(Host::Domain(_)) | None => return Ok(()),
        };
        let host = url.host_str().unwrap_or_default();
        if self.is_allowed(host) || is_public_ip(ip) {
            Ok(())
        } else {
            Err(BlockedHost(host.to_string()))
        }
    }

    /// Drop non-public addresses for a resolved name; error when none remain.
    pub fn filter_addrs(
        &self,
        host: &str,
        addrs: impl IntoIterator<Item = SocketAddr>,
    ) -> Result<Vec<SocketAddr>, BlockedHost> {
        let allowed = self.is_allowed(host);
        let addrs: Vec<SocketAddr> = addrs
            .into_iter()
            .filter(|addr| allowed || is_public_ip(addr.ip()))
            .collect();
        if addrs.is_empty() {
            warn!(host, "Refusing to connect to non-public address");
            return Err(BlockedHost(host.to_string()));
        }
        Ok(addrs)
    }
}

/// DNS resolver that never hands reqwest a non-public address.
pub struct GuardedResolver {
    policy: AddressPolicy,
}

impl GuardedResolver {
    pub fn new(policy: AddressPolicy) -> Self {
        Self { policy }
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let policy = self.policy.clone();
        Box::pin(async move {
            let host = name.as_str().to_string();
            let resolved = tokio::net::lookup_host((host.as_str(), 0)).await?;
            let addrs = policy.filter_addrs(&host, resolved)?;
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok::<_, BoxError>(addrs)
        })
    }
}

pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (64..128).contains(&b))
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b == 18 || b == 19))
        || a >= 240)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
        // 2001:db8::/32 documentation
        || (first == 0x2001 && ip.segments()[1] == 0x0db8))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn internal_ranges_are_not_public() {
        for addr in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.9",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "100.64.0.1",
            "::1",
            "fe80::1",
            "fd00:ec2::254",
            "::ffff:127.0.0.1",
        ] {
            assert!(!is_public_ip(ip(addr)), "{addr} should be blocked");
        }
    }

    #[test]
    fn public_addresses_pass() {
        for addr in ["93.184.216.34", "8.8.8.8", "2606:4700::1111"] {
            assert!(is_public_ip(ip(addr)), "{addr} should be allowed");
        }
    }

    #[test]
    fn literal_ip_urls_respect_allow_list() {
        let metadata = Url::parse("http://169.254.169.254/latest/meta-data").unwrap();
        let loopback = Url::parse("http://127.0.0.1:8080/internal/admin").unwrap();
        let domain = Url::parse("https://shop.example/p/1").unwrap();

        let default = AddressPolicy::default();
        assert_eq!(
            default.check_url(&metadata),
            Err(BlockedHost("169.254.169.254".into()))
        );
        assert!(default.check_url(&loopback).is_err());
        assert!(default.check_url(&domain).is_ok());

        let local = AddressPolicy::allowing(["127.0.0.1"]);
        assert!(local.check_url(&loopback).is_ok());
        assert!(local.check_url(&metadata).is_err());
    }

    #[test]
    fn resolved_addresses_are_filtered() {
        let policy = AddressPolicy::default();
        let mixed = vec![
            SocketAddr::new(ip("10.0.0.5"), 0),
            SocketAddr::new(ip("93.184.216.34"), 0),
        ];
        assert_eq!(
            policy.filter_addrs("shop.example", mixed).unwrap(),
            vec![SocketAddr::new(ip("93.184.216.34"), 0)]
        );

        let internal = vec![SocketAddr::new(ip("127.0.0.1"), 0)];
        assert_eq!(
            policy.filter_addrs("localhost", internal.clone()),
            Err(BlockedHost("localhost".into()))
        );
        assert_eq!(
            AddressPolicy::allowing(["LOCALHOST"])
                .filter_addrs("localhost", internal.clone())
                .unwrap(),
            internal
        );
    }
}
