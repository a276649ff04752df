//! Upstream Resolution
//!
//! Forward-eligible names are resolved through the host's own resolver.

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};

/// Something that can turn a name into IPv4 addresses
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Addresses for `name`, in the order the resolver returned them
    async fn lookup_ipv4(&self, name: &str) -> anyhow::Result<Vec<Ipv4Addr>>;
}

/// Resolver backed by the operating system (getaddrinfo via tokio)
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

#[async_trait]
impl Upstream for SystemResolver {
    async fn lookup_ipv4(&self, name: &str) -> anyhow::Result<Vec<Ipv4Addr>> {
        let addrs = tokio::net::lookup_host((name, 0)).await?;

        let mut ipv4 = Vec::new();
        for addr in addrs {
            if let IpAddr::V4(v4) = addr.ip() {
                if !ipv4.contains(&v4) {
                    ipv4.push(v4);
                }
            }
        }

        Ok(ipv4)
    }
}
