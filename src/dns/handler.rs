//! DNS Request Handler
//!
//! Turns a decoded query into a resolution and the response to encode.
//!
//! Decision order for the first question:
//!
//! 1. non-`A` type → NXDOMAIN
//! 2. name in the record store → that address
//! 3. name ends with the forward suffix → first upstream address for the
//!    name with the suffix removed
//! 4. otherwise → NXDOMAIN

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::api::Metrics;
use crate::dns::Upstream;
use crate::records::RecordStore;
use crate::types::{
    Answer, DnsResponse, Query, Question, RecordType, Resolution, FLAG_AA, FLAG_QR, FLAG_RA,
    FLAG_RD, RCODE_NOERROR, RCODE_NXDOMAIN,
};

/// Resolution engine backed by the record store and an upstream resolver
pub struct RecordsDnsHandler {
    /// Record store (read only from here)
    store: Arc<RecordStore>,

    /// Resolver for forward-eligible names
    upstream: Arc<dyn Upstream>,

    /// Suffix that makes a name forward-eligible
    forward_suffix: Option<String>,

    /// Bound on a single upstream lookup
    upstream_timeout: Duration,

    /// TTL for answer records (seconds)
    ttl: u32,

    metrics: Arc<Metrics>,
}

impl RecordsDnsHandler {
    pub fn new(
        store: Arc<RecordStore>,
        upstream: Arc<dyn Upstream>,
        forward_suffix: Option<String>,
        upstream_timeout: Duration,
        ttl: u32,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            upstream,
            forward_suffix: forward_suffix.filter(|s| !s.is_empty()),
            upstream_timeout,
            ttl,
            metrics,
        }
    }

    /// Resolve the first question of `query`.
    ///
    /// Returns `None` when the query has no question; nothing is sent back
    /// in that case.
    pub async fn resolve(&self, query: &Query) -> Option<(Resolution, DnsResponse)> {
        let question = query.questions.first()?;
        self.metrics.inc_dns_queries();

        let resolution = self.resolve_question(question).await;
        let response = self.build_response(query.id, question, resolution);
        if response.rcode() == RCODE_NXDOMAIN {
            self.metrics.inc_not_found();
        }

        Some((resolution, response))
    }

    async fn resolve_question(&self, question: &Question) -> Resolution {
        if question.qtype != RecordType::A {
            return Resolution::NotFound;
        }

        if let Some(addr) = self.store.lookup(&question.name).await {
            self.metrics.inc_answered_local();
            return Resolution::Answered(addr);
        }

        let Some(bare) = self.bare_name(&question.name) else {
            return Resolution::NotFound;
        };

        match self.forward(bare).await {
            Some(addr) => {
                self.metrics.inc_answered_forwarded();
                Resolution::Answered(addr)
            }
            None => {
                self.metrics.inc_upstream_failures();
                Resolution::NotFound
            }
        }
    }

    /// Name with the forward suffix removed, if it is forward-eligible
    pub fn bare_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        let suffix = self.forward_suffix.as_deref()?;
        name.strip_suffix(suffix)
    }

    /// First upstream address for `name`; every failure maps to `None`
    async fn forward(&self, name: &str) -> Option<Ipv4Addr> {
        match tokio::time::timeout(self.upstream_timeout, self.upstream.lookup_ipv4(name)).await {
            Ok(Ok(addrs)) => {
                let first = addrs.first().copied();
                if first.is_none() {
                    debug!("Upstream returned no IPv4 address for {}", name);
                }
                first
            }
            Ok(Err(e)) => {
                debug!("Upstream lookup for {} failed: {}", name, e);
                None
            }
            Err(_) => {
                debug!("Upstream lookup for {} timed out after {:?}", name, self.upstream_timeout);
                None
            }
        }
    }

    fn build_response(&self, id: u16, question: &Question, resolution: Resolution) -> DnsResponse {
        let flags = FLAG_QR | FLAG_AA | FLAG_RD | FLAG_RA;

        match resolution {
            Resolution::Answered(address) => DnsResponse {
                id,
                flags: flags | RCODE_NOERROR,
                question: question.clone(),
                answers: vec![Answer {
                    name: question.name.clone(),
                    ttl: self.ttl,
                    address,
                }],
            },
            // Also used for non-A questions on existing names
            Resolution::NotFound => DnsResponse {
                id,
                flags: flags | RCODE_NXDOMAIN,
                question: question.clone(),
                answers: vec![],
            },
        }
    }
}
