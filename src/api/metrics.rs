//! Metrics Collection
//!
//! Counters for DNS traffic and record administration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for the DNS server
#[derive(Default)]
pub struct Metrics {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// Queries that reached the resolution engine
    pub dns_queries: AtomicU64,

    /// Datagrams dropped without a response
    pub dns_dropped: AtomicU64,

    /// Answers served from the record store
    pub answered_local: AtomicU64,

    /// Answers relayed from the upstream resolver
    pub answered_forwarded: AtomicU64,

    /// NXDOMAIN responses
    pub not_found: AtomicU64,

    /// Upstream lookups that failed, timed out or came back empty
    pub upstream_failures: AtomicU64,

    /// Records inserted or replaced through the API
    pub records_upserted: AtomicU64,

    /// Records deleted through the API
    pub records_deleted: AtomicU64,

    /// Mutations whose file write failed
    pub persist_failures: AtomicU64,

    /// Current record count
    pub records: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn inc_dns_queries(&self) {
        self.dns_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dns_dropped(&self) {
        self.dns_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_answered_local(&self) {
        self.answered_local.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_answered_forwarded(&self) {
        self.answered_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_upstream_failures(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_records_upserted(&self, count: u64) {
        self.records_upserted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_records_deleted(&self) {
        self.records_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_persist_failures(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Update current record count
    pub fn set_records(&self, count: u64) {
        self.records.store(count, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let series: [(&str, &str, &str, u64); 11] = [
            ("uptime_seconds", "gauge", "Server uptime in seconds", self.uptime_secs()),
            ("dns_queries_total", "counter", "DNS queries processed", self.load(&self.dns_queries)),
            ("dns_dropped_total", "counter", "DNS datagrams dropped", self.load(&self.dns_dropped)),
            ("dns_answered_local_total", "counter", "Answers from the record store", self.load(&self.answered_local)),
            ("dns_answered_forwarded_total", "counter", "Answers relayed from upstream", self.load(&self.answered_forwarded)),
            ("dns_not_found_total", "counter", "NXDOMAIN responses", self.load(&self.not_found)),
            ("dns_upstream_failures_total", "counter", "Upstream lookups without an answer", self.load(&self.upstream_failures)),
            ("records_upserted_total", "counter", "Records inserted or replaced", self.load(&self.records_upserted)),
            ("records_deleted_total", "counter", "Records deleted", self.load(&self.records_deleted)),
            ("records_persist_failures_total", "counter", "Failed record file writes", self.load(&self.persist_failures)),
            ("records", "gauge", "Records in the store", self.load(&self.records)),
        ];

        let mut output = String::new();
        for (name, kind, help, value) in series {
            output.push_str(&format!(
                "# HELP dns_record_server_{name} {help}\n\
                 # TYPE dns_record_server_{name} {kind}\n\
                 dns_record_server_{name} {value}\n\n"
            ));
        }

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "dns": {
                "queries": self.load(&self.dns_queries),
                "dropped": self.load(&self.dns_dropped),
                "answered_local": self.load(&self.answered_local),
                "answered_forwarded": self.load(&self.answered_forwarded),
                "not_found": self.load(&self.not_found),
                "upstream_failures": self.load(&self.upstream_failures),
            },
            "records": {
                "count": self.load(&self.records),
                "upserted": self.load(&self.records_upserted),
                "deleted": self.load(&self.records_deleted),
                "persist_failures": self.load(&self.persist_failures),
            },
        })
    }

    fn load(&self, counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.inc_dns_queries();
        metrics.inc_dns_queries();
        metrics.inc_answered_local();

        assert_eq!(metrics.dns_queries.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.answered_local.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.set_records(12);
        metrics.inc_not_found();

        let output = metrics.to_prometheus();

        assert!(output.contains("# TYPE dns_record_server_records gauge"));
        assert!(output.contains("dns_record_server_records 12"));
        assert!(output.contains("dns_record_server_dns_not_found_total 1"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.add_records_upserted(3);

        let json = metrics.to_json();

        assert_eq!(json["records"]["upserted"], 3);
        assert_eq!(json["dns"]["queries"], 0);
    }
}
