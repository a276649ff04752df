//! UDP DNS Server
//!
//! Receives datagrams and answers each one on its own task, so a slow
//! upstream lookup never holds up other queries.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error, info};

use crate::api::Metrics;
use crate::config::ServerConfig;
use crate::dns::codec::{decode_query, encode_response, DNS_MAX_PACKET_SIZE};
use crate::dns::{RecordsDnsHandler, SystemResolver};
use crate::records::RecordStore;
use crate::types::QueryLog;

/// Run the DNS server
pub async fn run_dns_server(
    config: Arc<ServerConfig>,
    store: Arc<RecordStore>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.bind_address, config.dns_port);
    let socket = Arc::new(UdpSocket::bind(addr).await?);

    info!("🌐 DNS server listening on {}", addr);
    if let Some(suffix) = &config.forward_suffix {
        info!("   Forwarding *{} upstream", suffix);
    }

    let handler = Arc::new(RecordsDnsHandler::new(
        store,
        Arc::new(SystemResolver),
        config.forward_suffix.clone(),
        config.upstream_timeout(),
        config.record_ttl_secs,
        metrics.clone(),
    ));

    serve(socket, handler, metrics).await
}

/// Receive loop over an already bound socket
pub async fn serve(
    socket: Arc<UdpSocket>,
    handler: Arc<RecordsDnsHandler>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    loop {
        let mut buf = [0u8; DNS_MAX_PACKET_SIZE];
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => {
                let request = buf[..len].to_vec();
                let handler = handler.clone();
                let socket = socket.clone();
                let metrics = metrics.clone();

                tokio::spawn(async move {
                    match handle_dns_query(socket.as_ref(), src, &request, &handler).await {
                        Ok(true) => {}
                        Ok(false) => metrics.inc_dns_dropped(),
                        Err(e) => {
                            metrics.inc_dns_dropped();
                            debug!("DNS query error from {}: {}", src, e);
                        }
                    }
                });
            }
            Err(e) => {
                // ICMP port-unreachable from a previous send can surface here
                error!("DNS socket error: {}", e);
            }
        }
    }
}

/// Handle a single DNS query. Returns whether a response was sent.
async fn handle_dns_query(
    socket: &UdpSocket,
    src: SocketAddr,
    request: &[u8],
    handler: &RecordsDnsHandler,
) -> anyhow::Result<bool> {
    let query = decode_query(request)?;

    let Some((resolution, response)) = handler.resolve(&query).await else {
        debug!("Dropping DNS message without questions from {}", src);
        return Ok(false);
    };

    info!("{}", QueryLog::new(src, &response.question, resolution));

    let packet = encode_response(&response)?;
    socket.send_to(&packet, src).await?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::codec::encode_query;
    use crate::dns::Upstream;
    use crate::types::{Query, Question, RecordType};
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use std::time::{Duration, Instant};

    struct HangingUpstream;

    #[async_trait]
    impl Upstream for HangingUpstream {
        async fn lookup_ipv4(&self, _name: &str) -> anyhow::Result<Vec<Ipv4Addr>> {
            std::future::pending().await
        }
    }

    async fn start_server(store: Arc<RecordStore>) -> SocketAddr {
        start_server_with(store, Arc::new(SystemResolver), None, Duration::from_secs(1)).await
    }

    async fn start_server_with(
        store: Arc<RecordStore>,
        upstream: Arc<dyn Upstream>,
        forward_suffix: Option<String>,
        upstream_timeout: Duration,
    ) -> SocketAddr {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let metrics = Arc::new(Metrics::new());
        let handler = Arc::new(RecordsDnsHandler::new(
            store,
            upstream,
            forward_suffix,
            upstream_timeout,
            3600,
            metrics.clone(),
        ));

        tokio::spawn(serve(socket, handler, metrics));
        addr
    }

    async fn exchange(server: SocketAddr, packet: &[u8]) -> Option<Vec<u8>> {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(packet, server).await.unwrap();

        let mut buf = [0u8; DNS_MAX_PACKET_SIZE];
        match tokio::time::timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_answers_over_udp() {
        let store = Arc::new(RecordStore::in_memory());
        store.upsert_one("foo.test", "10.0.0.5".parse().unwrap()).await.unwrap();
        let server = start_server(store).await;

        let query = Query {
            id: 0x4242,
            flags: 0x0100,
            questions: vec![Question::new("foo.test", RecordType::A)],
        };
        let response = exchange(server, &encode_query(&query).unwrap()).await.unwrap();

        assert_eq!(response[0..2], [0x42, 0x42]);
        assert_eq!(response[3] & 0x0F, 0);
        assert_eq!(response[response.len() - 4..], [10, 0, 0, 5]);
    }

    #[tokio::test]
    async fn test_bad_datagrams_are_dropped_and_server_keeps_running() {
        let store = Arc::new(RecordStore::in_memory());
        let server = start_server(store).await;

        assert!(exchange(server, &[1, 2, 3]).await.is_none());

        let empty = Query {
            id: 9,
            flags: 0,
            questions: vec![],
        };
        assert!(exchange(server, &encode_query(&empty).unwrap()).await.is_none());

        let query = Query {
            id: 10,
            flags: 0,
            questions: vec![Question::new("missing.test", RecordType::A)],
        };
        let response = exchange(server, &encode_query(&query).unwrap()).await.unwrap();
        assert_eq!(response[3] & 0x0F, 3);
    }

    #[tokio::test]
    async fn test_hung_upstream_does_not_block_local_answers() {
        let store = Arc::new(RecordStore::in_memory());
        store.upsert_one("foo.test", "10.0.0.5".parse().unwrap()).await.unwrap();
        let server = start_server_with(
            store,
            Arc::new(HangingUpstream),
            Some(".fwd.test".to_string()),
            Duration::from_secs(10),
        )
        .await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let forwarded = Query {
            id: 1,
            flags: 0x0100,
            questions: vec![Question::new("slow.fwd.test", RecordType::A)],
        };
        let local = Query {
            id: 2,
            flags: 0x0100,
            questions: vec![Question::new("foo.test", RecordType::A)],
        };

        let started = Instant::now();
        client.send_to(&encode_query(&forwarded).unwrap(), server).await.unwrap();
        client.send_to(&encode_query(&local).unwrap(), server).await.unwrap();

        let mut buf = [0u8; DNS_MAX_PACKET_SIZE];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .expect("local answer held up by the pending upstream lookup")
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(buf[0..2], [0, 2]);
        assert_eq!(buf[len - 4..len], [10, 0, 0, 5]);
    }
}
