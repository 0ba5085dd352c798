//! Sample sources for the daemon.
//!
//! Samples arrive as newline-delimited JSON, one [`Sample`] per line:
//!
//! ```text
//! {"node_id":"cluster-a-node-1","timestamp_ms":1700000000000,"load":42.5}
//! {"node_id":"cluster-a-node-1","timestamp_ms":1700000001000,"load":47.0,"extra":{"tps":18000}}
//! ```
//!
//! A reader task consumes one stream until EOF; [`serve_tcp`] accepts
//! connections and spawns a reader per peer. Lines that fail to parse and
//! samples the gateway rejects are logged and skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use loadwatch_core::{IngestGateway, Sample};

/// Per-source line counters.
#[derive(Debug, Default)]
pub struct SourceStats {
    lines: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    malformed: AtomicU64,
}

/// Point-in-time copy of [`SourceStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceTotals {
    pub lines: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub malformed: u64,
}

impl SourceStats {
    pub fn totals(&self) -> SourceTotals {
        SourceTotals {
            lines: self.lines.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// Spawn a task that feeds NDJSON samples from `reader` into `gateway`.
///
/// The task ends at EOF or on a read error and returns the totals for this
/// stream. `stats` is shared so several readers can report into one set of
/// counters.
pub fn spawn_reader<R>(
    reader: R,
    description: impl Into<String>,
    gateway: IngestGateway,
    stats: Arc<SourceStats>,
) -> JoinHandle<SourceTotals>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let description = description.into();

    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut totals = SourceTotals::default();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!(source = %description, "input closed");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    totals.lines += 1;
                    stats.lines.fetch_add(1, Ordering::Relaxed);

                    let sample = match serde_json::from_str::<Sample>(trimmed) {
                        Ok(sample) => sample,
                        Err(e) => {
                            warn!(source = %description, error = %e, "malformed sample line");
                            totals.malformed += 1;
                            stats.malformed.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                    };

                    // Rejections are already logged by the gateway.
                    if gateway.ingest(sample).is_ok() {
                        totals.accepted += 1;
                        stats.accepted.fetch_add(1, Ordering::Relaxed);
                    } else {
                        totals.rejected += 1;
                        stats.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    warn!(source = %description, error = %e, "read error");
                    break;
                }
            }
        }

        totals
    })
}

/// Accept TCP connections on `listener`, one reader task per connection.
pub fn serve_tcp(
    listener: TcpListener,
    gateway: IngestGateway,
    stats: Arc<SourceStats>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    info!(%peer, "sample source connected");
                    spawn_reader(stream, peer.to_string(), gateway.clone(), stats.clone());
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadwatch_core::{current_timestamp_ms, NodeRegistry};
    use std::io::Cursor;
    use tokio::io::AsyncWriteExt;

    fn gateway(nodes: &[&str]) -> IngestGateway {
        let registry = Arc::new(NodeRegistry::default());
        for node in nodes {
            registry.register(*node);
        }
        IngestGateway::new(registry)
    }

    #[tokio::test]
    async fn reads_samples_until_eof() {
        let gw = gateway(&["n1", "n2"]);
        let now = current_timestamp_ms();
        let input = format!(
            "{{\"node_id\":\"n1\",\"timestamp_ms\":{},\"load\":10.0}}\n\n\
             {{\"node_id\":\"n2\",\"timestamp_ms\":{},\"load\":20.0,\"extra\":{{\"tps\":5.0}}}}\n",
            now - 10,
            now - 5
        );

        let stats = Arc::new(SourceStats::default());
        let totals = spawn_reader(Cursor::new(input.into_bytes()), "test", gw.clone(), stats.clone())
            .await
            .unwrap();

        assert_eq!(totals.lines, 2);
        assert_eq!(totals.accepted, 2);
        assert_eq!(stats.totals(), totals);

        let n2 = gw.registry().buffer_for("n2").unwrap();
        let buffer = n2.lock();
        assert_eq!(buffer.last().unwrap().extra.get("tps"), Some(&5.0));
    }

    #[tokio::test]
    async fn malformed_and_rejected_lines_are_skipped() {
        let gw = gateway(&["n1"]);
        let now = current_timestamp_ms();
        let input = format!(
            "not json\n\
             {{\"node_id\":\"ghost\",\"timestamp_ms\":{now},\"load\":10.0}}\n\
             {{\"node_id\":\"n1\",\"timestamp_ms\":{now},\"load\":150.0}}\n\
             {{\"node_id\":\"n1\",\"timestamp_ms\":{now},\"load\":50.0}}\n"
        );

        let totals = spawn_reader(
            Cursor::new(input.into_bytes()),
            "test",
            gw.clone(),
            Arc::new(SourceStats::default()),
        )
        .await
        .unwrap();

        assert_eq!(
            totals,
            SourceTotals {
                lines: 4,
                accepted: 1,
                rejected: 2,
                malformed: 1,
            }
        );
        assert_eq!(gw.registry().buffer_for("n1").unwrap().lock().len(), 1);
    }

    #[tokio::test]
    async fn tcp_connections_feed_the_gateway() {
        let gw = gateway(&["n1"]);
        let stats = Arc::new(SourceStats::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = serve_tcp(listener, gw.clone(), stats.clone());

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let line = format!(
            "{{\"node_id\":\"n1\",\"timestamp_ms\":{},\"load\":33.0}}\n",
            current_timestamp_ms()
        );
        client.write_all(line.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        for _ in 0..100 {
            if stats.totals().accepted == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(stats.totals().accepted, 1);
        server.abort();
    }
}
