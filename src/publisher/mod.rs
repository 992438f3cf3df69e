//! Snapshot publisher
//!
//! Fans book snapshots out to a downstream consumer over a Unix
//! socket as length-prefixed MessagePack. Delivery is gated on each
//! book's sequence number so a consumer never receives the same
//! snapshot twice, and connection attempts to an absent consumer are
//! rate-limited so a dead socket cannot slow the feed path down.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{FeedError, Result};
use crate::orderbook::BookSnapshot;

/// Minimum wait between connection attempts to a missing consumer
const CONNECT_COOLDOWN: Duration = Duration::from_secs(5);

/// What happened to one offered snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Written to the consumer
    Sent,
    /// The consumer already has this sequence for this symbol
    SkippedDuplicate,
    /// No consumer reachable; the snapshot was discarded
    Dropped,
}

/// Publisher for sending book snapshots via Unix socket
pub struct Publisher {
    socket_path: String,
    outlet: Mutex<Outlet>,
}

/// Connection state plus the per-symbol delivery ledger
struct Outlet {
    stream: Option<UnixStream>,
    last_attempt: Option<Instant>,
    /// symbol -> sequence last delivered on this connection
    delivered: HashMap<String, u64>,
}

impl Publisher {
    /// Create a publisher. The socket is dialed lazily on first
    /// publish; the consumer may come up after the feed does.
    pub fn new(socket_path: &str) -> Self {
        Self {
            socket_path: socket_path.to_string(),
            outlet: Mutex::new(Outlet {
                stream: None,
                last_attempt: None,
                delivered: HashMap::new(),
            }),
        }
    }

    /// Offer a snapshot to the consumer. Duplicate sequences for a
    /// symbol are suppressed; a sequence lower than the last delivered
    /// one means the book was recreated and is forwarded. Transport
    /// problems mark the outlet disconnected and discard the snapshot;
    /// only serialization failures surface as errors.
    pub async fn publish(&self, snapshot: &BookSnapshot) -> Result<PublishOutcome> {
        let mut outlet = self.outlet.lock().await;

        if outlet.delivered.get(&snapshot.symbol) == Some(&snapshot.sequence) {
            return Ok(PublishOutcome::SkippedDuplicate);
        }

        let frame = encode_frame(snapshot)?;

        if outlet.stream.is_none() && !outlet.dial(&self.socket_path).await {
            return Ok(PublishOutcome::Dropped);
        }

        let Some(stream) = outlet.stream.as_mut() else {
            return Ok(PublishOutcome::Dropped);
        };
        match stream.write_all(&frame).await {
            Ok(()) => {
                outlet
                    .delivered
                    .insert(snapshot.symbol.clone(), snapshot.sequence);
                Ok(PublishOutcome::Sent)
            }
            Err(e) => {
                warn!(error = %e, "Consumer write failed, dropping connection");
                outlet.stream = None;
                Ok(PublishOutcome::Dropped)
            }
        }
    }
}

impl Outlet {
    /// Dial the consumer socket, at most once per cooldown window.
    /// A fresh connection starts with an empty delivery ledger: the
    /// new consumer has seen nothing yet.
    async fn dial(&mut self, path: &str) -> bool {
        if let Some(last) = self.last_attempt {
            if last.elapsed() < CONNECT_COOLDOWN {
                return false;
            }
        }
        self.last_attempt = Some(Instant::now());

        match UnixStream::connect(path).await {
            Ok(stream) => {
                info!(path = %path, "Consumer socket connected");
                self.stream = Some(stream);
                self.delivered.clear();
                true
            }
            Err(e) => {
                debug!(path = %path, error = %e, "Consumer socket unavailable");
                false
            }
        }
    }
}

/// Encode one snapshot as a wire frame: 4-byte big-endian payload
/// length, then the MessagePack payload.
fn encode_frame(snapshot: &BookSnapshot) -> Result<Vec<u8>> {
    let payload = rmp_serde::to_vec(snapshot)
        .map_err(|e| FeedError::Serialization(format!("snapshot encode failed: {e}")))?;

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::BookLevel;
    use rust_decimal_macros::dec;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    fn snapshot(symbol: &str, sequence: u64) -> BookSnapshot {
        let bids = vec![BookLevel {
            price: dec!(100),
            size: dec!(1.5),
        }];
        let asks = vec![BookLevel {
            price: dec!(101),
            size: dec!(2),
        }];
        BookSnapshot {
            symbol: symbol.to_string(),
            sequence,
            timestamp_ns: 0,
            metrics: crate::orderbook::compute_metrics(&bids, &asks),
            bids,
            asks,
        }
    }

    fn socket_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("bookfeed-{}-{}.sock", tag, std::process::id()))
    }

    async fn read_frame(stream: &mut UnixStream) -> BookSnapshot {
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).await.unwrap();
        let mut payload = vec![0u8; u32::from_be_bytes(len) as usize];
        stream.read_exact(&mut payload).await.unwrap();
        rmp_serde::from_slice(&payload).unwrap()
    }

    #[test]
    fn test_frame_layout_round_trips() {
        let snap = snapshot("BTC-USD", 7);
        let frame = encode_frame(&snap).unwrap();

        let len = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - 4);

        let decoded: BookSnapshot = rmp_serde::from_slice(&frame[4..]).unwrap();
        assert_eq!(decoded.symbol, "BTC-USD");
        assert_eq!(decoded.sequence, 7);
        assert_eq!(decoded.bids[0].price, dec!(100));
        assert_eq!(decoded.metrics.best_ask, Some(dec!(101)));
    }

    #[tokio::test]
    async fn test_publish_delivers_and_suppresses_duplicates() {
        let path = socket_path("dedup");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let publisher = Publisher::new(path.to_str().unwrap());
        assert_eq!(
            publisher.publish(&snapshot("BTC-USD", 5)).await.unwrap(),
            PublishOutcome::Sent
        );

        let (mut consumer, _) = listener.accept().await.unwrap();
        let received = read_frame(&mut consumer).await;
        assert_eq!(received.sequence, 5);

        // Same sequence again: nothing hits the wire
        assert_eq!(
            publisher.publish(&snapshot("BTC-USD", 5)).await.unwrap(),
            PublishOutcome::SkippedDuplicate
        );

        // Progress flows, and other symbols are gated independently
        assert_eq!(
            publisher.publish(&snapshot("BTC-USD", 6)).await.unwrap(),
            PublishOutcome::Sent
        );
        assert_eq!(
            publisher.publish(&snapshot("ETH-USD", 5)).await.unwrap(),
            PublishOutcome::Sent
        );
        assert_eq!(read_frame(&mut consumer).await.sequence, 6);
        assert_eq!(read_frame(&mut consumer).await.symbol, "ETH-USD");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_recreated_book_sequence_is_forwarded() {
        let path = socket_path("reset");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let publisher = Publisher::new(path.to_str().unwrap());
        publisher.publish(&snapshot("BTC-USD", 40)).await.unwrap();

        // A lower sequence means a resubscribed book, not a stale one
        assert_eq!(
            publisher.publish(&snapshot("BTC-USD", 2)).await.unwrap(),
            PublishOutcome::Sent
        );

        let (mut consumer, _) = listener.accept().await.unwrap();
        assert_eq!(read_frame(&mut consumer).await.sequence, 40);
        assert_eq!(read_frame(&mut consumer).await.sequence, 2);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_absent_consumer_drops_without_failing() {
        let path = socket_path("absent");
        let _ = std::fs::remove_file(&path);

        let publisher = Publisher::new(path.to_str().unwrap());
        assert_eq!(
            publisher.publish(&snapshot("BTC-USD", 1)).await.unwrap(),
            PublishOutcome::Dropped
        );
        // Within the cooldown no second dial happens; still just a drop
        assert_eq!(
            publisher.publish(&snapshot("BTC-USD", 2)).await.unwrap(),
            PublishOutcome::Dropped
        );
    }
}
