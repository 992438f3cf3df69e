//! WebSocket transport for the exchange feed
//!
//! The feed speaks JSON text frames in both directions; this wrapper
//! hands the session exactly that, hiding websocket control traffic.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{FeedError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A single feed connection
pub struct FeedClient {
    stream: Option<WsStream>,
    endpoint: String,
}

impl FeedClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            stream: None,
            endpoint: endpoint.to_string(),
        }
    }

    /// Dial the endpoint, performing the TLS and websocket handshakes
    pub async fn connect(&mut self) -> Result<()> {
        let (stream, response) = connect_async(&self.endpoint)
            .await
            .map_err(|e| FeedError::WebSocketConnection(format!("connect failed: {e}")))?;

        info!(endpoint = %self.endpoint, status = ?response.status(), "Feed transport up");
        self.stream = Some(stream);
        Ok(())
    }

    /// Send a text frame (subscribe/unsubscribe messages)
    pub async fn send(&mut self, text: String) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FeedError::WebSocketConnection("not connected".to_string()))?;

        stream
            .send(Message::Text(text))
            .await
            .map_err(|e| FeedError::WebSocketMessage(e.to_string()))
    }

    /// Wait for the next text payload. Control traffic is absorbed
    /// here: pings are answered (RFC 6455 obliges us, or the server
    /// drops the connection), pongs are discarded. A close frame,
    /// transport error, or end of stream tears the connection down
    /// and surfaces as an error.
    pub async fn next_frame(&mut self) -> Result<String> {
        loop {
            let message = match self.stream.as_mut() {
                Some(stream) => stream.next().await,
                None => {
                    return Err(FeedError::WebSocketConnection("not connected".to_string()))
                }
            };

            match message {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    // The feed is JSON-over-text; a binary frame that
                    // decodes as UTF-8 is treated as a text payload
                    Ok(text) => return Ok(text),
                    Err(_) => {
                        debug!("discarding non-UTF-8 binary frame");
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Some(stream) = self.stream.as_mut() {
                        let _ = stream.send(Message::Pong(payload)).await;
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    warn!(frame = ?frame, "Feed closed the connection");
                    self.stream = None;
                    return Err(FeedError::WebSocketConnection(
                        "closed by feed".to_string(),
                    ));
                }
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(FeedError::WebSocketMessage(e.to_string()));
                }
                None => {
                    self.stream = None;
                    return Err(FeedError::WebSocketConnection(
                        "stream ended".to_string(),
                    ));
                }
            }
        }
    }

    /// Tear the connection down, best effort
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!(error = %e, "Close handshake failed");
            }
        }
    }
}
