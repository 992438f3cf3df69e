//! Error types for the feed handler and order book

use rust_decimal::Decimal;
use thiserror::Error;

/// Feed handler errors: transport, protocol, and configuration failures
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    Parse(String),

    #[error("No book for symbol: {0}")]
    UnknownSymbol(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection timed out waiting for frames")]
    ConnectionTimeout,

    #[error("Session is closed")]
    SessionClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::Ipc(err.to_string())
    }
}

/// Logical order book failures. These are expected during reconnection
/// races and surface as `false` from the book's public operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookError {
    #[error("Order already present: {0}")]
    DuplicateOrder(String),

    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    #[error("Order price {order} does not match level price {level}")]
    PriceMismatch { order: Decimal, level: Decimal },

    #[error("Invalid size reduction: {0}")]
    InvalidReduction(Decimal),
}

pub type Result<T> = std::result::Result<T, FeedError>;
