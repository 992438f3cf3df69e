//! Configuration module for the feed handler

use serde::Deserialize;
use std::env;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Products to subscribe to (e.g., ["BTC-USD", "ETH-USD"])
    pub products: Vec<String>,

    /// WebSocket endpoint for the exchange feed
    pub feed_endpoint: String,

    /// Channels requested per product
    pub channels: Vec<String>,

    /// Depth used for snapshots handed to consumers
    pub depth_levels: usize,

    /// Reconnection backoff bounds
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,

    /// Idle window: reconnect if no frame arrives within it
    pub heartbeat_timeout_secs: u64,

    /// IPC socket path for publishing snapshots; empty disables
    pub ipc_socket_path: Option<String>,

    /// Port for the health/stats HTTP server
    pub health_port: u16,

    /// Interval for periodic book status logging
    pub status_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let products: Vec<String> = env::var("PRODUCTS")
            .unwrap_or_else(|_| "BTC-USD,ETH-USD".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let channels: Vec<String> = env::var("CHANNELS")
            .unwrap_or_else(|_| "level2,ticker,heartbeat".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            products,
            channels,
            feed_endpoint: env::var("FEED_ENDPOINT")
                .unwrap_or_else(|_| "wss://ws-feed.exchange.coinbase.com".to_string()),
            depth_levels: env::var("DEPTH_LEVELS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            reconnect_initial_ms: env::var("RECONNECT_INITIAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            reconnect_max_ms: env::var("RECONNECT_MAX_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30000),
            heartbeat_timeout_secs: env::var("HEARTBEAT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            ipc_socket_path: env::var("IPC_SOCKET_PATH").ok().filter(|p| !p.is_empty()),
            health_port: env::var("HEALTH_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()
                .unwrap_or(9090),
            status_interval_secs: env::var("STATUS_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            products: vec!["BTC-USD".to_string()],
            feed_endpoint: "wss://ws-feed.exchange.coinbase.com".to_string(),
            channels: vec![
                "level2".to_string(),
                "ticker".to_string(),
                "heartbeat".to_string(),
            ],
            depth_levels: 20,
            reconnect_initial_ms: 1000,
            reconnect_max_ms: 30000,
            heartbeat_timeout_secs: 10,
            ipc_socket_path: None,
            health_port: 9090,
            status_interval_secs: 30,
        }
    }
}
