//! Wire message shapes for the exchange websocket feed
//!
//! Every message is a JSON object tagged by `type`. Prices, sizes and
//! sequence numbers arrive as either strings or JSON numbers; both are
//! accepted and converted to `Decimal` exactly once, here.

use rust_decimal::Decimal;
use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{FeedError, Result};
use crate::orderbook::Side;

/// A feed frame, dispatched by its `type` tag
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// Subscription acknowledgment
    Subscriptions { channels: serde_json::Value },

    /// Liveness signal; never mutates a book
    Heartbeat {
        product_id: String,
        #[serde(deserialize_with = "u64_flexible")]
        sequence: u64,
    },

    /// Full statement of the book, establishing ground truth
    Snapshot {
        product_id: String,
        bids: Vec<SnapshotEntry>,
        asks: Vec<SnapshotEntry>,
    },

    /// Aggregated level changes
    L2update {
        product_id: String,
        changes: Vec<LevelChange>,
    },

    /// Top-of-book summary; informational only
    Ticker {
        product_id: String,
        #[serde(deserialize_with = "decimal_flexible")]
        best_bid: Decimal,
        #[serde(deserialize_with = "decimal_flexible")]
        best_bid_size: Decimal,
        #[serde(deserialize_with = "decimal_flexible")]
        best_ask: Decimal,
        #[serde(deserialize_with = "decimal_flexible")]
        best_ask_size: Decimal,
        #[serde(deserialize_with = "u64_flexible")]
        sequence: u64,
    },

    /// A new order resting on the book
    Open {
        product_id: String,
        order_id: String,
        side: Side,
        #[serde(deserialize_with = "decimal_flexible")]
        price: Decimal,
        #[serde(deserialize_with = "decimal_flexible")]
        size: Decimal,
    },

    /// The feed acknowledged an order; treated like `open`
    Received {
        product_id: String,
        order_id: String,
        side: Side,
        #[serde(deserialize_with = "decimal_flexible")]
        price: Decimal,
        #[serde(deserialize_with = "decimal_flexible")]
        size: Decimal,
    },

    /// The order left the book; any side/price fields are advisory
    Done {
        product_id: String,
        order_id: String,
    },

    /// A fill against the resting maker order
    Match {
        product_id: String,
        maker_order_id: String,
        #[serde(deserialize_with = "decimal_flexible")]
        size: Decimal,
    },

    /// In-place size amendment
    Change {
        product_id: String,
        order_id: String,
        #[serde(deserialize_with = "decimal_flexible")]
        new_size: Decimal,
    },

    /// Feed-reported error
    Error { message: String },

    /// Anything we do not recognize
    #[serde(other)]
    Unknown,
}

/// One snapshot entry: `[price, size]` or `[price, size, order_id]`
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub price: Decimal,
    pub size: Decimal,
    pub order_id: Option<String>,
}

impl<'de> Deserialize<'de> for SnapshotEntry {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = SnapshotEntry;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a [price, size] or [price, size, order_id] array")
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let price: FlexDecimal = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let size: FlexDecimal = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let order_id: Option<String> = seq.next_element()?;
                while seq.next_element::<IgnoredAny>()?.is_some() {}

                Ok(SnapshotEntry {
                    price: price.0,
                    size: size.0,
                    order_id,
                })
            }
        }

        deserializer.deserialize_seq(EntryVisitor)
    }
}

/// One l2update change tuple: `[side, price, size]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LevelChange(pub Side, pub FlexDecimal, pub FlexDecimal);

impl LevelChange {
    pub fn side(&self) -> Side {
        self.0
    }

    pub fn price(&self) -> Decimal {
        self.1 .0
    }

    pub fn size(&self) -> Decimal {
        self.2 .0
    }
}

/// Decimal wrapper accepting both JSON strings and numbers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlexDecimal(pub Decimal);

impl<'de> Deserialize<'de> for FlexDecimal {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        decimal_flexible(deserializer).map(FlexDecimal)
    }
}

struct DecimalVisitor;

impl Visitor<'_> for DecimalVisitor {
    type Value = Decimal;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal as a string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Decimal, E> {
        Decimal::from_str(v).map_err(de::Error::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Decimal, E> {
        Decimal::from_f64_retain(v)
            .ok_or_else(|| de::Error::custom(format!("unrepresentable decimal: {v}")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Decimal, E> {
        Ok(Decimal::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Decimal, E> {
        Ok(Decimal::from(v))
    }
}

fn decimal_flexible<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DecimalVisitor)
}

struct U64Visitor;

impl Visitor<'_> for U64Visitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an unsigned integer as a string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<u64, E> {
        v.parse().map_err(de::Error::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<u64, E> {
        u64::try_from(v).map_err(de::Error::custom)
    }
}

fn u64_flexible<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(U64Visitor)
}

/// Parse a raw text frame into a feed message
pub fn parse_frame(raw: &str) -> Result<FeedMessage> {
    serde_json::from_str(raw).map_err(|e| FeedError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_snapshot_with_and_without_ids() {
        let raw = r#"{
            "type": "snapshot",
            "product_id": "BTC-USD",
            "bids": [["50000.00", "1.5"], ["49999.00", "2.0", "ord-7"]],
            "asks": [["50001.00", "1.0"]]
        }"#;

        match parse_frame(raw).unwrap() {
            FeedMessage::Snapshot {
                product_id,
                bids,
                asks,
            } => {
                assert_eq!(product_id, "BTC-USD");
                assert_eq!(bids.len(), 2);
                assert_eq!(bids[0].price, dec!(50000.00));
                assert_eq!(bids[0].order_id, None);
                assert_eq!(bids[1].order_id.as_deref(), Some("ord-7"));
                assert_eq!(asks[0].size, dec!(1.0));
            }
            other => panic!("expected Snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_l2update() {
        let raw = r#"{
            "type": "l2update",
            "product_id": "BTC-USD",
            "changes": [["buy", "50000.00", "1.5"], ["sell", "50001.00", "0"]]
        }"#;

        match parse_frame(raw).unwrap() {
            FeedMessage::L2update { changes, .. } => {
                assert_eq!(changes.len(), 2);
                assert_eq!(changes[0].side(), Side::Buy);
                assert_eq!(changes[0].price(), dec!(50000.00));
                assert_eq!(changes[1].side(), Side::Sell);
                assert_eq!(changes[1].size(), dec!(0));
            }
            other => panic!("expected L2update, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_open_and_received() {
        let raw = r#"{
            "type": "open",
            "product_id": "BTC-USD",
            "order_id": "o-1",
            "side": "buy",
            "price": "100.0",
            "size": "1.5"
        }"#;
        assert!(matches!(
            parse_frame(raw).unwrap(),
            FeedMessage::Open { side: Side::Buy, .. }
        ));

        let raw = r#"{
            "type": "received",
            "product_id": "BTC-USD",
            "order_id": "o-2",
            "side": "sell",
            "price": 101.5,
            "size": 2
        }"#;
        match parse_frame(raw).unwrap() {
            FeedMessage::Received { price, size, .. } => {
                assert_eq!(price, dec!(101.5));
                assert_eq!(size, dec!(2));
            }
            other => panic!("expected Received, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_match_and_done_and_change() {
        let raw = r#"{
            "type": "match",
            "product_id": "BTC-USD",
            "maker_order_id": "m-1",
            "taker_order_id": "t-1",
            "size": "0.5"
        }"#;
        match parse_frame(raw).unwrap() {
            FeedMessage::Match {
                maker_order_id,
                size,
                ..
            } => {
                assert_eq!(maker_order_id, "m-1");
                assert_eq!(size, dec!(0.5));
            }
            other => panic!("expected Match, got {other:?}"),
        }

        // Advisory fields on done are tolerated and ignored
        let raw = r#"{
            "type": "done",
            "product_id": "BTC-USD",
            "order_id": "o-1",
            "side": "buy",
            "price": "100.0",
            "reason": "canceled"
        }"#;
        assert!(matches!(parse_frame(raw).unwrap(), FeedMessage::Done { .. }));

        let raw = r#"{
            "type": "change",
            "product_id": "BTC-USD",
            "order_id": "o-1",
            "new_size": "0.75"
        }"#;
        match parse_frame(raw).unwrap() {
            FeedMessage::Change { new_size, .. } => assert_eq!(new_size, dec!(0.75)),
            other => panic!("expected Change, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_ticker_mixed_numerics() {
        let raw = r#"{
            "type": "ticker",
            "product_id": "BTC-USD",
            "best_bid": "50000.00",
            "best_bid_size": 1.5,
            "best_ask": 50001,
            "best_ask_size": "2.5",
            "sequence": "12345"
        }"#;
        match parse_frame(raw).unwrap() {
            FeedMessage::Ticker {
                best_bid,
                best_ask,
                sequence,
                ..
            } => {
                assert_eq!(best_bid, dec!(50000.00));
                assert_eq!(best_ask, dec!(50001));
                assert_eq!(sequence, 12345);
            }
            other => panic!("expected Ticker, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_heartbeat_and_subscriptions_and_error() {
        let raw = r#"{"type": "heartbeat", "product_id": "BTC-USD", "sequence": 90}"#;
        assert!(matches!(
            parse_frame(raw).unwrap(),
            FeedMessage::Heartbeat { sequence: 90, .. }
        ));

        let raw = r#"{"type": "subscriptions", "channels": [{"name": "level2"}]}"#;
        assert!(matches!(
            parse_frame(raw).unwrap(),
            FeedMessage::Subscriptions { .. }
        ));

        let raw = r#"{"type": "error", "message": "Failed to subscribe"}"#;
        match parse_frame(raw).unwrap() {
            FeedMessage::Error { message } => assert_eq!(message, "Failed to subscribe"),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        let raw = r#"{"type": "status", "products": []}"#;
        assert!(matches!(parse_frame(raw).unwrap(), FeedMessage::Unknown));
    }

    #[test]
    fn test_missing_field_is_a_parse_error() {
        // open without a price
        let raw = r#"{
            "type": "open",
            "product_id": "BTC-USD",
            "order_id": "o-1",
            "side": "buy",
            "size": "1.5"
        }"#;
        assert!(parse_frame(raw).is_err());

        let raw = r#"not json at all"#;
        assert!(parse_frame(raw).is_err());
    }

    #[test]
    fn test_malformed_number_is_a_parse_error() {
        let raw = r#"{
            "type": "open",
            "product_id": "BTC-USD",
            "order_id": "o-1",
            "side": "buy",
            "price": "abc",
            "size": "1.5"
        }"#;
        assert!(parse_frame(raw).is_err());
    }

    #[test]
    fn test_snapshot_entry_rejects_short_arrays() {
        let raw = r#"{
            "type": "snapshot",
            "product_id": "BTC-USD",
            "bids": [["50000.00"]],
            "asks": []
        }"#;
        assert!(parse_frame(raw).is_err());
    }
}
