//! Order — the externally visible record of a single leg.
//!
//! Unlike `Intent`, which is an internal pipeline artifact, `Order` exists
//! only at the external-interface boundary: it is what the paper-trading
//! adapter (spec §4.15) sends to the order-intent HTTP service.

use super::side::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order type accepted by the external order-intent endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Lmt,
    Mkt,
}

/// A single leg destined for the external paper-trading service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub order_type: OrderType,
    pub price: Option<f64>,
    pub client_tag: String,
}

impl Order {
    /// `order_type = Lmt` without a `price` is a precondition failure the
    /// adapter classifies as `skipped` before it ever sends the request
    /// (spec §4.15).
    pub fn is_sendable(&self) -> bool {
        !(self.order_type == OrderType::Lmt && self.price.is_none())
    }
}

/// The deterministic idempotency key derivation inputs, carried alongside
/// an `Order` at the external boundary: `(symbol, side, timestamp, source,
/// order_type)` per spec §4.15 and the testable property in spec §8 item 8
/// ("given identical (symbol, side, timestamp, source, order_type), the
/// idempotency key is identical"). The key itself is computed in
/// `trendlab-runner`'s paper-trading adapter, which also owns the UUIDv5
/// namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIdentity {
    pub symbol: String,
    pub side: Side,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub order_type: OrderType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_order_without_price_is_not_sendable() {
        let order = Order {
            symbol: "TSLA".into(),
            side: Side::Buy,
            quantity: 5.0,
            order_type: OrderType::Lmt,
            price: None,
            client_tag: "t1".into(),
        };
        assert!(!order.is_sendable());
    }

    #[test]
    fn limit_order_with_price_is_sendable() {
        let order = Order {
            symbol: "AAPL".into(),
            side: Side::Buy,
            quantity: 10.0,
            order_type: OrderType::Lmt,
            price: Some(227.5),
            client_tag: "t2".into(),
        };
        assert!(order.is_sendable());
    }

    #[test]
    fn market_order_without_price_is_sendable() {
        let order = Order {
            symbol: "MSFT".into(),
            side: Side::Sell,
            quantity: 5.0,
            order_type: OrderType::Mkt,
            price: None,
            client_tag: "t3".into(),
        };
        assert!(order.is_sendable());
    }
}
