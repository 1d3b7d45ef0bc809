//! The opaque upstream market/exchange collaborator.
//!
//! `MarketExchange` is deliberately thin: everything this workspace needs
//! from the venue (submitting orders, reading positions, streaming prices)
//! funnels through this trait so that `wx-executor` never depends on a
//! concrete HTTP/WS client. A real implementation lives outside this core;
//! tests and the simulation runner use an in-memory one that never performs
//! network I/O (SPEC_FULL §1, §6).

use crate::decimal::Probability;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSideReq {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderTypeReq {
    Gtc,
    Fok,
    Gtd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
}

/// A single order placement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub token_id: String,
    pub side: OrderSideReq,
    pub price: Probability,
    pub size: rust_decimal::Decimal,
    pub order_type: OrderTypeReq,
}

/// The venue's immediate response to an order placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub token_id: String,
    pub size: rust_decimal::Decimal,
    pub average_price: Probability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub order_id: String,
    pub token_id: String,
    pub price: Probability,
    pub size: rust_decimal::Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("order rejected: {0}")]
    Rejected(String),
    #[error("rate limit hit")]
    RateLimited,
}

/// The opaque collaborator trait every strategy/executor call ultimately
/// goes through. `streamPrices` is modeled as a callback registration
/// rather than an async stream so that a synchronous in-memory
/// implementation can drive it directly from test code.
#[async_trait]
pub trait MarketExchange: Send + Sync {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult, ExchangeError>;

    async fn get_open_orders(&self) -> Result<Vec<OrderResult>, ExchangeError>;

    async fn get_trades(&self) -> Result<Vec<Trade>, ExchangeError>;

    async fn get_positions(&self) -> Result<Vec<Position>, ExchangeError>;

    /// Registers `on_update` to be invoked as prices arrive for `tokens`.
    /// A real implementation streams over a websocket; the simulation
    /// implementation may simply never call `on_update`.
    fn stream_prices(&self, tokens: Vec<String>, on_update: Box<dyn Fn(String, Probability) + Send + Sync>);

    /// Whether this implementation is a simulation that never performs
    /// network I/O (SPEC_FULL §9: "Simulation mode").
    fn is_simulation(&self) -> bool {
        false
    }
}

impl fmt::Debug for dyn MarketExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MarketExchange(simulation={})", self.is_simulation())
    }
}

/// In-memory `MarketExchange` that never performs network I/O (SPEC_FULL
/// §9: "simulation mode"). Every order fills immediately at its requested
/// price; positions and trades accumulate in a lock-protected map keyed by
/// token id, the same "DashMap/RwLock per key" idiom used by
/// `wx-executor::PositionCache`. Exercised by the simulation runner and by
/// any test that needs a real (not mocked) `MarketExchange` implementation.
pub struct SimulationExchange {
    next_order_id: std::sync::atomic::AtomicU64,
    positions: dashmap::DashMap<String, Position>,
    trades: parking_lot::RwLock<Vec<Trade>>,
}

impl Default for SimulationExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationExchange {
    pub fn new() -> Self {
        Self {
            next_order_id: std::sync::atomic::AtomicU64::new(1),
            positions: dashmap::DashMap::new(),
            trades: parking_lot::RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MarketExchange for SimulationExchange {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult, ExchangeError> {
        let id = self
            .next_order_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let order_id = format!("sim-{id}");
        let now = Utc::now();

        let signed_size = match request.side {
            OrderSideReq::Buy => request.size,
            OrderSideReq::Sell => -request.size,
        };

        self.positions
            .entry(request.token_id.clone())
            .and_modify(|p| {
                let new_size = p.size + signed_size;
                if !new_size.is_zero() {
                    p.average_price = Probability::new(
                        (p.average_price.inner() * p.size + request.price.inner() * signed_size)
                            / new_size,
                    );
                }
                p.size = new_size;
            })
            .or_insert(Position {
                token_id: request.token_id.clone(),
                size: signed_size,
                average_price: request.price,
            });

        self.trades.write().push(Trade {
            order_id: order_id.clone(),
            token_id: request.token_id,
            price: request.price,
            size: request.size,
            timestamp: now,
        });

        Ok(OrderResult {
            order_id,
            status: OrderStatus::Filled,
        })
    }

    async fn get_open_orders(&self) -> Result<Vec<OrderResult>, ExchangeError> {
        // Every order fills synchronously in `place_order`, so nothing is
        // ever left resting.
        Ok(Vec::new())
    }

    async fn get_trades(&self) -> Result<Vec<Trade>, ExchangeError> {
        Ok(self.trades.read().clone())
    }

    async fn get_positions(&self) -> Result<Vec<Position>, ExchangeError> {
        Ok(self.positions.iter().map(|e| e.value().clone()).collect())
    }

    fn stream_prices(&self, _tokens: Vec<String>, _on_update: Box<dyn Fn(String, Probability) + Send + Sync>) {
        // A real venue pushes ticks over a websocket; the simulation never
        // originates price moves on its own, so callers drive price
        // updates directly into `wx-store` instead.
    }

    fn is_simulation(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn place_order_fills_immediately() {
        let exchange = SimulationExchange::new();
        let result = exchange
            .place_order(OrderRequest {
                token_id: "yes-1".to_string(),
                side: OrderSideReq::Buy,
                price: Probability::new(dec!(0.40)),
                size: dec!(10),
                order_type: OrderTypeReq::Gtc,
            })
            .await
            .unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert!(exchange.is_simulation());
    }

    #[tokio::test]
    async fn positions_accumulate_with_blended_average_price() {
        let exchange = SimulationExchange::new();
        exchange
            .place_order(OrderRequest {
                token_id: "yes-1".to_string(),
                side: OrderSideReq::Buy,
                price: Probability::new(dec!(0.40)),
                size: dec!(10),
                order_type: OrderTypeReq::Gtc,
            })
            .await
            .unwrap();
        exchange
            .place_order(OrderRequest {
                token_id: "yes-1".to_string(),
                side: OrderSideReq::Buy,
                price: Probability::new(dec!(0.60)),
                size: dec!(10),
                order_type: OrderTypeReq::Gtc,
            })
            .await
            .unwrap();
        let positions = exchange.get_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].size, dec!(20));
        assert_eq!(positions[0].average_price.inner(), dec!(0.50));
    }

    #[tokio::test]
    async fn never_leaves_a_resting_open_order() {
        let exchange = SimulationExchange::new();
        exchange
            .place_order(OrderRequest {
                token_id: "yes-1".to_string(),
                side: OrderSideReq::Buy,
                price: Probability::new(dec!(0.40)),
                size: dec!(10),
                order_type: OrderTypeReq::Gtc,
            })
            .await
            .unwrap();
        assert!(exchange.get_open_orders().await.unwrap().is_empty());
        assert_eq!(exchange.get_trades().await.unwrap().len(), 1);
    }
}
