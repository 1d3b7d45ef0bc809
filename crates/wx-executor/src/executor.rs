//! Order execution: sizing, cooldown, slippage guard, position cache (C12,
//! SPEC_FULL §4.12).
//!
//! The pre-submit checks are an ordered chain of independently testable
//! gates, each producing a typed rejection reason rather than a bare
//! boolean — the same shape as `hip3-risk/gates.rs`'s `check_all`, with an
//! early return the moment one gate blocks so a later gate's side effect
//! (here, the optimistic lock) never runs against a signal that was
//! already going to be rejected.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};

use wx_core::decimal::Probability;
use wx_core::exchange::{ExchangeError, MarketExchange, OrderRequest, OrderSideReq, OrderTypeReq, Position};
use wx_core::market::{Market, MarketId};
use wx_signal::{EntrySignal, Side};

use crate::position_cache::PositionCache;

/// One market's order-attempt state machine: `Idle -> Locked -> Submitted
/// -> (Confirmed | Failed -> Idle)` (SPEC_FULL §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Idle,
    Locked,
    Submitted,
    Confirmed,
    Failed,
}

struct MarketLock {
    state: OrderState,
    locked_at: DateTime<Utc>,
}

/// Why `execute` declined to submit an order, or how the exchange itself
/// failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteRejection {
    NoAction,
    Cooldown,
    PriceSlippage,
    PriceChase,
    Exchange(String),
}

#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub executed: bool,
    pub order_id: Option<String>,
    pub error: Option<ExecuteRejection>,
}

impl ExecuteOutcome {
    fn rejected(reason: ExecuteRejection) -> Self {
        Self {
            executed: false,
            order_id: None,
            error: Some(reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// `slippageTolerance`, default 0.05.
    pub slippage_tolerance: Decimal,
    /// Price-chase guard thresholds, default 0.05 / 1.10.
    pub price_chase_diff: Decimal,
    pub price_chase_ratio: Decimal,
    /// `TRADE_COOLDOWN_MS`, default 60s.
    pub trade_cooldown_ms: i64,
    /// Multiplies the half-Kelly notional for guaranteed-outcome signals.
    pub guaranteed_multiplier: Decimal,
    pub limit_offset: Decimal,
    pub guaranteed_limit_offset: Decimal,
    pub max_limit_price: Decimal,
    pub max_position_usdc: Decimal,
    /// Inter-order pacing delay used by `execute_batch`.
    pub batch_pacing: StdDuration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            slippage_tolerance: Decimal::new(5, 2),
            price_chase_diff: Decimal::new(5, 2),
            price_chase_ratio: Decimal::new(110, 2),
            trade_cooldown_ms: 60_000,
            guaranteed_multiplier: Decimal::new(15, 1),
            limit_offset: Decimal::new(1, 2),
            guaranteed_limit_offset: Decimal::new(5, 2),
            max_limit_price: Decimal::new(99, 2),
            max_position_usdc: Decimal::from(500),
            batch_pacing: StdDuration::from_secs(1),
        }
    }
}

pub struct OrderExecutor {
    config: ExecutorConfig,
    exchange: Arc<dyn MarketExchange>,
    positions: PositionCache,
    locks: DashMap<MarketId, RwLock<MarketLock>>,
}

impl OrderExecutor {
    pub fn new(config: ExecutorConfig, exchange: Arc<dyn MarketExchange>) -> Self {
        Self {
            config,
            exchange,
            positions: PositionCache::new(),
            locks: DashMap::new(),
        }
    }

    pub fn positions(&self) -> &PositionCache {
        &self.positions
    }

    /// `true` if `market_id` has an unexpired lock from a prior submission
    /// (SPEC_FULL §4.12's cooldown, auto-expiring on read).
    fn is_in_cooldown(&self, market_id: &MarketId, now: DateTime<Utc>) -> bool {
        match self.locks.get(market_id) {
            Some(lock) => {
                let guard = lock.read();
                let age_ms = (now - guard.locked_at).num_milliseconds();
                age_ms >= 0 && age_ms < self.config.trade_cooldown_ms
            }
            None => false,
        }
    }

    fn set_lock(&self, market_id: MarketId, state: OrderState, now: DateTime<Utc>) {
        self.locks.insert(
            market_id,
            RwLock::new(MarketLock {
                state,
                locked_at: now,
            }),
        );
    }

    fn update_state(&self, market_id: &MarketId, state: OrderState) {
        if let Some(lock) = self.locks.get(market_id) {
            lock.write().state = state;
        }
    }

    /// Releases a pre-submit lock (only ever called before the exchange was
    /// contacted, so there's no cooldown value worth preserving).
    fn release_lock(&self, market_id: &MarketId) {
        self.locks.remove(market_id);
    }

    pub fn order_state(&self, market_id: &MarketId) -> OrderState {
        self.locks
            .get(market_id)
            .map(|l| l.read().state)
            .unwrap_or(OrderState::Idle)
    }

    /// Runs the full pre-submit gate chain and, if all gates pass, submits
    /// the order (SPEC_FULL §4.12 steps 1-7).
    pub async fn execute(&self, signal: &EntrySignal, market: &Market, now: DateTime<Utc>) -> ExecuteOutcome {
        if signal.size_usdc <= Decimal::ZERO {
            return ExecuteOutcome::rejected(ExecuteRejection::NoAction);
        }

        if self.is_in_cooldown(&signal.market_id, now) {
            return ExecuteOutcome::rejected(ExecuteRejection::Cooldown);
        }

        let (token_id, current_price) = match signal.side {
            Side::BuyYes => (market.yes_token_id.clone(), market.yes_price),
            Side::BuyNo => (market.no_token_id.clone(), market.no_price),
        };

        let slippage = (current_price.inner() - signal.snapshot_price.inner()).abs();
        if slippage > self.config.slippage_tolerance {
            return ExecuteOutcome::rejected(ExecuteRejection::PriceSlippage);
        }

        if let Some(cached) = self.positions.get(&token_id) {
            if cached.size > crate::position_cache::DUST_SIZE {
                let price_diff = current_price.inner() - cached.average_price.inner();
                let price_ratio = if cached.average_price.inner().is_zero() {
                    Decimal::ZERO
                } else {
                    current_price.inner() / cached.average_price.inner()
                };
                if price_diff > self.config.price_chase_diff || price_ratio > self.config.price_chase_ratio {
                    return ExecuteOutcome::rejected(ExecuteRejection::PriceChase);
                }
            }
        }

        let confidence = signal.confidence.unwrap_or(1.0);
        let edge_yes = signal.edge.to_f64().unwrap_or(0.0);
        // `edge` is always yes-referenced; a BuyNo signal's conviction runs
        // the other way, so its side-relative edge is the negation.
        let edge = match signal.side {
            Side::BuyYes => edge_yes,
            Side::BuyNo => -edge_yes,
        };
        let kelly = edge * confidence;
        let half_kelly = (kelly * 10.0 / 2.0).min(1.0).max(0.0);
        let mut usdc = self.config.max_position_usdc * Decimal::from_f64_retain(half_kelly).unwrap_or(Decimal::ZERO);
        if signal.is_guaranteed {
            usdc *= self.config.guaranteed_multiplier;
        }

        let price = current_price.inner();
        if price <= Decimal::ZERO {
            return ExecuteOutcome::rejected(ExecuteRejection::NoAction);
        }
        let max_shares = (self.config.max_position_usdc / price).floor();
        let shares = (usdc / price).floor().clamp(Decimal::ONE, max_shares.max(Decimal::ONE));

        let limit_offset = if signal.is_guaranteed {
            self.config.guaranteed_limit_offset
        } else {
            self.config.limit_offset
        };
        let limit_price = (price + limit_offset).min(self.config.max_limit_price);

        self.set_lock(signal.market_id.clone(), OrderState::Locked, now);

        let request = OrderRequest {
            token_id: token_id.clone(),
            side: OrderSideReq::Buy,
            price: Probability::new(limit_price),
            size: shares,
            order_type: OrderTypeReq::Gtc,
        };

        self.update_state(&signal.market_id, OrderState::Submitted);
        match self.exchange.place_order(request).await {
            Ok(result) => {
                self.positions.record_fill(&token_id, shares, Probability::new(limit_price));
                self.update_state(&signal.market_id, OrderState::Confirmed);
                info!(market = %signal.market_id, order_id = %result.order_id, "order submitted");
                ExecuteOutcome {
                    executed: true,
                    order_id: Some(result.order_id),
                    error: None,
                }
            }
            Err(err) => {
                self.release_lock(&signal.market_id);
                warn!(market = %signal.market_id, error = %err, "order submission failed");
                ExecuteOutcome::rejected(ExecuteRejection::Exchange(exchange_error_text(&err)))
            }
        }
    }

    /// Executes each signal in order with a pacing delay between
    /// submissions (SPEC_FULL §4.12 "executeBatch").
    pub async fn execute_batch(
        &self,
        signals: &[EntrySignal],
        markets: &std::collections::HashMap<MarketId, Market>,
        now: DateTime<Utc>,
    ) -> Vec<ExecuteOutcome> {
        let mut outcomes = Vec::with_capacity(signals.len());
        for (i, signal) in signals.iter().enumerate() {
            let Some(market) = markets.get(&signal.market_id) else {
                outcomes.push(ExecuteOutcome::rejected(ExecuteRejection::NoAction));
                continue;
            };
            outcomes.push(self.execute(signal, market, now).await);
            if i + 1 < signals.len() {
                tokio::time::sleep(self.config.batch_pacing).await;
            }
        }
        outcomes
    }

    /// Refreshes the cache from the venue's authoritative positions,
    /// leaving any market currently within cooldown untouched (API lag
    /// tolerance, SPEC_FULL §4.12 "Position sync").
    pub fn sync_positions(
        &self,
        external: &[Position],
        markets: &std::collections::HashMap<MarketId, Market>,
        now: DateTime<Utc>,
    ) {
        let cooldown_tokens: Vec<String> = self
            .locks
            .iter()
            .filter(|entry| self.is_in_cooldown(entry.key(), now))
            .filter_map(|entry| markets.get(entry.key()))
            .flat_map(|m| vec![m.yes_token_id.clone(), m.no_token_id.clone()])
            .collect();
        self.positions.sync(external, &cooldown_tokens);
    }
}

fn exchange_error_text(err: &ExchangeError) -> String {
    err.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use wx_core::exchange::{OrderResult, OrderStatus, Trade};
    use wx_core::market::{Comparison, MetricType};
    use wx_core::units::Unit;
    use wx_signal::{EntrySignal, Urgency};

    struct FakeExchange {
        fail_next: bool,
        submitted: Mutex<Vec<OrderRequest>>,
    }

    #[async_trait]
    impl MarketExchange for FakeExchange {
        async fn place_order(&self, request: OrderRequest) -> Result<OrderResult, ExchangeError> {
            if self.fail_next {
                return Err(ExchangeError::Rejected("simulated failure".to_string()));
            }
            self.submitted.lock().unwrap().push(request);
            Ok(OrderResult {
                order_id: "order-1".to_string(),
                status: OrderStatus::Open,
            })
        }

        async fn get_open_orders(&self) -> Result<Vec<OrderResult>, ExchangeError> {
            Ok(vec![])
        }

        async fn get_trades(&self) -> Result<Vec<Trade>, ExchangeError> {
            Ok(vec![])
        }

        async fn get_positions(&self) -> Result<Vec<Position>, ExchangeError> {
            Ok(vec![])
        }

        fn stream_prices(&self, _tokens: Vec<String>, _on_update: Box<dyn Fn(String, Probability) + Send + Sync>) {}

        fn is_simulation(&self) -> bool {
            true
        }
    }

    fn market() -> Market {
        Market {
            market_id: MarketId::new("m1"),
            city: "Chicago".to_string(),
            metric_type: MetricType::TempHigh,
            comparison: Comparison::Above,
            threshold: Some(wx_core::decimal::Temperature::new(dec!(70.0))),
            min_threshold: None,
            max_threshold: None,
            unit: Unit::Fahrenheit,
            target_date: chrono::NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
            yes_token_id: "yes-token".to_string(),
            no_token_id: "no-token".to_string(),
            active: true,
            closed: false,
            yes_price: Probability::new(dec!(0.40)),
            no_price: Probability::new(dec!(0.60)),
        }
    }

    fn signal(edge: Decimal, snapshot_price: Decimal) -> EntrySignal {
        EntrySignal::new(
            "speed",
            MarketId::new("m1"),
            Side::BuyYes,
            dec!(100),
            Urgency::High,
            false,
            edge,
            1.5,
            None,
            Probability::new(snapshot_price),
            "test signal",
            Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn successful_submission_locks_and_records_fill() {
        let exchange = Arc::new(FakeExchange {
            fail_next: false,
            submitted: Mutex::new(Vec::new()),
        });
        let executor = OrderExecutor::new(ExecutorConfig::default(), exchange.clone());
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = market();
        let sig = signal(dec!(0.20), dec!(0.40));

        let outcome = executor.execute(&sig, &m, now).await;
        assert!(outcome.executed);
        assert_eq!(executor.order_state(&m.market_id), OrderState::Confirmed);
        assert!(executor.positions().get("yes-token").is_some());
        assert_eq!(exchange.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn slippage_beyond_tolerance_is_rejected() {
        let exchange = Arc::new(FakeExchange {
            fail_next: false,
            submitted: Mutex::new(Vec::new()),
        });
        let executor = OrderExecutor::new(ExecutorConfig::default(), exchange);
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = market();
        // snapshot was 0.10, current yes_price is 0.40: slippage 0.30 > 0.05
        let sig = signal(dec!(0.20), dec!(0.10));

        let outcome = executor.execute(&sig, &m, now).await;
        assert!(!outcome.executed);
        assert_eq!(outcome.error, Some(ExecuteRejection::PriceSlippage));
    }

    #[tokio::test]
    async fn cooldown_blocks_a_second_submission() {
        let exchange = Arc::new(FakeExchange {
            fail_next: false,
            submitted: Mutex::new(Vec::new()),
        });
        let executor = OrderExecutor::new(ExecutorConfig::default(), exchange);
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = market();
        let sig = signal(dec!(0.20), dec!(0.40));

        let first = executor.execute(&sig, &m, now).await;
        assert!(first.executed);

        let second = executor.execute(&sig, &m, now + chrono::Duration::seconds(5)).await;
        assert_eq!(second.error, Some(ExecuteRejection::Cooldown));
    }

    #[tokio::test]
    async fn exchange_failure_releases_the_lock() {
        let exchange = Arc::new(FakeExchange {
            fail_next: true,
            submitted: Mutex::new(Vec::new()),
        });
        let executor = OrderExecutor::new(ExecutorConfig::default(), exchange);
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let m = market();
        let sig = signal(dec!(0.20), dec!(0.40));

        let outcome = executor.execute(&sig, &m, now).await;
        assert!(!outcome.executed);
        assert_eq!(executor.order_state(&m.market_id), OrderState::Idle);
    }

    #[tokio::test]
    async fn price_chase_guard_blocks_runaway_price() {
        let exchange = Arc::new(FakeExchange {
            fail_next: false,
            submitted: Mutex::new(Vec::new()),
        });
        let executor = OrderExecutor::new(ExecutorConfig::default(), exchange);
        executor
            .positions()
            .record_fill("yes-token", dec!(10), Probability::new(dec!(0.20)));
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let mut m = market();
        m.yes_price = Probability::new(dec!(0.40));
        let sig = signal(dec!(0.20), dec!(0.40));

        let outcome = executor.execute(&sig, &m, now).await;
        assert_eq!(outcome.error, Some(ExecuteRejection::PriceChase));
    }
}
