//! Strategy interface and built-in strategies
//!
//! A strategy consumes market-data ticks and emits orders through the
//! callback passed to `on_tick`. The harness measures the time from tick
//! receipt to order emission; strategies that want a finer breakdown keep
//! a [`Checkpoints`] recorder and label the phases of their tick handler.

use rustc_hash::FxHashMap;

use crate::clock;
use crate::core_types::{OrderType, Price, Quantity, Side, Symbol, Timestamp};
use crate::stats::LatencyStats;

/// Market data tick
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub symbol: Symbol,
    pub bid_price: Price,
    pub ask_price: Price,
    pub bid_size: Quantity,
    pub ask_size: Quantity,
    pub last_price: Price,
    pub last_size: Quantity,
    /// Monotonically increasing per generator
    pub sequence: u64,
    /// Generation timestamp (t_gen)
    pub t_gen: Timestamp,
}

impl Tick {
    #[inline]
    pub fn mid_price(&self) -> Price {
        (self.bid_price + self.ask_price) / 2
    }
}

/// Order request produced by a strategy
#[derive(Debug, Clone, Copy)]
pub struct StrategyOrder {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub quantity: Quantity,
    pub client_order_id: u64,
}

/// Trading strategy driven by the harness
pub trait Strategy: Send {
    /// Handle one tick; emit zero or more orders through `submit`
    fn on_tick(&mut self, tick: &Tick, submit: &mut dyn FnMut(StrategyOrder));

    fn on_init(&mut self) {}

    fn on_shutdown(&mut self) {}

    fn name(&self) -> &'static str;

    /// Labeled phase breakdown collected during the run, if the strategy
    /// records one
    fn timing_report(&self) -> Option<String> {
        None
    }
}

// ============================================================
// CHECKPOINT RECORDER
// ============================================================

/// Aggregates deltas between consecutive labeled checkpoints within a tick
#[derive(Debug, Default)]
pub struct Checkpoints {
    last_ts: Timestamp,
    last_label: Option<&'static str>,
    stats: FxHashMap<String, LatencyStats>,
}

impl Checkpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a tick; resets the phase chain
    pub fn begin_tick(&mut self) {
        self.last_ts = clock::now();
        self.last_label = Some("tick_received");
    }

    /// Mark a labeled point; the delta from the previous mark is recorded
    /// under "prev -> label"
    pub fn mark(&mut self, label: &'static str) {
        let ts = clock::now();
        if let Some(prev) = self.last_label {
            let key = format!("{} -> {}", prev, label);
            self.stats.entry(key).or_default().record(ts - self.last_ts);
        }
        self.last_ts = ts;
        self.last_label = Some(label);
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn report(&self) -> String {
        let mut keys: Vec<&String> = self.stats.keys().collect();
        keys.sort();

        let mut s = String::from("Strategy timing breakdown:\n");
        for key in keys {
            let stats = &self.stats[key];
            s.push_str(&format!(
                "  {:<32} n={:<8} avg={:>8.0}ns min={:>8} max={:>8}\n",
                key,
                stats.count(),
                stats.mean().unwrap_or(0.0),
                stats.min().unwrap_or(0),
                stats.max().unwrap_or(0),
            ));
        }
        s
    }
}

// ============================================================
// BUILT-IN STRATEGIES
// ============================================================

/// Baseline: one order per tick, alternating sides at the mid price
#[derive(Debug, Default)]
pub struct PassThroughStrategy;

impl Strategy for PassThroughStrategy {
    fn on_tick(&mut self, tick: &Tick, submit: &mut dyn FnMut(StrategyOrder)) {
        submit(StrategyOrder {
            symbol: tick.symbol,
            side: if tick.sequence % 2 == 0 {
                Side::Buy
            } else {
                Side::Sell
            },
            order_type: OrderType::Limit,
            price: tick.mid_price(),
            quantity: 10,
            client_order_id: tick.sequence,
        });
    }

    fn name(&self) -> &'static str {
        "pass_through"
    }
}

/// Trade the sign of the last-price delta, bounded by a position limit
#[derive(Debug)]
pub struct MomentumStrategy {
    last_price: Price,
    position: i64,
    max_position: i64,
    checkpoints: Checkpoints,
}

impl MomentumStrategy {
    pub fn new() -> Self {
        Self {
            last_price: 0,
            position: 0,
            max_position: 100,
            checkpoints: Checkpoints::new(),
        }
    }
}

impl Default for MomentumStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MomentumStrategy {
    fn on_tick(&mut self, tick: &Tick, submit: &mut dyn FnMut(StrategyOrder)) {
        self.checkpoints.begin_tick();

        let delta = if self.last_price > 0 {
            tick.last_price - self.last_price
        } else {
            0
        };
        self.last_price = tick.last_price;
        self.checkpoints.mark("signal_calculated");

        if delta == 0 {
            return;
        }

        let can_buy = delta > 0 && self.position < self.max_position;
        let can_sell = delta < 0 && self.position > -self.max_position;
        self.checkpoints.mark("risk_checked");

        if can_buy {
            self.position += 1;
            submit(StrategyOrder {
                symbol: tick.symbol,
                side: Side::Buy,
                order_type: OrderType::Limit,
                price: tick.ask_price,
                quantity: 10,
                client_order_id: tick.sequence,
            });
            self.checkpoints.mark("order_submitted");
        } else if can_sell {
            self.position -= 1;
            submit(StrategyOrder {
                symbol: tick.symbol,
                side: Side::Sell,
                order_type: OrderType::Limit,
                price: tick.bid_price,
                quantity: 10,
                client_order_id: tick.sequence,
            });
            self.checkpoints.mark("order_submitted");
        }
    }

    fn name(&self) -> &'static str {
        "momentum"
    }

    fn timing_report(&self) -> Option<String> {
        if self.checkpoints.is_empty() {
            None
        } else {
            Some(self.checkpoints.report())
        }
    }
}

/// Quote both sides symmetrically around the mid with a floor on the spread
#[derive(Debug)]
pub struct MarketMakingStrategy {
    min_spread: Price,
    quote_size: Quantity,
}

impl MarketMakingStrategy {
    pub fn new() -> Self {
        Self {
            min_spread: 100,
            quote_size: 10,
        }
    }
}

impl Default for MarketMakingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MarketMakingStrategy {
    fn on_tick(&mut self, tick: &Tick, submit: &mut dyn FnMut(StrategyOrder)) {
        let mid = tick.mid_price();
        let spread = (tick.ask_price - tick.bid_price).max(self.min_spread) / 2;

        submit(StrategyOrder {
            symbol: tick.symbol,
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: mid - spread / 2,
            quantity: self.quote_size,
            client_order_id: tick.sequence * 2,
        });
        submit(StrategyOrder {
            symbol: tick.symbol,
            side: Side::Sell,
            order_type: OrderType::Limit,
            price: mid + spread / 2,
            quantity: self.quote_size,
            client_order_id: tick.sequence * 2 + 1,
        });
    }

    fn name(&self) -> &'static str {
        "market_making"
    }
}

/// Resolve a built-in strategy by config name
pub fn create_strategy(name: &str) -> Option<Box<dyn Strategy>> {
    match name {
        "pass_through" => Some(Box::new(PassThroughStrategy)),
        "momentum" => Some(Box::new(MomentumStrategy::new())),
        "market_making" => Some(Box::new(MarketMakingStrategy::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::PRICE_MULTIPLIER;

    const P: i64 = PRICE_MULTIPLIER;

    fn make_tick(sequence: u64, bid: Price, ask: Price, last: Price) -> Tick {
        Tick {
            symbol: Symbol::new("TEST"),
            bid_price: bid,
            ask_price: ask,
            bid_size: 10,
            ask_size: 10,
            last_price: last,
            last_size: 5,
            sequence,
            t_gen: 0,
        }
    }

    fn collect(strategy: &mut dyn Strategy, tick: &Tick) -> Vec<StrategyOrder> {
        let mut orders = Vec::new();
        strategy.on_tick(tick, &mut |o| orders.push(o));
        orders
    }

    #[test]
    fn test_pass_through_alternates_sides() {
        let mut strategy = PassThroughStrategy;
        let even = collect(&mut strategy, &make_tick(0, 100 * P, 101 * P, 100 * P));
        let odd = collect(&mut strategy, &make_tick(1, 100 * P, 101 * P, 100 * P));

        assert_eq!(even.len(), 1);
        assert_eq!(even[0].side, Side::Buy);
        assert_eq!(odd[0].side, Side::Sell);
        assert_eq!(even[0].price, (100 * P + 101 * P) / 2);
        assert_eq!(even[0].quantity, 10);
    }

    #[test]
    fn test_momentum_trades_on_delta_sign() {
        let mut strategy = MomentumStrategy::new();

        // First tick seeds last_price, no order
        assert!(collect(&mut strategy, &make_tick(0, 100 * P, 101 * P, 100 * P)).is_empty());

        // Uptick → buy at the ask
        let up = collect(&mut strategy, &make_tick(1, 100 * P, 101 * P, 102 * P));
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].side, Side::Buy);
        assert_eq!(up[0].price, 101 * P);

        // Downtick → sell at the bid
        let down = collect(&mut strategy, &make_tick(2, 100 * P, 101 * P, 99 * P));
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].side, Side::Sell);
        assert_eq!(down[0].price, 100 * P);

        // Flat → no order
        assert!(collect(&mut strategy, &make_tick(3, 100 * P, 101 * P, 99 * P)).is_empty());
    }

    #[test]
    fn test_momentum_position_limit() {
        let mut strategy = MomentumStrategy::new();
        strategy.max_position = 2;

        collect(&mut strategy, &make_tick(0, 100 * P, 101 * P, 100 * P));
        let mut price = 100 * P;
        let mut buys = 0;
        for i in 1..10 {
            price += P; // monotone upticks
            buys += collect(&mut strategy, &make_tick(i, 100 * P, 101 * P, price)).len();
        }
        assert_eq!(buys, 2);
    }

    #[test]
    fn test_momentum_has_timing_report() {
        let mut strategy = MomentumStrategy::new();
        collect(&mut strategy, &make_tick(0, 100 * P, 101 * P, 100 * P));
        collect(&mut strategy, &make_tick(1, 100 * P, 101 * P, 101 * P));

        let report = strategy.timing_report().unwrap();
        assert!(report.contains("signal_calculated"));
    }

    #[test]
    fn test_market_making_quotes_both_sides() {
        let mut strategy = MarketMakingStrategy::new();
        let orders = collect(&mut strategy, &make_tick(7, 100 * P, 101 * P, 100 * P));

        assert_eq!(orders.len(), 2);
        let buy = orders.iter().find(|o| o.side == Side::Buy).unwrap();
        let sell = orders.iter().find(|o| o.side == Side::Sell).unwrap();
        let mid = (100 * P + 101 * P) / 2;
        assert!(buy.price < mid);
        assert!(sell.price > mid);
        assert_eq!(buy.client_order_id, 14);
        assert_eq!(sell.client_order_id, 15);
    }

    #[test]
    fn test_factory_names() {
        assert_eq!(create_strategy("pass_through").unwrap().name(), "pass_through");
        assert_eq!(create_strategy("momentum").unwrap().name(), "momentum");
        assert_eq!(
            create_strategy("market_making").unwrap().name(),
            "market_making"
        );
        assert!(create_strategy("bogus").is_none());
    }

    #[test]
    fn test_checkpoints_aggregate_deltas() {
        let mut cp = Checkpoints::new();
        for _ in 0..3 {
            cp.begin_tick();
            cp.mark("a");
            cp.mark("b");
        }
        let report = cp.report();
        assert!(report.contains("tick_received -> a"));
        assert!(report.contains("a -> b"));
        assert!(report.contains("n=3"));
    }
}
