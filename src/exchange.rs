//! Exchange stage - consumes orders and measures tick-to-trade latency
//!
//! The strategy enqueues [`ExchangeOrder`]s (carrying `t_gen` and
//! `t_strategy_done`) into an SPSC queue; a dedicated exchange thread
//! dequeues, stamps `t_order_recv` immediately, drives the matching
//! engine, and maintains the latency breakdown:
//!
//! - tick-to-trade = `t_order_recv − t_gen` (the primary metric)
//! - strategy time = `t_strategy_done − t_gen`
//! - transit time  = `t_order_recv − t_strategy_done` (queue delay; a
//!   delay over 1 µs counts as a queue overload)

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::affinity;
use crate::clock;
use crate::core_types::{
    OrderId, OrderType, Price, Quantity, Side, Symbol, Timestamp, INVALID_ORDER_ID,
};
use crate::engine::MatchingEngine;
use crate::queue::SpscQueue;
use crate::stats::{LatencyHistogram, LatencyStats};
use crate::tsbuffer::{self, EventType};

// High-frequency per-order logs go to a hierarchical target so they can
// be toggled off (see logging.rs) without losing run-level logs.
const TARGET_EXCH: &str = "HFTPERF::EXCH";

/// Queue depth between strategy and exchange
pub const ORDER_QUEUE_CAPACITY: usize = 65_536;

/// Transit delay above this counts as a queue overload
pub const OVERLOAD_THRESHOLD_NS: i64 = 1_000;

/// Tick-attributable order message passed from strategy to exchange
#[derive(Debug, Clone, Copy)]
pub struct ExchangeOrder {
    pub order_id: u64,
    /// Which tick triggered this order
    pub tick_sequence: u64,
    pub t_gen: Timestamp,
    pub t_strategy_done: Timestamp,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub quantity: Quantity,
}

/// Acknowledgment produced by the exchange for each order
#[derive(Debug, Clone, Copy)]
pub struct OrderAck {
    pub order_id: u64,
    pub t_order_recv: Timestamp,
    pub t_ack_sent: Timestamp,
    pub accepted: bool,
    pub exchange_order_id: OrderId,
}

pub type AckCallback = Box<dyn FnMut(&OrderAck) + Send>;

// ============================================================
// STATS
// ============================================================

/// Latency breakdown accumulated on the exchange thread
pub struct TickToTradeStats {
    pub tick_to_order: LatencyStats,
    pub strategy_time: LatencyStats,
    pub transit_time: LatencyStats,
    pub histogram: LatencyHistogram,
    pub orders_received: u64,
    pub orders_accepted: u64,
    pub orders_rejected: u64,
    pub queue_overloads: u64,
}

impl TickToTradeStats {
    pub fn new() -> Self {
        Self {
            tick_to_order: LatencyStats::with_capacity(1 << 17),
            strategy_time: LatencyStats::with_capacity(1 << 17),
            transit_time: LatencyStats::with_capacity(1 << 17),
            histogram: LatencyHistogram::new(100, 1000),
            orders_received: 0,
            orders_accepted: 0,
            orders_rejected: 0,
            queue_overloads: 0,
        }
    }

    fn record(&mut self, order: &ExchangeOrder, t_order_recv: Timestamp) {
        let tick_to_order = t_order_recv - order.t_gen;
        let strategy_time = order.t_strategy_done - order.t_gen;
        let transit = t_order_recv - order.t_strategy_done;

        self.tick_to_order.record(tick_to_order);
        self.strategy_time.record(strategy_time);
        self.transit_time.record(transit);
        self.histogram.record(tick_to_order);
        if transit > OVERLOAD_THRESHOLD_NS {
            self.queue_overloads += 1;
        }
        self.orders_received += 1;
    }

    /// Clear all samples (end of warmup)
    pub fn reset(&mut self) {
        self.tick_to_order.clear();
        self.strategy_time.clear();
        self.transit_time.clear();
        self.histogram.reset();
        self.orders_received = 0;
        self.orders_accepted = 0;
        self.orders_rejected = 0;
        self.queue_overloads = 0;
    }

    pub fn report(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "--- Orders ---");
        let _ = writeln!(s, "  Received:  {}", self.orders_received);
        let _ = writeln!(s, "  Accepted:  {}", self.orders_accepted);
        let _ = writeln!(s, "  Rejected:  {}", self.orders_rejected);
        let _ = writeln!(s, "  Overloads: {} (transit > 1µs)", self.queue_overloads);
        s.push('\n');
        s.push_str(&self.tick_to_order.summary("Tick-to-trade (t_order_recv - t_gen)"));
        s.push('\n');
        s.push_str(&self.strategy_time.summary("Strategy time (t_strategy_done - t_gen)"));
        s.push('\n');
        s.push_str(&self.transit_time.summary("Order transit (t_order_recv - t_strategy_done)"));
        s.push('\n');
        s.push_str(&self.histogram.render());
        s
    }
}

impl Default for TickToTradeStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// EXCHANGE THREAD
// ============================================================

/// Behavior knobs for the exchange thread
pub struct ExchangeOptions {
    /// Core to pin the exchange thread to
    pub pin_core: Option<usize>,
    /// Busy-poll when the queue is empty (otherwise yield to the scheduler)
    pub use_polling: bool,
    /// Drive the matching engine for each order (false = ack-only)
    pub simulate_fills: bool,
    /// Discard statistics gathered before this timestamp (warmup window);
    /// 0 disables
    pub warmup_until: Timestamp,
    pub ack_callback: Option<AckCallback>,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            pin_core: None,
            use_polling: true,
            simulate_fills: true,
            warmup_until: 0,
            ack_callback: None,
        }
    }
}

/// Exchange simulator: owns the engine for the duration of the run
pub struct ExchangeSim {
    queue: Arc<SpscQueue<ExchangeOrder>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<(MatchingEngine, TickToTradeStats)>>,
}

impl ExchangeSim {
    /// Start the exchange thread. The engine moves onto that thread and is
    /// returned by [`stop`](Self::stop).
    pub fn start(mut engine: MatchingEngine, mut options: ExchangeOptions) -> Self {
        let queue: Arc<SpscQueue<ExchangeOrder>> =
            Arc::new(SpscQueue::with_capacity(ORDER_QUEUE_CAPACITY));
        let running = Arc::new(AtomicBool::new(true));

        let worker_queue = queue.clone();
        let worker_running = running.clone();
        let worker = std::thread::Builder::new()
            .name("exchange".to_string())
            .spawn(move || {
                if let Some(core) = options.pin_core {
                    affinity::pin_to_core(core);
                }

                let mut stats = TickToTradeStats::new();
                let mut exchange_order_seq: OrderId = 1;
                let mut warmup_pending = options.warmup_until > 0;

                loop {
                    if let Some(order) = worker_queue.try_pop() {
                        // t_order_recv must be stamped immediately on dequeue
                        let t_order_recv = clock::now();
                        if warmup_pending && t_order_recv >= options.warmup_until {
                            warmup_pending = false;
                            stats.reset();
                        }
                        let _ = tsbuffer::record(EventType::OrderReceived, order.order_id);

                        stats.record(&order, t_order_recv);

                        tracing::debug!(
                            target: TARGET_EXCH,
                            order_id = order.order_id,
                            tick = order.tick_sequence,
                            transit_ns = t_order_recv - order.t_strategy_done,
                            "order received"
                        );

                        let accepted = if options.simulate_fills {
                            let id = engine.submit_order(
                                order.symbol,
                                order.side,
                                order.order_type,
                                order.price,
                                order.quantity,
                                order.order_id,
                            );
                            id != INVALID_ORDER_ID
                        } else {
                            true
                        };
                        if accepted {
                            stats.orders_accepted += 1;
                        } else {
                            stats.orders_rejected += 1;
                        }

                        if let Some(ack) = options.ack_callback.as_mut() {
                            let exchange_order_id = exchange_order_seq;
                            exchange_order_seq += 1;
                            ack(&OrderAck {
                                order_id: order.order_id,
                                t_order_recv,
                                t_ack_sent: clock::now(),
                                accepted,
                                exchange_order_id,
                            });
                        }
                        continue;
                    }

                    if !worker_running.load(Ordering::Acquire) && worker_queue.is_empty() {
                        break;
                    }
                    if options.use_polling {
                        std::hint::spin_loop();
                    } else {
                        std::thread::yield_now();
                    }
                }

                (engine, stats)
            })
            .expect("failed to spawn exchange thread");

        Self {
            queue,
            running,
            worker: Some(worker),
        }
    }

    /// Enqueue an order (strategy thread). False when the queue is full;
    /// the harness policy is to spin and retry.
    #[inline]
    pub fn submit(&self, order: ExchangeOrder) -> bool {
        self.queue.try_push(order).is_ok()
    }

    /// Signal shutdown, let the thread drain the queue, and return the
    /// engine with the collected stats.
    pub fn stop(mut self) -> (MatchingEngine, TickToTradeStats) {
        self.running.store(false, Ordering::Release);
        let worker = self.worker.take().expect("exchange already stopped");
        worker.join().expect("exchange thread panicked")
    }
}

impl Drop for ExchangeSim {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::PRICE_MULTIPLIER;

    const P: i64 = PRICE_MULTIPLIER;

    fn make_order(seq: u64, side: Side) -> ExchangeOrder {
        let t_gen = clock::now();
        ExchangeOrder {
            order_id: seq + 1,
            tick_sequence: seq,
            t_gen,
            t_strategy_done: clock::now(),
            symbol: Symbol::new("TEST"),
            side,
            order_type: OrderType::Limit,
            price: 100 * P,
            quantity: 10,
        }
    }

    fn make_engine() -> MatchingEngine {
        let mut engine = MatchingEngine::with_book_capacity(4096);
        engine.add_instrument(Symbol::new("TEST"));
        engine
    }

    #[test]
    fn test_exchange_consumes_and_matches() {
        let exchange = ExchangeSim::start(
            make_engine(),
            ExchangeOptions {
                use_polling: false,
                ..Default::default()
            },
        );

        for i in 0..100 {
            let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
            let order = make_order(i, side);
            while !exchange.submit(order) {
                std::hint::spin_loop();
            }
        }

        let (engine, stats) = exchange.stop();
        assert_eq!(stats.orders_received, 100);
        assert_eq!(stats.orders_accepted, 100);
        assert_eq!(stats.tick_to_order.count(), 100);
        assert!(stats.tick_to_order.min().unwrap() >= 0);
        assert_eq!(engine.stats().orders_received, 100);

        // Alternating crossable orders leave the book flat
        let book = engine.get_book(Symbol::new("TEST")).unwrap();
        assert_eq!(book.trades_matched(), 50);
    }

    #[test]
    fn test_ack_callback_fires() {
        use std::sync::Mutex;

        let acks = Arc::new(Mutex::new(Vec::new()));
        let sink = acks.clone();
        let exchange = ExchangeSim::start(
            make_engine(),
            ExchangeOptions {
                use_polling: false,
                ack_callback: Some(Box::new(move |a: &OrderAck| {
                    sink.lock().unwrap().push(*a)
                })),
                ..Default::default()
            },
        );

        for i in 0..10 {
            while !exchange.submit(make_order(i, Side::Buy)) {
                std::hint::spin_loop();
            }
        }
        exchange.stop();

        let acks = acks.lock().unwrap();
        assert_eq!(acks.len(), 10);
        assert!(acks.iter().all(|a| a.accepted));
        assert!(acks.iter().all(|a| a.t_ack_sent >= a.t_order_recv));
        assert_eq!(acks[0].exchange_order_id, 1);
        assert_eq!(acks[9].exchange_order_id, 10);
    }

    #[test]
    fn test_ack_only_mode_skips_engine() {
        let exchange = ExchangeSim::start(
            make_engine(),
            ExchangeOptions {
                use_polling: false,
                simulate_fills: false,
                ..Default::default()
            },
        );
        for i in 0..20 {
            while !exchange.submit(make_order(i, Side::Buy)) {
                std::hint::spin_loop();
            }
        }
        let (engine, stats) = exchange.stop();
        assert_eq!(stats.orders_received, 20);
        assert_eq!(stats.orders_accepted, 20);
        assert_eq!(engine.stats().orders_received, 0);
    }

    #[test]
    fn test_stats_breakdown_consistency() {
        let mut stats = TickToTradeStats::new();
        let order = ExchangeOrder {
            order_id: 1,
            tick_sequence: 0,
            t_gen: 1_000,
            t_strategy_done: 1_400,
            symbol: Symbol::new("TEST"),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: 100 * P,
            quantity: 1,
        };
        stats.record(&order, 3_000);

        assert_eq!(stats.tick_to_order.min(), Some(2_000));
        assert_eq!(stats.strategy_time.min(), Some(400));
        assert_eq!(stats.transit_time.min(), Some(1_600));
        // Transit above 1µs counted as overload
        assert_eq!(stats.queue_overloads, 1);
        assert_eq!(stats.histogram.total_count(), 1);
    }
}
