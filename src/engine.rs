//! Matching engine - routes requests to per-symbol books
//!
//! The engine owns the set of order books, assigns order ids, fires the
//! execution callback for every report the books produce, and keeps
//! per-engine counters plus a submit-latency reducer.
//!
//! # Concurrency
//!
//! The engine is not internally synchronized; callers serialize mutations.
//! The pipeline harness does this by pinning all matching work to one
//! thread. [`AsyncMatchingEngine`] is the optional decoupling: an MPSC
//! request queue drained by a dedicated consumer thread, with the engine
//! itself staying single-threaded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::clock::{self, Clock};
use crate::core_types::{
    OrderId, OrderType, Price, Quantity, Quote, Side, Symbol, Timestamp, INVALID_ORDER_ID,
};
use crate::order::{ExecutionReport, Order, OrderIdGenerator};
use crate::orderbook::OrderBook;
use crate::queue::MpscQueue;
use crate::stats::LatencyStats;

// High-frequency per-order logs go to a hierarchical target so they can
// be toggled off (see logging.rs) without losing run-level logs.
const TARGET_ME: &str = "HFTPERF::ME";

/// Callback invoked synchronously, on the mutating thread, for every
/// NEW/TRADE/CANCELLED/REJECTED/REPLACED report in book emission order.
/// Must be non-blocking and must not re-enter the engine.
pub type ExecutionCallback = Box<dyn FnMut(&ExecutionReport) + Send>;

/// Per-engine counters. Written by the single mutating thread; readers in
/// the async variant may observe torn values and treat them as advisory.
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineStats {
    pub orders_received: u64,
    /// Submissions that produced at least one fill
    pub orders_matched: u64,
    pub orders_cancelled: u64,
    pub orders_rejected: u64,
    pub total_volume: Quantity,
}

/// Central matching engine
pub struct MatchingEngine {
    books: FxHashMap<Symbol, OrderBook>,
    id_generator: OrderIdGenerator,
    callback: Option<ExecutionCallback>,
    stats: EngineStats,
    latency: LatencyStats,
    book_capacity: usize,
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self::with_book_capacity(crate::orderbook::DEFAULT_ARENA_CAPACITY)
    }

    /// Engine whose books are created with the given order-pool size
    pub fn with_book_capacity(book_capacity: usize) -> Self {
        Self {
            books: FxHashMap::default(),
            id_generator: OrderIdGenerator::new(),
            callback: None,
            stats: EngineStats::default(),
            latency: LatencyStats::new(),
            book_capacity,
        }
    }

    /// Register an instrument. Idempotent: false on duplicates.
    pub fn add_instrument(&mut self, symbol: Symbol) -> bool {
        if self.books.contains_key(&symbol) {
            return false;
        }
        debug!(symbol = %symbol, "instrument added");
        self.books
            .insert(symbol, OrderBook::with_capacity(symbol, self.book_capacity));
        true
    }

    /// Submit a new order.
    ///
    /// Returns `INVALID_ORDER_ID` on unknown symbol, non-positive quantity,
    /// STOP_LIMIT, POST_ONLY that crosses, FOK that cannot fully fill, or
    /// pool exhaustion; each rejection also emits a REJECTED report.
    pub fn submit_order(
        &mut self,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        price: Price,
        quantity: Quantity,
        client_id: u64,
    ) -> OrderId {
        let start = clock::now();
        self.stats.orders_received += 1;

        let order_id = self.id_generator.next_id();
        let mut order = Order::new(order_id, symbol, side, order_type, price, quantity, client_id);

        if quantity <= 0 {
            self.stats.orders_rejected += 1;
            order.reject();
            debug!(target: TARGET_ME, order_id, quantity, "order rejected: non-positive quantity");
            if let Some(cb) = self.callback.as_mut() {
                cb(&ExecutionReport::rejected(&order));
            }
            return INVALID_ORDER_ID;
        }

        let Some(book) = self.books.get_mut(&symbol) else {
            self.stats.orders_rejected += 1;
            order.reject();
            debug!(target: TARGET_ME, order_id, symbol = %symbol, "order rejected: unknown symbol");
            if let Some(cb) = self.callback.as_mut() {
                cb(&ExecutionReport::rejected(&order));
            }
            return INVALID_ORDER_ID;
        };

        let trades_before = book.trades_matched();
        let volume_before = book.volume_matched();

        let callback = &mut self.callback;
        let mut emit = |report: &ExecutionReport| {
            if let Some(cb) = callback.as_mut() {
                cb(report);
            }
        };
        let accepted = book.add_order(order, &mut emit);

        if !accepted {
            self.stats.orders_rejected += 1;
            debug!(target: TARGET_ME, order_id, symbol = %symbol, "order rejected by book");
            return INVALID_ORDER_ID;
        }

        let fills = book.trades_matched() - trades_before;
        if fills > 0 {
            self.stats.orders_matched += 1;
            self.stats.total_volume += book.volume_matched() - volume_before;
        }
        debug!(target: TARGET_ME, order_id, symbol = %symbol, fills, "order accepted");

        self.latency.record(Clock::global().elapsed_ns(start));
        order_id
    }

    /// Cancel a resting order. False when symbol or id is unknown.
    pub fn cancel_order(&mut self, symbol: Symbol, order_id: OrderId) -> bool {
        let Some(book) = self.books.get_mut(&symbol) else {
            return false;
        };
        let callback = &mut self.callback;
        let mut emit = |report: &ExecutionReport| {
            if let Some(cb) = callback.as_mut() {
                cb(report);
            }
        };
        let cancelled = book.cancel_order(order_id, &mut emit);
        if cancelled {
            self.stats.orders_cancelled += 1;
            debug!(target: TARGET_ME, order_id, symbol = %symbol, "order cancelled");
        }
        cancelled
    }

    /// Modify a resting order (see the book for the in-place rules)
    pub fn modify_order(
        &mut self,
        symbol: Symbol,
        order_id: OrderId,
        new_price: Price,
        new_qty: Quantity,
    ) -> bool {
        let Some(book) = self.books.get_mut(&symbol) else {
            return false;
        };
        let callback = &mut self.callback;
        let mut emit = |report: &ExecutionReport| {
            if let Some(cb) = callback.as_mut() {
                cb(report);
            }
        };
        book.modify_order(order_id, new_price, new_qty, &mut emit)
    }

    /// Process a queued request (async variant and batch drivers)
    pub fn process_request(&mut self, request: &OrderRequest) -> OrderId {
        match request.kind {
            RequestKind::New => self.submit_order(
                request.symbol,
                request.side,
                request.order_type,
                request.price,
                request.quantity,
                request.client_id,
            ),
            RequestKind::Cancel => {
                if self.cancel_order(request.symbol, request.order_id) {
                    request.order_id
                } else {
                    INVALID_ORDER_ID
                }
            }
            RequestKind::Modify => {
                if self.modify_order(
                    request.symbol,
                    request.order_id,
                    request.price,
                    request.quantity,
                ) {
                    request.order_id
                } else {
                    INVALID_ORDER_ID
                }
            }
        }
    }

    pub fn get_book(&self, symbol: Symbol) -> Option<&OrderBook> {
        self.books.get(&symbol)
    }

    pub fn get_quote(&self, symbol: Symbol) -> Option<Quote> {
        self.books.get(&symbol).and_then(|b| b.get_quote())
    }

    /// Replace the execution callback
    pub fn set_execution_callback(&mut self, callback: ExecutionCallback) {
        self.callback = Some(callback);
    }

    pub fn clear_execution_callback(&mut self) {
        self.callback = None;
    }

    pub fn instruments(&self) -> Vec<Symbol> {
        self.books.keys().copied().collect()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn latency_stats(&self) -> &LatencyStats {
        &self.latency
    }

    pub fn reset_stats(&mut self) {
        self.stats = EngineStats::default();
        self.latency.clear();
    }

    /// Clear every book (orders only; instruments stay registered)
    pub fn clear(&mut self) {
        for book in self.books.values_mut() {
            book.clear();
        }
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// ORDER REQUESTS
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    New,
    Cancel,
    Modify,
}

/// Queued engine request for the async variant
#[derive(Debug, Clone, Copy)]
pub struct OrderRequest {
    pub kind: RequestKind,
    pub symbol: Symbol,
    pub order_id: OrderId,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub quantity: Quantity,
    pub client_id: u64,
    pub timestamp: Timestamp,
}

impl OrderRequest {
    pub fn new_order(
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        price: Price,
        quantity: Quantity,
        client_id: u64,
    ) -> Self {
        Self {
            kind: RequestKind::New,
            symbol,
            order_id: INVALID_ORDER_ID,
            side,
            order_type,
            price,
            quantity,
            client_id,
            timestamp: clock::now(),
        }
    }

    pub fn cancel(symbol: Symbol, order_id: OrderId) -> Self {
        Self {
            kind: RequestKind::Cancel,
            symbol,
            order_id,
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: 0,
            quantity: 0,
            client_id: 0,
            timestamp: clock::now(),
        }
    }

    pub fn modify(symbol: Symbol, order_id: OrderId, new_price: Price, new_qty: Quantity) -> Self {
        Self {
            kind: RequestKind::Modify,
            symbol,
            order_id,
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: new_price,
            quantity: new_qty,
            client_id: 0,
            timestamp: clock::now(),
        }
    }
}

// ============================================================
// ASYNC WRAPPER
// ============================================================

const IDLE_SPIN_LIMIT: u32 = 1 << 12;

/// Thread-decoupled engine: producers enqueue requests from any thread,
/// one consumer thread drains them into the single-threaded engine.
pub struct AsyncMatchingEngine {
    queue: Arc<MpscQueue<OrderRequest>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<MatchingEngine>>,
}

impl AsyncMatchingEngine {
    /// Take ownership of the engine and start the consumer thread
    pub fn start(mut engine: MatchingEngine) -> Self {
        let queue = Arc::new(MpscQueue::new());
        let running = Arc::new(AtomicBool::new(true));

        let worker_queue = queue.clone();
        let worker_running = running.clone();
        let worker = std::thread::spawn(move || {
            let mut spins = 0u32;
            loop {
                if let Some(request) = worker_queue.try_pop() {
                    spins = 0;
                    engine.process_request(&request);
                    continue;
                }
                if !worker_running.load(Ordering::Acquire) && worker_queue.is_empty() {
                    break;
                }
                spins += 1;
                if spins > IDLE_SPIN_LIMIT {
                    spins = 0;
                    std::thread::yield_now();
                } else {
                    std::hint::spin_loop();
                }
            }
            engine
        });

        Self {
            queue,
            running,
            worker: Some(worker),
        }
    }

    /// Enqueue a request from any thread
    pub fn submit(&self, request: OrderRequest) {
        self.queue.push(request);
    }

    /// Drain outstanding requests, stop the consumer, and return the engine
    pub fn stop(mut self) -> MatchingEngine {
        self.running.store(false, Ordering::Release);
        let worker = self.worker.take().expect("async engine already stopped");
        worker.join().expect("async engine worker panicked")
    }
}

impl Drop for AsyncMatchingEngine {
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
    use crate::core_types::{ExecType, PRICE_MULTIPLIER};
    use std::sync::Mutex;

    const P: i64 = PRICE_MULTIPLIER;

    fn make_engine() -> MatchingEngine {
        let mut engine = MatchingEngine::with_book_capacity(1024);
        engine.add_instrument(Symbol::new("TEST"));
        engine
    }

    #[test]
    fn test_add_instrument_idempotent() {
        let mut engine = MatchingEngine::new();
        assert!(engine.add_instrument(Symbol::new("A")));
        assert!(!engine.add_instrument(Symbol::new("A")));
        assert_eq!(engine.instruments().len(), 1);
    }

    #[test]
    fn test_submit_unknown_symbol() {
        let mut engine = make_engine();
        let id = engine.submit_order(
            Symbol::new("NOPE"),
            Side::Buy,
            OrderType::Limit,
            100 * P,
            10,
            0,
        );
        assert_eq!(id, INVALID_ORDER_ID);
        assert_eq!(engine.stats().orders_rejected, 1);
    }

    #[test]
    fn test_submit_non_positive_quantity() {
        let mut engine = make_engine();
        let id = engine.submit_order(Symbol::new("TEST"), Side::Buy, OrderType::Limit, 100 * P, 0, 0);
        assert_eq!(id, INVALID_ORDER_ID);
        let id = engine.submit_order(Symbol::new("TEST"), Side::Buy, OrderType::Limit, 100 * P, -5, 0);
        assert_eq!(id, INVALID_ORDER_ID);
        assert_eq!(engine.stats().orders_rejected, 2);
    }

    #[test]
    fn test_single_cross_scenario() {
        let sym = Symbol::new("TEST");
        let mut engine = make_engine();

        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        engine.set_execution_callback(Box::new(move |r| sink.lock().unwrap().push(*r)));

        let id1 = engine.submit_order(sym, Side::Buy, OrderType::Limit, 100 * P, 10, 0);
        assert_eq!(id1, 1);
        let id2 = engine.submit_order(sym, Side::Sell, OrderType::Limit, 99 * P, 10, 0);
        assert_eq!(id2, 2);

        let reports = reports.lock().unwrap();
        let kinds: Vec<ExecType> = reports.iter().map(|r| r.exec_type).collect();
        assert_eq!(
            kinds,
            vec![ExecType::New, ExecType::New, ExecType::Trade, ExecType::Trade]
        );

        let book = engine.get_book(sym).unwrap();
        assert_eq!(book.order_count(), 0);
        assert_eq!(book.trades_matched(), 1);
        assert_eq!(book.volume_matched(), 10);

        let stats = engine.stats();
        assert_eq!(stats.orders_received, 2);
        assert_eq!(stats.orders_matched, 1);
        assert_eq!(stats.total_volume, 10);
    }

    #[test]
    fn test_cancel_via_engine() {
        let sym = Symbol::new("TEST");
        let mut engine = make_engine();
        let id = engine.submit_order(sym, Side::Buy, OrderType::Limit, 100 * P, 10, 0);
        assert!(engine.cancel_order(sym, id));
        assert!(!engine.cancel_order(sym, id));
        assert!(!engine.cancel_order(Symbol::new("NOPE"), id));
        assert_eq!(engine.stats().orders_cancelled, 1);
    }

    #[test]
    fn test_modify_via_engine() {
        let sym = Symbol::new("TEST");
        let mut engine = make_engine();
        let id = engine.submit_order(sym, Side::Buy, OrderType::Limit, 100 * P, 10, 0);
        assert!(engine.modify_order(sym, id, 100 * P, 6));
        assert_eq!(
            engine.get_book(sym).unwrap().get_order(id).unwrap().quantity,
            6
        );
    }

    #[test]
    fn test_quote_via_engine() {
        let sym = Symbol::new("TEST");
        let mut engine = make_engine();
        assert!(engine.get_quote(sym).is_none());
        engine.submit_order(sym, Side::Buy, OrderType::Limit, 100 * P, 10, 0);
        engine.submit_order(sym, Side::Sell, OrderType::Limit, 101 * P, 10, 0);
        let quote = engine.get_quote(sym).unwrap();
        assert_eq!(quote.bid_price, 100 * P);
        assert_eq!(quote.ask_price, 101 * P);
    }

    #[test]
    fn test_submit_latency_recorded() {
        let mut engine = make_engine();
        engine.submit_order(Symbol::new("TEST"), Side::Buy, OrderType::Limit, 100 * P, 10, 0);
        assert_eq!(engine.latency_stats().count(), 1);
        assert!(engine.latency_stats().min().unwrap() >= 0);
    }

    #[test]
    fn test_process_request_roundtrip() {
        let sym = Symbol::new("TEST");
        let mut engine = make_engine();

        let id = engine.process_request(&OrderRequest::new_order(
            sym,
            Side::Buy,
            OrderType::Limit,
            100 * P,
            10,
            0,
        ));
        assert_ne!(id, INVALID_ORDER_ID);

        assert_eq!(
            engine.process_request(&OrderRequest::modify(sym, id, 100 * P, 5)),
            id
        );
        assert_eq!(engine.process_request(&OrderRequest::cancel(sym, id)), id);
        assert_eq!(
            engine.process_request(&OrderRequest::cancel(sym, id)),
            INVALID_ORDER_ID
        );
    }

    #[test]
    fn test_clear_and_reset() {
        let sym = Symbol::new("TEST");
        let mut engine = make_engine();
        engine.submit_order(sym, Side::Buy, OrderType::Limit, 100 * P, 10, 0);
        engine.clear();
        assert!(engine.get_book(sym).unwrap().is_empty());
        assert_eq!(engine.instruments(), vec![sym]);

        engine.reset_stats();
        assert_eq!(engine.stats().orders_received, 0);
        assert_eq!(engine.latency_stats().count(), 0);
    }

    #[test]
    fn test_async_engine_drains_before_stop() {
        let sym = Symbol::new("TEST");
        let engine = make_engine();
        let async_engine = AsyncMatchingEngine::start(engine);

        for i in 0..100 {
            let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
            async_engine.submit(OrderRequest::new_order(
                sym,
                side,
                OrderType::Limit,
                100 * P,
                1,
                i,
            ));
        }

        let engine = async_engine.stop();
        assert_eq!(engine.stats().orders_received, 100);
    }

    #[test]
    fn test_async_engine_multi_producer() {
        let sym = Symbol::new("TEST");
        let engine = make_engine();
        let async_engine = Arc::new(AsyncMatchingEngine::start(engine));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ae = async_engine.clone();
                std::thread::spawn(move || {
                    for i in 0..250u64 {
                        let side = if (t + i) % 2 == 0 { Side::Buy } else { Side::Sell };
                        ae.submit(OrderRequest::new_order(
                            sym,
                            side,
                            OrderType::Limit,
                            (100 + (i % 3) as i64) * P,
                            1,
                            t,
                        ));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let engine = Arc::try_unwrap(async_engine)
            .ok()
            .expect("all submitters done")
            .stop();
        assert_eq!(engine.stats().orders_received, 1000);
    }
}
