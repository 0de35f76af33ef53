//! Pipeline harness - drives the core under load and reports latency
//!
//! Four modes, mirroring the ways the core can be exercised:
//!
//! - `single_thread`: generator and engine in one loop; latency is the
//!   submit-call duration.
//! - `pipeline`: a generator thread feeds an SPSC queue; an engine thread
//!   dequeues and matches. Reports the queue delay, processing time, and
//!   end-to-end latency separately.
//! - `strategy`: generator → strategy → engine inline, with per-tick
//!   processing latency and the strategy's checkpoint breakdown.
//! - `exchange`: generator + strategy on the main thread, the exchange
//!   stage on its own thread behind an SPSC queue. The primary metric is
//!   tick-to-trade (`t_order_recv − t_gen`).
//!
//! Shutdown is ordered: the generator stops producing, the strategy
//! finishes its input, the exchange drains its queue, and only then does
//! the statistics reducer run.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::affinity;
use crate::clock::{self, Clock};
use crate::config::BenchConfig;
use crate::core_types::{OrderType, Side, Timestamp, INVALID_ORDER_ID};
use crate::csvlog::CsvLogger;
use crate::engine::MatchingEngine;
use crate::exchange::{ExchangeOptions, ExchangeOrder, ExchangeSim, OVERLOAD_THRESHOLD_NS};
use crate::generator::{GeneratorConfig, TickGenerator};
use crate::queue::SpscQueue;
use crate::stats::LatencyStats;
use crate::strategy::{self, Strategy};
use crate::tsbuffer::{self, EventType};

/// Sizing for per-book order pools relative to the configured load
const POOL_HEADROOM: usize = 4;
const MIN_POOL_CAPACITY: usize = 1 << 16;
const PIPELINE_QUEUE_CAPACITY: usize = 65_536;

/// End-of-run results
pub struct RunReport {
    pub mode: String,
    pub duration_ms: u64,
    pub ticks_generated: u64,
    pub orders_sent: u64,
    pub orders_accepted: u64,
    pub orders_rejected: u64,
    pub trades_matched: u64,
    /// The mode's primary latency metric
    pub latency: LatencyStats,
    /// Exchange mode: `t_strategy_done − t_gen`
    pub strategy_time: Option<LatencyStats>,
    /// Pipeline/exchange: queue delay between producer and consumer
    pub transit_time: Option<LatencyStats>,
    /// Pipeline mode: matching time after dequeue (`t_done − t_recv`)
    pub process_time: Option<LatencyStats>,
    pub queue_overloads: u64,
    pub dropped_events: u64,
    pub warmup_excluded: bool,
    /// Top-of-book depth rendering for the run's first symbol
    pub final_depth: String,
}

impl RunReport {
    pub fn render(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "--- Throughput ---");
        let _ = writeln!(s, "  Mode:            {}", self.mode);
        let _ = writeln!(s, "  Ticks generated: {}", self.ticks_generated);
        let _ = writeln!(s, "  Orders sent:     {}", self.orders_sent);
        let _ = writeln!(s, "  Orders accepted: {}", self.orders_accepted);
        let _ = writeln!(s, "  Orders rejected: {}", self.orders_rejected);
        let _ = writeln!(s, "  Trades matched:  {}", self.trades_matched);
        let _ = writeln!(s, "  Duration:        {} ms", self.duration_ms);
        if self.duration_ms > 0 {
            let _ = writeln!(
                s,
                "  Throughput:      {:.0} orders/sec",
                self.orders_sent as f64 * 1000.0 / self.duration_ms as f64
            );
        }
        let _ = writeln!(
            s,
            "  Warmup:          {}",
            if self.warmup_excluded { "excluded" } else { "none" }
        );
        s.push('\n');
        s.push_str(&self.latency.summary("End-to-end latency"));
        if let Some(strategy_time) = &self.strategy_time {
            s.push('\n');
            s.push_str(&strategy_time.summary("Strategy time"));
        }
        if let Some(transit) = &self.transit_time {
            s.push('\n');
            s.push_str(&transit.summary("Queue transit"));
        }
        if let Some(process) = &self.process_time {
            s.push('\n');
            s.push_str(&process.summary("Processing time"));
        }
        let _ = writeln!(s, "\n--- Health ---");
        let _ = writeln!(s, "  Queue overloads (delay > 1µs): {}", self.queue_overloads);
        let _ = writeln!(s, "  Dropped timestamp events:      {}", self.dropped_events);
        if !self.final_depth.is_empty() {
            let _ = writeln!(s, "\n--- Final depth ---");
            s.push_str(&self.final_depth);
        }
        s
    }

    /// One-sentence completion summary
    pub fn summary_line(&self) -> String {
        let fmt_count = |n: u64| -> String {
            if n >= 1_000_000 {
                format!("{}M", n / 1_000_000)
            } else if n >= 1_000 {
                format!("{}k", n / 1_000)
            } else {
                n.to_string()
            }
        };
        let us = |v: i64| v as f64 / 1000.0;
        format!(
            "Completed {:.1}s {} run: {} ticks, {} orders. \
             Latency: median {:.1} µs, p99 {:.1} µs, max {:.1} µs. \
             Jitter (stddev) ~{:.1} µs. {} dropped events, {} queue overloads.",
            self.duration_ms as f64 / 1000.0,
            self.mode,
            fmt_count(self.ticks_generated),
            fmt_count(self.orders_sent),
            us(self.latency.median().unwrap_or(0)),
            us(self.latency.percentile(99.0).unwrap_or(0)),
            us(self.latency.max().unwrap_or(0)),
            self.latency.stddev().unwrap_or(0.0) / 1000.0,
            self.dropped_events,
            self.queue_overloads,
        )
    }
}

// ============================================================
// ENTRY POINTS
// ============================================================

/// Run a benchmark described by `config` with the built-in strategies
pub fn run(config: &BenchConfig) -> Result<RunReport> {
    run_with_user_strategy(config, None)
}

/// Run a benchmark, supplying the implementation for `strategy: user`
pub fn run_with_user_strategy(
    config: &BenchConfig,
    user_strategy: Option<Box<dyn Strategy>>,
) -> Result<RunReport> {
    config.validate()?;

    let strategy: Box<dyn Strategy> = if config.strategy == "user" {
        match user_strategy {
            Some(s) => s,
            None => bail!("strategy 'user' requires a host-supplied implementation"),
        }
    } else {
        strategy::create_strategy(&config.strategy)
            .with_context(|| format!("unknown strategy '{}'", config.strategy))?
    };

    let generator = TickGenerator::new(GeneratorConfig {
        message_rate: config.message_rate,
        poisson: config.message_pattern == "poisson",
        gap_pause_ms: config.gap_pause_ms,
        gap_burst_count: config.gap_burst_count,
        gap_interval_sec: config.gap_interval_sec,
        trade_signal_ratio: config.trade_signal_ratio,
        num_symbols: config.num_symbols,
        symbol_prefix: config.symbol_prefix.clone(),
        jitter_min_ns: config.jitter_min_ns,
        jitter_max_ns: config.jitter_max_ns,
    });

    // Pool must outlast the run when every tick rests an order
    let expected_orders = (config.message_rate * config.duration_sec) as usize;
    let pool_capacity = (expected_orders * POOL_HEADROOM).max(MIN_POOL_CAPACITY);

    let mut engine = MatchingEngine::with_book_capacity(pool_capacity);
    for &symbol in generator.symbols() {
        engine.add_instrument(symbol);
    }

    let mut csv = if config.log_file.is_empty() {
        None
    } else {
        Some(
            CsvLogger::create(Path::new(&config.log_file))
                .with_context(|| format!("cannot open result log '{}'", config.log_file))?,
        )
    };

    info!(
        mode = %config.mode,
        rate = config.message_rate,
        duration_sec = config.duration_sec,
        strategy = %config.strategy,
        "starting benchmark ({})",
        Clock::global().describe()
    );

    tsbuffer::clear_all();
    let dropped_before = tsbuffer::total_dropped();

    let mut report = match config.mode.as_str() {
        "single_thread" => run_single_thread(config, engine, generator, csv.as_mut()),
        "pipeline" => run_pipeline(config, engine, generator, csv.as_mut()),
        "strategy" => run_strategy(config, engine, generator, strategy, csv.as_mut()),
        "exchange" => run_exchange(config, engine, generator, strategy, csv.as_mut()),
        other => bail!("unknown mode '{}'", other),
    }?;

    report.dropped_events = tsbuffer::total_dropped() - dropped_before;

    if let Some(csv) = csv.as_mut() {
        csv.flush().context("flushing result log")?;
        info!(rows = csv.rows(), path = %config.log_file, "result log written");
    }

    Ok(report)
}

// ============================================================
// TIMELINE HELPERS
// ============================================================

struct Timeline {
    start: Timestamp,
    end: Timestamp,
    warmup_end: Timestamp,
    warmup_done: bool,
    last_progress: Timestamp,
}

impl Timeline {
    fn new(config: &BenchConfig) -> Self {
        let start = clock::now();
        Self {
            start,
            end: start + config.duration_sec as i64 * 1_000_000_000,
            warmup_end: start + config.warmup_sec as i64 * 1_000_000_000,
            warmup_done: config.warmup_sec == 0,
            last_progress: start,
        }
    }

    #[inline]
    fn expired(&self, now: Timestamp) -> bool {
        now >= self.end
    }

    /// True exactly once, at the end of the warmup window
    fn warmup_boundary(&mut self, now: Timestamp) -> bool {
        if !self.warmup_done && now >= self.warmup_end {
            self.warmup_done = true;
            return true;
        }
        false
    }

    /// One progress line per elapsed second
    fn progress(&mut self, now: Timestamp, ticks: u64, orders: u64) {
        if now - self.last_progress >= 1_000_000_000 {
            self.last_progress = now;
            let elapsed_sec = ((now - self.start) / 1_000_000_000).max(1);
            info!(
                elapsed_sec,
                ticks,
                orders,
                rate = orders / elapsed_sec as u64,
                warmup = !self.warmup_done,
                "progress"
            );
        }
    }

    fn elapsed_ms(&self) -> u64 {
        ((clock::now() - self.start) / 1_000_000) as u64
    }
}

fn depth_render(engine: &MatchingEngine, generator: &TickGenerator, levels: usize) -> String {
    let Some(book) = engine.get_book(generator.symbols()[0]) else {
        return String::new();
    };
    let depth = book.get_depth(levels);
    let mut s = String::new();
    for level in &depth.asks {
        let _ = writeln!(
            s,
            "  ASK {:>14} x {:<8} ({} orders)",
            level.price, level.quantity, level.order_count
        );
    }
    for level in &depth.bids {
        let _ = writeln!(
            s,
            "  BID {:>14} x {:<8} ({} orders)",
            level.price, level.quantity, level.order_count
        );
    }
    s
}

// ============================================================
// MODE: single_thread
// ============================================================

fn run_single_thread(
    config: &BenchConfig,
    mut engine: MatchingEngine,
    mut generator: TickGenerator,
    mut csv: Option<&mut CsvLogger>,
) -> Result<RunReport> {
    if let Some(&core) = config.affinity.first() {
        affinity::pin_to_core(core);
    }

    let mut timeline = Timeline::new(config);
    generator.start(timeline.start, config.duration_sec as i64 * 1_000_000_000);

    let mut latency = LatencyStats::with_capacity(1 << 17);
    let mut ticks = 0u64;
    let mut orders = 0u64;
    let mut accepted = 0u64;

    loop {
        let now = clock::now();
        if timeline.expired(now) {
            break;
        }
        if timeline.warmup_boundary(now) {
            latency.clear();
            engine.reset_stats();
            ticks = 0;
            orders = 0;
            accepted = 0;
            info!("warmup complete, measurement started");
        }

        let tick = generator.next_tick();
        ticks += 1;
        let _ = tsbuffer::record(EventType::TickGenerated, tick.sequence);

        if !generator.should_trade() {
            continue;
        }

        let (is_buy, price, qty) = generator.random_order_fields();
        let side = if is_buy { Side::Buy } else { Side::Sell };

        let order_start = clock::now();
        let order_id = engine.submit_order(tick.symbol, side, OrderType::Limit, price, qty, 1);
        let order_latency = Clock::global().elapsed_ns(order_start);

        orders += 1;
        if order_id != INVALID_ORDER_ID {
            accepted += 1;
        }
        latency.record(order_latency);

        if let Some(csv) = csv.as_deref_mut() {
            csv.log_row(order_start, order_id, order_latency, side.as_str(), price, qty, tick.symbol)
                .context("writing result row")?;
        }

        timeline.progress(clock::now(), ticks, orders);
    }

    let engine_stats = engine.stats();
    Ok(RunReport {
        mode: config.mode.clone(),
        duration_ms: timeline.elapsed_ms(),
        ticks_generated: ticks,
        orders_sent: orders,
        orders_accepted: accepted,
        orders_rejected: engine_stats.orders_rejected,
        trades_matched: engine_stats.orders_matched,
        latency,
        strategy_time: None,
        transit_time: None,
        process_time: None,
        queue_overloads: 0,
        dropped_events: 0,
        warmup_excluded: config.warmup_sec > 0,
        final_depth: depth_render(&engine, &generator, config.book_depth_levels),
    })
}

// ============================================================
// MODE: pipeline
// ============================================================

/// Order message between the generator and engine stages
#[derive(Clone, Copy)]
struct PipelineOrder {
    order_id: u64,
    t_gen: Timestamp,
    side: Side,
    price: i64,
    quantity: i64,
    symbol: crate::core_types::Symbol,
}

fn run_pipeline(
    config: &BenchConfig,
    mut engine: MatchingEngine,
    mut generator: TickGenerator,
    mut csv: Option<&mut CsvLogger>,
) -> Result<RunReport> {
    let queue = Arc::new(SpscQueue::<PipelineOrder>::with_capacity(
        PIPELINE_QUEUE_CAPACITY,
    ));
    let producing = Arc::new(AtomicBool::new(true));

    let consumer_core = config.affinity.get(1).copied();
    let use_polling = config.use_polling;

    // Stage 2: matching thread (consumer)
    let consumer_queue = queue.clone();
    let consumer_producing = producing.clone();
    let consumer = std::thread::Builder::new()
        .name("matcher".to_string())
        .spawn(move || {
            if let Some(core) = consumer_core {
                affinity::pin_to_core(core);
            }

            let mut queue_delay = LatencyStats::with_capacity(1 << 17);
            let mut process_time = LatencyStats::with_capacity(1 << 17);
            let mut total_latency = LatencyStats::with_capacity(1 << 17);
            let mut overloads = 0u64;
            let mut accepted = 0u64;

            loop {
                if let Some(msg) = consumer_queue.try_pop() {
                    // Receive timestamp immediately after dequeue
                    let t_recv = clock::now();
                    let _ = tsbuffer::record(EventType::QueuePop, msg.order_id);

                    let delay = t_recv - msg.t_gen;
                    if delay > OVERLOAD_THRESHOLD_NS {
                        overloads += 1;
                    }

                    let result = engine.submit_order(
                        msg.symbol,
                        msg.side,
                        OrderType::Limit,
                        msg.price,
                        msg.quantity,
                        1,
                    );
                    let t_done = clock::now();
                    if result != INVALID_ORDER_ID {
                        accepted += 1;
                    }

                    queue_delay.record(delay);
                    process_time.record(t_done - t_recv);
                    total_latency.record(t_done - msg.t_gen);
                    continue;
                }
                if !consumer_producing.load(Ordering::Acquire) && consumer_queue.is_empty() {
                    break;
                }
                if use_polling {
                    std::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
            }

            (engine, queue_delay, process_time, total_latency, overloads, accepted)
        })
        .expect("failed to spawn matcher thread");

    // Stage 1: generator (this thread)
    if let Some(&core) = config.affinity.first() {
        affinity::pin_to_core(core);
    }

    let mut timeline = Timeline::new(config);
    generator.start(timeline.start, config.duration_sec as i64 * 1_000_000_000);

    let mut ticks = 0u64;
    let mut sent = 0u64;
    let mut order_id = 1u64;

    loop {
        let now = clock::now();
        if timeline.expired(now) {
            break;
        }
        // Warmup in pipeline mode only trims the producer-side counters;
        // consumer stats span the whole run and are reported as such.
        if timeline.warmup_boundary(now) {
            ticks = 0;
            sent = 0;
            info!("warmup complete, measurement started");
        }

        let tick = generator.next_tick();
        ticks += 1;

        if !generator.should_trade() {
            continue;
        }

        let (is_buy, price, qty) = generator.random_order_fields();
        let msg = PipelineOrder {
            order_id,
            t_gen: clock::now(),
            side: if is_buy { Side::Buy } else { Side::Sell },
            price,
            quantity: qty,
            symbol: tick.symbol,
        };
        order_id += 1;

        let _ = tsbuffer::record(EventType::QueuePush, msg.order_id);
        // Back-pressure policy: spin until space
        let mut pending = msg;
        loop {
            match queue.try_push(pending) {
                Ok(()) => break,
                Err(returned) => {
                    pending = returned;
                    std::hint::spin_loop();
                }
            }
        }
        sent += 1;

        if let Some(csv) = csv.as_deref_mut() {
            csv.log_row(msg.t_gen, msg.order_id, 0, msg.side.as_str(), msg.price, msg.quantity, msg.symbol)
                .context("writing result row")?;
        }

        timeline.progress(clock::now(), ticks, sent);
    }

    // Shutdown: stop producing, let the consumer drain, then reduce
    producing.store(false, Ordering::Release);
    let (engine, queue_delay, process_time, total_latency, overloads, accepted) =
        consumer.join().expect("matcher thread panicked");

    let engine_stats = engine.stats();
    Ok(RunReport {
        mode: config.mode.clone(),
        duration_ms: timeline.elapsed_ms(),
        ticks_generated: ticks,
        orders_sent: sent,
        orders_accepted: accepted,
        orders_rejected: engine_stats.orders_rejected,
        trades_matched: engine_stats.orders_matched,
        latency: total_latency,
        strategy_time: None,
        transit_time: Some(queue_delay),
        process_time: Some(process_time),
        queue_overloads: overloads,
        dropped_events: 0,
        warmup_excluded: config.warmup_sec > 0,
        final_depth: depth_render(&engine, &generator, config.book_depth_levels),
    })
}

// ============================================================
// MODE: strategy
// ============================================================

fn run_strategy(
    config: &BenchConfig,
    mut engine: MatchingEngine,
    mut generator: TickGenerator,
    mut strategy: Box<dyn Strategy>,
    mut csv: Option<&mut CsvLogger>,
) -> Result<RunReport> {
    if let Some(&core) = config.affinity.first() {
        affinity::pin_to_core(core);
    }

    let mut timeline = Timeline::new(config);
    generator.start(timeline.start, config.duration_sec as i64 * 1_000_000_000);

    let mut latency = LatencyStats::with_capacity(1 << 17);
    let mut ticks = 0u64;
    let mut orders = 0u64;
    let mut accepted = 0u64;

    strategy.on_init();

    loop {
        let now = clock::now();
        if timeline.expired(now) {
            break;
        }
        if timeline.warmup_boundary(now) {
            latency.clear();
            engine.reset_stats();
            ticks = 0;
            orders = 0;
            accepted = 0;
            info!("warmup complete, measurement started");
        }

        let tick = generator.next_tick();
        ticks += 1;
        let _ = tsbuffer::record(EventType::TickGenerated, tick.sequence);

        if !generator.should_trade() {
            continue;
        }

        let tick_start = clock::now();
        let _ = tsbuffer::record(EventType::StrategyStart, tick.sequence);

        let mut emitted = 0u64;
        let mut emitted_accepted = 0u64;
        strategy.on_tick(&tick, &mut |order| {
            emitted += 1;
            let id = engine.submit_order(
                order.symbol,
                order.side,
                order.order_type,
                order.price,
                order.quantity,
                order.client_order_id,
            );
            if id != INVALID_ORDER_ID {
                emitted_accepted += 1;
            }
        });

        let _ = tsbuffer::record(EventType::StrategyEnd, tick.sequence);
        let tick_latency = Clock::global().elapsed_ns(tick_start);

        orders += emitted;
        accepted += emitted_accepted;
        latency.record(tick_latency);

        if let Some(csv) = csv.as_deref_mut() {
            csv.log_row(
                tick_start,
                tick.sequence,
                tick_latency,
                "TICK",
                tick.last_price,
                tick.last_size,
                tick.symbol,
            )
            .context("writing result row")?;
        }

        timeline.progress(clock::now(), ticks, orders);
    }

    strategy.on_shutdown();
    if let Some(breakdown) = strategy.timing_report() {
        info!("\n{}", breakdown);
    }

    let engine_stats = engine.stats();
    Ok(RunReport {
        mode: config.mode.clone(),
        duration_ms: timeline.elapsed_ms(),
        ticks_generated: ticks,
        orders_sent: orders,
        orders_accepted: accepted,
        orders_rejected: engine_stats.orders_rejected,
        trades_matched: engine_stats.orders_matched,
        latency,
        strategy_time: None,
        transit_time: None,
        process_time: None,
        queue_overloads: 0,
        dropped_events: 0,
        warmup_excluded: config.warmup_sec > 0,
        final_depth: depth_render(&engine, &generator, config.book_depth_levels),
    })
}

// ============================================================
// MODE: exchange
// ============================================================

fn run_exchange(
    config: &BenchConfig,
    engine: MatchingEngine,
    mut generator: TickGenerator,
    mut strategy: Box<dyn Strategy>,
    mut csv: Option<&mut CsvLogger>,
) -> Result<RunReport> {
    let mut timeline = Timeline::new(config);

    let exchange = ExchangeSim::start(
        engine,
        ExchangeOptions {
            pin_core: config.affinity.get(1).copied(),
            use_polling: config.use_polling,
            simulate_fills: config.simulate_fills,
            warmup_until: if config.warmup_sec > 0 {
                timeline.warmup_end
            } else {
                0
            },
            ack_callback: None,
        },
    );

    if let Some(&core) = config.affinity.first() {
        affinity::pin_to_core(core);
    }

    generator.start(timeline.start, config.duration_sec as i64 * 1_000_000_000);
    strategy.on_init();

    let mut ticks = 0u64;
    let mut sent = 0u64;
    let mut exchange_order_id = 1u64;

    loop {
        let now = clock::now();
        if timeline.expired(now) {
            break;
        }
        if timeline.warmup_boundary(now) {
            ticks = 0;
            sent = 0;
            info!("warmup complete, measurement started");
        }

        let tick = generator.next_tick();
        ticks += 1;
        let _ = tsbuffer::record(EventType::TickGenerated, tick.sequence);

        if !generator.should_trade() {
            continue;
        }

        let _ = tsbuffer::record(EventType::StrategyStart, tick.sequence);
        strategy.on_tick(&tick, &mut |order| {
            let ex_order = ExchangeOrder {
                order_id: exchange_order_id,
                tick_sequence: tick.sequence,
                t_gen: tick.t_gen,
                // Stamped at emission: the strategy has just finished
                // deriving this order
                t_strategy_done: clock::now(),
                symbol: order.symbol,
                side: order.side,
                order_type: order.order_type,
                price: order.price,
                quantity: order.quantity,
            };
            exchange_order_id += 1;

            let _ = tsbuffer::record(EventType::OrderSubmitted, ex_order.order_id);
            // Back-pressure policy: spin until space
            while !exchange.submit(ex_order) {
                std::hint::spin_loop();
            }
            sent += 1;
        });
        let _ = tsbuffer::record(EventType::StrategyEnd, tick.sequence);

        if let Some(csv) = csv.as_deref_mut() {
            csv.log_row(
                tick.t_gen,
                tick.sequence,
                0,
                "TICK",
                tick.last_price,
                tick.last_size,
                tick.symbol,
            )
            .context("writing result row")?;
        }

        timeline.progress(clock::now(), ticks, sent);
    }

    strategy.on_shutdown();

    // Shutdown ordering: generation has stopped, the strategy has emitted
    // everything; stop() drains the queue before the reducer runs.
    let (engine, stats) = exchange.stop();
    info!("\n{}", stats.report());

    let engine_stats = engine.stats();
    Ok(RunReport {
        mode: config.mode.clone(),
        duration_ms: timeline.elapsed_ms(),
        ticks_generated: ticks,
        orders_sent: sent,
        orders_accepted: stats.orders_accepted,
        orders_rejected: stats.orders_rejected,
        trades_matched: engine_stats.orders_matched,
        latency: stats.tick_to_order,
        strategy_time: Some(stats.strategy_time),
        transit_time: Some(stats.transit_time),
        process_time: None,
        queue_overloads: stats.queue_overloads,
        dropped_events: 0,
        warmup_excluded: config.warmup_sec > 0,
        final_depth: depth_render(&engine, &generator, config.book_depth_levels),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config(mode: &str) -> BenchConfig {
        let mut config = BenchConfig::default();
        config.mode = mode.to_string();
        config.duration_sec = 1;
        config.message_rate = 5_000;
        config
    }

    // run() resets the global timestamp registry, so runs are serialized
    // against each other and against the tsbuffer tests.
    fn run_serialized(config: &BenchConfig) -> Result<RunReport> {
        let _guard = tsbuffer::test_guard().lock().unwrap();
        run(config)
    }

    #[test]
    fn test_single_thread_smoke() {
        let report = run_serialized(&quick_config("single_thread")).unwrap();
        assert!(report.ticks_generated > 0);
        assert!(report.orders_sent > 0);
        assert_eq!(report.orders_sent, report.orders_accepted);
        assert!(report.latency.count() > 0);
        assert!(report.latency.median().unwrap() >= 0);
    }

    #[test]
    fn test_pipeline_smoke() {
        let report = run_serialized(&quick_config("pipeline")).unwrap();
        assert!(report.orders_sent > 0);
        assert_eq!(report.orders_sent, report.orders_accepted);
        assert!(report.latency.count() > 0);
        assert!(report.transit_time.is_some());
    }

    #[test]
    fn test_strategy_mode_smoke() {
        let mut config = quick_config("strategy");
        config.strategy = "momentum".to_string();
        let report = run_serialized(&config).unwrap();
        assert!(report.ticks_generated > 0);
        assert!(report.latency.count() > 0);
    }

    #[test]
    fn test_exchange_mode_smoke() {
        let report = run_serialized(&quick_config("exchange")).unwrap();
        assert!(report.ticks_generated > 0);
        assert!(report.orders_sent > 0);
        assert_eq!(report.orders_sent, report.orders_accepted);
        // Tick-to-trade must be positive and finite
        assert!(report.latency.median().unwrap() > 0);
        assert!(report.strategy_time.is_some());
        assert!(report.transit_time.is_some());
    }

    #[test]
    fn test_user_strategy_required() {
        let mut config = quick_config("single_thread");
        config.strategy = "user".to_string();
        assert!(run_serialized(&config).is_err());
    }

    #[test]
    fn test_report_renders() {
        let report = run_serialized(&quick_config("single_thread")).unwrap();
        let rendered = report.render();
        assert!(rendered.contains("Throughput"));
        assert!(rendered.contains("End-to-end latency"));
        let line = report.summary_line();
        assert!(line.contains("Completed"));
    }
}
