//! Built-in self-test suite (`--selftest`)
//!
//! A deployment check that runs without a Rust toolchain: exercises the
//! types, clock calibration, queues, book, engine, and timestamp buffers,
//! printing PASS/FAIL per check. Returns true when everything passed.

use crate::clock::Clock;
use crate::core_types::{OrderType, Side, Symbol, INVALID_ORDER_ID, PRICE_MULTIPLIER};
use crate::engine::MatchingEngine;
use crate::queue::SpscQueue;
use crate::tsbuffer::{self, EventType};

struct Suite {
    passed: u32,
    failed: u32,
}

impl Suite {
    fn check(&mut self, name: &str, condition: bool) {
        if condition {
            println!("  [PASS] {}", name);
            self.passed += 1;
        } else {
            println!("  [FAIL] {}", name);
            self.failed += 1;
        }
    }
}

pub fn run_selftest() -> bool {
    println!("Running self-test suite...\n");
    let mut suite = Suite {
        passed: 0,
        failed: 0,
    };

    println!("--- Basic types ---");
    {
        let sym = Symbol::new("TEST-USD");
        suite.check("symbol round-trip", sym.as_str() == "TEST-USD");
        suite.check("symbol equality", sym == Symbol::new("TEST-USD"));
        suite.check(
            "fixed-point price scale",
            crate::core_types::to_fixed_price(1.0) == PRICE_MULTIPLIER,
        );
    }

    println!("\n--- Clock calibration ---");
    {
        let clock = Clock::global();
        println!("  {}", clock.describe());

        let t1 = clock.now_ns();
        let mut x = 0u64;
        for i in 0..1000 {
            x = x.wrapping_add(i);
        }
        std::hint::black_box(x);
        let t2 = clock.now_ns();

        suite.check("clock advances", t2 > t1);
        suite.check("1000 iterations under 1ms", (t2 - t1) < 1_000_000);
        suite.check("read overhead under 1µs", clock.overhead_ns() < 1_000);
        suite.check("elapsed never negative", clock.elapsed_ns(clock.now_ns()) >= 0);
    }

    println!("\n--- SPSC queue ---");
    {
        let queue: SpscQueue<u64> = SpscQueue::with_capacity(4);
        suite.check("effective capacity", queue.capacity() == 3);
        let mut ok = true;
        for v in [1u64, 2, 3] {
            ok &= queue.try_push(v).is_ok();
        }
        suite.check("fills to capacity", ok);
        suite.check("full push refused", queue.try_push(4).is_err());
        suite.check("pop returns first", queue.try_pop() == Some(1));
        suite.check("push after pop succeeds", queue.try_push(4).is_ok());
        suite.check(
            "drains in order",
            queue.try_pop() == Some(2) && queue.try_pop() == Some(3) && queue.try_pop() == Some(4),
        );
        suite.check("empty pop is none", queue.try_pop().is_none());
    }

    println!("\n--- Matching engine ---");
    {
        let sym = Symbol::new("SELFTEST");
        let mut engine = MatchingEngine::with_book_capacity(4096);
        suite.check("add instrument", engine.add_instrument(sym));
        suite.check("duplicate instrument refused", !engine.add_instrument(sym));

        let id1 = engine.submit_order(sym, Side::Buy, OrderType::Limit, 100 * PRICE_MULTIPLIER, 10, 1);
        suite.check("submit buy", id1 != INVALID_ORDER_ID);

        let id2 = engine.submit_order(sym, Side::Sell, OrderType::Limit, 100 * PRICE_MULTIPLIER, 5, 2);
        suite.check("submit crossing sell", id2 != INVALID_ORDER_ID);

        let book = engine.get_book(sym).expect("book exists");
        suite.check("cross produced a trade", book.trades_matched() == 1);
        suite.check("volume conserved", book.volume_matched() == 5);
        suite.check("remainder rests", book.best_bid() == Some(100 * PRICE_MULTIPLIER));

        let unknown = engine.submit_order(
            Symbol::new("UNKNOWN"),
            Side::Buy,
            OrderType::Limit,
            PRICE_MULTIPLIER,
            1,
            0,
        );
        suite.check("unknown symbol rejected", unknown == INVALID_ORDER_ID);
    }

    println!("\n--- Throughput sanity ---");
    {
        let sym = Symbol::new("PERF-TEST");
        let mut engine = MatchingEngine::with_book_capacity(1 << 16);
        engine.add_instrument(sym);

        const NUM_ORDERS: u64 = 10_000;
        let clock = Clock::global();
        let start = clock.now_ns();
        for i in 0..NUM_ORDERS {
            let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
            engine.submit_order(
                sym,
                side,
                OrderType::Limit,
                (10_000 + (i % 100) as i64) * 1_000_000,
                10,
                i,
            );
        }
        let elapsed_us = (clock.now_ns() - start) / 1_000;
        let rate = if elapsed_us > 0 {
            NUM_ORDERS * 1_000_000 / elapsed_us as u64
        } else {
            u64::MAX
        };
        println!("  {} orders in {} µs ({} orders/sec)", NUM_ORDERS, elapsed_us, rate);
        suite.check("throughput over 50k orders/sec", rate > 50_000);
    }

    println!("\n--- Timestamp buffers ---");
    {
        tsbuffer::clear_all();

        const EVENTS: u64 = 10_000;
        let mut recorded = true;
        for i in 0..EVENTS {
            recorded &= tsbuffer::record(EventType::TickGenerated, i);
        }
        suite.check("single-thread recording", recorded);

        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                std::thread::spawn(move || {
                    (0..1000u64).all(|i| tsbuffer::record(EventType::TickReceived, t * 10_000 + i))
                })
            })
            .collect();
        let all_ok = handles.into_iter().all(|h| h.join().unwrap_or(false));
        suite.check("multi-thread recording", all_ok);

        let merged = tsbuffer::aggregate();
        suite.check(
            "aggregation complete",
            merged.len() as u64 >= EVENTS + 4 * 1000,
        );
        suite.check(
            "events sorted by sequence",
            merged.windows(2).all(|w| w[0].sequence <= w[1].sequence),
        );
        suite.check("no drops", tsbuffer::total_dropped() == 0);
    }

    println!("\n================================================================");
    println!(
        "Self-test complete: {} passed, {} failed",
        suite.passed, suite.failed
    );
    println!("================================================================");

    suite.failed == 0
}
