//! hftperf - low-latency trading-infrastructure toolkit
//!
//! A price-time priority matching engine, the lock-free SPSC/MPSC
//! transport that feeds it, a calibrated timing core, and the pipeline
//! harness that drives end-to-end tick-to-trade experiments.
//!
//! # Modules
//!
//! - [`core_types`] - fixed-point prices, symbols, order enums
//! - [`clock`] - calibrated monotonic clock (counter → ns, read overhead)
//! - [`stats`] - latency reducer and histogram
//! - [`tsbuffer`] - thread-local timestamp event buffers
//! - [`queue`] - SPSC ring and MPSC chain
//! - [`arena`] / [`price_level`] / [`orderbook`] - the matching core
//! - [`engine`] - symbol routing, callbacks, async wrapper
//! - [`strategy`] / [`generator`] / [`exchange`] / [`pipeline`] - harness
//! - [`config`] / [`csvlog`] / [`logging`] / [`affinity`] - supporting cast

// Core types - must be first!
pub mod core_types;

// Timing core
pub mod clock;
pub mod stats;
pub mod tsbuffer;

// Transport core
pub mod queue;

// Matching core
pub mod arena;
pub mod engine;
pub mod order;
pub mod orderbook;
pub mod price_level;

// Pipeline harness
pub mod exchange;
pub mod generator;
pub mod pipeline;
pub mod strategy;

// Supporting cast
pub mod affinity;
pub mod config;
pub mod csvlog;
pub mod logging;
pub mod selftest;

// Convenient re-exports at crate root
pub use core_types::{
    OrderId, OrderStatus, OrderType, Price, Quantity, Quote, Side, Symbol, Timestamp,
    INVALID_ORDER_ID, INVALID_PRICE, PRICE_MULTIPLIER,
};
pub use engine::{AsyncMatchingEngine, EngineStats, MatchingEngine, OrderRequest};
pub use order::{ExecutionReport, Order};
pub use orderbook::{BookStats, Depth, DepthLevel, OrderBook};
pub use queue::{MpscQueue, SpscQueue};
pub use stats::{LatencyHistogram, LatencyStats};
pub use strategy::{Strategy, StrategyOrder, Tick};
