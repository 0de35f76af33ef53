//! Tick generator - drives the pipeline at a configured rate
//!
//! Emission is deadline-paced: tick k is released at
//! `start + k · (1e9 / rate)` nanoseconds, busy-waiting with the CPU pause
//! hint until the deadline. Poisson mode draws each gap from an exponential
//! distribution with the same mean inter-arrival.
//!
//! Optional behaviors (all off by default):
//! - gap recovery: pause `gap_pause_ms`, then emit `gap_burst_count` ticks
//!   back-to-back, repeating every `gap_interval_sec` (0 = once at the run
//!   midpoint);
//! - Bernoulli thinning via `trade_signal_ratio`;
//! - round-robin over `num_symbols` symbols named `{symbol_prefix}-{i}`;
//! - uniform jitter in `[jitter_min_ns, jitter_max_ns]` before each emission.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::clock;
use crate::core_types::{Price, Quantity, Symbol, Timestamp};
use crate::strategy::Tick;

/// Tick spread in fixed-point (0.01 at 8 decimals × 100 price ticks)
const SPREAD: Price = 1_000_000;

/// Generator knobs (a subset of the benchmark config)
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub message_rate: u64,
    pub poisson: bool,
    pub gap_pause_ms: u64,
    pub gap_burst_count: u32,
    pub gap_interval_sec: u64,
    pub trade_signal_ratio: f64,
    pub num_symbols: usize,
    pub symbol_prefix: String,
    pub jitter_min_ns: u64,
    pub jitter_max_ns: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            message_rate: 100_000,
            poisson: false,
            gap_pause_ms: 0,
            gap_burst_count: 0,
            gap_interval_sec: 0,
            trade_signal_ratio: 1.0,
            num_symbols: 1,
            symbol_prefix: "SYM".to_string(),
            jitter_min_ns: 0,
            jitter_max_ns: 0,
        }
    }
}

/// Busy-wait until the monotonic clock passes `deadline_ns`
#[inline]
pub fn spin_until(deadline_ns: Timestamp) {
    while clock::now() < deadline_ns {
        std::hint::spin_loop();
    }
}

pub struct TickGenerator {
    config: GeneratorConfig,
    rng: SmallRng,
    symbols: Vec<Symbol>,
    sequence: u64,
    symbol_cursor: usize,
    /// Deadline of the next emission in uniform mode: start + k · interval
    next_deadline: Timestamp,
    interval_ns: i64,
    /// Gap state: next trigger time and remaining burst quota
    next_gap_at: Option<Timestamp>,
    burst_remaining: u32,
}

impl TickGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        assert!(config.message_rate > 0, "message rate must be positive");
        assert!(config.num_symbols > 0, "need at least one symbol");

        let symbols = (0..config.num_symbols)
            .map(|i| Symbol::new(&format!("{}-{}", config.symbol_prefix, i)))
            .collect();
        let interval_ns = (1_000_000_000 / config.message_rate) as i64;

        Self {
            symbols,
            rng: SmallRng::from_entropy(),
            sequence: 0,
            symbol_cursor: 0,
            next_deadline: 0,
            interval_ns,
            next_gap_at: None,
            burst_remaining: 0,
            config,
        }
    }

    /// Symbols this generator round-robins over (register these with the
    /// engine before starting a run)
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Arm the pacing clock; `run_duration_ns` places the midpoint gap
    pub fn start(&mut self, now: Timestamp, run_duration_ns: i64) {
        self.next_deadline = now;
        if self.config.gap_pause_ms > 0 {
            let first = if self.config.gap_interval_sec > 0 {
                now + self.config.gap_interval_sec as i64 * 1_000_000_000
            } else {
                now + run_duration_ns / 2
            };
            self.next_gap_at = Some(first);
        }
    }

    /// Block (busy-wait or sleep) until the next tick is due, then emit it.
    ///
    /// Burst ticks after a gap skip pacing entirely, simulating a feed
    /// replaying its backlog.
    pub fn next_tick(&mut self) -> Tick {
        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
        } else {
            self.maybe_gap();
            self.pace();
        }
        self.inject_jitter();
        self.emit()
    }

    /// Bernoulli thinning: does this tick produce an order signal?
    #[inline]
    pub fn should_trade(&mut self) -> bool {
        if self.config.trade_signal_ratio >= 1.0 {
            return true;
        }
        self.rng.gen_bool(self.config.trade_signal_ratio.max(0.0))
    }

    /// Random book-shaped values for pipeline mode (no strategy in the loop)
    pub fn random_order_fields(&mut self) -> (bool, Price, Quantity) {
        let is_buy = self.rng.gen_bool(0.5);
        let price = self.random_price();
        let qty = self.rng.gen_range(1..=100);
        (is_buy, price, qty)
    }

    fn maybe_gap(&mut self) {
        let Some(gap_at) = self.next_gap_at else {
            return;
        };
        let now = clock::now();
        if now < gap_at {
            return;
        }

        tracing::info!(
            pause_ms = self.config.gap_pause_ms,
            burst = self.config.gap_burst_count,
            "simulating market data gap"
        );
        std::thread::sleep(std::time::Duration::from_millis(self.config.gap_pause_ms));
        self.burst_remaining = self.config.gap_burst_count;

        self.next_gap_at = if self.config.gap_interval_sec > 0 {
            Some(clock::now() + self.config.gap_interval_sec as i64 * 1_000_000_000)
        } else {
            None
        };
        // Re-anchor pacing after the pause so the generator does not burst
        // to catch up beyond the configured recovery burst.
        self.next_deadline = clock::now();
    }

    fn pace(&mut self) {
        spin_until(self.next_deadline);
        let gap = if self.config.poisson {
            self.exponential_interval_ns()
        } else {
            self.interval_ns
        };
        self.next_deadline += gap;
    }

    /// Inverse-transform sample of an exponential with mean `interval_ns`
    fn exponential_interval_ns(&mut self) -> i64 {
        let u: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        (-(u.ln()) * self.interval_ns as f64) as i64
    }

    fn inject_jitter(&mut self) {
        if self.config.jitter_max_ns == 0 {
            return;
        }
        let lo = self.config.jitter_min_ns.min(self.config.jitter_max_ns);
        let jitter = self.rng.gen_range(lo..=self.config.jitter_max_ns) as i64;
        spin_until(clock::now() + jitter);
    }

    fn random_price(&mut self) -> Price {
        // Around $100.00: 9900..10100 price ticks of 0.01
        self.rng.gen_range(9_900..10_100) * SPREAD
    }

    fn emit(&mut self) -> Tick {
        let t_gen = clock::now();
        let bid = self.random_price();
        let bid_size = self.rng.gen_range(1..=100);
        let ask_size = self.rng.gen_range(1..=100);
        let last_size = self.rng.gen_range(1..=100);

        let symbol = self.symbols[self.symbol_cursor];
        self.symbol_cursor = (self.symbol_cursor + 1) % self.symbols.len();

        let tick = Tick {
            symbol,
            bid_price: bid,
            ask_price: bid + SPREAD,
            bid_size,
            ask_size,
            last_price: bid + SPREAD / 2,
            last_size,
            sequence: self.sequence,
            t_gen,
        };
        self.sequence += 1;
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_generator(config: GeneratorConfig) -> TickGenerator {
        let mut generator = TickGenerator::new(config);
        generator.start(clock::now(), 1_000_000_000);
        generator
    }

    #[test]
    fn test_sequence_monotonic() {
        let mut generator = make_generator(GeneratorConfig {
            message_rate: 1_000_000,
            ..Default::default()
        });
        let a = generator.next_tick();
        let b = generator.next_tick();
        let c = generator.next_tick();
        assert_eq!(a.sequence, 0);
        assert_eq!(b.sequence, 1);
        assert_eq!(c.sequence, 2);
        assert!(b.t_gen >= a.t_gen);
        assert!(c.t_gen >= b.t_gen);
    }

    #[test]
    fn test_tick_shape() {
        let mut generator = make_generator(GeneratorConfig {
            message_rate: 1_000_000,
            ..Default::default()
        });
        let tick = generator.next_tick();
        assert_eq!(tick.ask_price - tick.bid_price, SPREAD);
        assert_eq!(tick.last_price, tick.mid_price());
        assert!(tick.bid_size >= 1 && tick.bid_size <= 100);
    }

    #[test]
    fn test_symbol_round_robin() {
        let mut generator = make_generator(GeneratorConfig {
            message_rate: 1_000_000,
            num_symbols: 3,
            symbol_prefix: "RR".to_string(),
            ..Default::default()
        });
        assert_eq!(generator.symbols().len(), 3);

        let names: Vec<String> = (0..6)
            .map(|_| generator.next_tick().symbol.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["RR-0", "RR-1", "RR-2", "RR-0", "RR-1", "RR-2"]);
    }

    #[test]
    fn test_rate_pacing_roughly_holds() {
        // 100k ticks/sec → 200 ticks should need ≥ ~1.9ms
        let mut generator = make_generator(GeneratorConfig {
            message_rate: 100_000,
            ..Default::default()
        });
        let start = clock::now();
        for _ in 0..200 {
            generator.next_tick();
        }
        let elapsed = clock::now() - start;
        assert!(elapsed >= 1_900_000, "200 ticks at 100k/s took {}ns", elapsed);
    }

    #[test]
    fn test_poisson_pacing_advances() {
        let mut generator = make_generator(GeneratorConfig {
            message_rate: 1_000_000,
            poisson: true,
            ..Default::default()
        });
        let mut last = 0;
        for _ in 0..50 {
            let tick = generator.next_tick();
            assert!(tick.t_gen >= last);
            last = tick.t_gen;
        }
    }

    #[test]
    fn test_trade_signal_thinning() {
        let mut generator = make_generator(GeneratorConfig {
            message_rate: 1_000_000,
            trade_signal_ratio: 0.5,
            ..Default::default()
        });
        let fired = (0..10_000).filter(|_| generator.should_trade()).count();
        // Bernoulli(0.5): well within 6 sigma of 5000
        assert!(fired > 4_000 && fired < 6_000, "fired {}", fired);
    }

    #[test]
    fn test_trade_signal_ratio_one_always_fires() {
        let mut generator = make_generator(GeneratorConfig::default());
        assert!((0..100).all(|_| generator.should_trade()));
    }

    #[test]
    fn test_exponential_interval_positive_and_mean_like() {
        let mut generator = make_generator(GeneratorConfig {
            message_rate: 100_000, // mean 10_000ns
            poisson: true,
            ..Default::default()
        });
        let n = 20_000;
        let mut sum = 0i64;
        for _ in 0..n {
            let v = generator.exponential_interval_ns();
            assert!(v >= 0);
            sum += v;
        }
        let mean = sum / n;
        assert!(mean > 8_000 && mean < 12_000, "mean {}", mean);
    }

    #[test]
    fn test_random_order_fields_in_range() {
        let mut generator = make_generator(GeneratorConfig::default());
        for _ in 0..100 {
            let (_, price, qty) = generator.random_order_fields();
            assert!(price >= 9_900 * SPREAD && price < 10_100 * SPREAD);
            assert!((1..=100).contains(&qty));
        }
    }
}
