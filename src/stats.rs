//! Latency statistics
//!
//! `LatencyStats` collects raw nanosecond samples and reduces them to the
//! standard summary (min/mean/median/percentiles/stddev). Percentiles are
//! nearest-rank: for sorted samples of size n and percentile p, the element
//! at index floor(p/100 · (n−1)).
//!
//! `LatencyHistogram` is a fixed-bucket distribution used for the
//! tick-to-trade printout; it never allocates after construction.

use std::fmt::Write as _;

/// Collects latency samples and computes summary statistics
#[derive(Debug, Default, Clone)]
pub struct LatencyStats {
    samples: Vec<i64>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn record(&mut self, nanos: i64) {
        self.samples.push(nanos);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[i64] {
        &self.samples
    }

    pub fn min(&self) -> Option<i64> {
        self.samples.iter().copied().min()
    }

    pub fn max(&self) -> Option<i64> {
        self.samples.iter().copied().max()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: i64 = self.samples.iter().sum();
        Some(sum as f64 / self.samples.len() as f64)
    }

    /// Nearest-rank percentile; `p` in [0, 100]
    pub fn percentile(&self, p: f64) -> Option<i64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let idx = ((p / 100.0) * (sorted.len() - 1) as f64).floor() as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    pub fn median(&self) -> Option<i64> {
        self.percentile(50.0)
    }

    /// Sample standard deviation (n−1 denominator)
    pub fn stddev(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let mean = self.mean()?;
        let sum_sq: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let d = s as f64 - mean;
                d * d
            })
            .sum();
        Some((sum_sq / (self.samples.len() - 1) as f64).sqrt())
    }

    /// Multi-line summary block for end-of-run reports
    pub fn summary(&self, label: &str) -> String {
        if self.samples.is_empty() {
            return format!("{}: no samples\n", label);
        }

        let mut s = String::new();
        let _ = writeln!(s, "{} (n={}):", label, self.count());
        let _ = writeln!(s, "  Min:    {} ns", self.min().unwrap_or(0));
        let _ = writeln!(s, "  Max:    {} ns", self.max().unwrap_or(0));
        let _ = writeln!(s, "  Mean:   {:.0} ns", self.mean().unwrap_or(0.0));
        if let Some(sd) = self.stddev() {
            let _ = writeln!(s, "  StdDev: {:.0} ns", sd);
        }
        let _ = writeln!(s, "  P50:    {} ns", self.percentile(50.0).unwrap_or(0));
        let _ = writeln!(s, "  P90:    {} ns", self.percentile(90.0).unwrap_or(0));
        let _ = writeln!(s, "  P99:    {} ns", self.percentile(99.0).unwrap_or(0));
        let _ = writeln!(s, "  P99.9:  {} ns", self.percentile(99.9).unwrap_or(0));
        s
    }
}

// ============================================================
// HISTOGRAM
// ============================================================

/// Fixed-bucket latency histogram; the last bucket absorbs overflow
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    bucket_width_ns: i64,
    buckets: Vec<u64>,
    count: u64,
}

impl LatencyHistogram {
    pub fn new(bucket_width_ns: i64, bucket_count: usize) -> Self {
        assert!(bucket_width_ns > 0, "bucket width must be positive");
        assert!(bucket_count > 0, "need at least one bucket");
        Self {
            bucket_width_ns,
            buckets: vec![0; bucket_count],
            count: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, nanos: i64) {
        let idx = (nanos.max(0) / self.bucket_width_ns) as usize;
        let idx = idx.min(self.buckets.len() - 1);
        self.buckets[idx] += 1;
        self.count += 1;
    }

    pub fn reset(&mut self) {
        self.buckets.iter_mut().for_each(|b| *b = 0);
        self.count = 0;
    }

    #[inline]
    pub fn total_count(&self) -> u64 {
        self.count
    }

    #[inline]
    pub fn bucket_width_ns(&self) -> i64 {
        self.bucket_width_ns
    }

    pub fn bucket_count(&self, bucket: usize) -> u64 {
        self.buckets.get(bucket).copied().unwrap_or(0)
    }

    /// Text rendering with proportional bars; empty buckets are skipped
    pub fn render(&self) -> String {
        const BAR_WIDTH: u64 = 50;

        let mut s = format!(
            "Latency histogram (bucket={}ns, total={}):\n",
            self.bucket_width_ns, self.count
        );
        let max_count = self.buckets.iter().copied().max().unwrap_or(0);
        if max_count == 0 {
            return s;
        }

        for (i, &n) in self.buckets.iter().enumerate() {
            if n == 0 {
                continue;
            }
            let bar_len = (n * BAR_WIDTH / max_count) as usize;
            let _ = writeln!(
                s,
                "{:>8}ns: {} {}",
                i as i64 * self.bucket_width_ns,
                "#".repeat(bar_len.max(1)),
                n
            );
        }
        s
    }
}
