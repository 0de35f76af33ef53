//! Thread-local timestamp buffers for contention-free event capture
//!
//! Each thread records latency-attribution events into its own
//! heap-allocated ring. Recording never allocates, locks, or enters the
//! kernel; ordering across threads is defined only by a process-wide
//! sequence counter incremented with relaxed atomics. Aggregation runs
//! off the hot path after the measured interval ends and merges every
//! thread's buffer into one sequence sorted by `sequence`.
//!
//! A full buffer drops the event, returns `false`, and bumps the owning
//! thread's drop counter; statistics over the recorded prefix stay valid.

use std::cell::UnsafeCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::clock;

/// Default per-thread event capacity (32 bytes/event → 3.2 MB/thread)
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Process-wide event sequence. Lives for the whole program; relaxed
/// arithmetic only - it orders events, it does not synchronize them.
static GLOBAL_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Event kinds recorded by the pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventType {
    TickGenerated = 0,
    TickReceived = 1,
    StrategyStart = 2,
    StrategyEnd = 3,
    OrderSubmitted = 4,
    OrderReceived = 5,
    OrderMatched = 6,
    QueuePush = 7,
    QueuePop = 8,
    UserDefined = 255,
}

/// One recorded event. Exactly 32 bytes.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TimestampEvent {
    /// Raw counter ticks at the moment of the call
    pub ticks: i64,
    /// Draw from the process-wide sequence counter
    pub sequence: u64,
    /// Caller payload (e.g. an order id or tick sequence)
    pub payload: u64,
    pub event_type: EventType,
    pub thread_id: u8,
    _reserved: [u8; 6],
}

const _: () = assert!(std::mem::size_of::<TimestampEvent>() == 32);

// ============================================================
// PER-THREAD BUFFER
// ============================================================

/// Fixed-capacity event ring owned by one thread
pub struct EventBuffer {
    // Heap-allocated so large capacities do not hit TLS size limits
    events: Box<[TimestampEvent]>,
    count: usize,
    dropped: u64,
    thread_id: u8,
}

impl EventBuffer {
    pub fn with_capacity(capacity: usize, thread_id: u8) -> Self {
        let blank = TimestampEvent {
            ticks: 0,
            sequence: 0,
            payload: 0,
            event_type: EventType::UserDefined,
            thread_id,
            _reserved: [0; 6],
        };
        Self {
            events: vec![blank; capacity].into_boxed_slice(),
            count: 0,
            dropped: 0,
            thread_id,
        }
    }

    /// Record an event stamped with the current counter reading.
    ///
    /// Returns `false` (and counts a drop) when the buffer is full.
    #[inline]
    pub fn record(&mut self, event_type: EventType, payload: u64) -> bool {
        self.record_at(event_type, clock::raw_ticks() as i64, payload)
    }

    /// Record with an externally captured timestamp
    #[inline]
    pub fn record_at(&mut self, event_type: EventType, ticks: i64, payload: u64) -> bool {
        if self.count >= self.events.len() {
            self.dropped += 1;
            return false;
        }

        self.events[self.count] = TimestampEvent {
            ticks,
            sequence: GLOBAL_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            payload,
            event_type,
            thread_id: self.thread_id,
            _reserved: [0; 6],
        };
        self.count += 1;
        true
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count >= self.events.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.events.len() - self.count
    }

    pub fn events(&self) -> &[TimestampEvent] {
        &self.events[..self.count]
    }

    pub fn clear(&mut self) {
        self.count = 0;
        self.dropped = 0;
    }

    #[inline]
    pub fn thread_id(&self) -> u8 {
        self.thread_id
    }
}

// ============================================================
// REGISTRY
// ============================================================

/// Shared shell around a buffer. Only the owning thread writes; readers
/// (aggregation) run after the measured interval, per the module contract.
struct BufferShell {
    inner: UnsafeCell<EventBuffer>,
}

// SAFETY: the owning thread is the only mutator; aggregate()/clear_all()
// are documented to run only after recording threads have quiesced.
unsafe impl Sync for BufferShell {}
unsafe impl Send for BufferShell {}

fn registry() -> &'static Mutex<Vec<Arc<BufferShell>>> {
    static REGISTRY: OnceLock<Mutex<Vec<Arc<BufferShell>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

thread_local! {
    static THREAD_BUFFER: OnceLock<Arc<BufferShell>> = const { OnceLock::new() };
}

fn thread_buffer() -> Arc<BufferShell> {
    THREAD_BUFFER.with(|cell| {
        cell.get_or_init(|| {
            let mut reg = registry().lock().expect("timestamp registry poisoned");
            let thread_id = reg.len().min(u8::MAX as usize) as u8;
            let shell = Arc::new(BufferShell {
                inner: UnsafeCell::new(EventBuffer::with_capacity(DEFAULT_CAPACITY, thread_id)),
            });
            reg.push(shell.clone());
            shell
        })
        .clone()
    })
}

/// Record an event in the calling thread's buffer
#[inline]
pub fn record(event_type: EventType, payload: u64) -> bool {
    let shell = thread_buffer();
    // SAFETY: only this thread holds a mutable path to its own buffer.
    unsafe { (*shell.inner.get()).record(event_type, payload) }
}

/// Record an event with an explicit timestamp
#[inline]
pub fn record_at(event_type: EventType, ticks: i64, payload: u64) -> bool {
    let shell = thread_buffer();
    // SAFETY: only this thread holds a mutable path to its own buffer.
    unsafe { (*shell.inner.get()).record_at(event_type, ticks, payload) }
}

/// Merge every thread's events into one sequence sorted by `sequence`.
///
/// Call only after the measured interval ends; recording threads must have
/// quiesced.
pub fn aggregate() -> Vec<TimestampEvent> {
    let reg = registry().lock().expect("timestamp registry poisoned");

    let mut all = Vec::new();
    for shell in reg.iter() {
        // SAFETY: producers have quiesced per the aggregate() contract.
        let buffer = unsafe { &*shell.inner.get() };
        all.extend_from_slice(buffer.events());
    }
    all.sort_unstable_by_key(|e| e.sequence);
    all
}

/// Total events dropped across all thread buffers
pub fn total_dropped() -> u64 {
    let reg = registry().lock().expect("timestamp registry poisoned");
    reg.iter()
        .map(|shell| {
            // SAFETY: read-only count; producers quiesced or the value is advisory.
            unsafe { (*shell.inner.get()).dropped() }
        })
        .sum()
}

/// Number of threads that have registered a buffer
pub fn thread_count() -> usize {
    registry().lock().expect("timestamp registry poisoned").len()
}

/// Reset every registered buffer (between runs)
pub fn clear_all() {
    let reg = registry().lock().expect("timestamp registry poisoned");
    for shell in reg.iter() {
        // SAFETY: callers reset between runs, with no concurrent producers.
        unsafe { (*shell.inner.get()).clear() };
    }
}

// ============================================================
// CSV EXPORT
// ============================================================

/// Write a merged event log as CSV for offline analysis
pub fn export_csv(
    events: &[TimestampEvent],
    path: &Path,
    ns_per_tick: f64,
) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "sequence,timestamp_ns,type,thread_id,payload")?;
    for event in events {
        writeln!(
            out,
            "{},{},{},{},{}",
            event.sequence,
            (event.ticks as f64 * ns_per_tick) as i64,
            event.event_type as u8,
            event.thread_id,
            event.payload
        )?;
    }
    out.flush()
}

/// Serializes tests that reset or aggregate the global registry; without
/// it, parallel tests that call `clear_all` would erase each other's
/// events mid-assertion.
#[cfg(test)]
pub(crate) fn test_guard() -> &'static Mutex<()> {
    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD.get_or_init(|| Mutex::new(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_size() {
        assert_eq!(std::mem::size_of::<TimestampEvent>(), 32);
    }

    #[test]
    fn test_buffer_records_until_full() {
        let mut buf = EventBuffer::with_capacity(4, 0);
        for i in 0..4 {
            assert!(buf.record(EventType::TickGenerated, i));
        }
        assert!(buf.is_full());
        assert!(!buf.record(EventType::TickGenerated, 99));
        assert_eq!(buf.count(), 4);
        assert_eq!(buf.dropped(), 1);

        // Prefix stays intact after the drop
        assert_eq!(buf.events()[3].payload, 3);
    }

    #[test]
    fn test_sequences_monotonic_within_thread() {
        let mut buf = EventBuffer::with_capacity(16, 0);
        for i in 0..10 {
            assert!(buf.record(EventType::QueuePush, i));
        }
        let events = buf.events();
        for pair in events.windows(2) {
            assert!(pair[0].sequence < pair[1].sequence);
        }
    }

    #[test]
    fn test_record_at_uses_given_timestamp() {
        let mut buf = EventBuffer::with_capacity(4, 7);
        assert!(buf.record_at(EventType::OrderReceived, 12345, 42));
        let event = buf.events()[0];
        assert_eq!(event.ticks, 12345);
        assert_eq!(event.payload, 42);
        assert_eq!(event.thread_id, 7);
    }

    #[test]
    fn test_clear_resets() {
        let mut buf = EventBuffer::with_capacity(2, 0);
        buf.record(EventType::TickGenerated, 0);
        buf.record(EventType::TickGenerated, 1);
        buf.record(EventType::TickGenerated, 2); // dropped
        buf.clear();
        assert_eq!(buf.count(), 0);
        assert_eq!(buf.dropped(), 0);
        assert!(buf.record(EventType::TickGenerated, 3));
    }

    #[test]
    fn test_export_csv_roundtrip() {
        let mut buf = EventBuffer::with_capacity(4, 3);
        buf.record_at(EventType::TickGenerated, 1_000, 7);
        buf.record_at(EventType::OrderReceived, 3_000, 8);

        let path = std::env::temp_dir().join("hftperf_events_test.csv");
        export_csv(buf.events(), &path, 1.0).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "sequence,timestamp_ns,type,thread_id,payload");
        assert!(lines[1].ends_with(",1000,0,3,7"));
        assert!(lines[2].ends_with(",3000,5,3,8"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_aggregate_sorted_across_threads() {
        let _guard = test_guard().lock().unwrap();
        clear_all();

        // Distinctive payload base so events from other tests in the same
        // process cannot collide with this test's filter.
        const BASE: u64 = 9_000_000;

        let handles: Vec<_> = (0..4)
            .map(|t: u64| {
                std::thread::spawn(move || {
                    for i in 0..100u64 {
                        assert!(record(EventType::TickReceived, BASE + t * 1000 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let merged = aggregate();
        assert!(merged.len() >= 400);
        for pair in merged.windows(2) {
            assert!(pair[0].sequence <= pair[1].sequence);
        }

        // Per-thread order is preserved in the merged log
        for t in 0..4u64 {
            let payloads: Vec<u64> = merged
                .iter()
                .filter(|e| e.payload >= BASE && (e.payload - BASE) / 1000 == t)
                .map(|e| (e.payload - BASE) % 1000)
                .collect();
            assert_eq!(payloads.len(), 100);
            let mut sorted = payloads.clone();
            sorted.sort_unstable();
            assert_eq!(payloads, sorted);
        }
    }
}
