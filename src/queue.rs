//! Lock-free inter-thread transport
//!
//! Two queues connect the pipeline stages:
//!
//! - [`SpscQueue`]: a bounded wait-free ring for exactly one producer and
//!   one consumer. Capacity is a power of two and one slot is kept empty,
//!   so the effective capacity is `capacity − 1`. The producer publishes
//!   with a release store of `tail`; the consumer releases slots with a
//!   release store of `head`; each side reads the opposite index with
//!   acquire only when its cached copy reports full/empty. Head, tail,
//!   and both cached counters live on separate cache lines.
//!
//! - [`MpscQueue`]: an unbounded linked chain. Producers atomically swap
//!   the tail with a freshly allocated node and then publish the `next`
//!   link from the old tail; the single consumer follows `next` links and
//!   observes empty at an unlinked tail.
//!
//! `try_push`/`try_pop` never block. The blocking variants spin with the
//! platform pause hint and yield to the scheduler after a bounded number
//! of spins.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

/// Spins before the blocking variants fall back to a scheduler yield
const SPIN_BUDGET: u32 = 1 << 14;

// ============================================================
// SPSC RING
// ============================================================

/// Bounded wait-free single-producer single-consumer queue
///
/// Exactly one thread may call the push side and exactly one thread the
/// pop side; the queue itself is shared by reference (typically `Arc`).
pub struct SpscQueue<T> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,

    /// Consumer index; written by the consumer (release), read by the producer (acquire)
    head: CachePadded<AtomicUsize>,
    /// Producer index; written by the producer (release), read by the consumer (acquire)
    tail: CachePadded<AtomicUsize>,

    /// Producer's private copy of `head`, refreshed only on apparent full
    cached_head: CachePadded<UnsafeCell<usize>>,
    /// Consumer's private copy of `tail`, refreshed only on apparent empty
    cached_tail: CachePadded<UnsafeCell<usize>>,
}

// SAFETY: the single-producer/single-consumer discipline partitions all
// UnsafeCell access; slot hand-off is ordered by the release/acquire
// index pair.
unsafe impl<T: Send> Send for SpscQueue<T> {}
unsafe impl<T: Send> Sync for SpscQueue<T> {}

impl<T> SpscQueue<T> {
    /// Create a queue with the given slot count (power of two, ≥ 2).
    /// Effective capacity is `capacity − 1`.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 2, "capacity must be at least 2");
        assert!(capacity.is_power_of_two(), "capacity must be a power of two");

        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            buffer,
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            cached_head: CachePadded::new(UnsafeCell::new(0)),
            cached_tail: CachePadded::new(UnsafeCell::new(0)),
        }
    }

    /// Effective capacity (one slot stays empty to disambiguate full/empty)
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask
    }

    /// Non-blocking push. Returns the value back when the queue is full.
    ///
    /// Producer thread only.
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let next = (tail + 1) & self.mask;

        // SAFETY: cached_head is touched by the producer thread only.
        let cached = unsafe { &mut *self.cached_head.get() };
        if next == *cached {
            *cached = self.head.load(Ordering::Acquire);
            if next == *cached {
                return Err(value);
            }
        }

        // SAFETY: the slot at `tail` is outside the consumer's visible
        // range until the release store below.
        unsafe { (*self.buffer[tail].get()).write(value) };

        self.tail.store(next, Ordering::Release);
        Ok(())
    }

    /// Non-blocking pop. Returns `None` when the queue is empty.
    ///
    /// Consumer thread only.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);

        // SAFETY: cached_tail is touched by the consumer thread only.
        let cached = unsafe { &mut *self.cached_tail.get() };
        if head == *cached {
            *cached = self.tail.load(Ordering::Acquire);
            if head == *cached {
                return None;
            }
        }

        // SAFETY: the acquire load of `tail` ordered the producer's write;
        // the slot is initialized and not yet released.
        let value = unsafe { (*self.buffer[head].get()).assume_init_read() };

        self.head.store((head + 1) & self.mask, Ordering::Release);
        Some(value)
    }

    /// Blocking push: spin with the CPU pause hint until space frees up
    pub fn push(&self, value: T) {
        let mut value = value;
        let mut spins = 0u32;
        loop {
            match self.try_push(value) {
                Ok(()) => return,
                Err(v) => {
                    value = v;
                    spins += 1;
                    if spins >= SPIN_BUDGET {
                        spins = 0;
                        std::thread::yield_now();
                    } else {
                        std::hint::spin_loop();
                    }
                }
            }
        }
    }

    /// Blocking pop: spin with the CPU pause hint until an element arrives
    pub fn pop(&self) -> T {
        let mut spins = 0u32;
        loop {
            if let Some(value) = self.try_pop() {
                return value;
            }
            spins += 1;
            if spins >= SPIN_BUDGET {
                spins = 0;
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
    }

    /// True when no element is visible to the consumer (approximate
    /// across threads)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Number of occupied slots (approximate across threads)
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head) & self.mask
    }
}

impl<T> Drop for SpscQueue<T> {
    fn drop(&mut self) {
        // Drain remaining elements so their destructors run
        while self.try_pop().is_some() {}
    }
}

// ============================================================
// MPSC CHAIN
// ============================================================

struct Node<T> {
    value: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn new(value: Option<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            value,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// Unbounded multi-producer single-consumer queue
///
/// Any thread may push; exactly one thread may pop.
pub struct MpscQueue<T> {
    /// Consumer position (stub node whose `next` is the first element)
    head: CachePadded<AtomicPtr<Node<T>>>,
    /// Last published node; producers swap this
    tail: CachePadded<AtomicPtr<Node<T>>>,
}

// SAFETY: producers only touch `tail` (atomic swap + release publish of
// `next`); the single consumer owns `head` and every node behind it.
unsafe impl<T: Send> Send for MpscQueue<T> {}
unsafe impl<T: Send> Sync for MpscQueue<T> {}

impl<T> MpscQueue<T> {
    pub fn new() -> Self {
        let stub = Node::new(None);
        Self {
            head: CachePadded::new(AtomicPtr::new(stub)),
            tail: CachePadded::new(AtomicPtr::new(stub)),
        }
    }

    /// Push from any thread
    pub fn push(&self, value: T) {
        let node = Node::new(Some(value));
        let prev = self.tail.swap(node, Ordering::AcqRel);
        // SAFETY: `prev` is a valid node; only this producer links it
        // forward, and the release store publishes the new node's value.
        unsafe { (*prev).next.store(node, Ordering::Release) };
    }

    /// Pop from the single consumer thread
    pub fn try_pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        // SAFETY: head is owned by the consumer and always valid.
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }

        // SAFETY: the acquire load above ordered the producer's write of
        // the node's value; `next` becomes the new stub.
        let value = unsafe { (*next).value.take() };
        self.head.store(next, Ordering::Relaxed);
        // SAFETY: no other thread can still reach the old head.
        drop(unsafe { Box::from_raw(head) });
        value
    }

    /// True when the consumer observes an unlinked tail
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        // SAFETY: head is always a valid node.
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }
}

impl<T> Default for MpscQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for MpscQueue<T> {
    fn drop(&mut self) {
        let mut node = self.head.load(Ordering::Relaxed);
        while !node.is_null() {
            // SAFETY: drop has exclusive access to the whole chain.
            let next = unsafe { (*node).next.load(Ordering::Relaxed) };
            drop(unsafe { Box::from_raw(node) });
            node = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_spsc_capacity_boundary() {
        // Capacity 4 → effective 3
        let q: SpscQueue<u64> = SpscQueue::with_capacity(4);
        assert_eq!(q.capacity(), 3);

        assert!(q.try_push(1).is_ok());
        assert!(q.try_push(2).is_ok());
        assert!(q.try_push(3).is_ok());
        assert_eq!(q.try_push(4), Err(4));

        assert_eq!(q.try_pop(), Some(1));
        assert!(q.try_push(4).is_ok());

        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), Some(4));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn test_spsc_fifo_with_wraparound() {
        let q: SpscQueue<u32> = SpscQueue::with_capacity(8);
        for round in 0..10u32 {
            for i in 0..5 {
                q.try_push(round * 10 + i).unwrap();
            }
            for i in 0..5 {
                assert_eq!(q.try_pop(), Some(round * 10 + i));
            }
        }
        assert!(q.is_empty());
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_spsc_rejects_non_power_of_two() {
        let _ = SpscQueue::<u8>::with_capacity(6);
    }

    #[test]
    fn test_spsc_drops_remaining_elements() {
        let value = Arc::new(());
        {
            let q: SpscQueue<Arc<()>> = SpscQueue::with_capacity(4);
            q.try_push(value.clone()).unwrap();
            q.try_push(value.clone()).unwrap();
        }
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn test_spsc_cross_thread_order() {
        const COUNT: u64 = 100_000;
        let q = Arc::new(SpscQueue::<u64>::with_capacity(1024));

        let producer = {
            let q = q.clone();
            std::thread::spawn(move || {
                for i in 0..COUNT {
                    q.push(i);
                }
            })
        };

        let mut expected = 0u64;
        while expected < COUNT {
            if let Some(v) = q.try_pop() {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
        assert!(q.is_empty());
    }

    #[test]
    fn test_spsc_len() {
        let q: SpscQueue<u8> = SpscQueue::with_capacity(8);
        assert_eq!(q.len(), 0);
        q.try_push(1).unwrap();
        q.try_push(2).unwrap();
        assert_eq!(q.len(), 2);
        q.try_pop();
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_mpsc_single_producer_fifo() {
        let q: MpscQueue<u32> = MpscQueue::new();
        assert!(q.is_empty());
        for i in 0..100 {
            q.push(i);
        }
        for i in 0..100 {
            assert_eq!(q.try_pop(), Some(i));
        }
        assert_eq!(q.try_pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_mpsc_multi_producer_delivers_everything() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 10_000;

        let q = Arc::new(MpscQueue::<u64>::new());
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = q.clone();
                std::thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        q.push(p * PER_PRODUCER + i);
                    }
                })
            })
            .collect();

        let mut seen = vec![false; (PRODUCERS * PER_PRODUCER) as usize];
        let mut count = 0u64;
        while count < PRODUCERS * PER_PRODUCER {
            if let Some(v) = q.try_pop() {
                assert!(!seen[v as usize], "duplicate element {}", v);
                seen[v as usize] = true;
                count += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_mpsc_preserves_per_producer_order() {
        let q = Arc::new(MpscQueue::<u64>::new());
        let producer = {
            let q = q.clone();
            std::thread::spawn(move || {
                for i in 0..50_000u64 {
                    q.push(i);
                }
            })
        };

        let mut last: Option<u64> = None;
        let mut count = 0;
        while count < 50_000 {
            if let Some(v) = q.try_pop() {
                if let Some(prev) = last {
                    assert!(v > prev);
                }
                last = Some(v);
                count += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
    }

    #[test]
    fn test_mpsc_drop_frees_chain() {
        let value = Arc::new(());
        {
            let q: MpscQueue<Arc<()>> = MpscQueue::new();
            for _ in 0..10 {
                q.push(value.clone());
            }
            q.try_pop();
        }
        assert_eq!(Arc::strong_count(&value), 1);
    }
}
