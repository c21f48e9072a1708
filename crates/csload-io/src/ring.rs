//! Fixed-capacity FIFO between exactly one producer thread and one consumer thread.
//!
//! The slot array is owned by the buffer; the producer fills the head slot and
//! the consumer empties the tail slot, so an element moves from producer to
//! consumer when it is popped and is never shared. With `N` slots the ring is
//! full when `(head + 1) % N == tail` and empty when `head == tail`, so it holds
//! at most `N - 1` items.
//!
//! Blocking uses two condition variables; every wake-up re-checks the ring
//! state. The optional grace pause after a wake-up only batches work under
//! contention and is never needed for correctness.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

struct RingState<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    no_more_input: bool,
}

impl<T> RingState<T> {
    fn is_full(&self) -> bool {
        (self.head + 1) % self.slots.len() == self.tail
    }

    fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    fn len(&self) -> usize {
        (self.head + self.slots.len() - self.tail) % self.slots.len()
    }
}

pub struct BoundedRingBuffer<T> {
    state: Mutex<RingState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    grace: Duration,
}

impl<T> BoundedRingBuffer<T> {
    /// Ring with `slots` slots (clamped to at least 2), holding up to `slots - 1` items.
    pub fn new(slots: usize) -> Self {
        Self::with_grace(slots, Duration::ZERO)
    }

    pub fn with_grace(slots: usize, grace: Duration) -> Self {
        let n = slots.max(2);
        let slots: Vec<Option<T>> = (0..n).map(|_| None).collect();
        Self {
            state: Mutex::new(RingState {
                slots: slots.into_boxed_slice(),
                head: 0,
                tail: 0,
                no_more_input: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            grace,
        }
    }

    /// Append `item`, blocking while the ring is full.
    pub fn push(&self, item: T) {
        let mut st = self.lock();
        while st.is_full() {
            st = self.wait(&self.not_full, st);
        }
        debug_assert!(!st.no_more_input, "push after signal_no_more_input");
        let head = st.head;
        st.slots[head] = Some(item);
        st.head = (head + 1) % st.slots.len();
        drop(st);
        self.not_empty.notify_one();
    }

    /// Remove the oldest item, blocking while the ring is empty and more input
    /// is expected. `None` means the producer is done and the ring is drained.
    pub fn pop(&self) -> Option<T> {
        let mut st = self.lock();
        loop {
            if !st.is_empty() {
                let tail = st.tail;
                let item = st.slots[tail].take();
                st.tail = (tail + 1) % st.slots.len();
                drop(st);
                self.not_full.notify_one();
                return item;
            }
            if st.no_more_input {
                return None;
            }
            st = self.wait(&self.not_empty, st);
        }
    }

    /// Producer side: no further pushes will happen. Idempotent.
    pub fn signal_no_more_input(&self) {
        let mut st = self.lock();
        st.no_more_input = true;
        drop(st);
        self.not_empty.notify_all();
    }

    /// Pop until the producer is done, yielding items in FIFO order.
    pub fn drain(&self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.pop())
    }

    /// Items currently buffered (advisory).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of items the ring holds at once.
    pub fn capacity(&self) -> usize {
        self.lock().slots.len() - 1
    }

    fn lock(&self) -> MutexGuard<'_, RingState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(
        &'a self,
        cv: &Condvar,
        guard: MutexGuard<'a, RingState<T>>,
    ) -> MutexGuard<'a, RingState<T>> {
        let guard = cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
        if self.grace.is_zero() {
            return guard;
        }
        drop(guard);
        thread::sleep(self.grace);
        self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn holds_one_less_than_slot_count() {
        let ring = BoundedRingBuffer::new(4);
        assert_eq!(ring.capacity(), 3);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn drains_then_reports_end() {
        let ring = BoundedRingBuffer::new(8);
        ring.push("a");
        ring.push("b");
        ring.signal_no_more_input();
        ring.signal_no_more_input();
        assert_eq!(ring.pop(), Some("a"));
        assert_eq!(ring.pop(), Some("b"));
        assert_eq!(ring.pop(), None);
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn signal_wakes_a_parked_consumer() {
        let ring: Arc<BoundedRingBuffer<u32>> = Arc::new(BoundedRingBuffer::new(2));
        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.pop())
        };
        thread::sleep(Duration::from_millis(20));
        ring.signal_no_more_input();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn parked_consumer_wakes_through_grace_pause() {
        let ring = Arc::new(BoundedRingBuffer::with_grace(2, Duration::from_millis(1)));
        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || (ring.pop(), ring.pop()))
        };
        thread::sleep(Duration::from_millis(20));
        ring.push(7u32);
        ring.signal_no_more_input();
        assert_eq!(consumer.join().unwrap(), (Some(7), None));
    }

    #[test]
    fn blocked_producer_resumes_when_space_frees() {
        let ring = Arc::new(BoundedRingBuffer::with_grace(2, Duration::from_micros(50)));
        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for i in 0..100u32 {
                    ring.push(i);
                }
                ring.signal_no_more_input();
            })
        };
        let got: Vec<u32> = ring.drain().collect();
        producer.join().unwrap();
        assert_eq!(got, (0..100).collect::<Vec<_>>());
    }
}
