use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{BufferError, Result};

/// Bounded, thread-safe FIFO of bytes.
///
/// Producers push without blocking; a full buffer rejects the excess. The
/// consumer can block in [`pop_blocking`](RingBuffer::pop_blocking) until
/// data arrives, with the availability check and the dequeue done under the
/// same lock acquisition.
#[derive(Debug)]
pub struct RingBuffer {
    ring: Mutex<Ring>,
    not_empty: Condvar,
}

#[derive(Debug)]
struct Ring {
    buf: Box<[u8]>,
    read_index: usize,
    write_index: usize,
    count: usize,
    dropped: u64,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    fn put(&mut self, b: u8) {
        self.buf[self.write_index] = b;
        self.write_index = (self.write_index + 1) % self.capacity();
        self.count += 1;
    }

    fn take(&mut self) -> u8 {
        let b = self.buf[self.read_index];
        self.read_index = (self.read_index + 1) % self.capacity();
        self.count -= 1;
        b
    }
}

impl RingBuffer {
    /// Create a buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                buf: vec![0u8; capacity].into_boxed_slice(),
                read_index: 0,
                write_index: 0,
                count: 0,
                dropped: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock()
    }

    /// Store one byte. Returns false, leaving the buffer untouched, when full.
    pub fn push(&self, b: u8) -> bool {
        let mut ring = self.lock();
        if ring.is_full() {
            ring.dropped += 1;
            return false;
        }
        ring.put(b);
        self.not_empty.notify_one();
        true
    }

    /// Store as many leading bytes of `bytes` as fit.
    ///
    /// Returns how many were stored. The rest are dropped, not queued; a
    /// short count means the buffer overflowed.
    pub fn push_all(&self, bytes: &[u8]) -> usize {
        let mut ring = self.lock();
        let mut stored = 0;
        for &b in bytes {
            if ring.is_full() {
                break;
            }
            ring.put(b);
            stored += 1;
        }
        ring.dropped += (bytes.len() - stored) as u64;
        if stored > 0 {
            self.not_empty.notify_one();
        }
        stored
    }

    /// Remove the oldest byte.
    ///
    /// Fails with [`BufferError::Empty`] when nothing is buffered; check
    /// [`bytes_available`](RingBuffer::bytes_available) or use
    /// [`pop_blocking`](RingBuffer::pop_blocking) instead.
    pub fn pop(&self) -> Result<u8> {
        let mut ring = self.lock();
        if ring.count == 0 {
            return Err(BufferError::Empty);
        }
        Ok(ring.take())
    }

    /// Wait until a byte is available or `running` is cleared.
    ///
    /// Returns `None` as soon as `running` is false, even if bytes remain.
    /// Whoever clears `running` must call [`interrupt`](RingBuffer::interrupt)
    /// afterwards to wake the waiter.
    pub fn pop_blocking(&self, running: &AtomicBool) -> Option<u8> {
        let mut ring = self.lock();
        while ring.count == 0 && running.load(Ordering::SeqCst) {
            self.not_empty.wait(&mut ring);
        }
        if !running.load(Ordering::SeqCst) {
            return None;
        }
        Some(ring.take())
    }

    /// Wake every thread blocked in [`pop_blocking`](RingBuffer::pop_blocking).
    pub fn interrupt(&self) {
        let _ring = self.lock();
        self.not_empty.notify_all();
    }

    /// Discard all buffered bytes.
    pub fn clear(&self) {
        let mut ring = self.lock();
        ring.read_index = 0;
        ring.write_index = 0;
        ring.count = 0;
    }

    /// Number of unread bytes.
    pub fn bytes_available(&self) -> usize {
        self.lock().count
    }

    /// Number of bytes that can still be pushed.
    pub fn free_space(&self) -> usize {
        let ring = self.lock();
        ring.capacity() - ring.count
    }

    /// Fixed capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Total bytes rejected because the buffer was full.
    pub fn dropped_bytes(&self) -> u64 {
        self.lock().dropped
    }
}
