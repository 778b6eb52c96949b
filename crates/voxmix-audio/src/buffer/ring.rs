//! Lock-free ring buffer for PCM hand-off between threads.
//!
//! Single-producer, single-consumer: a decode worker writes samples ahead of
//! time and the render thread reads them without locking or allocating.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free single-producer, single-consumer ring buffer of `T` samples.
pub struct RingBuffer<T> {
    /// The underlying storage.
    buffer: UnsafeCell<Box<[T]>>,
    /// Total samples ever read.
    read_pos: AtomicUsize,
    /// Total samples ever written.
    write_pos: AtomicUsize,
    /// Capacity (power of 2 for efficient modulo).
    capacity: usize,
    /// capacity - 1.
    mask: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer. The capacity is rounded up to a power of 2.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let buffer = vec![T::default(); capacity].into_boxed_slice();

        Self {
            buffer: UnsafeCell::new(buffer),
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples available for reading.
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Free slots for writing.
    pub fn free(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Write samples. Returns how many fit. Producer side only.
    pub fn write(&self, samples: &[T]) -> usize {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        let space = self.capacity - write_pos.wrapping_sub(read_pos);
        let to_write = samples.len().min(space);
        if to_write == 0 {
            return 0;
        }

        let start = write_pos & self.mask;
        let first = to_write.min(self.capacity - start);

        // SAFETY: only the producer touches the free region [write_pos, read_pos + capacity),
        // and the consumer never reads past write_pos until it is published below.
        #[allow(unsafe_code)]
        unsafe {
            let dst = (*self.buffer.get()).as_mut_ptr();
            std::ptr::copy_nonoverlapping(samples.as_ptr(), dst.add(start), first);
            std::ptr::copy_nonoverlapping(samples.as_ptr().add(first), dst, to_write - first);
        }

        self.write_pos
            .store(write_pos.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    /// Read samples into `output`. Returns how many were read. Consumer side only.
    pub fn read(&self, output: &mut [T]) -> usize {
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let write_pos = self.write_pos.load(Ordering::Acquire);

        let to_read = output.len().min(write_pos.wrapping_sub(read_pos));
        if to_read == 0 {
            return 0;
        }

        let start = read_pos & self.mask;
        let first = to_read.min(self.capacity - start);

        // SAFETY: only the consumer touches the filled region [read_pos, write_pos),
        // which the producer published with Release ordering.
        #[allow(unsafe_code)]
        unsafe {
            let src = (*self.buffer.get()).as_ptr();
            std::ptr::copy_nonoverlapping(src.add(start), output.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(src, output.as_mut_ptr().add(first), to_read - first);
        }

        self.read_pos
            .store(read_pos.wrapping_add(to_read), Ordering::Release);
        to_read
    }

    /// Drop everything currently buffered. Consumer side only.
    pub fn clear(&self) {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write_pos, Ordering::Release);
    }

    /// Total samples ever written, marking the current end of the stream.
    pub fn write_mark(&self) -> usize {
        self.write_pos.load(Ordering::Acquire)
    }

    /// Drop every sample written before `mark`. A mark the reader has
    /// already passed is ignored. Consumer side only.
    pub fn discard_to(&self, mark: usize) {
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let write_pos = self.write_pos.load(Ordering::Acquire);
        if mark.wrapping_sub(read_pos) <= write_pos.wrapping_sub(read_pos) {
            self.read_pos.store(mark, Ordering::Release);
        }
    }
}

// SAFETY: producer and consumer operate on disjoint regions coordinated by the
// atomic positions, so sharing across threads is sound for `T: Send`.
#[allow(unsafe_code)]
unsafe impl<T: Send> Send for RingBuffer<T> {}
#[allow(unsafe_code)]
unsafe impl<T: Send> Sync for RingBuffer<T> {}

/// Thread-safe reference to a ring buffer.
pub type SharedRingBuffer<T> = Arc<RingBuffer<T>>;

/// Create a new shared ring buffer.
pub fn shared_ring_buffer<T: Copy + Default>(capacity: usize) -> SharedRingBuffer<T> {
    Arc::new(RingBuffer::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_write_read() {
        let buffer = RingBuffer::<i16>::new(1024);

        let samples = [1i16, 2, 3, 4, 5];
        assert_eq!(buffer.write(&samples), 5);
        assert_eq!(buffer.available(), 5);

        let mut output = [0i16; 5];
        assert_eq!(buffer.read(&mut output), 5);
        assert_eq!(output, samples);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_wraparound() {
        let buffer = RingBuffer::<i16>::new(8);

        assert_eq!(buffer.write(&[1; 6]), 6);
        let mut output = [0i16; 4];
        assert_eq!(buffer.read(&mut output), 4);

        // Wraps past the end of storage.
        assert_eq!(buffer.write(&[2; 5]), 5);

        let mut rest = [0i16; 7];
        assert_eq!(buffer.read(&mut rest), 7);
        assert_eq!(&rest[0..2], &[1, 1]);
        assert_eq!(&rest[2..7], &[2; 5]);
    }

    #[test]
    fn test_full_buffer() {
        let buffer = RingBuffer::<i16>::new(4);
        assert_eq!(buffer.write(&[1; 4]), 4);
        assert_eq!(buffer.free(), 0);
        assert_eq!(buffer.write(&[2]), 0);

        let mut output = [0i16; 1];
        buffer.read(&mut output);
        assert_eq!(buffer.write(&[2]), 1);
    }

    #[test]
    fn test_clear() {
        let buffer = RingBuffer::<i16>::new(16);
        buffer.write(&[1; 10]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.free(), 16);
    }

    #[test]
    fn test_discard_to_mark() {
        let buffer = RingBuffer::<i16>::new(16);
        buffer.write(&[1; 6]);
        let mark = buffer.write_mark();
        buffer.write(&[2; 3]);

        buffer.discard_to(mark);
        let mut output = [0i16; 8];
        assert_eq!(buffer.read(&mut output), 3);
        assert_eq!(&output[..3], &[2; 3]);

        // Already read past it.
        buffer.discard_to(mark);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let buffer = shared_ring_buffer::<i16>(1024);
        let writer_buf = buffer.clone();
        let reader_buf = buffer;

        let writer = thread::spawn(move || {
            let mut next = 0i16;
            let mut total = 0usize;
            while total < 10_000 {
                let chunk: Vec<i16> = (0..100).map(|i| next.wrapping_add(i)).collect();
                let written = writer_buf.write(&chunk);
                next = next.wrapping_add(written as i16);
                total += written;
                if written == 0 {
                    thread::yield_now();
                }
            }
        });

        let reader = thread::spawn(move || {
            let mut output = [0i16; 64];
            let mut expected = 0i16;
            let mut total = 0usize;
            while total < 10_000 {
                let read = reader_buf.read(&mut output);
                for &s in &output[..read] {
                    assert_eq!(s, expected);
                    expected = expected.wrapping_add(1);
                }
                total += read;
                if read == 0 {
                    thread::yield_now();
                }
            }
            total
        });

        writer.join().unwrap();
        assert!(reader.join().unwrap() >= 10_000);
    }
}
