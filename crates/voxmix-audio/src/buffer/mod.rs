//! Lock-free sample buffers between decode workers and the render thread.

pub mod ring;

pub use ring::{shared_ring_buffer, RingBuffer, SharedRingBuffer};
