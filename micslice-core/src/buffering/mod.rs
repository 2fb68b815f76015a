//! Sample buffers shared between producer threads and their consumers.
//!
//! - [`RingSlot`]: one fixed-capacity slot of 16-bit samples with a write
//!   cursor. Two of them form the streaming double buffer.
//! - A lock-free SPSC `ringbuf` ring carrying f32 frames from the cpal audio
//!   callback to the `CpalPeripheral` reader.

pub mod slot;

pub use slot::RingSlot;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half: held by the cpal input callback.
pub type FrameProducer = ringbuf::HeapProd<f32>;

/// Consumer half: held by the peripheral reader.
pub type FrameConsumer = ringbuf::HeapCons<f32>;

/// Ring capacity: 2^18 = 262 144 f32 frames ≈ 5.4 s at 48 kHz.
pub const FRAME_RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_frame_ring() -> (FrameProducer, FrameConsumer) {
    HeapRb::<f32>::new(FRAME_RING_CAPACITY).split()
}

/// Allocate a zeroed vector without aborting on allocation failure.
pub(crate) fn try_alloc_zeroed<T: Default>(len: usize) -> crate::error::Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| crate::error::MicsliceError::AllocationFailure { samples: len })?;
    buf.resize_with(len, T::default);
    Ok(buf)
}
