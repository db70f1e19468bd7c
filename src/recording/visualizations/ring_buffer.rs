//! Lock-free single-producer/single-consumer sample queue.
//!
//! The capture callback owns the [`RingProducer`] and the analyzer worker owns
//! the [`RingConsumer`]. Each copy is split into at most two contiguous
//! segments around the wrap point, and the new position is published only
//! after the payload is copied. A full buffer drops the incoming samples.

use rtrb::RingBuffer;

use crate::recording::error::{RecordingError, Result};

/// Creates a ring of `capacity` samples split into its two halves.
///
/// # Errors
/// - If `capacity` is zero
pub fn sample_ring(capacity: usize) -> Result<(RingProducer, RingConsumer)> {
    if capacity == 0 {
        return Err(RecordingError::InvalidConfig(
            "ring buffer capacity must be greater than zero".to_string(),
        ));
    }

    let (producer, consumer) = RingBuffer::new(capacity);
    Ok((
        RingProducer { producer, capacity },
        RingConsumer { consumer, capacity },
    ))
}

/// Writing half of the sample ring.
pub struct RingProducer {
    producer: rtrb::Producer<i16>,
    capacity: usize,
}

impl RingProducer {
    /// Copies as many samples as fit and returns how many were written.
    ///
    /// Never blocks and never grows; returns 0 when the ring is full.
    pub fn write(&mut self, samples: &[i16]) -> usize {
        let to_write = self.producer.slots().min(samples.len());
        if to_write == 0 {
            return 0;
        }
        let Ok(mut chunk) = self.producer.write_chunk(to_write) else {
            return 0;
        };

        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&samples[..split]);
        second.copy_from_slice(&samples[split..to_write]);
        chunk.commit_all();
        to_write
    }

    pub fn available_to_read(&self) -> usize {
        self.capacity - self.producer.slots()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Reading half of the sample ring.
pub struct RingConsumer {
    consumer: rtrb::Consumer<i16>,
    capacity: usize,
}

impl RingConsumer {
    /// Copies up to `destination.len()` samples out and returns how many were read.
    pub fn read(&mut self, destination: &mut [i16]) -> usize {
        let to_read = self.consumer.slots().min(destination.len());
        if to_read == 0 {
            return 0;
        }
        let Ok(chunk) = self.consumer.read_chunk(to_read) else {
            return 0;
        };

        let (first, second) = chunk.as_slices();
        let split = first.len();
        destination[..split].copy_from_slice(first);
        destination[split..to_read].copy_from_slice(second);
        chunk.commit_all();
        to_read
    }

    pub fn available_to_read(&self) -> usize {
        self.consumer.slots()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
