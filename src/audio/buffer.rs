//! Bounded sample history for one utterance.
//!
//! Once `capacity` samples are held, pushing more discards the oldest ones,
//! so a runaway utterance can never grow memory without bound.

use std::collections::VecDeque;

/// Fixed-capacity FIFO of samples that keeps the newest data.
///
/// ```rust
/// use doc_voice_agent::audio::RingBuffer;
///
/// let mut buf = RingBuffer::new(3);
/// buf.push_slice(&[1.0, 2.0, 3.0, 4.0]);
/// assert_eq!(buf.snapshot(), vec![2.0, 3.0, 4.0]);
/// assert_eq!(buf.drain(), vec![2.0, 3.0, 4.0]);
/// assert!(buf.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> RingBuffer<T> {
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push_slice(&mut self, data: &[T]) {
        // Only the tail of an oversized push can survive.
        let data = &data[data.len().saturating_sub(self.capacity)..];
        let overflow = (self.samples.len() + data.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(data.iter().copied());
    }

    /// Copy of the stored samples, oldest first.  The buffer is unchanged.
    pub fn snapshot(&self) -> Vec<T> {
        self.samples.iter().copied().collect()
    }

    /// Take every stored sample, oldest first, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<T> {
        self.samples.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
