use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use log::warn;

use super::SampleSink;

/// Samples drained from a [`DataBuffer`], de-interleaved per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    pub channels: Vec<Vec<f32>>,
    pub timestamps: Vec<i64>,
    pub event_words: Vec<u64>,
}

impl SampleBlock {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

struct Ring {
    capacity: usize,
    channels: Vec<VecDeque<f32>>,
    timestamps: VecDeque<i64>,
    event_words: VecDeque<u64>,
    overwritten: u64,
}

impl Ring {
    fn new(channels: usize, capacity: usize) -> Self {
        Self {
            capacity,
            channels: (0..channels).map(|_| VecDeque::with_capacity(capacity)).collect(),
            timestamps: VecDeque::with_capacity(capacity),
            event_words: VecDeque::with_capacity(capacity),
            overwritten: 0,
        }
    }

    fn push_slot(&mut self, frame: &[f32], timestamp: i64, event_word: u64) {
        if self.timestamps.len() == self.capacity {
            for channel in self.channels.iter_mut() {
                channel.pop_front();
            }
            self.timestamps.pop_front();
            self.event_words.pop_front();
            self.overwritten += 1;
        }
        for (channel, &value) in self.channels.iter_mut().zip(frame) {
            channel.push_back(value);
        }
        self.timestamps.push_back(timestamp);
        self.event_words.push_back(event_word);
    }
}

/// In-memory ring sink. When full, the oldest sample slots are overwritten.
pub struct DataBuffer {
    ring: Mutex<Ring>,
}

impl DataBuffer {
    pub fn new(channels: usize, capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring::new(channels, capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn num_channels(&self) -> usize {
        self.lock().channels.len()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Buffered sample slots.
    pub fn len(&self) -> usize {
        self.lock().timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample slots dropped because a reader fell behind.
    pub fn overwritten(&self) -> u64 {
        self.lock().overwritten
    }

    /// Remove up to `max_slots` of the oldest sample slots.
    pub fn read(&self, max_slots: usize) -> Option<SampleBlock> {
        let mut ring = self.lock();
        let n = max_slots.min(ring.timestamps.len());
        if n == 0 {
            return None;
        }

        let channels = ring
            .channels
            .iter_mut()
            .map(|channel| channel.drain(..n).collect())
            .collect();
        let timestamps = ring.timestamps.drain(..n).collect();
        let event_words = ring.event_words.drain(..n).collect();

        Some(SampleBlock {
            channels,
            timestamps,
            event_words,
        })
    }
}

impl SampleSink for DataBuffer {
    fn resize(&self, channels: usize, capacity: usize) {
        *self.lock() = Ring::new(channels, capacity);
    }

    fn append(
        &self,
        samples: &[f32],
        timestamps: &[i64],
        event_words: &[u64],
        count: usize,
        _stream_id: u32,
    ) {
        let mut ring = self.lock();
        let width = ring.channels.len();
        if width == 0 {
            return;
        }

        let slots = count
            .min(samples.len() / width)
            .min(timestamps.len())
            .min(event_words.len());
        if slots < count {
            warn!("Sink append truncated to {} of {} slots", slots, count);
        }

        for slot in 0..slots {
            let frame = &samples[slot * width..(slot + 1) * width];
            ring.push_slot(frame, timestamps[slot], event_words[slot]);
        }
    }

    fn clear(&self) {
        let mut ring = self.lock();
        for channel in ring.channels.iter_mut() {
            channel.clear();
        }
        ring.timestamps.clear();
        ring.event_words.clear();
    }
}
