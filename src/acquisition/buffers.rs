use log::debug;

use crate::config::AcquisitionConfig;
use crate::sink::SampleSink;

/// Scratch buffers used by the acquisition thread for one packet.
///
/// A single owner at a time: the source holds them while idle and hands
/// them to the acquisition thread on start, which hands them back on exit.
#[derive(Debug, Default)]
pub struct WorkingBuffers {
    recv: Vec<u8>,
    samples: Vec<f32>,
    timestamps: Vec<i64>,
    event_words: Vec<u64>,
    channel_count: usize,
    samples_per_packet: usize,
}

impl WorkingBuffers {
    pub fn new(channel_count: usize, samples_per_packet: usize) -> Self {
        let mut buffers = Self::default();
        buffers.resize(channel_count, samples_per_packet);
        buffers
    }

    /// Reallocate for a new packet shape. Every buffer is zeroed, so nothing
    /// from the previous shape survives.
    pub fn resize(&mut self, channel_count: usize, samples_per_packet: usize) {
        let words = channel_count * samples_per_packet;

        // One spare byte so an oversized datagram shows up as a length
        // mismatch instead of being truncated to a valid-looking packet.
        self.recv.clear();
        self.recv.resize(words * 2 + 1, 0);
        self.samples.clear();
        self.samples.resize(words, 0.0);
        self.timestamps.clear();
        self.timestamps.resize(samples_per_packet, 0);
        self.event_words.clear();
        self.event_words.resize(samples_per_packet, 0);

        self.channel_count = channel_count;
        self.samples_per_packet = samples_per_packet;
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn samples_per_packet(&self) -> usize {
        self.samples_per_packet
    }

    /// Bytes in a well-formed packet for the current shape.
    pub fn packet_bytes(&self) -> usize {
        self.channel_count * self.samples_per_packet * 2
    }

    pub fn recv_capacity(&self) -> usize {
        self.recv.len()
    }

    pub fn sample_capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn timestamp_capacity(&self) -> usize {
        self.timestamps.len()
    }

    pub fn event_word_capacity(&self) -> usize {
        self.event_words.len()
    }

    pub fn recv_mut(&mut self) -> &mut [u8] {
        &mut self.recv
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn event_words(&self) -> &[u64] {
        &self.event_words
    }

    /// Split borrows for the conversion step: the received bytes of one
    /// packet plus the sample and timestamp outputs.
    pub(crate) fn packet_views(&mut self) -> (&[u8], &mut [f32], &mut [i64]) {
        let bytes = self.packet_bytes();
        (&self.recv[..bytes], &mut self.samples, &mut self.timestamps)
    }
}

/// Sizes the working buffers and the sink for a packet shape.
#[derive(Debug, Clone, Copy)]
pub struct CapacityManager {
    sink_capacity: usize,
}

impl CapacityManager {
    pub fn new(sink_capacity: usize) -> Self {
        Self { sink_capacity }
    }

    pub fn sink_capacity(&self) -> usize {
        self.sink_capacity
    }

    /// Must not run while the acquisition thread owns the buffers.
    pub fn resize(&self, buffers: &mut WorkingBuffers, sink: &dyn SampleSink, config: &AcquisitionConfig) {
        sink.resize(config.channel_count, self.sink_capacity);
        buffers.resize(config.channel_count, config.samples_per_packet);
        debug!(
            "Resized for {} channels x {} samples ({} byte packets)",
            config.channel_count,
            config.samples_per_packet,
            config.packet_bytes()
        );
    }
}
