pub mod data_buffer;

pub use data_buffer::{DataBuffer, SampleBlock};

/// Downstream store for converted samples.
///
/// Implementations provide their own synchronisation: the acquisition thread
/// appends while host threads read, resize and clear.
pub trait SampleSink: Send + Sync {
    /// Reshape to `channels` x `capacity` samples, discarding contents.
    fn resize(&self, channels: usize, capacity: usize);

    /// Append `count` sample slots. `samples` is slot-major (all channels of
    /// slot 0, then slot 1, ...); `timestamps` and `event_words` hold one
    /// entry per slot.
    fn append(
        &self,
        samples: &[f32],
        timestamps: &[i64],
        event_words: &[u64],
        count: usize,
        stream_id: u32,
    );

    fn clear(&self);
}
