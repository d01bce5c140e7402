use std::collections::HashMap;
use serde::{Serialize, Deserialize};

use crate::sink::SampleBlock;

/// Unit of data handed to the host pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFrame {
    /// Sample index of the first slot in the frame
    pub timestamp: u64,

    /// Sequential frame number for ordering
    pub sequence_id: u64,

    /// Per-channel samples keyed "ch0", "ch1", ...
    pub payload: HashMap<String, Vec<f64>>,

    /// Side-channel information (sample_rate, bit_volts, ...)
    pub metadata: HashMap<String, String>,
}

impl DataFrame {
    pub fn new(timestamp: u64, sequence_id: u64) -> Self {
        Self {
            timestamp,
            sequence_id,
            payload: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Build a frame from samples drained out of the sink.
    pub fn from_block(block: &SampleBlock, sequence_id: u64) -> Self {
        let timestamp = block.timestamps.first().copied().unwrap_or(0).max(0) as u64;
        let mut frame = Self::new(timestamp, sequence_id);

        for (index, channel) in block.channels.iter().enumerate() {
            frame.payload.insert(
                format!("ch{}", index),
                channel.iter().map(|&v| v as f64).collect(),
            );
        }

        frame
    }

    pub fn num_samples(&self) -> usize {
        self.payload.values().next().map(|v| v.len()).unwrap_or(0)
    }

    pub fn channel(&self, index: usize) -> Option<&Vec<f64>> {
        self.payload.get(&format!("ch{}", index))
    }
}
