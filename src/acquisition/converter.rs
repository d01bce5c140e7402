use crate::config::{AcquisitionConfig, ScaleMode};

/// Maps raw wire words to output floats.
///
/// Pure: the same word always yields the same value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleConverter {
    offset: i32,
    scale: f32,
    mode: ScaleMode,
}

impl SampleConverter {
    pub fn new(offset: i32, scale: f32, mode: ScaleMode) -> Self {
        Self {
            offset,
            scale,
            mode,
        }
    }

    pub fn from_config(config: &AcquisitionConfig, mode: ScaleMode) -> Self {
        Self::new(config.data_offset, config.data_scale, mode)
    }

    #[inline]
    pub fn convert(&self, raw: u16) -> f32 {
        let centered = (raw as i32 - self.offset) as f32;
        match self.mode {
            ScaleMode::Unscaled => centered,
            ScaleMode::Scaled => self.scale * centered,
        }
    }

    /// Decode little-endian words from `raw` into `out`, one float per word.
    /// Converts `min(raw.len() / 2, out.len())` words.
    pub fn convert_packet(&self, raw: &[u8], out: &mut [f32]) -> usize {
        let mut converted = 0;
        for (word, slot) in raw.chunks_exact(2).zip(out.iter_mut()) {
            *slot = self.convert(u16::from_le_bytes([word[0], word[1]]));
            converted += 1;
        }
        converted
    }
}

/// Write `first, first + 1, ...` into every entry of `out`.
pub fn fill_timestamps(first: i64, out: &mut [i64]) {
    for (index, timestamp) in out.iter_mut().enumerate() {
        *timestamp = first + index as i64;
    }
}
