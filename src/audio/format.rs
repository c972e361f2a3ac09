// Fixed-shape sample format used for every render

use serde::Serialize;

use crate::error::ValidationError;

/// Length of the pacing guard window in milliseconds.
pub const GUARD_WINDOW_MS: u32 = 5;

/// 8-bit signed, big-endian, mono PCM at a caller-chosen sample rate.
///
/// With one byte per frame, byte counts and sample counts coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    sample_rate: u32,
}

impl AudioFormat {
    pub const SAMPLE_SIZE_BITS: u16 = 8;
    pub const CHANNELS: u16 = 1;

    pub fn new(sample_rate: u32) -> Result<Self, ValidationError> {
        if sample_rate == 0 {
            return Err(ValidationError::InvalidSampleRate);
        }
        Ok(Self { sample_rate })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Bytes per frame; writes to a line are whole multiples of this.
    pub fn frame_size(&self) -> usize {
        (Self::SAMPLE_SIZE_BITS as usize / 8) * Self::CHANNELS as usize
    }

    /// Samples covered by the pacing guard window, never less than one.
    pub fn guard_interval(&self) -> usize {
        ((self.sample_rate as u64 * GUARD_WINDOW_MS as u64 / 1000) as usize).max(1)
    }
}
