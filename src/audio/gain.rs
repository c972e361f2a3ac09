// Output gain calibration
//
// The volume knob is linear 0..=100 and maps onto a decibel level with
//   gain_dB = -80.0 + 0.86 * value
// so 0 sits on the -80 dB floor and 100 lands at +6 dB.

use serde::Serialize;

use crate::error::ValidationError;

pub const GAIN_FLOOR_DB: f32 = -80.0;
pub const GAIN_SLOPE_DB: f32 = 0.86;

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 100.0;

/// Decibel range a device gain control accepts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GainRange {
    pub min_db: f32,
    pub max_db: f32,
}

impl GainRange {
    pub fn new(min_db: f32, max_db: f32) -> Self {
        Self { min_db, max_db }
    }

    pub fn clamp(&self, db: f32) -> f32 {
        db.clamp(self.min_db, self.max_db)
    }
}

/// Reject volumes outside 0..=100 (NaN included).
pub fn validate_volume(value: f32) -> Result<f32, ValidationError> {
    if (MIN_VOLUME..=MAX_VOLUME).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::GainOutOfRange(value))
    }
}

pub fn volume_to_db(value: f32) -> f32 {
    GAIN_FLOOR_DB + GAIN_SLOPE_DB * value
}

/// Linear amplitude factor for a decibel level.
pub fn db_to_amplitude(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}
