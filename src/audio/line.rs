// Output device and line capabilities
// The renderer only ever talks to these traits; cpal_line.rs is the real
// backend and tests swap in an in-memory line.

use std::sync::Arc;

use crate::audio::catalog::OutputDeviceDescriptor;
use crate::audio::format::AudioFormat;
use crate::audio::gain::GainRange;
use crate::error::DeviceError;

/// A playback line: a bounded device-side buffer samples are written into.
///
/// All methods take `&self` so gain changes can be issued from another
/// thread while a render owns the write side.
pub trait OutputLine: Send + Sync {
    fn name(&self) -> &str;

    /// Open the line for `format`. Opening an already open line is a no-op.
    fn open(&self, format: &AudioFormat) -> Result<(), DeviceError>;

    fn is_open(&self) -> bool;

    /// Capacity of the device-side buffer in bytes.
    fn buffer_size(&self) -> usize;

    /// Free space in the device-side buffer in bytes.
    fn available(&self) -> usize;

    /// Write samples, blocking until the line accepted them or was closed.
    /// Returns the number of bytes accepted.
    fn write(&self, data: &[u8]) -> usize;

    /// Block until everything written so far has been played.
    fn drain(&self);

    fn stop(&self);

    fn close(&self);

    /// Decibel range of the gain control, or `None` if the line has none.
    fn gain_range(&self) -> Option<GainRange>;

    fn set_gain_db(&self, db: f32) -> Result<(), DeviceError>;
}

/// A playback endpoint that can hand out lines.
pub trait OutputDevice: Send + Sync {
    fn descriptor(&self) -> &OutputDeviceDescriptor;

    fn open_line(&self) -> Result<Arc<dyn OutputLine>, DeviceError>;
}
