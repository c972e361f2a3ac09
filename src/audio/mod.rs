// Audio output module
// Enumerates playback devices and streams 8-bit mono sample buffers into them.

pub mod catalog;
pub mod cpal_line;
pub mod format;
pub mod gain;
pub mod line;
pub mod player;

pub use catalog::{OutputDeviceCatalog, OutputDeviceDescriptor};
pub use format::AudioFormat;
pub use gain::GainRange;
pub use line::{OutputDevice, OutputLine};
pub use player::{PlaybackReport, PlayerControls, SoundPlayer};
