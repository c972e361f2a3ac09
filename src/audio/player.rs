// Sound player
// Streams an encoded sample buffer into an output line in chunks the size of
// the line's own buffer, pacing itself so the line never runs dry or overfills.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::audio::format::AudioFormat;
use crate::audio::gain::{validate_volume, volume_to_db};
use crate::audio::line::OutputLine;
use crate::error::{DeviceError, ValidationError};
use crate::task::cancel::CancelToken;
use crate::task::runner::{BackgroundTask, TaskContext};

/// Outcome of one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaybackReport {
    pub bytes_written: usize,
    pub total_bytes: usize,
    pub chunks: usize,
}

impl PlaybackReport {
    pub fn is_complete(&self) -> bool {
        self.bytes_written == self.total_bytes
    }
}

/// Drains, stops and closes the line when dropped, whichever way the render
/// loop was left.
struct LineSession<'a> {
    line: &'a dyn OutputLine,
}

impl Drop for LineSession<'_> {
    fn drop(&mut self) {
        self.line.drain();
        self.line.stop();
        self.line.close();
        debug!(device = %self.line.name(), "output line released");
    }
}

/// Handle for steering a player from other threads while it renders.
#[derive(Clone)]
pub struct PlayerControls {
    line: Arc<dyn OutputLine>,
    format: AudioFormat,
    running: Arc<AtomicBool>,
    gain_db: Arc<Mutex<Option<f32>>>,
}

impl PlayerControls {
    /// Ask the render loop to finish after the chunk in flight. An ongoing
    /// device write is never aborted.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Set the output volume on a 0..=100 scale.
    ///
    /// Out of range values are rejected before the device is touched. The
    /// resulting decibel level is clamped into what the line supports and
    /// returned.
    pub fn set_output_gain(&self, value: f32) -> Result<f32, DeviceError> {
        let value = validate_volume(value)?;

        if !self.line.is_open() {
            self.line.open(&self.format)?;
        }
        let range = self.line.gain_range().ok_or(DeviceError::NoGainControl)?;
        let db = range.clamp(volume_to_db(value));
        self.line.set_gain_db(db)?;
        *self.gain_db.lock() = Some(db);

        debug!(device = %self.line.name(), value, db, "output gain set");
        Ok(db)
    }

    /// Last decibel level applied, if any.
    pub fn output_gain(&self) -> Option<f32> {
        *self.gain_db.lock()
    }
}

pub struct SoundPlayer {
    controls: PlayerControls,
    buffer: Option<Vec<u8>>,
    initial_gain: Option<f32>,
}

impl SoundPlayer {
    pub fn new(line: Arc<dyn OutputLine>, format: AudioFormat) -> Self {
        Self {
            controls: PlayerControls {
                line,
                format,
                running: Arc::new(AtomicBool::new(false)),
                gain_db: Arc::new(Mutex::new(None)),
            },
            buffer: None,
            initial_gain: None,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.controls.format
    }

    pub fn controls(&self) -> PlayerControls {
        self.controls.clone()
    }

    /// Set the samples to render. Must be called before [`SoundPlayer::play`].
    pub fn set_buffer(&mut self, samples: Vec<u8>) -> Result<(), ValidationError> {
        if samples.is_empty() {
            return Err(ValidationError::MissingBuffer);
        }
        self.buffer = Some(samples);
        Ok(())
    }

    /// Volume to apply once the line has been opened by [`SoundPlayer::play`].
    /// Validated now, applied on the rendering thread.
    pub fn set_initial_gain(&mut self, value: f32) -> Result<(), ValidationError> {
        self.initial_gain = Some(validate_volume(value)?);
        Ok(())
    }

    pub fn stop(&self) {
        self.controls.stop();
    }

    pub fn set_output_gain(&self, value: f32) -> Result<f32, DeviceError> {
        self.controls.set_output_gain(value)
    }

    pub fn output_gain(&self) -> Option<f32> {
        self.controls.output_gain()
    }

    /// Render the whole buffer without progress reporting.
    pub fn play(&mut self) -> Result<PlaybackReport, DeviceError> {
        self.play_with(&CancelToken::new(), |_| {})
    }

    /// Render the buffer, reporting progress as a percentage after every chunk.
    ///
    /// `cancel` and [`PlayerControls::stop`] are checked at each chunk boundary
    /// and on every pass of the pacing wait. An interrupt cuts a pause short.
    pub fn play_with<F>(
        &mut self,
        cancel: &CancelToken,
        mut progress_callback: F,
    ) -> Result<PlaybackReport, DeviceError>
    where
        F: FnMut(u8),
    {
        let buffer = self.buffer.as_deref().ok_or(ValidationError::MissingBuffer)?;
        let line = self.controls.line.as_ref();
        let format = self.controls.format;
        let running = &self.controls.running;

        if !line.is_open() {
            if let Err(e) = line.open(&format) {
                error!(device = %line.name(), "cannot open output line: {}", e);
                return Err(e);
            }
        }
        let _session = LineSession { line };

        if let Some(volume) = self.initial_gain.take() {
            if let Err(e) = self.controls.set_output_gain(volume) {
                warn!(device = %line.name(), "could not apply output gain: {}", e);
            }
        }

        let total = buffer.len();
        let frame_size = format.frame_size();
        let chunk_size = (line.buffer_size() / frame_size * frame_size).max(frame_size);
        let guard_interval = format.guard_interval();
        let pacing = Duration::from_millis((chunk_size / guard_interval).max(1) as u64);
        info!(
            device = %line.name(),
            total,
            chunk_size,
            "rendering at {} Hz",
            format.sample_rate()
        );

        running.store(true, Ordering::SeqCst);
        let mut consumed = 0;
        let mut chunks = 0;
        let mut remaining = total;

        while running.load(Ordering::SeqCst) && remaining > 0 {
            if cancel.is_cancelled() {
                running.store(false, Ordering::SeqCst);
                break;
            }

            let length = chunk_size.min(remaining);
            let written = line.write(&buffer[consumed..consumed + length]);
            consumed += written;
            chunks += 1;
            progress_callback((consumed * 100 / total) as u8);

            if written < length {
                // The line refused part of the chunk, it was stopped or closed underneath us
                debug!(device = %line.name(), written, length, "short write");
                running.store(false, Ordering::SeqCst);
                break;
            }

            while line.available() < line.buffer_size() / 2 {
                if cancel.is_cancelled() || !running.load(Ordering::SeqCst) {
                    running.store(false, Ordering::SeqCst);
                    break;
                }
                if cancel.pause(pacing).is_err() {
                    running.store(false, Ordering::SeqCst);
                    break;
                }
            }

            remaining = total - consumed;
        }

        running.store(false, Ordering::SeqCst);
        let report = PlaybackReport {
            bytes_written: consumed,
            total_bytes: total,
            chunks,
        };
        info!(
            device = %line.name(),
            "rendered {} of {} bytes in {} chunks",
            consumed,
            total,
            chunks
        );
        Ok(report)
    }
}

impl BackgroundTask for SoundPlayer {
    type Output = PlaybackReport;

    fn run(&mut self, ctx: &TaskContext) -> anyhow::Result<PlaybackReport> {
        let report = self.play_with(ctx.cancel_token(), |progress| ctx.step_on(progress))?;
        Ok(report)
    }
}
