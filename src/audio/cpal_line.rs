// Audio output using cpal
// Each open line owns a ring buffer; a holder thread keeps the cpal stream
// alive (streams are not Send everywhere) until the line is closed.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use regex::Regex;
use ringbuf::{HeapRb, traits::{Consumer, Observer, Producer, Split}};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::audio::catalog::{OutputDeviceDescriptor, DIRECT_PLAYBACK_PREFIX, UNKNOWN_VERSION};
use crate::audio::format::AudioFormat;
use crate::audio::gain::{db_to_amplitude, GainRange, GAIN_FLOOR_DB};
use crate::audio::line::{OutputDevice, OutputLine};
use crate::error::DeviceError;

/// Ring buffer length in milliseconds of audio at the line's sample rate.
const RING_BUFFER_MS: usize = 250;
const MIN_RING_BUFFER: usize = 256;

/// Upper end of the software gain control, 2x amplitude.
const MAX_GAIN_DB: f32 = 6.0206;

type RingProducer = ringbuf::HeapProd<i8>;
type RingConsumer = ringbuf::HeapCons<i8>;

fn virtual_endpoint_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?i)loopback|monitor|null|dummy|virtual").expect("virtual endpoint pattern is valid")
    })
}

/// Describe an endpoint the way the catalog filter expects.
pub fn describe_endpoint(host: &str, name: &str, playback: bool) -> String {
    if !playback {
        format!("{} capture-only endpoint", host)
    } else if virtual_endpoint_regex().is_match(name) {
        format!("Virtual {} endpoint", host)
    } else {
        format!("{}: {} playback endpoint", DIRECT_PLAYBACK_PREFIX, host)
    }
}

fn endpoint_descriptor(host: &str, name: String, playback: bool) -> OutputDeviceDescriptor {
    OutputDeviceDescriptor {
        description: describe_endpoint(host, &name, playback),
        name,
        vendor: host.to_string(),
        version: UNKNOWN_VERSION.to_string(),
    }
}

/// Every endpoint of every available host, playback-capable or not.
pub fn enumerate_devices() -> Vec<Arc<dyn OutputDevice>> {
    let mut found: Vec<Arc<dyn OutputDevice>> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                warn!("audio host {} unavailable: {}", host_id.name(), e);
                continue;
            }
        };
        let devices = match host.devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("failed to enumerate {} devices: {}", host_id.name(), e);
                continue;
            }
        };

        for device in devices {
            let name = match device.name() {
                Ok(name) => name,
                Err(e) => {
                    debug!("skipping unnamed device: {}", e);
                    continue;
                }
            };
            let playback = device
                .supported_output_configs()
                .map(|mut configs| configs.next().is_some())
                .unwrap_or(false);

            found.push(Arc::new(CpalDevice {
                descriptor: endpoint_descriptor(host_id.name(), name, playback),
                device: Mutex::new(device),
            }));
        }
    }

    found
}

pub struct CpalDevice {
    descriptor: OutputDeviceDescriptor,
    device: Mutex<cpal::Device>,
}

impl OutputDevice for CpalDevice {
    fn descriptor(&self) -> &OutputDeviceDescriptor {
        &self.descriptor
    }

    fn open_line(&self) -> Result<Arc<dyn OutputLine>, DeviceError> {
        let device = self.device.lock().clone();
        Ok(Arc::new(CpalLine::new(self.descriptor.name.clone(), device)))
    }
}

struct Session {
    producer: RingProducer,
    sample_rate: u32,
    shutdown: crossbeam_channel::Sender<()>,
    holder: thread::JoinHandle<()>,
}

/// Playback line on top of a cpal output stream.
pub struct CpalLine {
    name: String,
    device: Mutex<cpal::Device>,
    session: Mutex<Option<Session>>,
    capacity: AtomicUsize,
    amplitude: Arc<Mutex<f32>>,
    active: Arc<AtomicBool>,
}

impl CpalLine {
    pub fn new(name: String, device: cpal::Device) -> Self {
        Self {
            name,
            device: Mutex::new(device),
            session: Mutex::new(None),
            capacity: AtomicUsize::new(0),
            amplitude: Arc::new(Mutex::new(1.0)),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> DeviceError {
        DeviceError::Unavailable {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Pick a supported config that runs at `sample_rate`, fewest channels first.
    fn pick_config(
        device: &cpal::Device,
        sample_rate: u32,
    ) -> Result<(StreamConfig, SampleFormat), String> {
        let configs = device
            .supported_output_configs()
            .map_err(|e| format!("failed to query output configs: {}", e))?;

        let rate = cpal::SampleRate(sample_rate);
        let mut candidates: Vec<_> = configs
            .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
            .collect();
        candidates.sort_by_key(|range| range.channels());

        let supported = candidates
            .into_iter()
            .next()
            .ok_or_else(|| format!("no output config supports {} Hz", sample_rate))?
            .with_sample_rate(rate);

        Ok((supported.config(), supported.sample_format()))
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut consumer: RingConsumer,
        amplitude: Arc<Mutex<f32>>,
        active: Arc<AtomicBool>,
    ) -> Result<Stream, String> {
        let channels = config.channels.max(1) as usize;
        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let amp = *amplitude.lock();
                let playing = active.load(Ordering::SeqCst);

                // Mono in, same sample on every device channel out
                for frame in data.chunks_mut(channels) {
                    let value = if playing {
                        consumer.try_pop().map(|s| s as f32 / 128.0).unwrap_or(0.0)
                    } else {
                        0.0
                    };
                    let sample = T::from_sample(value * amp);
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            move |err| {
                error!("audio output error: {}", err);
            },
            None,
        ).map_err(|e| format!("failed to build output stream: {}", e))?;

        Ok(stream)
    }

    fn start_stream(
        device: &cpal::Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
        consumer: RingConsumer,
        amplitude: Arc<Mutex<f32>>,
        active: Arc<AtomicBool>,
    ) -> Result<Stream, String> {
        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(device, config, consumer, amplitude, active)?,
            SampleFormat::I16 => Self::build_stream::<i16>(device, config, consumer, amplitude, active)?,
            SampleFormat::U16 => Self::build_stream::<u16>(device, config, consumer, amplitude, active)?,
            SampleFormat::I8 => Self::build_stream::<i8>(device, config, consumer, amplitude, active)?,
            SampleFormat::U8 => Self::build_stream::<u8>(device, config, consumer, amplitude, active)?,
            SampleFormat::I32 => Self::build_stream::<i32>(device, config, consumer, amplitude, active)?,
            format => return Err(format!("unsupported sample format: {:?}", format)),
        };
        stream.play().map_err(|e| format!("failed to start stream: {}", e))?;
        Ok(stream)
    }
}

impl OutputLine for CpalLine {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, format: &AudioFormat) -> Result<(), DeviceError> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Ok(());
        }

        let device = self.device.lock().clone();
        let (config, sample_format) =
            Self::pick_config(&device, format.sample_rate()).map_err(|e| self.unavailable(e))?;

        let capacity =
            (format.sample_rate() as usize * RING_BUFFER_MS / 1000).max(MIN_RING_BUFFER);
        let (producer, consumer) = HeapRb::<i8>::new(capacity).split();

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let amplitude = Arc::clone(&self.amplitude);
        let active = Arc::clone(&self.active);
        let channels = config.channels;

        let holder = thread::Builder::new()
            .name(format!("line-{}", self.name))
            .spawn(move || {
                let stream = match Self::start_stream(
                    &device,
                    &config,
                    sample_format,
                    consumer,
                    amplitude,
                    active,
                ) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Sender dropped or shutdown sent, either way we are done
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|e| self.unavailable(format!("failed to spawn stream holder: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                let _ = holder.join();
                return Err(self.unavailable(reason));
            }
            Err(_) => {
                let _ = holder.join();
                return Err(self.unavailable("stream holder exited early"));
            }
        }

        info!(
            device = %self.name,
            sample_rate = format.sample_rate(),
            channels = channels,
            "output line open ({:?}, {} byte buffer)",
            sample_format,
            capacity
        );
        self.capacity.store(capacity, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        *session = Some(Session {
            producer,
            sample_rate: format.sample_rate(),
            shutdown: shutdown_tx,
            holder,
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.session.lock().is_some()
    }

    fn buffer_size(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    fn available(&self) -> usize {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.producer.vacant_len())
            .unwrap_or(0)
    }

    fn write(&self, data: &[u8]) -> usize {
        // Big-endian 8-bit: every byte is one two's complement sample
        let samples: Vec<i8> = data.iter().map(|&b| b as i8).collect();
        let mut written = 0;

        while written < samples.len() {
            if !self.active.load(Ordering::SeqCst) {
                break;
            }
            let pushed = match self.session.lock().as_mut() {
                Some(session) => session.producer.push_slice(&samples[written..]),
                None => break,
            };
            written += pushed;
            if pushed == 0 {
                // Buffer full, wait for the callback to make room
                thread::sleep(Duration::from_millis(1));
            }
        }

        written
    }

    fn drain(&self) {
        let Some(sample_rate) = self.session.lock().as_ref().map(|s| s.sample_rate) else {
            return;
        };
        let capacity = self.buffer_size() as u64;
        let limit = Duration::from_millis(capacity * 1000 / sample_rate.max(1) as u64 + 1000);
        let started = Instant::now();

        loop {
            let pending = self
                .session
                .lock()
                .as_ref()
                .map(|session| session.producer.occupied_len())
                .unwrap_or(0);
            if pending == 0 || !self.active.load(Ordering::SeqCst) {
                break;
            }
            if started.elapsed() > limit {
                warn!(device = %self.name, pending, "drain timed out");
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn close(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };
        self.active.store(false, Ordering::SeqCst);
        let _ = session.shutdown.send(());
        if session.holder.join().is_err() {
            error!(device = %self.name, "stream holder panicked");
        }
        self.capacity.store(0, Ordering::SeqCst);
        debug!(device = %self.name, "output line closed");
    }

    fn gain_range(&self) -> Option<GainRange> {
        Some(GainRange::new(GAIN_FLOOR_DB, MAX_GAIN_DB))
    }

    fn set_gain_db(&self, db: f32) -> Result<(), DeviceError> {
        *self.amplitude.lock() = db_to_amplitude(db);
        Ok(())
    }
}

impl Drop for CpalLine {
    fn drop(&mut self) {
        self.close();
    }
}
