// Output device catalog
// Snapshot of the playback endpoints that can take raw streamed samples.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::audio::cpal_line;
use crate::audio::line::OutputDevice;

/// Descriptions of endpoints that accept raw sample streams start with this.
pub const DIRECT_PLAYBACK_PREFIX: &str = "Direct Audio Device";

/// Immutable description of one playback endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDeviceDescriptor {
    pub name: String,
    /// Audio host that exposes the endpoint, e.g. "ALSA" or "WASAPI".
    pub vendor: String,
    /// Driver version, or [`UNKNOWN_VERSION`] when the host does not report one.
    pub version: String,
    pub description: String,
}

/// Placeholder version for endpoints whose host reports none. cpal exposes
/// no driver version on any backend.
pub const UNKNOWN_VERSION: &str = "unknown";

fn direct_playback_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?i)^\s*direct\s+audio\s+device\b").expect("direct playback pattern is valid")
    })
}

/// Whether a device description advertises direct sound playback.
pub fn is_direct_playback(description: &str) -> bool {
    direct_playback_regex().is_match(description)
}

/// Playback devices found at construction time, ordered by name.
pub struct OutputDeviceCatalog {
    devices: Vec<Arc<dyn OutputDevice>>,
}

impl OutputDeviceCatalog {
    /// Enumerate every endpoint of every audio host on this machine.
    pub fn new() -> Self {
        Self::from_devices(cpal_line::enumerate_devices())
    }

    /// Build a catalog from an arbitrary set of devices, keeping only direct
    /// playback endpoints.
    pub fn from_devices(devices: Vec<Arc<dyn OutputDevice>>) -> Self {
        let total = devices.len();
        let mut devices: Vec<Arc<dyn OutputDevice>> = devices
            .into_iter()
            .filter(|device| {
                let keep = is_direct_playback(&device.descriptor().description);
                if !keep {
                    debug!(
                        device = %device.descriptor().name,
                        description = %device.descriptor().description,
                        "skipping non-playback endpoint"
                    );
                }
                keep
            })
            .collect();
        devices.sort_by(|a, b| a.descriptor().name.cmp(&b.descriptor().name));

        info!("found {} playback devices out of {} endpoints", devices.len(), total);
        Self { devices }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Device names in ascending order.
    pub fn list_names(&self) -> Vec<String> {
        self.devices
            .iter()
            .map(|device| device.descriptor().name.clone())
            .collect()
    }

    pub fn descriptors(&self) -> Vec<OutputDeviceDescriptor> {
        self.devices
            .iter()
            .map(|device| device.descriptor().clone())
            .collect()
    }

    /// Positional lookup in name order.
    pub fn get(&self, index: usize) -> Option<Arc<dyn OutputDevice>> {
        self.devices.get(index).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn OutputDevice>> {
        self.devices
            .iter()
            .find(|device| device.descriptor().name == name)
            .cloned()
    }
}

impl Default for OutputDeviceCatalog {
    fn default() -> Self {
        Self::new()
    }
}
