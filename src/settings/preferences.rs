// Typed view of the persisted user preferences

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::gain::{MAX_VOLUME, MIN_VOLUME};
use crate::extensions::store::PropertyStore;

pub const OUTPUT_DEVICE_KEY: &str = "defaultOutputDeviceName";
pub const OUTPUT_VOLUME_KEY: &str = "defaultOutputVolume";
pub const TARGET_SYSTEM_KEY: &str = "defaultTargetSystemName";

pub const DEFAULT_OUTPUT_VOLUME: f32 = 22.0;

/// Selections remembered between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub output_device_name: Option<String>,
    pub output_volume: f32,
    pub target_system_name: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            output_device_name: None,
            output_volume: DEFAULT_OUTPUT_VOLUME,
            target_system_name: None,
        }
    }
}

/// Parse a volume the way the volume field does: garbage falls back to the
/// default, numbers are coerced into 0..=100.
pub fn parse_volume(raw: &str) -> f32 {
    match raw.trim().parse::<f32>() {
        Ok(value) if value.is_finite() => value.clamp(MIN_VOLUME, MAX_VOLUME),
        _ => {
            warn!("ignoring unreadable volume {:?}", raw);
            DEFAULT_OUTPUT_VOLUME
        }
    }
}

impl Preferences {
    pub fn from_store(store: &PropertyStore) -> Self {
        let non_blank = |key: &str| {
            store
                .get(key)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        Self {
            output_device_name: non_blank(OUTPUT_DEVICE_KEY),
            output_volume: store
                .get(OUTPUT_VOLUME_KEY)
                .map(parse_volume)
                .unwrap_or(DEFAULT_OUTPUT_VOLUME),
            target_system_name: non_blank(TARGET_SYSTEM_KEY),
        }
    }

    pub fn write_to(&self, store: &mut PropertyStore) {
        match &self.output_device_name {
            Some(name) => store.set(OUTPUT_DEVICE_KEY, name.as_str()),
            None => {
                store.remove(OUTPUT_DEVICE_KEY);
            }
        }
        store.set(OUTPUT_VOLUME_KEY, format_volume(self.output_volume));
        match &self.target_system_name {
            Some(name) => store.set(TARGET_SYSTEM_KEY, name.as_str()),
            None => {
                store.remove(TARGET_SYSTEM_KEY);
            }
        }
    }

    /// Clamp-to-range setter used by the volume field.
    pub fn set_output_volume(&mut self, value: f32) {
        self.output_volume = if value.is_finite() {
            value.clamp(MIN_VOLUME, MAX_VOLUME)
        } else {
            DEFAULT_OUTPUT_VOLUME
        };
    }
}

fn format_volume(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i32)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_store_is_empty() {
        let prefs = Preferences::from_store(&PropertyStore::new());
        assert_eq!(prefs, Preferences::default());
        assert_eq!(prefs.output_volume, 22.0);
    }

    #[test]
    fn test_parse_volume_clamps() {
        assert_eq!(parse_volume("40"), 40.0);
        assert_eq!(parse_volume(" 12.5 "), 12.5);
        assert_eq!(parse_volume("-3"), 0.0);
        assert_eq!(parse_volume("250"), 100.0);
        assert_eq!(parse_volume("loud"), 22.0);
        assert_eq!(parse_volume("NaN"), 22.0);
    }

    #[test]
    fn test_read_from_store() {
        let store = PropertyStore::from_pairs([
            (OUTPUT_DEVICE_KEY, "USB Codec"),
            (OUTPUT_VOLUME_KEY, "65"),
            (TARGET_SYSTEM_KEY, "  "),
        ]);
        let prefs = Preferences::from_store(&store);
        assert_eq!(prefs.output_device_name.as_deref(), Some("USB Codec"));
        assert_eq!(prefs.output_volume, 65.0);
        assert_eq!(prefs.target_system_name, None);
    }

    #[test]
    fn test_write_back() {
        let mut store = PropertyStore::from_pairs([(TARGET_SYSTEM_KEY, "KIM-1")]);
        let mut prefs = Preferences::from_store(&store);
        prefs.output_device_name = Some("HDMI".to_string());
        prefs.target_system_name = None;
        prefs.set_output_volume(140.0);
        prefs.write_to(&mut store);

        assert_eq!(store.get(OUTPUT_DEVICE_KEY), Some("HDMI"));
        assert_eq!(store.get(OUTPUT_VOLUME_KEY), Some("100"));
        assert_eq!(store.get(TARGET_SYSTEM_KEY), None);
        assert_eq!(Preferences::from_store(&store), prefs);
    }
}
