// Application state management
// Wires the device catalog, the extension configuration and the provider
// registry together, and turns a payload into a running transfer.

use anyhow::{bail, Context};
use parking_lot::{RwLock, RwLockReadGuard};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::audio::catalog::OutputDeviceCatalog;
use crate::audio::format::AudioFormat;
use crate::audio::player::{PlayerControls, SoundPlayer};
use crate::extensions::provider::ProviderRegistry;
use crate::extensions::registry::{ExtensionRegistry, NOT_DEFINED};
use crate::extensions::store::PropertyStore;
use crate::settings::Preferences;
use crate::task::runner::Task;
use crate::task::status::StatusChannel;

/// A transfer that has been set up, and possibly started.
pub struct Transfer {
    pub task: Task<SoundPlayer>,
    /// Live gain and stop controls for the player inside `task`.
    pub controls: PlayerControls,
}

pub struct AppState {
    pub catalog: OutputDeviceCatalog,
    pub providers: ProviderRegistry,
    registry: RwLock<ExtensionRegistry>,
    defaults_path: Option<PathBuf>,
}

impl AppState {
    pub fn new(
        catalog: OutputDeviceCatalog,
        registry: ExtensionRegistry,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            catalog,
            providers,
            registry: RwLock::new(registry),
            defaults_path: None,
        }
    }

    /// Enumerate the machine's devices and read both property files.
    /// Preferences saved later go back to `defaults_path`.
    pub fn load(
        defaults_path: &Path,
        extensions_path: &Path,
        providers: ProviderRegistry,
    ) -> anyhow::Result<Self> {
        let defaults = PropertyStore::load(defaults_path)?;
        let extensions = PropertyStore::load(extensions_path)?;
        let mut state = Self::new(
            OutputDeviceCatalog::new(),
            ExtensionRegistry::new(defaults, extensions),
            providers,
        );
        state.defaults_path = Some(defaults_path.to_path_buf());
        Ok(state)
    }

    pub fn registry(&self) -> RwLockReadGuard<'_, ExtensionRegistry> {
        self.registry.read()
    }

    /// Replace the configuration. Transfers already running keep the
    /// providers they were built with.
    pub fn reconfigure(&self, defaults: PropertyStore, extensions: PropertyStore) {
        self.registry.write().reload(defaults, extensions);
    }

    pub fn preferences(&self) -> Preferences {
        Preferences::from_store(self.registry.read().defaults())
    }

    pub fn save_preferences(&self, preferences: &Preferences) -> anyhow::Result<()> {
        let mut registry = self.registry.write();
        preferences.write_to(registry.defaults_mut());
        if let Some(path) = &self.defaults_path {
            registry.defaults().save(path)?;
            info!("preferences saved to {:?}", path);
        }
        Ok(())
    }

    /// Read an input file with the reader configured for `target_name`.
    pub fn read_payload(&self, target_name: &str, source: &mut dyn Read) -> anyhow::Result<Vec<u8>> {
        let reader_id = self.registry.read().resolve_reader_provider(target_name);
        if reader_id == NOT_DEFINED {
            bail!("no input format configured for {:?}", target_name);
        }
        let factory = self.providers.instantiate_reader(&reader_id)?;
        factory
            .create()
            .read(source)
            .with_context(|| format!("{} reader failed", factory.format_name()))
    }

    /// Encode `payload` for `target_name` and bind it to a player on
    /// `device_name`. Nothing is opened or played yet.
    pub fn prepare_transfer(
        &self,
        target_name: &str,
        device_name: &str,
        payload: &[u8],
    ) -> anyhow::Result<Transfer> {
        let provider_id = self.registry.read().resolve_target_provider(target_name);
        if provider_id == NOT_DEFINED {
            bail!("no target system provider configured for {:?}", target_name);
        }
        let factory = self.providers.instantiate_target(&provider_id)?;
        let encoded = factory
            .create()?
            .encode(payload)
            .with_context(|| format!("{} could not encode the payload", factory.display_name()))?;

        let device = match self.catalog.get_by_name(device_name) {
            Some(device) => device,
            None => {
                error!(device = %device_name, "output device not found");
                bail!("output device {:?} not found", device_name);
            }
        };
        let line = device.open_line()?;
        let format = AudioFormat::new(encoded.sample_rate)?;

        let mut player = SoundPlayer::new(line, format);
        player.set_buffer(encoded.samples)?;
        player.set_initial_gain(self.preferences().output_volume)?;
        let controls = player.controls();

        info!(
            target = %factory.display_name(),
            device = %device_name,
            bytes = payload.len(),
            "transfer prepared"
        );
        Ok(Transfer {
            task: Task::new(format!("transfer to {}", target_name), player),
            controls,
        })
    }

    /// Prepare a transfer and start it in the background, reporting to `listener`.
    pub fn start_transfer(
        &self,
        target_name: &str,
        device_name: &str,
        payload: &[u8],
        listener: Arc<dyn StatusChannel>,
    ) -> anyhow::Result<Transfer> {
        let transfer = self.prepare_transfer(target_name, device_name, payload)?;
        transfer.task.set_status_channel(listener);
        transfer.task.execute()?;
        Ok(transfer)
    }
}
