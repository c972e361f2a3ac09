// Tonelink - sends programs to retro hardware as audio
// Module declarations
pub mod audio;
pub mod error;
pub mod extensions;
pub mod logging;
pub mod settings;
pub mod state;
pub mod task;

pub use audio::{OutputDeviceCatalog, SoundPlayer};
pub use error::{ConfigError, DeviceError, ExtensionLoadError, TaskError, ValidationError};
pub use extensions::{ExtensionRegistry, PropertyStore, ProviderRegistry, NOT_DEFINED};
pub use state::{AppState, Transfer};
pub use task::{BackgroundTask, RunState, StatusChannel, Task, TaskEvent};
