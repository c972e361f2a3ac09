// Error taxonomy
// Caller mistakes are raised synchronously; failures inside a running task
// travel through the status channel instead.

use thiserror::Error;

/// Invalid caller input, rejected before any work starts.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("output gain {0} is outside 0..=100")]
    GainOutOfRange(f32),

    #[error("sample buffer is empty or missing")]
    MissingBuffer,

    #[error("sample rate must be positive")]
    InvalidSampleRate,
}

/// A provider identifier that could not be turned into a working provider.
#[derive(Debug, Error)]
pub enum ExtensionLoadError {
    #[error("provider identifier is blank")]
    BlankIdentifier,

    #[error("provider {0:?} is not registered")]
    NotFound(String),

    #[error("provider {id:?} could not be constructed: {source}")]
    Construction {
        id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("provider {id:?} does not implement {expected}")]
    CapabilityMismatch { id: String, expected: &'static str },
}

/// The output line could not be opened or driven.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("output device {name:?} is unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    #[error("output line has no gain control")]
    NoGainControl,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task is already bound to an executor")]
    IllegalState,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}

/// Loading or saving a property store failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
