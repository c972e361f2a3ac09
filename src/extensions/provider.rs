// Provider capabilities and the registry that constructs them by identifier
//
// Providers are registered at startup under the identifier used in the
// extension catalog (`<id>.provider` / `<id>.inputFormat` values).

use std::collections::HashMap;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::error::ExtensionLoadError;
use crate::extensions::binary::{RawBinaryReaderFactory, RAW_BINARY_READER_ID};
use crate::extensions::store::PropertyStore;

/// Sample buffer produced by a target system encoder, in the player's
/// 8-bit signed mono format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    pub sample_rate: u32,
    pub samples: Vec<u8>,
}

/// Encodes a payload into tones the target hardware understands.
pub trait TargetSystem: Send {
    fn encode(&mut self, payload: &[u8]) -> anyhow::Result<EncodedAudio>;
}

pub trait TargetSystemFactory: Send + Sync {
    fn display_name(&self) -> &str;

    fn create(&self) -> anyhow::Result<Box<dyn TargetSystem>>;

    /// Provider-specific settings, if it keeps any.
    fn extension_state(&self) -> Option<&PropertyStore> {
        None
    }
}

/// Turns an input file into the raw payload to transmit.
pub trait InputReader: Send {
    fn read(&mut self, source: &mut dyn Read) -> anyhow::Result<Vec<u8>>;
}

pub trait InputReaderFactory: Send + Sync {
    fn format_name(&self) -> &str;

    /// File extensions (without dot) this reader accepts.
    fn file_extensions(&self) -> &[&str];

    fn create(&self) -> Box<dyn InputReader>;

    fn extension_state(&self) -> Option<&PropertyStore> {
        None
    }
}

/// A constructed provider, one of the two capabilities.
pub enum Provider {
    Target(Box<dyn TargetSystemFactory>),
    Reader(Box<dyn InputReaderFactory>),
}

impl Provider {
    pub fn capability(&self) -> &'static str {
        match self {
            Provider::Target(_) => TARGET_CAPABILITY,
            Provider::Reader(_) => READER_CAPABILITY,
        }
    }
}

const TARGET_CAPABILITY: &str = "target system factory";
const READER_CAPABILITY: &str = "input reader factory";

type Constructor = Box<dyn Fn() -> anyhow::Result<Provider> + Send + Sync>;

/// Identifier → zero-argument constructor.
#[derive(Default)]
pub struct ProviderRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the providers that ship with the crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_reader::<RawBinaryReaderFactory>(RAW_BINARY_READER_ID);
        registry
    }

    /// Register a constructor; a later registration under the same identifier wins.
    pub fn register<F>(&mut self, id: impl Into<String>, constructor: F)
    where
        F: Fn() -> anyhow::Result<Provider> + Send + Sync + 'static,
    {
        let id = id.into();
        if self.constructors.contains_key(&id) {
            warn!("provider {:?} registered twice, keeping the last one", id);
        }
        debug!("registered provider {:?}", id);
        self.constructors.insert(id, Box::new(constructor));
    }

    pub fn register_target<T>(&mut self, id: impl Into<String>)
    where
        T: TargetSystemFactory + Default + 'static,
    {
        self.register(id, || Ok(Provider::Target(Box::new(T::default()))));
    }

    pub fn register_reader<T>(&mut self, id: impl Into<String>)
    where
        T: InputReaderFactory + Default + 'static,
    {
        self.register(id, || Ok(Provider::Reader(Box::new(T::default()))));
    }

    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.constructors.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Construct the provider registered under `id`.
    pub fn instantiate(&self, id: &str) -> Result<Provider, ExtensionLoadError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ExtensionLoadError::BlankIdentifier);
        }
        let constructor = self
            .constructors
            .get(id)
            .ok_or_else(|| ExtensionLoadError::NotFound(id.to_string()))?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| constructor()));
        let source: Box<dyn std::error::Error + Send + Sync> = match outcome {
            Ok(Ok(provider)) => return Ok(provider),
            Ok(Err(e)) => e.into(),
            Err(_) => "constructor panicked".into(),
        };
        warn!("provider {:?} could not be constructed: {}", id, source);
        Err(ExtensionLoadError::Construction {
            id: id.to_string(),
            source,
        })
    }

    pub fn instantiate_target(
        &self,
        id: &str,
    ) -> Result<Box<dyn TargetSystemFactory>, ExtensionLoadError> {
        match self.instantiate(id)? {
            Provider::Target(factory) => Ok(factory),
            Provider::Reader(_) => Err(ExtensionLoadError::CapabilityMismatch {
                id: id.trim().to_string(),
                expected: TARGET_CAPABILITY,
            }),
        }
    }

    pub fn instantiate_reader(
        &self,
        id: &str,
    ) -> Result<Box<dyn InputReaderFactory>, ExtensionLoadError> {
        match self.instantiate(id)? {
            Provider::Reader(factory) => Ok(factory),
            Provider::Target(_) => Err(ExtensionLoadError::CapabilityMismatch {
                id: id.trim().to_string(),
                expected: READER_CAPABILITY,
            }),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::SquareWaveFactory;
    use super::*;

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::with_builtin();
        registry.register_target::<SquareWaveFactory>("target.SquareWave");
        registry.register("target.Broken", || anyhow::bail!("missing firmware table"));
        registry.register("target.Panicky", || panic!("constructor blew up"));
        registry
    }

    #[test]
    fn test_unknown_identifier() {
        assert!(matches!(
            registry().instantiate("does.not.Exist"),
            Err(ExtensionLoadError::NotFound(id)) if id == "does.not.Exist"
        ));
    }

    #[test]
    fn test_blank_identifier() {
        assert!(matches!(
            registry().instantiate("   "),
            Err(ExtensionLoadError::BlankIdentifier)
        ));
        assert!(matches!(
            registry().instantiate(""),
            Err(ExtensionLoadError::BlankIdentifier)
        ));
    }

    #[test]
    fn test_construction_failure() {
        let registry = registry();
        assert!(matches!(
            registry.instantiate("target.Broken"),
            Err(ExtensionLoadError::Construction { .. })
        ));
        assert!(matches!(
            registry.instantiate("target.Panicky"),
            Err(ExtensionLoadError::Construction { .. })
        ));
    }

    #[test]
    fn test_capability_checks() {
        let registry = registry();

        let target = registry.instantiate_target("target.SquareWave").unwrap();
        assert_eq!(target.display_name(), "Square Wave");
        assert!(target.extension_state().is_none());

        let reader = registry.instantiate_reader(RAW_BINARY_READER_ID).unwrap();
        assert_eq!(reader.format_name(), "Raw binary");

        assert!(matches!(
            registry.instantiate_reader("target.SquareWave"),
            Err(ExtensionLoadError::CapabilityMismatch { expected, .. }) if expected == READER_CAPABILITY
        ));
        assert!(matches!(
            registry.instantiate_target(RAW_BINARY_READER_ID),
            Err(ExtensionLoadError::CapabilityMismatch { expected, .. }) if expected == TARGET_CAPABILITY
        ));
    }

    #[test]
    fn test_identifier_is_trimmed() {
        let provider = registry().instantiate("  target.SquareWave ").unwrap();
        assert_eq!(provider.capability(), TARGET_CAPABILITY);
    }

    #[test]
    fn test_identifiers_sorted() {
        assert_eq!(
            registry().identifiers(),
            vec![
                RAW_BINARY_READER_ID.to_string(),
                "target.Broken".to_string(),
                "target.Panicky".to_string(),
                "target.SquareWave".to_string(),
            ]
        );
    }

    #[test]
    fn test_encoder_output() {
        let factory = SquareWaveFactory;
        let mut target = factory.create().unwrap();
        let audio = target.encode(&[1, 2]).unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.samples, vec![0x7f, 0x7f, 0, 0, 0x81, 0x81, 0, 0]);
    }
}
