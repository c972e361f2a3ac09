// Extension registry
// Maps target-system display names to provider identifiers from flat
// key/value configuration, and turns identifiers into provider instances.

pub mod binary;
pub mod provider;
pub mod registry;
pub mod store;

pub use provider::{
    EncodedAudio, InputReader, InputReaderFactory, Provider, ProviderRegistry, TargetSystem,
    TargetSystemFactory,
};
pub use registry::{ExtensionDescriptor, ExtensionRegistry, NOT_DEFINED};
pub use store::PropertyStore;
