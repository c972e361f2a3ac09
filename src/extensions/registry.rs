// Target system lookup over two layered property stores
//
// Key scheme in either store:
//   <id>.name         display name of a target system
//   <id>.provider     identifier of its target system provider
//   <id>.inputFormat  identifier of its input reader provider

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::extensions::store::PropertyStore;

/// Returned instead of an error when a lookup finds nothing.
pub const NOT_DEFINED: &str = "Not defined";

const NAME_SUFFIX: &str = ".name";
const PROVIDER_SUFFIX: &str = ".provider";
const INPUT_FORMAT_SUFFIX: &str = ".inputFormat";

/// One target system entry, derived from the stores on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionDescriptor {
    pub id: String,
    pub name: String,
    pub provider: Option<String>,
    pub input_format: Option<String>,
}

pub struct ExtensionRegistry {
    defaults: PropertyStore,
    extensions: PropertyStore,
}

impl ExtensionRegistry {
    pub fn new(defaults: PropertyStore, extensions: PropertyStore) -> Self {
        Self {
            defaults,
            extensions,
        }
    }

    pub fn defaults(&self) -> &PropertyStore {
        &self.defaults
    }

    pub fn defaults_mut(&mut self) -> &mut PropertyStore {
        &mut self.defaults
    }

    pub fn extensions(&self) -> &PropertyStore {
        &self.extensions
    }

    /// Swap in new configuration. Only meant for reconfiguration, never
    /// while a transfer is running.
    pub fn reload(&mut self, defaults: PropertyStore, extensions: PropertyStore) {
        debug!(
            "reloading registry: {} defaults, {} extension keys",
            defaults.len(),
            extensions.len()
        );
        self.defaults = defaults;
        self.extensions = extensions;
    }

    /// Value of `key`, extensions first.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).or_else(|| self.defaults.get(key))
    }

    /// All entries in scan order: extensions, then defaults, each by key.
    /// Keys present in both stores are only yielded from extensions.
    fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.extensions.iter().chain(
            self.defaults
                .iter()
                .filter(|(key, _)| !self.extensions.contains_key(key)),
        )
    }

    /// Display names of every configured target system, ascending.
    pub fn list_target_system_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries()
            .filter(|(key, _)| key.ends_with(NAME_SUFFIX))
            .map(|(_, value)| value.to_string())
            .collect();
        names.sort();
        names
    }

    /// Id of the first target system whose display name is `display_name`.
    fn find_id(&self, display_name: &str) -> Option<&str> {
        self.entries()
            .find(|(key, value)| key.ends_with(NAME_SUFFIX) && *value == display_name)
            .map(|(key, _)| &key[..key.len() - NAME_SUFFIX.len()])
    }

    fn resolve(&self, display_name: &str, suffix: &str) -> String {
        let resolved = self
            .find_id(display_name)
            .and_then(|id| self.get(&format!("{}{}", id, suffix)));

        match resolved {
            Some(value) => value.to_string(),
            None => {
                debug!("no {} entry for {:?}", suffix, display_name);
                NOT_DEFINED.to_string()
            }
        }
    }

    /// Provider identifier of the target system factory, or [`NOT_DEFINED`].
    pub fn resolve_target_provider(&self, display_name: &str) -> String {
        self.resolve(display_name, PROVIDER_SUFFIX)
    }

    /// Provider identifier of the input reader factory, or [`NOT_DEFINED`].
    pub fn resolve_reader_provider(&self, display_name: &str) -> String {
        self.resolve(display_name, INPUT_FORMAT_SUFFIX)
    }

    pub fn descriptor(&self, id: &str) -> Option<ExtensionDescriptor> {
        let name = self.get(&format!("{}{}", id, NAME_SUFFIX))?;
        Some(ExtensionDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            provider: self
                .get(&format!("{}{}", id, PROVIDER_SUFFIX))
                .map(str::to_string),
            input_format: self
                .get(&format!("{}{}", id, INPUT_FORMAT_SUFFIX))
                .map(str::to_string),
        })
    }

    /// Every target system, keyed by id.
    pub fn descriptors(&self) -> BTreeMap<String, ExtensionDescriptor> {
        self.entries()
            .filter_map(|(key, _)| key.strip_suffix(NAME_SUFFIX))
            .filter_map(|id| self.descriptor(id).map(|d| (id.to_string(), d)))
            .collect()
    }
}
