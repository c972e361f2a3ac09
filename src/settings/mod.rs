// Settings management
// User preferences live in the "defaults" property store.

pub mod preferences;

pub use preferences::Preferences;
