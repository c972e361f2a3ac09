// Logging setup

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Filters come from `RUST_LOG`, defaulting to
/// `info`. Calling this again is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init();
        init();
        tracing::info!("still logging");
    }
}
