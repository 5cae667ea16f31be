//! Logging bootstrap.
//!
//! The engine only emits `tracing` events; applications that do not
//! install their own subscriber can call [`init`].

use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"portico=debug"`).
///
/// Returns `false` if a global subscriber was already set; calling it
/// more than once is harmless.
pub fn init(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(default_directive, "Logging initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let _ = init("portico=debug");
        assert!(!init("portico=trace"));
    }
}
