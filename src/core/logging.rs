//! Logging initialization

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG, e.g. `RUST_LOG=strata=trace` to see
/// per-refinement statistics.
///
/// # Example
/// ```
/// strata::core::logging::init();
/// log::info!("Terrain viewer started");
/// ```
pub fn init() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();
}
