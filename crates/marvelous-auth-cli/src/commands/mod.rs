//! CLI command implementations.

pub mod config;
pub mod hash;
pub mod registry;
pub mod serve;
pub mod status;

pub use config::run_config;
pub use hash::run_hash_password;
pub use registry::run_registry;
pub use serve::run_serve;
pub use status::run_status;

use std::path::Path;

use marvelous_auth_core::Config;

/// Load configuration from `path`, or the default location when absent.
///
/// Environment overrides apply in both cases.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::load_default()?);
    };

    let mut config = Config::load(path)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
