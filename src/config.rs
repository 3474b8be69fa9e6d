//! Service configuration.
//!
//! Deployment-time settings, fixed for the life of the process. Values are
//! layered, highest priority first:
//!
//! 1. `IMGQ_*` environment variables
//! 2. the TOML config file (`imgq.toml` by default, optional)
//! 3. built-in defaults
//!
//! ```toml
//! same_origin = false        # reject url/overlay targets on another origin
//! max_ops = 10               # operations per request, nested images included
//! max_depth = 8              # nested same-origin resolutions per request
//! show_stack_on_err = false  # include diagnostic detail in 500 bodies
//! # max_processes = 4        # render workers (omit for auto = CPU cores)
//! ```
//!
//! Run `imgq gen-config` for the documented template.

use confique::Config;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config load error: {0}")]
    Load(#[from] confique::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Deployment-time configuration.
#[derive(Config, Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Reject `url` and overlay targets whose origin differs from the
    /// request's own origin.
    #[config(env = "IMGQ_SAME_ORIGIN", default = false)]
    pub same_origin: bool,

    /// Maximum number of operations per request, counted across the request
    /// and every same-origin image nested in it.
    #[config(env = "IMGQ_MAX_OPS", default = 10)]
    pub max_ops: u32,

    /// Maximum nesting of same-origin image references.
    #[config(env = "IMGQ_MAX_DEPTH", default = 8)]
    pub max_depth: u32,

    /// Include error detail in the body of internal-error responses.
    #[config(env = "IMGQ_SHOW_STACK_ON_ERR", default = false)]
    pub show_stack_on_err: bool,

    /// Maximum number of parallel render workers. Defaults to the number of
    /// CPU cores; larger values are clamped down.
    #[config(env = "IMGQ_MAX_PROCESSES")]
    pub max_processes: Option<usize>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            same_origin: false,
            max_ops: 10,
            max_depth: 8,
            show_stack_on_err: false,
            max_processes: None,
        }
    }
}

impl ServiceConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_ops == 0 {
            return Err(ConfigError::Validation("max_ops must be at least 1".into()));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::Validation(
                "max_depth must be at least 1".into(),
            ));
        }
        if self.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Load config from the environment layered over `path`, then validate.
///
/// A missing file is not an error; defaults fill in.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let config = ServiceConfig::builder().env().file(path).load()?;
    config.validate()?;
    Ok(config)
}

/// Load from a file only, ignoring the environment.
pub fn load_config_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let config = ServiceConfig::builder().file(path).load()?;
    config.validate()?;
    Ok(config)
}

/// The documented TOML template, used by `imgq gen-config`.
pub fn config_template() -> String {
    confique::toml::template::<ServiceConfig>(confique::toml::FormatOptions::default())
}

/// Resolve the effective worker count.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ServiceConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}
