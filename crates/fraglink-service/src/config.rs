//! Service configuration from environment variables.
//!
//! | Variable                   | Default      |
//! |----------------------------|--------------|
//! | `FRAGLINK_TIMEOUT_MS`      | `5000`       |
//! | `FRAGLINK_MEMORY_LIMIT_MB` | `64`         |
//! | `FRAGLINK_MAX_STACK_KB`    | `512`        |
//! | `FRAGLINK_MAX_OUTPUT_KB`   | `1024`       |
//! | `FRAGLINK_MAX_CONCURRENT`  | `4`          |
//! | `FRAGLINK_MODULE_DIR`      | unset        |
//! | `FRAGLINK_HOIST`           | `namespaced` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fraglink_codegen::HoistMode;
use fraglink_sandbox::{ModuleRegistry, SandboxError, SandboxLimits};

pub const TIMEOUT_MS: &str = "FRAGLINK_TIMEOUT_MS";
pub const MEMORY_LIMIT_MB: &str = "FRAGLINK_MEMORY_LIMIT_MB";
pub const MAX_STACK_KB: &str = "FRAGLINK_MAX_STACK_KB";
pub const MAX_OUTPUT_KB: &str = "FRAGLINK_MAX_OUTPUT_KB";
pub const MAX_CONCURRENT: &str = "FRAGLINK_MAX_CONCURRENT";
pub const MODULE_DIR: &str = "FRAGLINK_MODULE_DIR";
pub const HOIST: &str = "FRAGLINK_HOIST";

/// Invalid configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to load modules from {}: {source}", path.display())]
    Modules {
        path: PathBuf,
        #[source]
        source: SandboxError,
    },
}

/// Everything the service needs to run executions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Per-execution sandbox limits.
    pub limits: SandboxLimits,
    /// Upper bound on isolates alive at the same time.
    pub max_concurrent: usize,
    /// Directory of extra `<name>.js` modules to allowlist.
    pub module_dir: Option<PathBuf>,
    /// Hoisting strategy for compiled units.
    pub hoist_mode: HoistMode,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            limits: SandboxLimits::default(),
            max_concurrent: 4,
            module_dir: None,
            hoist_mode: HoistMode::Namespaced,
        }
    }
}

impl ServiceConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns the raw value
    /// of a variable if it is set. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(ms) = parse_positive::<u64>(TIMEOUT_MS, get(TIMEOUT_MS))? {
            config.limits.timeout = Duration::from_millis(ms);
        }
        if let Some(mb) = parse_positive::<usize>(MEMORY_LIMIT_MB, get(MEMORY_LIMIT_MB))? {
            config.limits.memory_limit = scaled(MEMORY_LIMIT_MB, mb, 1024 * 1024)?;
        }
        if let Some(kb) = parse_positive::<usize>(MAX_STACK_KB, get(MAX_STACK_KB))? {
            config.limits.max_stack_size = scaled(MAX_STACK_KB, kb, 1024)?;
        }
        if let Some(kb) = parse_positive::<usize>(MAX_OUTPUT_KB, get(MAX_OUTPUT_KB))? {
            config.limits.max_output_bytes = scaled(MAX_OUTPUT_KB, kb, 1024)?;
        }
        if let Some(n) = parse_positive::<usize>(MAX_CONCURRENT, get(MAX_CONCURRENT))? {
            config.max_concurrent = n;
        }
        if let Some(dir) = get(MODULE_DIR) {
            config.module_dir = Some(PathBuf::from(dir));
        }
        if let Some(mode) = get(HOIST) {
            config.hoist_mode = HoistMode::from_str(mode.trim()).map_err(|reason| {
                ConfigError::Invalid {
                    name: HOIST,
                    value: mode.clone(),
                    reason,
                }
            })?;
        }

        Ok(config)
    }

    /// The module allowlist: the built-ins plus everything in `module_dir`.
    pub fn module_registry(&self) -> Result<ModuleRegistry, ConfigError> {
        let mut modules = ModuleRegistry::with_builtins();
        if let Some(dir) = &self.module_dir {
            let loaded = modules
                .load_dir(dir)
                .map_err(|source| ConfigError::Modules {
                    path: dir.clone(),
                    source,
                })?;
            tracing::info!(dir = %dir.display(), loaded, "loaded sandbox modules");
        }
        Ok(modules)
    }
}

fn parse_positive<T>(name: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value = raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        name,
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            name,
            value: raw,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Some(value))
}

fn scaled(name: &'static str, value: usize, unit: usize) -> Result<usize, ConfigError> {
    value.checked_mul(unit).ok_or_else(|| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: "value is too large".to_string(),
    })
}
