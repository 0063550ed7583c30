//! Multi-source config loading.
//!
//! Priority, highest first: environment variables, the YAML file, defaults.

use std::path::{Path, PathBuf};

use crate::error::{GraphError, Result};

use super::schema::AppConfig;

pub const ENV_DB_PATH: &str = "CALLGRAPH_DB_PATH";
pub const ENV_POOL_SIZE: &str = "CALLGRAPH_POOL_SIZE";
pub const ENV_BIND: &str = "CALLGRAPH_BIND";

/// Load configuration from `path` (if it exists) and apply env overrides.
///
/// A missing file is not an error; an unreadable or malformed one is.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut config = match path {
        Some(p) if p.exists() => {
            let text = std::fs::read_to_string(p)?;
            serde_yaml::from_str(&text)
                .map_err(|e| GraphError::Config(format!("{}: {}", p.display(), e)))?
        }
        Some(p) => {
            tracing::debug!("config file {} not found, using defaults", p.display());
            AppConfig::default()
        }
        None => AppConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Apply overrides from a variable lookup. Split out so tests don't touch
/// the process environment.
fn apply_env_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(path) = lookup(ENV_DB_PATH) {
        config.store.path = PathBuf::from(path);
    }
    if let Some(size) = lookup(ENV_POOL_SIZE) {
        config.store.pool_size = size
            .trim()
            .parse()
            .map_err(|_| GraphError::Config(format!("{ENV_POOL_SIZE}: not a number: {size}")))?;
    }
    if let Some(bind) = lookup(ENV_BIND) {
        config.server.bind = bind;
    }
    Ok(())
}
