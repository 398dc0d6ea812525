use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use shoal_core::config::RuntimeConfig;

/// Validated process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port, kept as the single string the process interface takes;
    /// the listener builder validates it.
    pub listen: String,
    pub runtime: RuntimeConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub root: PathBuf,
    pub index_file: String,
    pub spa_fallback: bool,
}

/// On-disk shape of the config file. Everything is optional; defaults
/// produce a working server on port 8080 fronting `./public`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct UserConfig {
    listen: Option<String>,
    runtime: Option<RuntimeConfig>,
    #[serde(default)]
    server: ServerUserConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerUserConfig {
    root: Option<PathBuf>,
    index_file: Option<String>,
    spa_fallback: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        UserConfig::default().into()
    }
}

impl From<UserConfig> for Config {
    fn from(user: UserConfig) -> Self {
        Self {
            listen: user.listen.unwrap_or_else(|| "8080".to_string()),
            runtime: user.runtime.unwrap_or_default(),
            server: ServerConfig {
                root: user.server.root.unwrap_or_else(|| PathBuf::from("./public")),
                index_file: user
                    .server
                    .index_file
                    .unwrap_or_else(|| "index.html".to_string()),
                spa_fallback: user.server.spa_fallback.unwrap_or(true),
            },
        }
    }
}

impl Config {
    /// Loads TOML or JSON, decided by the file extension; anything not
    /// `.json` is treated as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let user: UserConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw)
                .with_context(|| format!("parsing {} as JSON", path.display()))?,
            _ => toml::from_str(&raw)
                .with_context(|| format!("parsing {} as TOML", path.display()))?,
        };
        let config: Config = user.into();
        if config.runtime.workers == 0 {
            bail!("runtime.workers must be at least 1");
        }
        Ok(config)
    }
}
