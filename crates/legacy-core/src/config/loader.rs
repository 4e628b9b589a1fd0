//! Configuration loading.
//!
//! Sources, first match wins:
//! 1. the `--config-file` path (JSON or YAML, picked by extension), if it exists
//! 2. the `CONFIG` environment variable holding JSON (`.env` is loaded first)
//!
//! The selected source is then overlaid with `LEGACY__`-prefixed environment
//! variables, `__` separating nested keys (e.g. `LEGACY__STORAGE__PATH`).

use ::config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

use super::{AppConfig, ConfigError};

pub const CONFIG_ENV_VAR: &str = "CONFIG";
pub const ENV_PREFIX: &str = "LEGACY";

/// Load and validate configuration the way the CLI does.
pub fn load_config(config_file: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = config_file {
        loader = loader.config_file(path);
    }
    loader.load()
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    inline_json: Option<String>,
    env_var: String,
    env_prefix: String,
    dotenv: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_file: None,
            inline_json: None,
            env_var: CONFIG_ENV_VAR.to_string(),
            env_prefix: ENV_PREFIX.to_string(),
            dotenv: true,
        }
    }

    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// JSON used instead of reading the `CONFIG` variable.
    pub fn inline_json(mut self, json: impl Into<String>) -> Self {
        self.inline_json = Some(json.into());
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn without_dotenv(mut self) -> Self {
        self.dotenv = false;
        self
    }

    pub fn load(self) -> Result<AppConfig, ConfigError> {
        let mut builder = Config::builder();

        match self.config_file.as_deref().filter(|path| path.exists()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading configuration file");
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Some(path) = &self.config_file {
                    tracing::warn!(path = %path.display(), "configuration file not found, falling back to environment");
                }
                let json = match self.inline_json {
                    Some(json) => json,
                    None => {
                        if self.dotenv {
                            // a missing .env file is fine
                            let _ = dotenvy::dotenv();
                        }
                        std::env::var(&self.env_var).map_err(|_| ConfigError::NotFound(self.env_var.clone()))?
                    }
                };
                builder = builder.add_source(File::from_str(&json, FileFormat::Json));
            }
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let app: AppConfig = cfg.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
