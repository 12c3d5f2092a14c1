//! Configuration loader with multi-source merging

use crate::{ConfigFiles, DiveConfig, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Variables read without the prefix, for compatibility with the
/// deployment environment.
const BARE_OVERRIDES: &[(&str, &str)] = &[("KAS_URL", "instance.kas_url"), ("OPA_URL", "opa.url")];

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    /// Replaces the process environment when set.
    env: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "DIVE".to_string(),
            env: None,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "DIVE")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Reads variables from `vars` instead of the process environment.
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    fn var(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(vars) => vars.get(name).cloned(),
            None => env::var(name).ok(),
        }
        .filter(|value| !value.trim().is_empty())
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<DiveConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = DiveConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2-4. ~/.config/dive/config.toml, dive.toml, dive.local.toml
        let files = ConfigFiles::discover(&self.project_dir);
        for file in files.existing() {
            builder = builder.add_source(
                config::File::from(file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (DIVE_OPA__URL, DIVE_CACHE__TTL_SECS, ...)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(self.env.clone()),
        );

        // 6. KAS_URL / OPA_URL
        for (name, key) in BARE_OVERRIDES {
            if let Some(value) = self.var(name) {
                builder = builder.set_override(*key, value)?;
            }
        }

        let dive_config: DiveConfig = builder.build()?.try_deserialize()?;
        dive_config.validate()?;
        Ok(dive_config)
    }

    /// Load configuration or return defaults if anything fails
    pub fn load_or_default(self) -> DiveConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
