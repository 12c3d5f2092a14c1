//! Configuration management for DIVE
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. `KAS_URL` / `OPA_URL` (highest precedence)
//! 2. Environment variables (`DIVE_*` prefix, `__` between section and key)
//! 3. dive.local.toml (gitignored, local overrides)
//! 4. dive.toml (instance config)
//! 5. ~/.config/dive/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use dive_abac::BilateralTrust;
use dive_abac::pdp::DEFAULT_DECISION_PATH;
use dive_kas::ExternalKasConfig;
use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;
pub use paths::{ConfigFiles, INSTANCE_FILE, LOCAL_FILE, user_config_dir};

/// Main DIVE instance configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiveConfig {
    pub instance: InstanceConfig,
    pub opa: OpaConfig,
    pub cache: CacheConfig,
    pub federation: FederationConfig,
    pub trust: TrustConfig,
    pub kas: KasConfig,
}

/// Identity of this instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Instance code, e.g. `USA`.
    pub id: String,
    pub country: String,
    /// Local KAS URL; KAOs pointing elsewhere are external.
    pub kas_url: Option<String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            id: "USA".to_string(),
            country: "USA".to_string(),
            kas_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpaConfig {
    pub url: String,
    pub decision_path: String,
    pub timeout_ms: u64,
}

impl Default for OpaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8181".to_string(),
            decision_path: DEFAULT_DECISION_PATH.to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl OpaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            capacity: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// A partner instance reachable for federated search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEntry {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    pub api_url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    pub instances: Vec<InstanceEntry>,
    /// Budget for a single instance's search call.
    pub query_timeout_ms: u64,
    /// Budget for a whole fan-out.
    pub deadline_ms: u64,
    pub max_concurrency: usize,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            instances: Vec::new(),
            query_timeout_ms: 10_000,
            deadline_ms: 30_000,
            max_concurrency: 8,
        }
    }
}

impl FederationConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Match trust records in both directions.
    pub symmetric: bool,
    pub bilateral: Vec<BilateralTrust>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            symmetric: true,
            bilateral: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KasConfig {
    pub external: Vec<ExternalKasConfig>,
}

impl DiveConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific instance directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Rejects values that would make the instance unusable.
    pub fn validate(&self) -> Result<()> {
        fn invalid(message: String) -> ConfigError {
            ConfigError::ValidationError(message)
        }

        if self.instance.id.trim().is_empty() {
            return Err(invalid("instance.id must not be empty".to_string()));
        }
        if self.cache.capacity == 0 {
            return Err(invalid("cache.capacity must be greater than zero".to_string()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(invalid("cache.ttl_secs must be greater than zero".to_string()));
        }
        if self.opa.timeout_ms == 0 {
            return Err(invalid("opa.timeout_ms must be greater than zero".to_string()));
        }
        if self.federation.query_timeout_ms == 0 || self.federation.deadline_ms == 0 {
            return Err(invalid("federation timeouts must be greater than zero".to_string()));
        }
        if self.federation.max_concurrency == 0 {
            return Err(invalid(
                "federation.max_concurrency must be greater than zero".to_string(),
            ));
        }

        let mut codes = HashSet::new();
        for entry in &self.federation.instances {
            if !codes.insert(entry.code.to_ascii_uppercase()) {
                return Err(invalid(format!("duplicate federation instance '{}'", entry.code)));
            }
        }

        let mut known = codes;
        known.insert(self.instance.id.to_ascii_uppercase());
        for trust in &self.trust.bilateral {
            for side in [&trust.instance_a, &trust.instance_b] {
                if !known.contains(&side.to_ascii_uppercase()) {
                    return Err(invalid(format!(
                        "bilateral trust {} <-> {} names unknown instance '{side}'",
                        trust.instance_a, trust.instance_b
                    )));
                }
            }
        }

        let mut kas_ids = HashSet::new();
        for kas in &self.kas.external {
            if !kas_ids.insert(kas.kas_id.as_str()) {
                return Err(invalid(format!("duplicate external KAS '{}'", kas.kas_id)));
            }
            if kas.timeout_ms == 0 {
                return Err(invalid(format!("KAS '{}' timeout_ms must be greater than zero", kas.kas_id)));
            }
        }

        Ok(())
    }

    /// Renders the configuration as TOML. Secrets print as `[REDACTED]`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::RenderError(e.to_string()))
    }
}
