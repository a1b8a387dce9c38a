//! Settings and the YAML-backed route and API key tables.
//!
//! `models.yaml` maps public model names to backend instances:
//!
//! ```yaml
//! models:
//!   llama3:
//!     host: localhost
//!     port: 11434
//!     model: llama3:8b
//!     timeout: 30
//! ```
//!
//! `keys.yaml` maps presented credentials to key records:
//!
//! ```yaml
//! keys:
//!   sk-example:
//!     name: alice
//!     enabled: true
//! ```
//!
//! Both tables are loaded once at startup and shared read-only with every
//! request task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::RouteError;

/// Process settings, overridable via CLI flags or `OLLAMUX_*` environment
/// variables (a `.env` file is honored, see `util::init_tracing`).
#[derive(Debug, Clone, Parser)]
#[command(name = "ollamux", version, about = "OpenAI-compatible gateway for Ollama backends")]
pub struct Settings {
    /// Address the HTTP server binds to.
    #[arg(long, env = "OLLAMUX_BIND", default_value = "0.0.0.0:8000")]
    pub bind: String,

    /// Directory containing the YAML configuration files.
    #[arg(long, env = "OLLAMUX_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Models configuration file name inside the config directory.
    #[arg(long, env = "OLLAMUX_MODELS_FILE", default_value = "models.yaml")]
    pub models_file: String,

    /// API keys configuration file name inside the config directory.
    #[arg(long, env = "OLLAMUX_KEYS_FILE", default_value = "keys.yaml")]
    pub keys_file: String,

    /// "*" or a comma-separated list of allowed CORS origins.
    #[arg(long, env = "OLLAMUX_CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Tracing filter used when RUST_LOG is not set.
    #[arg(long, env = "OLLAMUX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Settings {
    pub fn models_path(&self) -> PathBuf {
        self.config_dir.join(&self.models_file)
    }

    pub fn keys_path(&self) -> PathBuf {
        self.config_dir.join(&self.keys_file)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_stall_timeout() -> u64 {
    300
}

fn default_quota() -> String {
    "unlimited".to_string()
}

fn default_true() -> bool {
    true
}

/// One backend binding: a public model name routed to a specific Ollama
/// instance. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRoute {
    /// Public model name; filled from the YAML map key on load.
    #[serde(skip)]
    pub name: String,

    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,

    /// Model identifier the backend itself understands (e.g. "llama3:8b").
    pub model: String,

    /// Quantization label, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quant: Option<String>,

    /// Deadline in seconds for the backend to start responding.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Accepted for config compatibility; the connector never retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Maximum seconds a streaming backend may go silent between chunks
    /// before the stream is terminated with an error frame.
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout: u64,
}

impl ModelRoute {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ModelsFile {
    #[serde(default)]
    models: HashMap<String, ModelRoute>,
}

/// Read-only mapping from public model name to backend route.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    routes: HashMap<String, ModelRoute>,
}

impl RouteTable {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading models config {}", path.display()))?;
        let file: ModelsFile = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing models config {}", path.display()))?;

        let mut routes = HashMap::new();
        for (name, mut route) in file.models {
            route.name = name.clone();
            routes.insert(name, route);
        }
        Ok(Self { routes })
    }

    pub fn from_routes(list: Vec<ModelRoute>) -> Self {
        let routes = list.into_iter().map(|r| (r.name.clone(), r)).collect();
        Self { routes }
    }

    /// Exact, case-sensitive lookup. The miss payload carries the live list
    /// of configured model names.
    pub fn resolve(&self, model: &str) -> Result<&ModelRoute, RouteError> {
        self.routes.get(model).ok_or_else(|| RouteError::NotFound {
            model: model.to_string(),
            known: self.model_names(),
        })
    }

    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelRoute> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// One API key record from `keys.yaml`. The presented credential is the YAML
/// map key; a disabled record makes the key unusable regardless of existence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// Human-readable name, used only in logs.
    pub name: String,
    /// Reserved for quota enforcement; currently inert.
    #[serde(default = "default_quota")]
    pub quota: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
struct KeysFile {
    #[serde(default)]
    keys: HashMap<String, ApiKeyRecord>,
}

/// Read-only mapping from presented credential to key record.
#[derive(Debug, Default, Clone)]
pub struct ApiKeyTable {
    keys: HashMap<String, ApiKeyRecord>,
}

impl ApiKeyTable {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading keys config {}", path.display()))?;
        let file: KeysFile = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing keys config {}", path.display()))?;
        Ok(Self { keys: file.keys })
    }

    pub fn from_records(records: Vec<(String, ApiKeyRecord)>) -> Self {
        Self {
            keys: records.into_iter().collect(),
        }
    }

    pub fn lookup(&self, presented: &str) -> Option<&ApiKeyRecord> {
        self.keys.get(presented)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
