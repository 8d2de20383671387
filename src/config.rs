//! Syncer configuration
//!
//! Settings are layered, later sources winning:
//! 1. Default values
//! 2. YAML file (`VCLUSTER_SYNCER_CONFIG`, or `/etc/vcluster-syncer/config.yaml` if present)
//! 3. Environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::translate::{NamespaceMode, Translator};
use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "VCLUSTER_SYNCER_CONFIG";

/// Config file picked up when no explicit path is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vcluster-syncer/config.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncerConfig {
    /// Virtual cluster name, used in host names and ownership markers
    pub name: String,
    /// Host namespace all objects land in (single-namespace mode)
    pub target_namespace: Option<String>,
    /// Mirror each virtual namespace into its own host namespace
    pub multi_namespace_mode: bool,
    /// Kubeconfig for the virtual control plane; in-cluster/default when unset
    pub virtual_kubeconfig: Option<PathBuf>,
    /// Kubeconfig for the host cluster; in-cluster/default when unset
    pub host_kubeconfig: Option<PathBuf>,
    pub metrics_port: u16,
    /// Requeue interval after a successful pass
    pub resync_interval_secs: u64,
    /// Attempts per pass when writes lose an optimistic-concurrency race
    pub max_conflict_retries: u32,
    pub sync: SyncToggles,
    pub logging: LoggingConfig,
}

/// Which kinds are synced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncToggles {
    pub pod_disruption_budgets: bool,
    pub service_accounts: bool,
    pub secrets: bool,
    pub config_maps: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            target_namespace: None,
            multi_namespace_mode: false,
            virtual_kubeconfig: None,
            host_kubeconfig: None,
            metrics_port: 8080,
            resync_interval_secs: 300,
            max_conflict_retries: 5,
            sync: SyncToggles::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SyncToggles {
    fn default() -> Self {
        Self {
            pod_disruption_budgets: true,
            service_accounts: true,
            secrets: true,
            config_maps: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,vcluster_syncer=debug,kube=warn,hyper=warn".to_string(),
            json: true,
        }
    }
}

impl SyncerConfig {
    /// Load from the config file (if any) and the process environment
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }
        Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| p.exists())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    /// Unparseable numbers and booleans are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("VCLUSTER_NAME") {
            self.name = name;
        }
        if let Some(namespace) = lookup("VCLUSTER_TARGET_NAMESPACE") {
            self.target_namespace = Some(namespace).filter(|ns| !ns.is_empty());
        }
        if let Some(enabled) = lookup("VCLUSTER_MULTI_NAMESPACE_MODE").and_then(|v| v.parse().ok()) {
            self.multi_namespace_mode = enabled;
        }
        if let Some(path) = lookup("VCLUSTER_VIRTUAL_KUBECONFIG") {
            self.virtual_kubeconfig = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("VCLUSTER_HOST_KUBECONFIG") {
            self.host_kubeconfig = Some(PathBuf::from(path));
        }
        if let Some(port) = lookup("VCLUSTER_METRICS_PORT").and_then(|v| v.parse().ok()) {
            self.metrics_port = port;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::ConfigError("name cannot be empty".to_string()));
        }
        if !self.multi_namespace_mode
            && self.target_namespace.as_deref().unwrap_or_default().is_empty()
        {
            return Err(Error::ConfigError(
                "targetNamespace is required unless multiNamespaceMode is set".to_string(),
            ));
        }
        if self.max_conflict_retries == 0 {
            return Err(Error::ConfigError(
                "maxConflictRetries must be >= 1".to_string(),
            ));
        }
        if self.resync_interval_secs == 0 {
            return Err(Error::ConfigError(
                "resyncIntervalSecs must be >= 1".to_string(),
            ));
        }

        // Name and namespace syntax
        self.translator().map(|_| ())
    }

    pub fn namespace_mode(&self) -> NamespaceMode {
        match (&self.target_namespace, self.multi_namespace_mode) {
            (Some(target), false) => NamespaceMode::SingleNamespace {
                target_namespace: target.clone(),
            },
            _ => NamespaceMode::MultiNamespace,
        }
    }

    pub fn translator(&self) -> Result<Translator> {
        if !self.multi_namespace_mode && self.target_namespace.is_none() {
            return Err(Error::ConfigError(
                "targetNamespace is required unless multiNamespaceMode is set".to_string(),
            ));
        }
        Translator::new(self.name.clone(), self.namespace_mode())
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}
