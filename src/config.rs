use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

fn default_interval_secs() -> u64 {
    300
}

fn default_wait_timeout_secs() -> u64 {
    10
}

fn default_module_interval() -> u32 {
    1
}

fn default_agent_name() -> String {
    #[cfg(unix)]
    let host = nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok());
    #[cfg(not(unix))]
    let host = std::env::var("COMPUTERNAME").ok();

    host.unwrap_or_else(|| "svcwatch".to_string())
}

/// Top‑level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Name written into every report
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    /// Seconds between agent cycles (synchronous checks)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound on one wait for service-control notifications
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    /// Directory receiving XML data files; reports are only logged when unset
    pub output_dir: Option<String>,
    #[serde(default)]
    pub watchers: Vec<WatcherDefinition>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            interval_secs: default_interval_secs(),
            wait_timeout_secs: default_wait_timeout_secs(),
            output_dir: None,
            watchers: vec![],
        }
    }
}

/// On‑disk TOML description of a single service watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherDefinition {
    /// Module name used in reports
    pub name: String,
    /// Service to watch (case-insensitive)
    pub service: String,
    /// Start the service whenever it is seen stopping
    #[serde(default)]
    pub watchdog: bool,
    /// Watch transitions in the background instead of once per cycle
    #[serde(default, rename = "async")]
    pub is_async: bool,
    /// Agent cycles between synchronous checks
    #[serde(default = "default_module_interval")]
    pub interval: u32,
}

impl AgentConfig {
    /// Load the configuration at `path`, writing defaults first if it is missing.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let config_err = |reason: String| WatchError::Config {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            log::info!(
                "Config not found at {}, creating default configuration",
                path.display()
            );
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| config_err(e.to_string()))?;
            }
            let default_toml = toml::to_string_pretty(&AgentConfig::default())
                .map_err(|e| config_err(e.to_string()))?;
            fs::write(path, default_toml).map_err(|e| config_err(e.to_string()))?;
        }

        let text = fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
        let cfg: AgentConfig = toml::from_str(&text).map_err(|e| config_err(e.to_string()))?;
        cfg.validate().map_err(config_err)?;
        Ok(cfg)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.interval_secs == 0 {
            return Err("interval_secs must be greater than zero".into());
        }
        if self.wait_timeout_secs == 0 {
            return Err("wait_timeout_secs must be greater than zero".into());
        }
        if let Some(def) = self.watchers.iter().find(|w| w.service.trim().is_empty()) {
            return Err(format!("watcher '{}' has an empty service name", def.name));
        }
        Ok(())
    }
}

/// Resolve the config path from CLI arguments.
pub fn resolve_config_path(explicit: Option<String>, system: bool) -> Option<PathBuf> {
    if let Some(path) = explicit {
        Some(PathBuf::from(path))
    } else if system {
        Some(system_config_path())
    } else {
        dirs::config_dir().map(|dir| dir.join("svcwatch").join("svcwatch.toml"))
    }
}

fn system_config_path() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from(r"C:\ProgramData\svcwatch\svcwatch.toml")
    } else {
        PathBuf::from("/etc/svcwatch/svcwatch.toml")
    }
}
