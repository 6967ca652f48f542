//! Overmux Configuration System
//!
//! Loads configuration from YAML files with a cascading priority system:
//! 1. `./overmux.yaml` (current directory - highest priority)
//! 2. `~/.overmux.yaml` (home directory)
//! 3. `~/.config/overmux/overmux.yaml` (user config directory)
//! 4. `/etc/overmux/overmux.yaml` (system - lowest priority)
//!
//! Values from higher priority files override those from lower priority files.
//!
//! # YAML Structure
//!
//! ```yaml
//! mux:
//!   protocol_tag: "ipop"
//! resolver:
//!   namespace: "lab"
//!   max_attempts: 2
//! ondemand:
//!   idle_timeout_secs: 900
//! ```

mod mux;
mod resolver;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use mux::{MuxConfig, OnDemandConfig};
pub use resolver::ResolverConfig;

/// Default config filename.
const CONFIG_FILENAME: &str = "overmux.yaml";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Multiplexer configuration (`mux.*`).
    #[serde(default)]
    pub mux: MuxConfig,

    /// Resolver configuration (`resolver.*`).
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// On-demand policy (`ondemand.*`).
    #[serde(default)]
    pub ondemand: OnDemandConfig,
}

impl Config {
    /// Create a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard search paths.
    ///
    /// Returns a tuple of (config, paths_loaded) where paths_loaded contains
    /// the paths that were successfully loaded.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let search_paths = Self::search_paths();
        Self::load_from_paths(&search_paths)
    }

    /// Load configuration from specific paths.
    ///
    /// Paths are processed in order, with later paths overriding earlier ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let file_config = Self::load_file(path)?;
                config.merge(file_config);
                loaded_paths.push(path.clone());
            }
        }

        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System config (lowest priority)
        paths.push(PathBuf::from("/etc/overmux").join(CONFIG_FILENAME));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("overmux").join(CONFIG_FILENAME));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".overmux.yaml"));
        }

        // Current directory (highest priority)
        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));

        paths
    }

    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` when present.
    pub fn merge(&mut self, other: Config) {
        self.mux.merge(other.mux);
        self.resolver.merge(other.resolver);
        self.ondemand.merge(other.ondemand);
    }

    /// Serialize this configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_defaults() {
        let config = Config::new();
        assert_eq!(config.mux.protocol_tag(), "overmux");
        assert_eq!(config.mux.ready_channel_capacity(), 256);
        assert_eq!(config.resolver.namespace(), "default");
        assert_eq!(config.resolver.key_prefix(), "dhcp");
        assert_eq!(config.resolver.max_attempts(), 2);
        assert_eq!(config.resolver.staleness(), Duration::from_secs(600));
        assert_eq!(config.resolver.sweep_interval(), Duration::from_secs(600));
        assert_eq!(config.resolver.refresh_after(), Some(Duration::from_secs(300)));
        assert_eq!(config.ondemand.idle_timeout(), None);
    }

    #[test]
    fn test_parse_yaml_empty() {
        let config: Config = serde_yaml::from_str("").unwrap();
        assert!(config.mux.protocol_tag.is_none());
    }

    #[test]
    fn test_parse_yaml_sections() {
        let yaml = r#"
mux:
  protocol_tag: "ipop"
  ready_channel_capacity: 16
resolver:
  namespace: "lab"
  max_attempts: 3
  refresh_after_secs: 0
ondemand:
  idle_timeout_secs: 900
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.mux.protocol_tag(), "ipop");
        assert_eq!(config.mux.ready_channel_capacity(), 16);
        assert_eq!(config.resolver.namespace(), "lab");
        assert_eq!(config.resolver.max_attempts(), 3);
        assert_eq!(config.resolver.refresh_after(), None);
        assert_eq!(config.ondemand.idle_timeout(), Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let yaml = r#"
resolver:
  namespce: "typo"
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_zero_sweep_interval_clamped() {
        let mut config = Config::new();
        config.resolver.sweep_interval_secs = Some(0);
        assert_eq!(config.resolver.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_merge_configs() {
        let mut base = Config::new();
        base.mux.protocol_tag = Some("base".to_string());
        base.resolver.namespace = Some("base_ns".to_string());

        let mut override_config = Config::new();
        override_config.mux.protocol_tag = Some("override".to_string());

        base.merge(override_config);
        assert_eq!(base.mux.protocol_tag(), "override");
        // Unset fields in the override keep the base value
        assert_eq!(base.resolver.namespace(), "base_ns");
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("overmux.yaml");

        fs::write(&config_path, "resolver:\n  key_prefix: \"ipop\"\n").unwrap();

        let config = Config::load_file(&config_path).unwrap();
        assert_eq!(config.resolver.key_prefix(), "ipop");
    }

    #[test]
    fn test_load_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.yaml");
        assert!(matches!(
            Config::load_file(&missing),
            Err(ConfigError::ReadFile { .. })
        ));

        let broken = temp_dir.path().join("broken.yaml");
        fs::write(&broken, "mux: [unclosed").unwrap();
        assert!(matches!(
            Config::load_file(&broken),
            Err(ConfigError::ParseYaml { .. })
        ));
    }

    #[test]
    fn test_load_from_paths_merges() {
        let temp_dir = TempDir::new().unwrap();
        let low_priority = temp_dir.path().join("low.yaml");
        let high_priority = temp_dir.path().join("high.yaml");

        fs::write(
            &low_priority,
            r#"
mux:
  protocol_tag: "low"
resolver:
  namespace: "low_ns"
"#,
        )
        .unwrap();

        fs::write(
            &high_priority,
            r#"
mux:
  protocol_tag: "high"
"#,
        )
        .unwrap();

        let paths = vec![low_priority.clone(), high_priority.clone()];
        let (config, loaded) = Config::load_from_paths(&paths).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(config.mux.protocol_tag(), "high");
        assert_eq!(config.resolver.namespace(), "low_ns");
    }

    #[test]
    fn test_load_skips_missing_files() {
        let temp_dir = TempDir::new().unwrap();
        let existing = temp_dir.path().join("exists.yaml");
        let missing = temp_dir.path().join("missing.yaml");

        fs::write(&existing, "ondemand:\n  idle_timeout_secs: 60\n").unwrap();

        let paths = vec![missing, existing.clone()];
        let (config, loaded) = Config::load_from_paths(&paths).unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], existing);
        assert_eq!(config.ondemand.idle_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_search_paths_includes_expected() {
        let paths = Config::search_paths();

        assert!(paths.iter().any(|p| p.ends_with("overmux.yaml")));
        assert!(paths
            .iter()
            .any(|p| p.starts_with("/etc/overmux") && p.ends_with("overmux.yaml")));
    }

    #[test]
    fn test_to_yaml() {
        let mut config = Config::new();
        config.resolver.namespace = Some("lab".to_string());

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("resolver:"));
        assert!(yaml.contains("namespace: lab"));
        // Unset fields are omitted
        assert!(!yaml.contains("protocol_tag"));
    }
}
