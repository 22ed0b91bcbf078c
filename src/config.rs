//! Typed application configuration
//!
//! Configuration is a single JSON file validated once at startup. The policy
//! sections (outlet groups, time limits) have no defaults on purpose: an
//! empty policy is a deployment mistake and must fail fast rather than
//! surface later as a runtime error.
//!
//! Default location is `$XDG_CONFIG_HOME/wlt/config.json`, overridable with
//! `--config <path>` on the command line.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Addresses the nftables map the gateway operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_family")]
    pub family: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_map")]
    pub map: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            family: default_family(),
            table: default_table(),
            map: default_map(),
        }
    }
}

fn default_family() -> String {
    "inet".to_string()
}

fn default_table() -> String {
    "wlt".to_string()
}

fn default_map() -> String {
    "src2mark".to_string()
}

/// One independent policy axis of the egress mark.
///
/// `outlets` is an ordered list of `(name, value)` pairs; declaration order
/// is significant because the first outlet whose masked value matches wins
/// when values collide under `mask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutletGroup {
    pub title: String,
    pub mask: u32,
    pub outlets: Vec<(String, u32)>,
}

impl OutletGroup {
    /// Looks up an outlet value by name.
    pub fn outlet_value(&self, name: &str) -> Option<u32> {
        self.outlets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub nftables: MapConfig,
    pub outlet_groups: Vec<OutletGroup>,
    /// Permitted grant durations in hours; `0` means permanent.
    pub time_limits: Vec<u32>,
    /// Upper bound on a single nft invocation. A hung nft fails the one
    /// request that triggered it instead of hanging it forever.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_command_timeout() -> u64 {
    10
}

/// Error type for configuration loading and validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl AppConfig {
    /// Validates the loaded configuration against the policy invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if any policy section is empty or a
    /// map coordinate is blank. Callers treat this as startup-fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nftables.family.is_empty()
            || self.nftables.table.is_empty()
            || self.nftables.map.is_empty()
        {
            return Err(ConfigError::Invalid(
                "nftables family, table and map names must be non-empty".into(),
            ));
        }

        if self.outlet_groups.is_empty() {
            return Err(ConfigError::Invalid(
                "outlet_groups cannot be empty".into(),
            ));
        }

        for group in &self.outlet_groups {
            if group.outlets.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "outlet group '{}' has no outlets",
                    group.title
                )));
            }
        }

        if self.time_limits.is_empty() {
            return Err(ConfigError::Invalid("time_limits cannot be empty".into()));
        }

        Ok(())
    }
}

/// Returns the default config file path under the XDG config directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "wlt", "wlt").map(|pd| pd.config_dir().join("config.json"))
}

/// Loads and validates the configuration.
///
/// `path` overrides the XDG default when given.
///
/// # Errors
///
/// Returns `Err` if no config file exists, it cannot be read or parsed, or
/// validation fails.
pub async fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()
            .ok_or_else(|| ConfigError::Invalid("cannot determine config directory".into()))?,
    };

    if !path.exists() {
        return Err(ConfigError::NotFound(path));
    }

    let json = tokio::fs::read_to_string(&path).await?;
    let config: AppConfig = serde_json::from_str(&json)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit_group() -> OutletGroup {
        OutletGroup {
            title: "exit".to_string(),
            mask: 0xF,
            outlets: vec![
                ("domestic".to_string(), 1),
                ("international".to_string(), 2),
            ],
        }
    }

    fn valid_config() -> AppConfig {
        AppConfig {
            nftables: MapConfig::default(),
            outlet_groups: vec![exit_group()],
            time_limits: vec![1, 4, 0],
            command_timeout_secs: 10,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_empty_groups_rejected() {
        let mut config = valid_config();
        config.outlet_groups.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_empty_outlets_rejected() {
        let mut config = valid_config();
        config.outlet_groups[0].outlets.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exit"));
    }

    #[test]
    fn test_empty_time_limits_rejected() {
        let mut config = valid_config();
        config.time_limits.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_nftables_section_defaults() {
        let json = r#"{
            "outlet_groups": [
                { "title": "exit", "mask": 15,
                  "outlets": [["domestic", 1], ["international", 2]] }
            ],
            "time_limits": [1, 4, 0]
        }"#;

        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.nftables.family, "inet");
        assert_eq!(config.nftables.table, "wlt");
        assert_eq!(config.nftables.map, "src2mark");
        assert_eq!(config.command_timeout_secs, 10);
    }

    #[test]
    fn test_outlet_order_preserved() {
        let json = r#"{
            "outlet_groups": [
                { "title": "exit", "mask": 15,
                  "outlets": [["b", 2], ["a", 1]] }
            ],
            "time_limits": [0]
        }"#;

        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.outlet_groups[0].outlets[0].0, "b");
        assert_eq!(config.outlet_groups[0].outlet_value("a"), Some(1));
        assert_eq!(config.outlet_groups[0].outlet_value("missing"), None);
    }
}
