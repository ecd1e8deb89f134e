use crate::error::{AlmoxError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const CONFIG_FILENAME: &str = "almox.json";

const MAX_INTERVAL_HOURS: u64 = 24 * 365;
const MAX_RETENTION_DAYS: u64 = 365 * 100;

/// Keys accepted by `almox config`.
pub const KEYS: [&str; 4] = [
    "backup-interval-hours",
    "retention-days",
    "code-seed",
    "operator",
];

/// Configuration for almox, stored in `<data dir>/almox.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlmoxConfig {
    /// Minimum time between two automatic backups
    #[serde(default = "default_backup_interval")]
    pub backup_interval_hours: u64,

    /// Backups older than this are removed
    #[serde(default = "default_retention")]
    pub retention_days: u64,

    /// First code handed out when the ledger has no numeric code yet
    #[serde(default = "default_code_seed")]
    pub code_seed: u64,

    /// Operator recorded on journal rows when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
}

fn default_backup_interval() -> u64 {
    3
}

fn default_retention() -> u64 {
    3
}

fn default_code_seed() -> u64 {
    1
}

impl Default for AlmoxConfig {
    fn default() -> Self {
        Self {
            backup_interval_hours: default_backup_interval(),
            retention_days: default_retention(),
            code_seed: default_code_seed(),
            operator: None,
        }
    }
}

impl AlmoxConfig {
    /// Load config from the given directory, or return defaults if not found
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILENAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(AlmoxError::Io)?;
        let config: AlmoxConfig =
            serde_json::from_str(&content).map_err(AlmoxError::Serialization)?;
        Ok(config)
    }

    /// Save config to the given directory
    pub fn save<P: AsRef<Path>>(&self, config_dir: P) -> Result<()> {
        let config_dir = config_dir.as_ref();

        if !config_dir.exists() {
            fs::create_dir_all(config_dir).map_err(AlmoxError::Io)?;
        }

        let config_path = config_dir.join(CONFIG_FILENAME);
        let content = serde_json::to_string_pretty(self).map_err(AlmoxError::Serialization)?;
        fs::write(config_path, content).map_err(AlmoxError::Io)?;
        Ok(())
    }

    pub fn backup_period(&self) -> Duration {
        Duration::from_secs(self.backup_interval_hours.saturating_mul(60 * 60))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(24 * 60 * 60))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "backup-interval-hours" => Some(self.backup_interval_hours.to_string()),
            "retention-days" => Some(self.retention_days.to_string()),
            "code-seed" => Some(self.code_seed.to_string()),
            "operator" => Some(self.operator.clone().unwrap_or_default()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        let value = value.trim();
        match key {
            "backup-interval-hours" => {
                self.backup_interval_hours = parse_in_range(key, value, 1, MAX_INTERVAL_HOURS)?
            }
            "retention-days" => {
                self.retention_days = parse_in_range(key, value, 1, MAX_RETENTION_DAYS)?
            }
            "code-seed" => self.code_seed = parse_in_range(key, value, 0, u64::MAX)?,
            "operator" => {
                self.operator = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}

fn parse_in_range(
    key: &str,
    value: &str,
    min: u64,
    max: u64,
) -> std::result::Result<u64, String> {
    match value.parse::<u64>() {
        Ok(n) if (min..=max).contains(&n) => Ok(n),
        _ => Err(format!(
            "{} must be a whole number between {} and {} (got '{}')",
            key, min, max, value
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = AlmoxConfig::default();
        assert_eq!(config.backup_interval_hours, 3);
        assert_eq!(config.retention_days, 3);
        assert_eq!(config.code_seed, 1);
        assert_eq!(config.backup_period(), Duration::from_secs(3 * 3600));
        assert_eq!(config.retention(), Duration::from_secs(3 * 86_400));
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempdir().unwrap();
        let config = AlmoxConfig::load(dir.path().join("nowhere")).unwrap();
        assert_eq!(config, AlmoxConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();

        let mut config = AlmoxConfig::default();
        config.set("retention-days", "7").unwrap();
        config.set("operator", " Ana ").unwrap();
        config.save(dir.path()).unwrap();

        let loaded = AlmoxConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.retention_days, 7);
        assert_eq!(loaded.operator.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), r#"{"code_seed": 3}"#).unwrap();

        let loaded = AlmoxConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.code_seed, 3);
        assert_eq!(loaded.backup_interval_hours, 3);
        assert_eq!(loaded.operator, None);
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = AlmoxConfig::default();
        assert!(config.set("retention-days", "0").is_err());
        assert!(config.set("backup-interval-hours", "soon").is_err());
        assert!(config.set("colour", "blue").is_err());
        assert!(config
            .set("retention-days", "18446744073709551615")
            .is_err());
        assert!(config.set("backup-interval-hours", "9000").is_err());
        assert_eq!(config, AlmoxConfig::default());

        config.set("retention-days", "36500").unwrap();
        assert_eq!(config.retention(), Duration::from_secs(36_500 * 86_400));

        config.set("operator", "").unwrap();
        assert_eq!(config.get("operator").as_deref(), Some(""));
        assert_eq!(config.get("unknown"), None);
    }
}
