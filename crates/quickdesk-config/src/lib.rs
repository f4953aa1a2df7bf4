use quickdesk_storage::{DeadlineSettings, Priority, TicketType};
use quickdesk_tickets::{RefreshPolicy, TicketDefaults};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found. Run 'quickdesk init' first or pass --config.")]
    NotFound,
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Could not determine the home directory")]
    NoHomeDir,
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Local configuration stored in ~/.quickdesk/config.json
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QuickdeskConfig {
    /// Snapshot file of the local store. Defaults to `state.json` next to the config.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    #[serde(default = "default_priority")]
    pub default_priority: Priority,
    #[serde(default = "default_ticket_type")]
    pub default_ticket_type: TicketType,
    /// Lead times applied to organizations created from this machine.
    #[serde(default)]
    pub deadline_settings: Option<DeadlineSettings>,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub billing: BillingDefaults,
}

/// Ticket list refresh intervals, in seconds
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub active_interval_secs: u64,
    pub idle_interval_secs: u64,
    pub idle_threshold_secs: u64,
}

/// Pricing used when no billing environment is configured
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BillingDefaults {
    pub price_per_agent: i64,
    pub currency: String,
    pub trial_days: u32,
}

fn default_priority() -> Priority {
    Priority::Medium
}

fn default_ticket_type() -> TicketType {
    TicketType::Incident
}

fn default_cache_capacity() -> usize {
    256
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            active_interval_secs: 10,
            idle_interval_secs: 60,
            idle_threshold_secs: 300,
        }
    }
}

impl Default for BillingDefaults {
    fn default() -> Self {
        Self {
            price_per_agent: 500,
            currency: "PHP".to_string(),
            trial_days: 14,
        }
    }
}

impl Default for QuickdeskConfig {
    fn default() -> Self {
        Self {
            state_path: None,
            default_priority: default_priority(),
            default_ticket_type: default_ticket_type(),
            deadline_settings: None,
            polling: PollingConfig::default(),
            cache_capacity: default_cache_capacity(),
            billing: BillingDefaults::default(),
        }
    }
}

impl QuickdeskConfig {
    /// Load config from default path (~/.quickdesk/config.json)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path()?)
    }

    /// Load config from custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound
            } else {
                ConfigError::Read(e)
            }
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`QuickdeskConfig::load_from`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load_from(path) {
            Err(ConfigError::NotFound) => Ok(Self::default()),
            other => other,
        }
    }

    /// Save config to default path
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path()?)
    }

    /// Save config to custom path
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self)?)?;
        Ok(())
    }

    /// Get default config path (~/.quickdesk/config.json)
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::home()?.join("config.json"))
    }

    /// Snapshot path, resolved against the config directory when unset.
    pub fn resolve_state_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.state_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::home()?.join("state.json")),
        }
    }

    pub fn ticket_defaults(&self) -> TicketDefaults {
        TicketDefaults {
            priority: self.default_priority,
            ticket_type: self.default_ticket_type,
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::from_secs(
            self.polling.active_interval_secs,
            self.polling.idle_interval_secs,
            self.polling.idle_threshold_secs,
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache_capacity must be at least 1".into()));
        }
        if self.polling.active_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.active_interval_secs must be at least 1".into(),
            ));
        }
        if let Some(priority) = self.deadline_settings.and_then(|d| d.out_of_range()) {
            return Err(ConfigError::Invalid(format!(
                "deadline_settings.{} must be at most {} days",
                priority,
                DeadlineSettings::MAX_LEAD_DAYS
            )));
        }
        if self.billing.price_per_agent < 0 {
            return Err(ConfigError::Invalid(
                "billing.price_per_agent must not be negative".into(),
            ));
        }
        Ok(())
    }

    fn home() -> Result<PathBuf, ConfigError> {
        Ok(dirs::home_dir()
            .ok_or(ConfigError::NoHomeDir)?
            .join(".quickdesk"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = QuickdeskConfig {
            state_path: Some(dir.path().join("state.json")),
            default_priority: Priority::High,
            deadline_settings: Some(DeadlineSettings {
                urgent: 0,
                high: 1,
                medium: 3,
                low: 5,
            }),
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        let loaded = QuickdeskConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_priority": "Low", "polling": {{"active_interval_secs": 5, "idle_interval_secs": 30, "idle_threshold_secs": 120}}}}"#).unwrap();

        let config = QuickdeskConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_priority, Priority::Low);
        assert_eq!(config.default_ticket_type, TicketType::Incident);
        assert_eq!(config.cache_capacity, 256);
        assert_eq!(config.billing.trial_days, 14);
        assert_eq!(
            config.refresh_policy(),
            RefreshPolicy::from_secs(5, 30, 120)
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(
            QuickdeskConfig::load_from(&path),
            Err(ConfigError::NotFound)
        ));
        assert_eq!(
            QuickdeskConfig::load_or_default(&path).unwrap(),
            QuickdeskConfig::default()
        );
    }

    #[test]
    fn test_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            QuickdeskConfig::load_from(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_cache_capacity_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"cache_capacity": 0}}"#).unwrap();
        let err = QuickdeskConfig::load_from(file.path()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid config: cache_capacity must be at least 1"
        );
    }

    #[test]
    fn test_absurd_lead_time_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"deadline_settings": {{"High": 4294967295}}}}"#).unwrap();
        let err = QuickdeskConfig::load_from(file.path()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid config: deadline_settings.High must be at most 36500 days"
        );
    }

    #[test]
    fn test_ticket_defaults() {
        let config = QuickdeskConfig {
            default_ticket_type: TicketType::Problem,
            ..Default::default()
        };
        let defaults = config.ticket_defaults();
        assert_eq!(defaults.priority, Priority::Medium);
        assert_eq!(defaults.ticket_type, TicketType::Problem);
    }
}
