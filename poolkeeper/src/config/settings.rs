//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub pool: PoolSettings,
    pub lease: LeaseSettings,
    pub coordinator: CoordinatorSettings,
    pub logging: LoggingSettings,
}

/// Pool identity and initial shape.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub namespace: String,
    pub resource_id: String,
    /// Initial slot count (at least 1)
    pub size: usize,
    pub initializer: InitializerType,
    /// Record id prefix, used by the custom initializer only
    pub prefix: String,
    /// Recorded in custom record metadata
    pub purpose: Option<String>,
    /// Recorded in custom record metadata
    pub created_by: Option<String>,
}

/// Lease configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseSettings {
    /// Maximum time a grant may be held. `None` means no limit.
    pub timeout: Option<Duration>,
}

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    /// Inbox capacity. Senders wait when it is full.
    pub channel_capacity: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}

/// Which initializer new pools use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitializerType {
    #[default]
    Default,
    Custom,
}

impl InitializerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for InitializerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitializerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown initializer '{}'", other)),
        }
    }
}
