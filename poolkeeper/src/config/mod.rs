//! Configuration for poolkeeper.
//!
//! Configuration lives in an INI file at `~/.poolkeeper/config.ini`. Missing
//! files and missing keys fall back to defaults; invalid values are
//! reported with their section and key.
//!
//! # Example
//!
//! ```ignore
//! use poolkeeper::config::ConfigFile;
//! use poolkeeper::pool::PoolOptions;
//!
//! let config = ConfigFile::load()?;
//! let options = PoolOptions::from(&config);
//! ```

mod defaults;
mod duration;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use duration::{format_duration, parse_duration, DurationParseError};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, CoordinatorSettings, InitializerType, LeaseSettings, LoggingSettings,
    PoolSettings,
};
