//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;

use super::duration::parse_duration;
use super::file::ConfigFileError;
use super::settings::ConfigFile;

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_positive(section: &str, key: &str, value: &str) -> Result<usize, ConfigFileError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(section, key, value, "must be a positive integer")),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [pool] section
    if let Some(section) = ini.section(Some("pool")) {
        if let Some(v) = section.get("namespace") {
            config.pool.namespace =
                non_empty(v).ok_or_else(|| invalid("pool", "namespace", v, "must not be empty"))?;
        }
        if let Some(v) = section.get("resource_id") {
            config.pool.resource_id = non_empty(v)
                .ok_or_else(|| invalid("pool", "resource_id", v, "must not be empty"))?;
        }
        if let Some(v) = section.get("size") {
            config.pool.size = parse_positive("pool", "size", v)?;
        }
        if let Some(v) = section.get("initializer") {
            config.pool.initializer = v
                .parse()
                .map_err(|_| invalid("pool", "initializer", v, "must be 'default' or 'custom'"))?;
        }
        if let Some(v) = section.get("prefix") {
            if let Some(prefix) = non_empty(v) {
                config.pool.prefix = prefix;
            }
        }
        if let Some(v) = section.get("purpose") {
            config.pool.purpose = non_empty(v);
        }
        if let Some(v) = section.get("created_by") {
            config.pool.created_by = non_empty(v);
        }
    }

    // [lease] section
    if let Some(section) = ini.section(Some("lease")) {
        if let Some(v) = section.get("timeout") {
            if !v.trim().is_empty() {
                let timeout = parse_duration(v).map_err(|_| {
                    invalid(
                        "lease",
                        "timeout",
                        v,
                        "expected format like '30s', '5m', or '1h' (0 disables)",
                    )
                })?;
                config.lease.timeout = (!timeout.is_zero()).then_some(timeout);
            }
        }
    }

    // [coordinator] section
    if let Some(section) = ini.section(Some("coordinator")) {
        if let Some(v) = section.get("channel_capacity") {
            config.coordinator.channel_capacity =
                parse_positive("coordinator", "channel_capacity", v)?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

/// Expands a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::InitializerType;
    use std::time::Duration;

    fn parse(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(content).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_yields_defaults() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
[pool]
namespace = render
resource_id = gpu
size = 8
initializer = custom
prefix = farm
purpose = nightly renders
created_by = ops

[lease]
timeout = 5m

[coordinator]
channel_capacity = 64

[logging]
file = /var/log/poolkeeper.log
"#,
        )
        .unwrap();

        assert_eq!(config.pool.namespace, "render");
        assert_eq!(config.pool.resource_id, "gpu");
        assert_eq!(config.pool.size, 8);
        assert_eq!(config.pool.initializer, InitializerType::Custom);
        assert_eq!(config.pool.prefix, "farm");
        assert_eq!(config.pool.purpose.as_deref(), Some("nightly renders"));
        assert_eq!(config.pool.created_by.as_deref(), Some("ops"));
        assert_eq!(config.lease.timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.coordinator.channel_capacity, 64);
        assert_eq!(config.logging.file, PathBuf::from("/var/log/poolkeeper.log"));
    }

    #[test]
    fn test_zero_timeout_disables_leases() {
        let config = parse("[lease]\ntimeout = 0\n").unwrap();
        assert_eq!(config.lease.timeout, None);
    }

    #[test]
    fn test_empty_optional_values_are_none() {
        let config = parse("[pool]\npurpose =\ncreated_by =   \n").unwrap();
        assert!(config.pool.purpose.is_none());
        assert!(config.pool.created_by.is_none());
    }

    #[test]
    fn test_zero_size_is_invalid() {
        match parse("[pool]\nsize = 0\n").unwrap_err() {
            ConfigFileError::InvalidValue {
                section,
                key,
                value,
                ..
            } => {
                assert_eq!(section, "pool");
                assert_eq!(key, "size");
                assert_eq!(value, "0");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(parse("[pool]\nsize = many\n").is_err());
        assert!(parse("[pool]\ninitializer = elastic\n").is_err());
        assert!(parse("[pool]\nnamespace =\n").is_err());
        assert!(parse("[lease]\ntimeout = soon\n").is_err());
        assert!(parse("[coordinator]\nchannel_capacity = 0\n").is_err());
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/tmp/x.log"), PathBuf::from("/tmp/x.log"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/x.log"), home.join("x.log"));
        }
    }
}
