//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::duration::format_duration;
use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let purpose = config.pool.purpose.as_deref().unwrap_or("");
    let created_by = config.pool.created_by.as_deref().unwrap_or("");
    let timeout = config
        .lease
        .timeout
        .map(format_duration)
        .unwrap_or_else(|| "0".to_string());

    format!(
        r#"[pool]
; Pool key. The coordinator id is "resource-pool" + namespace + resource_id
namespace = {}
resource_id = {}
; Initial number of slots (at least 1)
size = {}
; Record initializer:
;   default - ids like <resource_id>-<index>, no extra metadata
;   custom  - ids like <prefix>:<resource_id>-<index>, with metadata below;
;             shrinking sheds expanded records first
initializer = {}
; Record id prefix (custom initializer only)
prefix = {}
; Metadata recorded on every record (custom initializer only)
purpose = {}
created_by = {}

[lease]
; Maximum time a grant may be held before it is reclaimed automatically
; Supports: ms, s, m, h suffixes (e.g., 30s, 5m, 1h); 0 disables the timeout
timeout = {}

[coordinator]
; Coordinator inbox capacity (default: 1000)
channel_capacity = {}

[logging]
; Log file path (default: ~/.poolkeeper/poolkeeper.log)
file = {}
"#,
        config.pool.namespace,
        config.pool.resource_id,
        config.pool.size,
        config.pool.initializer,
        config.pool.prefix,
        purpose,
        created_by,
        timeout,
        config.coordinator.channel_capacity,
        path_to_string(&config.logging.file),
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
