//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Rift Configuration
# Only override what you want to change -- missing fields use defaults.

[relay]
# host = "0.0.0.0"
# port = 51001                    # overridden by $PORT
# heartbeat_interval_ms = 10000   # 1000-300000

[bridge]
# relay_url = "ws://127.0.0.1:51001"
# user_id = ""                    # required before the bridge can connect
# reconnect_delay_ms = 5000       # 100-600000
# discovery_interval_ms = 3000    # 100-60000
# lockfile_path = "/path/to/lockfile"

[logging]
# level = "INFO"                  # TRACE, DEBUG, INFO, WARNING, ERROR
"##
    .to_string()
}
