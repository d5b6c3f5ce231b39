use config::{ConfigBuilder, ConfigError, builder::DefaultState};

const DEFAULT_DEBUG: &str = "false";
const DEFAULT_SERVER_BINARY: &str = "portunus-server";
const DEFAULT_SERVER_GROUP: &str = "portunus";
const DEFAULT_SERVER_HTTP_LISTEN: &str = "127.0.0.1:8080";
const DEFAULT_SERVER_HTTP_SECURE: &str = "true";
const DEFAULT_SERVER_STATE_DIR: &str = "/var/lib/portunus";
const DEFAULT_SERVER_USER: &str = "portunus";
const DEFAULT_SLAPD_BINARY: &str = "slapd";
const DEFAULT_SLAPD_GROUP: &str = "ldap";
const DEFAULT_SLAPD_SCHEMA_DIR: &str = "/etc/openldap/schema";
const DEFAULT_SLAPD_STATE_DIR: &str = "/var/run/portunus-slapd";
const DEFAULT_SLAPD_USER: &str = "ldap";

// PORTUNUS_LDAP_SUFFIX and the TLS keys have no default and are checked in
// validation instead.
pub(crate) fn apply_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default("debug", DEFAULT_DEBUG)?
        .set_default("server_binary", DEFAULT_SERVER_BINARY)?
        .set_default("server_group", DEFAULT_SERVER_GROUP)?
        .set_default("server_http_listen", DEFAULT_SERVER_HTTP_LISTEN)?
        .set_default("server_http_secure", DEFAULT_SERVER_HTTP_SECURE)?
        .set_default("server_state_dir", DEFAULT_SERVER_STATE_DIR)?
        .set_default("server_user", DEFAULT_SERVER_USER)?
        .set_default("slapd_binary", DEFAULT_SLAPD_BINARY)?
        .set_default("slapd_group", DEFAULT_SLAPD_GROUP)?
        .set_default("slapd_schema_dir", DEFAULT_SLAPD_SCHEMA_DIR)?
        .set_default("slapd_state_dir", DEFAULT_SLAPD_STATE_DIR)?
        .set_default("slapd_user", DEFAULT_SLAPD_USER)
}
