use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

mod defaults;
mod validation;

pub const ENV_PREFIX: &str = "PORTUNUS";

pub const KEY_DEBUG: &str = "PORTUNUS_DEBUG";
pub const KEY_LDAP_SUFFIX: &str = "PORTUNUS_LDAP_SUFFIX";
pub const KEY_SERVER_BINARY: &str = "PORTUNUS_SERVER_BINARY";
pub const KEY_SERVER_GROUP: &str = "PORTUNUS_SERVER_GROUP";
pub const KEY_SERVER_HTTP_LISTEN: &str = "PORTUNUS_SERVER_HTTP_LISTEN";
pub const KEY_SERVER_HTTP_SECURE: &str = "PORTUNUS_SERVER_HTTP_SECURE";
pub const KEY_SERVER_STATE_DIR: &str = "PORTUNUS_SERVER_STATE_DIR";
pub const KEY_SERVER_USER: &str = "PORTUNUS_SERVER_USER";
pub const KEY_SLAPD_BINARY: &str = "PORTUNUS_SLAPD_BINARY";
pub const KEY_SLAPD_GROUP: &str = "PORTUNUS_SLAPD_GROUP";
pub const KEY_SLAPD_SCHEMA_DIR: &str = "PORTUNUS_SLAPD_SCHEMA_DIR";
pub const KEY_SLAPD_STATE_DIR: &str = "PORTUNUS_SLAPD_STATE_DIR";
pub const KEY_SLAPD_USER: &str = "PORTUNUS_SLAPD_USER";
pub const KEY_SLAPD_TLS_CERTIFICATE: &str = "PORTUNUS_SLAPD_TLS_CERTIFICATE";
pub const KEY_SLAPD_TLS_DOMAIN_NAME: &str = "PORTUNUS_SLAPD_TLS_DOMAIN_NAME";
pub const KEY_SLAPD_TLS_PRIVATE_KEY: &str = "PORTUNUS_SLAPD_TLS_PRIVATE_KEY";
pub const KEY_SLAPD_TLS_CA_CERTIFICATE: &str = "PORTUNUS_SLAPD_TLS_CA_CERTIFICATE";

const BASE_KEYS: [&str; 13] = [
    KEY_DEBUG,
    KEY_LDAP_SUFFIX,
    KEY_SERVER_BINARY,
    KEY_SERVER_GROUP,
    KEY_SERVER_HTTP_LISTEN,
    KEY_SERVER_HTTP_SECURE,
    KEY_SERVER_STATE_DIR,
    KEY_SERVER_USER,
    KEY_SLAPD_BINARY,
    KEY_SLAPD_GROUP,
    KEY_SLAPD_SCHEMA_DIR,
    KEY_SLAPD_STATE_DIR,
    KEY_SLAPD_USER,
];

const TLS_KEYS: [&str; 4] = [
    KEY_SLAPD_TLS_CERTIFICATE,
    KEY_SLAPD_TLS_PRIVATE_KEY,
    KEY_SLAPD_TLS_CA_CERTIFICATE,
    KEY_SLAPD_TLS_DOMAIN_NAME,
];

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("missing required environment variable: {key}")]
    Missing { key: &'static str },
    #[error("malformed environment variable {key}: {value:?} must look like /{pattern}/ ({description})")]
    Malformed {
        key: &'static str,
        value: String,
        pattern: &'static str,
        description: &'static str,
    },
    #[error("malformed environment variable {key}: value is not valid UTF-8")]
    NotUnicode { key: &'static str },
    #[error("cannot read configuration from environment: {0}")]
    Source(#[from] ConfigError),
}

impl SettingsError {
    /// Returns the environment variable that caused this error, if any.
    #[must_use]
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::Missing { key } | Self::Malformed { key, .. } | Self::NotUnicode { key } => {
                Some(key)
            }
            Self::Source(_) => None,
        }
    }
}

/// Validated configuration snapshot, one field per `PORTUNUS_*` variable.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub debug: String,
    #[serde(default)]
    pub ldap_suffix: String,
    pub server_binary: String,
    pub server_group: String,
    pub server_http_listen: String,
    pub server_http_secure: String,
    pub server_state_dir: PathBuf,
    pub server_user: String,
    pub slapd_binary: String,
    pub slapd_group: String,
    pub slapd_schema_dir: PathBuf,
    pub slapd_state_dir: PathBuf,
    pub slapd_user: String,
    #[serde(default)]
    pub slapd_tls_certificate: String,
    #[serde(default)]
    pub slapd_tls_domain_name: String,
    #[serde(default)]
    pub slapd_tls_private_key: String,
    #[serde(default)]
    pub slapd_tls_ca_certificate: String,
}

/// Operator-supplied TLS material for the directory server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    pub ca_certificate: PathBuf,
    pub domain_name: String,
}

impl Settings {
    /// Reads the configuration from the given environment variables.
    ///
    /// Empty values count as unset and fall back to the default. Only exact,
    /// upper-case names of recognized variables are read; TLS variables are
    /// also ignored while `PORTUNUS_SLAPD_TLS_CERTIFICATE` is unset.
    ///
    /// # Errors
    /// Returns an error naming the first variable that is missing or malformed.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        // The Environment source matches its prefix case-insensitively and
        // lowercases keys, so anything else would be read but never scrubbed.
        let source: config::Map<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .filter(|(key, _)| is_known_key(key))
            .collect();

        let builder = defaults::apply_defaults(Config::builder())?.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .ignore_empty(true)
                .source(Some(source)),
        );
        let mut settings: Settings = builder.build()?.try_deserialize()?;

        if settings.slapd_tls_certificate.is_empty() {
            settings.slapd_tls_domain_name.clear();
            settings.slapd_tls_private_key.clear();
            settings.slapd_tls_ca_certificate.clear();
        }

        validation::validate_settings(&settings)?;
        Ok(settings)
    }

    /// Reads the configuration from the process environment.
    ///
    /// This does not scrub the environment; see [`scrub_process_env`].
    ///
    /// # Errors
    /// Returns an error naming the first variable that is missing or malformed.
    pub fn from_process_env() -> Result<Self, SettingsError> {
        Self::from_os_vars(std::env::vars_os())
    }

    /// Like [`Settings::from_vars`], but rejects recognized variables whose
    /// value is not valid UTF-8 instead of skipping them.
    ///
    /// # Errors
    /// Returns an error naming the first variable that is missing or malformed.
    pub fn from_os_vars<I>(vars: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut utf8 = Vec::new();
        for (key, value) in vars {
            let Ok(key) = key.into_string() else {
                continue;
            };
            match value.into_string() {
                Ok(value) => utf8.push((key, value)),
                Err(_) => {
                    if let Some(known) = known_key(&key) {
                        return Err(SettingsError::NotUnicode { key: known });
                    }
                }
            }
        }
        Self::from_vars(utf8)
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug == "true"
    }

    #[must_use]
    pub fn http_secure(&self) -> bool {
        self.server_http_secure == "true"
    }

    #[must_use]
    pub fn tls(&self) -> Option<TlsSettings> {
        if self.slapd_tls_certificate.is_empty() {
            return None;
        }
        Some(TlsSettings {
            certificate: PathBuf::from(&self.slapd_tls_certificate),
            private_key: PathBuf::from(&self.slapd_tls_private_key),
            ca_certificate: PathBuf::from(&self.slapd_tls_ca_certificate),
            domain_name: self.slapd_tls_domain_name.clone(),
        })
    }

    #[must_use]
    pub fn slapd_config_path(&self) -> PathBuf {
        self.slapd_state_dir.join(crate::slapd::CONFIG_FILE_NAME)
    }

    #[must_use]
    pub fn slapd_data_dir(&self) -> PathBuf {
        self.slapd_state_dir.join(crate::slapd::DATA_DIR_NAME)
    }

    /// Lists the variables that were read into this snapshot.
    #[must_use]
    pub fn recognized_keys(&self) -> Vec<&'static str> {
        let mut keys = BASE_KEYS.to_vec();
        if self.tls().is_some() {
            keys.extend(TLS_KEYS);
        }
        keys
    }

    /// Returns the value recorded for a recognized variable.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        let value = match key {
            KEY_DEBUG => &self.debug,
            KEY_LDAP_SUFFIX => &self.ldap_suffix,
            KEY_SERVER_BINARY => &self.server_binary,
            KEY_SERVER_GROUP => &self.server_group,
            KEY_SERVER_HTTP_LISTEN => &self.server_http_listen,
            KEY_SERVER_HTTP_SECURE => &self.server_http_secure,
            KEY_SERVER_STATE_DIR => return path_str(&self.server_state_dir),
            KEY_SERVER_USER => &self.server_user,
            KEY_SLAPD_BINARY => &self.slapd_binary,
            KEY_SLAPD_GROUP => &self.slapd_group,
            KEY_SLAPD_SCHEMA_DIR => return path_str(&self.slapd_schema_dir),
            KEY_SLAPD_STATE_DIR => return path_str(&self.slapd_state_dir),
            KEY_SLAPD_USER => &self.slapd_user,
            KEY_SLAPD_TLS_CERTIFICATE => &self.slapd_tls_certificate,
            KEY_SLAPD_TLS_DOMAIN_NAME => &self.slapd_tls_domain_name,
            KEY_SLAPD_TLS_PRIVATE_KEY => &self.slapd_tls_private_key,
            KEY_SLAPD_TLS_CA_CERTIFICATE => &self.slapd_tls_ca_certificate,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Builds the placeholder table for config templates, keyed by variable name.
    #[must_use]
    pub fn template_vars(&self) -> BTreeMap<String, String> {
        self.recognized_keys()
            .into_iter()
            .filter_map(|key| Some((key.to_string(), self.value(key)?.to_string())))
            .collect()
    }
}

fn known_key(name: &str) -> Option<&'static str> {
    BASE_KEYS
        .iter()
        .chain(TLS_KEYS.iter())
        .copied()
        .find(|key| *key == name)
}

fn is_known_key(name: &str) -> bool {
    known_key(name).is_some()
}

fn path_str(path: &Path) -> Option<&str> {
    path.to_str()
}

/// Removes every recognized variable from the process environment, so that
/// children only see what the supervisor hands them explicitly.
///
/// # Safety
/// Must be called while no other thread reads or writes the environment,
/// i.e. before the async runtime is started.
pub unsafe fn scrub_process_env(settings: &Settings) {
    for key in settings.recognized_keys() {
        // SAFETY: the caller guarantees single-threaded access to the environment.
        unsafe { std::env::remove_var(key) };
    }
}

/// Lists the recognized variables that are still present in an environment.
#[must_use]
pub fn leftover_keys<I>(settings: &Settings, vars: I) -> Vec<String>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let keys = settings.recognized_keys();
    vars.into_iter()
        .filter_map(|(key, _)| key.into_string().ok())
        .filter(|key| keys.contains(&key.as_str()))
        .collect()
}
