use super::{
    KEY_DEBUG, KEY_LDAP_SUFFIX, KEY_SERVER_GROUP, KEY_SERVER_HTTP_LISTEN, KEY_SERVER_HTTP_SECURE,
    KEY_SERVER_USER, KEY_SLAPD_GROUP, KEY_SLAPD_USER, Settings, SettingsError,
};
use crate::grammars::{self, ValueFormat};

pub(crate) fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    for key in settings.recognized_keys() {
        let value = settings.value(key).unwrap_or_default();
        validate_value(key, value, format_for(key))?;
    }
    Ok(())
}

fn format_for(key: &str) -> Option<&'static ValueFormat> {
    match key {
        KEY_DEBUG | KEY_SERVER_HTTP_SECURE => Some(&grammars::STRICT_BOOL),
        KEY_LDAP_SUFFIX => Some(&grammars::LDAP_SUFFIX),
        KEY_SERVER_HTTP_LISTEN => Some(&grammars::LISTEN_ADDRESS),
        KEY_SERVER_USER | KEY_SERVER_GROUP | KEY_SLAPD_USER | KEY_SLAPD_GROUP => {
            Some(&grammars::POSIX_ACCOUNT_NAME)
        }
        _ => None,
    }
}

fn validate_value(
    key: &'static str,
    value: &str,
    format: Option<&'static ValueFormat>,
) -> Result<(), SettingsError> {
    if value.is_empty() {
        return Err(SettingsError::Missing { key });
    }
    if let Some(format) = format
        && !format.matches(value)
    {
        return Err(SettingsError::Malformed {
            key,
            value: value.to_string(),
            pattern: format.pattern,
            description: format.description,
        });
    }
    Ok(())
}
