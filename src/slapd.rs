use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use ring::rand::{SecureRandom, SystemRandom};

use crate::config::Settings;
use crate::crypt::PasswordHasher;

pub const CONFIG_FILE_NAME: &str = "slapd.conf";
pub const SCHEMA_FILE_NAME: &str = "portunus.schema";
pub const DATA_DIR_NAME: &str = "data";

pub const KEY_LDAP_PASSWORD: &str = "PORTUNUS_LDAP_PASSWORD";
pub const KEY_LDAP_PASSWORD_HASH: &str = "PORTUNUS_LDAP_PASSWORD_HASH";

const SERVICE_PASSWORD_BYTES: usize = 32;

// Only the service user has write access. Members of cn=portunus-viewers (a
// group maintained by portunus-server) may read; everyone else may only bind.
const CONFIG_TEMPLATE: &str = r#"
include %PORTUNUS_SLAPD_SCHEMA_DIR%/core.schema
include %PORTUNUS_SLAPD_SCHEMA_DIR%/cosine.schema
include %PORTUNUS_SLAPD_SCHEMA_DIR%/inetorgperson.schema
include %PORTUNUS_SLAPD_SCHEMA_DIR%/nis.schema
include %PORTUNUS_SLAPD_STATE_DIR%/portunus.schema

access to dn.base="" by * read
access to dn.base="cn=Subschema" by * read
access to *
	by dn.base="cn=portunus,%PORTUNUS_LDAP_SUFFIX%" write
	by group.exact="cn=portunus-viewers,%PORTUNUS_LDAP_SUFFIX%" read
	by anonymous auth
"#;

const TLS_CONFIG_TEMPLATE: &str = r#"
TLSCACertificateFile "%PORTUNUS_SLAPD_STATE_DIR%/ca.pem"
TLSCertificateFile "%PORTUNUS_SLAPD_STATE_DIR%/cert.pem"
TLSCertificateKeyFile "%PORTUNUS_SLAPD_STATE_DIR%/key.pem"
"#;

const DATABASE_TEMPLATE: &str = r#"
database mdb
maxsize 1073741824
suffix "%PORTUNUS_LDAP_SUFFIX%"
rootdn "cn=portunus,%PORTUNUS_LDAP_SUFFIX%"
rootpw "{CRYPT}%PORTUNUS_LDAP_PASSWORD_HASH%"
directory "%PORTUNUS_SLAPD_STATE_DIR%/data"

index objectClass eq
"#;

/// Schema for the group back-reference on users. portunus-server fills in
/// `memberOf` itself, so the memberof overlay is not used.
pub const CUSTOM_SCHEMA: &str = r"
attributetype ( 9999.1.1 NAME 'memberOf'
	DESC 'back-reference to groups this entry is a member of'
	EQUALITY distinguishedNameMatch
	SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 )

objectclass ( 9999.2.1 NAME 'hasMemberOf'
	DESC 'entry that lists its group memberships in memberOf'
	SUP top AUXILIARY
	MAY memberOf )
";

static PLACEHOLDER_RX: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"%(\w+)%").expect("placeholder pattern must compile")
});

/// Credentials of `cn=portunus,<suffix>`, minted once per run.
pub struct ServiceAccount {
    password: String,
    password_hash: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("password", &"<redacted>")
            .field("password_hash", &self.password_hash)
            .finish()
    }
}

impl ServiceAccount {
    /// Generates a random 64-character hex password and hashes it.
    ///
    /// # Errors
    /// Returns an error if no randomness is available or hashing fails.
    pub fn generate<H: PasswordHasher + ?Sized>(hasher: &H) -> Result<Self> {
        let password = generate_password()?;
        let password_hash = hasher
            .hash_password(&password)
            .context("Failed to hash service user password")?;
        Ok(Self {
            password,
            password_hash,
        })
    }

    /// Cleartext password; only ever handed to portunus-server via its environment.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

fn generate_password() -> Result<String> {
    let mut buffer = [0u8; SERVICE_PASSWORD_BYTES];
    SystemRandom::new()
        .fill(&mut buffer)
        .map_err(|_| anyhow::anyhow!("Failed to generate random service user password"))?;
    Ok(hex::encode(buffer))
}

/// Contents of the files that slapd reads from its state directory.
#[derive(Debug, Clone)]
pub struct SlapdFiles {
    pub schema: String,
    pub config: String,
}

/// Renders slapd.conf and the custom schema for this run.
///
/// # Errors
/// Returns an error if the template references a value that is not available.
pub fn render_files(settings: &Settings, account: &ServiceAccount) -> Result<SlapdFiles> {
    let mut vars = settings.template_vars();
    vars.insert(KEY_LDAP_PASSWORD.to_string(), account.password.clone());
    vars.insert(
        KEY_LDAP_PASSWORD_HASH.to_string(),
        account.password_hash.clone(),
    );

    let mut template = String::from(CONFIG_TEMPLATE);
    if settings.tls().is_some() {
        template.push_str(TLS_CONFIG_TEMPLATE);
    }
    template.push_str(DATABASE_TEMPLATE);

    Ok(SlapdFiles {
        schema: CUSTOM_SCHEMA.to_string(),
        config: render_template(&template, &vars)?,
    })
}

/// Replaces every `%KEY%` in `template` with `vars[KEY]`.
///
/// # Errors
/// Returns an error listing all placeholders without a value.
pub fn render_template(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut missing = Vec::new();
    let rendered = PLACEHOLDER_RX.replace_all(template, |caps: &Captures<'_>| {
        if let Some(value) = vars.get(&caps[1]) {
            value.clone()
        } else {
            missing.push(caps[1].to_string());
            String::new()
        }
    });
    if !missing.is_empty() {
        anyhow::bail!(
            "unresolved placeholders in slapd config template: {}",
            missing.join(", ")
        );
    }
    Ok(rendered.into_owned())
}
