use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tracing::{debug, error, info};

use crate::config::{
    KEY_DEBUG, KEY_LDAP_SUFFIX, KEY_SERVER_HTTP_LISTEN, KEY_SERVER_HTTP_SECURE,
    KEY_SERVER_STATE_DIR, KEY_SLAPD_TLS_DOMAIN_NAME, Settings,
};
use crate::identity::IdentityMap;
use crate::slapd::{KEY_LDAP_PASSWORD, ServiceAccount};

pub const ENV_SERVER_UID: &str = "PORTUNUS_SERVER_UID";
pub const ENV_SERVER_GID: &str = "PORTUNUS_SERVER_GID";

// Cleartext only, even with TLS configured; clients are expected to use StartTLS.
pub const SLAPD_LISTEN_URLS: &str = "ldap:///";

const SLAPD_SYSLOG_HINT: &str = "Since slapd logs to syslog only, check there for more information.";

/// Builds the slapd invocation. `-d 0` keeps slapd in the foreground
/// without enabling debug output.
#[must_use]
pub fn directory_server_command(settings: &Settings) -> Command {
    let mut command = Command::new(&settings.slapd_binary);
    command
        .arg("-u")
        .arg(&settings.slapd_user)
        .arg("-g")
        .arg(&settings.slapd_group)
        .arg("-h")
        .arg(SLAPD_LISTEN_URLS)
        .arg("-f")
        .arg(settings.slapd_config_path())
        .arg("-d")
        .arg("0");
    remove_recognized(&mut command, settings);
    inherit_streams(&mut command);
    command
}

/// Builds the portunus-server invocation with its curated environment.
#[must_use]
pub fn app_server_command(
    settings: &Settings,
    ids: &IdentityMap,
    account: &ServiceAccount,
) -> Command {
    let mut command = Command::new(&settings.server_binary);
    remove_recognized(&mut command, settings);
    command.envs(app_server_envs(settings, ids, account));
    inherit_streams(&mut command);
    command
}

fn app_server_envs(
    settings: &Settings,
    ids: &IdentityMap,
    account: &ServiceAccount,
) -> Vec<(&'static str, String)> {
    let tls_domain_name = settings
        .tls()
        .map(|tls| tls.domain_name)
        .unwrap_or_default();
    vec![
        (ENV_SERVER_UID, ids.server.uid.to_string()),
        (ENV_SERVER_GID, ids.server.gid.to_string()),
        (KEY_DEBUG, settings.debug.clone()),
        (KEY_LDAP_SUFFIX, settings.ldap_suffix.clone()),
        (KEY_LDAP_PASSWORD, account.password().to_string()),
        (KEY_SERVER_HTTP_LISTEN, settings.server_http_listen.clone()),
        (KEY_SERVER_HTTP_SECURE, settings.server_http_secure.clone()),
        (
            KEY_SERVER_STATE_DIR,
            settings.server_state_dir.display().to_string(),
        ),
        (KEY_SLAPD_TLS_DOMAIN_NAME, tls_domain_name),
    ]
}

fn remove_recognized(command: &mut Command, settings: &Settings) {
    for key in settings.recognized_keys() {
        command.env_remove(key);
    }
}

fn inherit_streams(command: &mut Command) {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
}

/// Starts slapd and portunus-server and waits until one of them exits.
///
/// # Errors
/// Returns an error if either child cannot be spawned, if slapd exits at
/// all, or if portunus-server exits unsuccessfully.
pub async fn supervise(
    settings: &Settings,
    ids: &IdentityMap,
    account: &ServiceAccount,
) -> Result<()> {
    info!("Starting {}", settings.slapd_binary);
    let slapd_command = directory_server_command(settings);
    debug!(
        "slapd arguments: {:?}",
        slapd_command.as_std().get_args().collect::<Vec<_>>()
    );
    let mut slapd = spawn(slapd_command, &settings.slapd_binary)?;
    info!("Starting {}", settings.server_binary);
    let mut server = spawn(
        app_server_command(settings, ids, account),
        &settings.server_binary,
    )?;

    tokio::select! {
        status = slapd.wait() => {
            let status = describe(status, &settings.slapd_binary)?;
            error!("{} exited unexpectedly ({status})", settings.slapd_binary);
            info!("{SLAPD_SYSLOG_HINT}");
            anyhow::bail!("{} exited unexpectedly ({status})", settings.slapd_binary);
        }
        status = server.wait() => {
            let status = describe(status, &settings.server_binary)?;
            if status.success() {
                info!("{} exited ({status})", settings.server_binary);
                Ok(())
            } else {
                error!("{} failed ({status})", settings.server_binary);
                anyhow::bail!("{} failed ({status})", settings.server_binary);
            }
        }
    }
}

fn spawn(mut command: Command, program: &str) -> Result<Child> {
    command
        .spawn()
        .with_context(|| format!("Failed to spawn {program}"))
}

fn describe(status: std::io::Result<ExitStatus>, program: &str) -> Result<ExitStatus> {
    status.with_context(|| format!("Failed to wait for {program}"))
}
