use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

use crate::config::Settings;
use crate::fs_util;
use crate::identity::IdentityMap;
use crate::slapd::{self, SlapdFiles};

pub const SLAPD_STATE_DIR_MODE: u32 = 0o700;
pub const SLAPD_DATA_DIR_MODE: u32 = 0o770;
pub const SLAPD_CONFIG_FILE_MODE: u32 = 0o444;
pub const TLS_FILE_MODE: u32 = 0o400;
pub const SERVER_STATE_DIR_MODE: u32 = 0o770;

pub const TLS_CERTIFICATE_FILE_NAME: &str = "cert.pem";
pub const TLS_PRIVATE_KEY_FILE_NAME: &str = "key.pem";
pub const TLS_CA_CERTIFICATE_FILE_NAME: &str = "ca.pem";

/// Recreates the slapd state directory from scratch and makes sure the
/// server state directory exists.
///
/// Everything below `PORTUNUS_SLAPD_STATE_DIR` is deleted first. The server
/// state directory keeps its contents between runs.
///
/// # Errors
/// Returns an error on the first filesystem operation that fails.
pub async fn prepare(settings: &Settings, ids: &IdentityMap, files: &SlapdFiles) -> Result<()> {
    let slapd_owner = Some(ids.slapd);
    let state_dir = &settings.slapd_state_dir;
    info!("Preparing slapd state directory {}", state_dir.display());

    fs_util::remove_dir_all_if_exists(state_dir).await?;
    fs_util::create_dir(state_dir, SLAPD_STATE_DIR_MODE, slapd_owner).await?;
    fs_util::create_dir(&settings.slapd_data_dir(), SLAPD_DATA_DIR_MODE, slapd_owner).await?;

    let schema_path = state_dir.join(slapd::SCHEMA_FILE_NAME);
    fs_util::write_new_file(
        &schema_path,
        files.schema.as_bytes(),
        SLAPD_CONFIG_FILE_MODE,
        None,
    )
    .await?;
    debug!("Wrote {}", schema_path.display());

    let config_path = settings.slapd_config_path();
    fs_util::write_new_file(
        &config_path,
        files.config.as_bytes(),
        SLAPD_CONFIG_FILE_MODE,
        None,
    )
    .await?;
    debug!("Wrote {}", config_path.display());

    if let Some(tls) = settings.tls() {
        let copies = [
            (&tls.certificate, TLS_CERTIFICATE_FILE_NAME),
            (&tls.private_key, TLS_PRIVATE_KEY_FILE_NAME),
            (&tls.ca_certificate, TLS_CA_CERTIFICATE_FILE_NAME),
        ];
        for (source, name) in copies {
            let target = state_dir.join(name);
            fs_util::copy_new_file(source, &target, TLS_FILE_MODE, slapd_owner).await?;
            debug!("Copied {} to {}", source.display(), target.display());
        }
    }

    info!(
        "Preparing server state directory {}",
        settings.server_state_dir.display()
    );
    fs_util::ensure_dir_all(
        &settings.server_state_dir,
        SERVER_STATE_DIR_MODE,
        Some(ids.server),
    )
    .await?;

    Ok(())
}

/// Lists where the TLS material ends up inside the slapd state directory.
#[must_use]
pub fn tls_targets(state_dir: &Path) -> [PathBuf; 3] {
    [
        state_dir.join(TLS_CERTIFICATE_FILE_NAME),
        state_dir.join(TLS_PRIVATE_KEY_FILE_NAME),
        state_dir.join(TLS_CA_CERTIFICATE_FILE_NAME),
    ]
}
