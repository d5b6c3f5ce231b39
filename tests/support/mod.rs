// Helper functions are shared across multiple test crates; not every helper is
// referenced in each test module.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};

pub(crate) const ENV_DUMP_VAR: &str = "FAKE_SERVER_ENV_DUMP";
pub(crate) const ARGS_DUMP_VAR: &str = "FAKE_SLAPD_ARGS_DUMP";

/// Fake slapd: records its arguments and stays in the foreground.
pub(crate) fn write_fake_slapd(dir: &Path) -> Result<PathBuf> {
    let script = format!(
        r#"#!/bin/sh
set -eu
printf '%s\n' "$@" > "${{{ARGS_DUMP_VAR}}}"
exec sleep 30
"#
    );
    write_script(&dir.join("slapd"), &script)
}

/// Fake portunus-server: waits for slapd to start, dumps its environment and
/// exits with `status`.
pub(crate) fn write_fake_server(dir: &Path, status: i32) -> Result<PathBuf> {
    let script = format!(
        r#"#!/bin/sh
set -eu
sleep 1
env > "${{{ENV_DUMP_VAR}}}"
exit {status}
"#
    );
    write_script(&dir.join("portunus-server"), &script)
}

fn write_script(path: &Path, script: &str) -> Result<PathBuf> {
    fs::write(path, script)
        .with_context(|| format!("Failed to write fake script {}", path.display()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Parses the output of `env` into key/value pairs.
pub(crate) fn read_env_dump(path: &Path) -> Result<Vec<(String, String)>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(contents
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect())
}

pub(crate) fn env_value<'a>(envs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    envs.iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

/// Name, uid and gid of the invoking user and their primary group, as listed
/// in `/etc/passwd` and `/etc/group`.
#[derive(Debug, Clone)]
pub(crate) struct CurrentIdentity {
    pub(crate) user: String,
    pub(crate) group: String,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
}

/// `None` if either name is missing or would be rejected by the orchestrator.
pub(crate) fn current_identity() -> Option<CurrentIdentity> {
    // SAFETY: getuid and getgid cannot fail.
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    let user = name_for_id(Path::new("/etc/passwd"), uid)?;
    let group = name_for_id(Path::new("/etc/group"), gid)?;
    let valid = |name: &str| portunus_orchestrator::grammars::POSIX_ACCOUNT_NAME.matches(name);
    if !valid(&user) || !valid(&group) {
        return None;
    }
    Some(CurrentIdentity {
        user,
        group,
        uid,
        gid,
    })
}

fn name_for_id(database: &Path, id: u32) -> Option<String> {
    let contents = fs::read_to_string(database).ok()?;
    contents.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(':').collect();
        let matches = fields.get(2)?.parse::<u32>().ok()? == id;
        matches.then(|| fields[0].to_string())
    })
}

/// Whether a usable libcrypt is loadable on this host.
pub(crate) fn libcrypt_available() -> bool {
    portunus_orchestrator::crypt::SystemHasher::new().is_ok()
}

/// Runs the orchestrator with exactly `envs` plus `PATH`.
pub(crate) fn run_orchestrator(envs: &[(&str, String)]) -> (String, String, i32) {
    let mut command = Command::new(env!("CARGO_BIN_EXE_portunus-orchestrator"));
    command.env_clear();
    if let Some(path) = std::env::var_os("PATH") {
        command.env("PATH", path);
    }
    for (key, value) in envs {
        command.env(key, value);
    }
    let output = command.output().expect("run portunus-orchestrator");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}
