use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Settings;

pub const PASSWD_DATABASE: &str = "/etc/passwd";
pub const GROUP_DATABASE: &str = "/etc/group";

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("while reading {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("while reading {}: cannot find ID for {name:?}", path.display())]
    NotFound { path: PathBuf, name: String },
    #[error("while reading {}: cannot parse ID for {name:?}: {reason}", path.display())]
    MalformedId {
        path: PathBuf,
        name: String,
        reason: String,
    },
}

/// Locations of the host's user and group databases.
#[derive(Debug, Clone)]
pub struct IdentityDatabases {
    pub passwd: PathBuf,
    pub group: PathBuf,
}

impl Default for IdentityDatabases {
    fn default() -> Self {
        Self {
            passwd: PathBuf::from(PASSWD_DATABASE),
            group: PathBuf::from(GROUP_DATABASE),
        }
    }
}

/// Numeric owner for a node in the runtime tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

/// Resolved IDs for the application server and directory server slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityMap {
    pub server: Ownership,
    pub slapd: Ownership,
}

impl IdentityMap {
    /// Resolves all four slots against `/etc/passwd` and `/etc/group`.
    ///
    /// # Errors
    /// Returns an error if any user or group is unknown or has an unparseable ID.
    pub fn resolve(settings: &Settings) -> Result<Self, LookupError> {
        Self::resolve_with(settings, &IdentityDatabases::default())
    }

    /// Resolves all four slots against the given databases.
    ///
    /// # Errors
    /// Returns an error if any user or group is unknown or has an unparseable ID.
    pub fn resolve_with(
        settings: &Settings,
        databases: &IdentityDatabases,
    ) -> Result<Self, LookupError> {
        let ids = Self {
            server: Ownership {
                uid: lookup_id(&databases.passwd, &settings.server_user)?,
                gid: lookup_id(&databases.group, &settings.server_group)?,
            },
            slapd: Ownership {
                uid: lookup_id(&databases.passwd, &settings.slapd_user)?,
                gid: lookup_id(&databases.group, &settings.slapd_group)?,
            },
        };
        debug!(
            "Resolved identities: server={}:{} slapd={}:{}",
            ids.server.uid, ids.server.gid, ids.slapd.uid, ids.slapd.gid
        );
        Ok(ids)
    }
}

/// Looks up the numeric ID of `name` in a passwd(5) or group(5) style database.
///
/// # Errors
/// Returns an error if the database cannot be read, the name is absent, or
/// its ID column is not a 32-bit unsigned integer.
pub fn lookup_id(database: &Path, name: &str) -> Result<u32, LookupError> {
    let contents = std::fs::read_to_string(database).map_err(|source| LookupError::Read {
        path: database.to_path_buf(),
        source,
    })?;
    find_id(&contents, name).map_err(|err| match err {
        RowError::Absent => LookupError::NotFound {
            path: database.to_path_buf(),
            name: name.to_string(),
        },
        RowError::Malformed(reason) => LookupError::MalformedId {
            path: database.to_path_buf(),
            name: name.to_string(),
            reason,
        },
    })
}

#[derive(Debug, PartialEq, Eq)]
enum RowError {
    Absent,
    Malformed(String),
}

// Both databases put the entity name in the first column and its own
// numeric ID in the third; uid_t and gid_t are 32 bits wide on Linux.
fn find_id(contents: &str, name: &str) -> Result<u32, RowError> {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split(':');
        if fields.next() != Some(name) {
            continue;
        }
        let id = fields
            .nth(1)
            .ok_or_else(|| RowError::Malformed("missing ID column".to_string()))?;
        return id
            .parse::<u32>()
            .map_err(|err| RowError::Malformed(err.to_string()));
    }
    Err(RowError::Absent)
}
