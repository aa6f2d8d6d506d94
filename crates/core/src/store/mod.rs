//! Flat-file persistence for tickets and staff configuration.
//!
//! Each store keeps its whole state in memory and rewrites its backing JSON
//! file on every mutation. Writes go to a sibling temp file that is renamed
//! over the target, so a crash mid-write leaves the previous state intact.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::domain::ids::{TicketId, UserId};

pub mod staff;
pub mod tickets;

pub use staff::{StaffConfigStore, StaffUpdateError};
pub use tickets::TicketStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not read state file `{path}`: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("state file `{path}` is corrupt: {source}")]
    Corrupt { path: PathBuf, source: serde_json::Error },
    #[error("state file `{path}` is inconsistent: {detail}")]
    Inconsistent { path: PathBuf, detail: String },
    #[error("could not write state file `{path}`: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("could not encode state: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("user {owner_id} still has open ticket {open_ticket_id}")]
    Conflict { owner_id: UserId, open_ticket_id: TicketId },
}

/// Reads and decodes a whole JSON file. A missing file yields `None`.
pub(crate) fn read_json<T>(path: &Path) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
{
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(StoreError::Read { path: path.to_path_buf(), source }),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Corrupt { path: path.to_path_buf(), source })
}

pub(crate) fn write_json_atomic<T>(path: &Path, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec_pretty(value).map_err(StoreError::Encode)?;
    let write_error = |source| StoreError::Write { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }

    let temp = temp_path(path);
    let mut file = File::create(&temp).map_err(write_error)?;
    file.write_all(&payload).map_err(write_error)?;
    file.sync_all().map_err(write_error)?;
    drop(file);

    fs::rename(&temp, path).map_err(write_error)
}

/// `tickets.json` -> `tickets.json.tmp`. Keeps the full file name so stores
/// that share a stem never share a temp file.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name =
        path.file_name().map(|name| name.to_os_string()).unwrap_or_else(|| "state".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// `tickets.json` -> `tickets.<suffix>`-style sibling that keeps the stem.
pub(crate) fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("state");
    path.with_file_name(format!("{stem}.{suffix}"))
}
