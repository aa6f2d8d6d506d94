use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{read_json, sibling_path, write_json_atomic, StoreError};
use crate::domain::ids::{TicketId, UserId};
use crate::domain::ticket::Ticket;

#[derive(Clone, Debug)]
struct BackingFiles {
    tickets: PathBuf,
    archive: PathBuf,
}

/// Ticket records keyed by owner, one record per owner.
///
/// When an owner opens a new ticket after an earlier one was closed, the
/// closed record moves to an append-only archive next to the tickets file.
/// The id counter is seeded from the highest id seen in either file, so ids
/// never repeat even though the live map only holds one record per owner.
#[derive(Debug)]
pub struct TicketStore {
    files: Option<BackingFiles>,
    tickets: BTreeMap<UserId, Ticket>,
    last_ticket_id: TicketId,
}

impl TicketStore {
    pub fn in_memory() -> Self {
        Self { files: None, tickets: BTreeMap::new(), last_ticket_id: TicketId(0) }
    }

    /// Loads the tickets file at `path`, or starts empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let tickets_path = path.into();
        let archive_path = sibling_path(&tickets_path, "archive.jsonl");

        let tickets: BTreeMap<UserId, Ticket> = read_json(&tickets_path)?.unwrap_or_default();
        for (owner_id, ticket) in &tickets {
            if ticket.owner_id != *owner_id {
                return Err(StoreError::Inconsistent {
                    path: tickets_path,
                    detail: format!(
                        "ticket {} is filed under {owner_id} but owned by {}",
                        ticket.id, ticket.owner_id
                    ),
                });
            }
        }

        let archived_max = highest_archived_id(&archive_path)?;
        let live_max = tickets.values().map(|ticket| ticket.id).max().unwrap_or(TicketId(0));
        let last_ticket_id = live_max.max(archived_max);

        info!(
            event_name = "store.tickets.loaded",
            path = %tickets_path.display(),
            tickets = tickets.len(),
            last_ticket_id = last_ticket_id.0,
            "ticket store loaded"
        );

        Ok(Self {
            files: Some(BackingFiles { tickets: tickets_path, archive: archive_path }),
            tickets,
            last_ticket_id,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.files.as_ref().map(|files| files.tickets.as_path())
    }

    pub fn archive_path(&self) -> Option<&Path> {
        self.files.as_ref().map(|files| files.archive.as_path())
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Latest ticket for `owner_id`, open or closed.
    pub fn get(&self, owner_id: UserId) -> Option<&Ticket> {
        self.tickets.get(&owner_id)
    }

    pub fn open_ticket(&self, owner_id: UserId) -> Option<&Ticket> {
        self.get(owner_id).filter(|ticket| ticket.is_open())
    }

    /// Open tickets ordered by ticket id.
    pub fn all_open(&self) -> Vec<&Ticket> {
        let mut open: Vec<&Ticket> = self.tickets.values().filter(|ticket| ticket.is_open()).collect();
        open.sort_by_key(|ticket| ticket.id);
        open
    }

    /// The open ticket `staff_id` has claimed. If there are several, the
    /// oldest one wins.
    pub fn find_open_claimed_by(&self, staff_id: UserId) -> Option<&Ticket> {
        self.tickets
            .values()
            .filter(|ticket| ticket.is_open() && ticket.is_claimed_by(staff_id))
            .min_by_key(|ticket| ticket.id)
    }

    pub fn next_id(&self) -> TicketId {
        self.last_ticket_id.next()
    }

    /// Inserts or fully overwrites the owner's record and persists the store.
    ///
    /// The tickets file is rewritten before a superseded closed record is
    /// appended to the archive. If either step fails, memory and the tickets
    /// file are restored and nothing reaches the archive.
    pub fn put(&mut self, ticket: Ticket) -> Result<(), StoreError> {
        let owner_id = ticket.owner_id;
        let ticket_id = ticket.id;

        if let Some(previous) = self.tickets.get(&owner_id) {
            if previous.id != ticket_id && previous.is_open() {
                return Err(StoreError::Conflict { owner_id, open_ticket_id: previous.id });
            }
        }

        let replaced = self.tickets.insert(owner_id, ticket);
        if let Err(error) = self.persist() {
            self.restore(owner_id, replaced);
            return Err(error);
        }

        let archived = match (replaced.as_ref(), &self.files) {
            (Some(previous), Some(files)) if previous.id != ticket_id => {
                append_archive(&files.archive, previous).map(|()| Some(previous.id))
            }
            _ => Ok(None),
        };
        match archived {
            Ok(Some(archived_id)) => debug!(
                event_name = "store.tickets.archived",
                ticket_id = archived_id.0,
                user_id = owner_id.0,
                "closed ticket archived"
            ),
            Ok(None) => {}
            Err(error) => {
                self.restore(owner_id, replaced);
                if let Err(rewrite) = self.persist() {
                    warn!(
                        event_name = "store.tickets.restore_failed",
                        user_id = owner_id.0,
                        error = %rewrite,
                        "tickets file could not be restored after a failed archive write"
                    );
                }
                return Err(error);
            }
        }

        self.last_ticket_id = self.last_ticket_id.max(ticket_id);
        Ok(())
    }

    fn restore(&mut self, owner_id: UserId, replaced: Option<Ticket>) {
        match replaced {
            Some(replaced) => self.tickets.insert(owner_id, replaced),
            None => self.tickets.remove(&owner_id),
        };
    }

    /// Every record ever stored: archived closed tickets followed by the live
    /// map, ordered by ticket id.
    pub fn history(&self) -> Result<Vec<Ticket>, StoreError> {
        let mut records = match &self.files {
            Some(files) => read_archive(&files.archive)?,
            None => Vec::new(),
        };
        records.extend(self.tickets.values().cloned());
        records.sort_by_key(|ticket| ticket.id);
        Ok(records)
    }

    fn persist(&self) -> Result<(), StoreError> {
        match &self.files {
            Some(files) => write_json_atomic(&files.tickets, &self.tickets),
            None => Ok(()),
        }
    }
}

fn append_archive(path: &Path, ticket: &Ticket) -> Result<(), StoreError> {
    let write_error = |source| StoreError::Write { path: path.to_path_buf(), source };
    let mut line = serde_json::to_vec(ticket).map_err(StoreError::Encode)?;
    line.push(b'\n');

    let mut file =
        OpenOptions::new().create(true).append(true).open(path).map_err(write_error)?;
    file.write_all(&line).map_err(write_error)?;
    file.sync_all().map_err(write_error)
}

fn read_archive(path: &Path) -> Result<Vec<Ticket>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(StoreError::Read { path: path.to_path_buf(), source }),
    };

    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<Ticket>(line)
                .map_err(|source| StoreError::Corrupt { path: path.to_path_buf(), source })
        })
        .collect()
}

fn highest_archived_id(path: &Path) -> Result<TicketId, StoreError> {
    Ok(read_archive(path)?.iter().map(|ticket| ticket.id).max().unwrap_or(TicketId(0)))
}
