use std::path::PathBuf;

use serde::Serialize;
use ticketry_core::config::{AppConfig, LoadOptions};
use ticketry_core::domain::ticket::Ticket;
use ticketry_core::store::TicketStore;

use super::CommandResult;

const COMMAND: &str = "tickets";

#[derive(Debug, Serialize)]
struct TicketListing {
    command: &'static str,
    status: &'static str,
    path: String,
    count: usize,
    tickets: Vec<Ticket>,
}

/// Lists open tickets, or every ticket ever stored when `all` is set.
/// Reads the file directly; a running bot is not required.
pub fn run(path: Option<PathBuf>, all: bool) -> CommandResult {
    let path = match path {
        Some(path) if !path.exists() => {
            return CommandResult::failure(
                COMMAND,
                "not_found",
                format!("tickets file `{}` does not exist", path.display()),
                1,
            );
        }
        Some(path) => path,
        None => match AppConfig::load(LoadOptions::default()) {
            Ok(config) => config.storage.tickets_path,
            Err(error) => {
                return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2)
            }
        },
    };

    let store = match TicketStore::open(&path) {
        Ok(store) => store,
        Err(error) => return CommandResult::failure(COMMAND, "store", error.to_string(), 1),
    };

    let tickets = if all {
        match store.history() {
            Ok(history) => history,
            Err(error) => return CommandResult::failure(COMMAND, "store", error.to_string(), 1),
        }
    } else {
        store.all_open().into_iter().cloned().collect()
    };

    CommandResult::json(
        0,
        &TicketListing {
            command: COMMAND,
            status: "ok",
            path: path.display().to_string(),
            count: tickets.len(),
            tickets,
        },
    )
}
