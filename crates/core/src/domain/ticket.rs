use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{user_id_string, TicketId, UserId};
use crate::domain::timestamp;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Closed,
}

/// A support request tied to one requesting user.
///
/// Field names on the wire follow the tickets file layout; `claimed_by` is
/// written as `null` while unclaimed and `closed_at` only appears once the
/// ticket has been closed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(rename = "ticket_id")]
    pub id: TicketId,
    #[serde(rename = "user_id", with = "user_id_string")]
    pub owner_id: UserId,
    #[serde(rename = "username")]
    pub owner_display_name: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub initial_message: String,
    pub status: TicketStatus,
    #[serde(default)]
    pub claimed_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn open(
        id: TicketId,
        owner_id: UserId,
        owner_display_name: impl Into<String>,
        initial_message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            owner_display_name: owner_display_name.into(),
            created_at,
            initial_message: initial_message.into(),
            status: TicketStatus::Open,
            claimed_by: None,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed_by.is_some()
    }

    pub fn is_claimed_by(&self, staff_id: UserId) -> bool {
        self.claimed_by == Some(staff_id)
    }

    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        matches!((self.status, next), (TicketStatus::Open, TicketStatus::Closed))
    }

    /// Assigns the ticket to `staff_id`. The assignment is permanent.
    pub fn claim(&mut self, staff_id: UserId) -> Result<(), DomainError> {
        if !self.is_open() {
            return Err(DomainError::TicketNotOpen { ticket_id: self.id });
        }
        if let Some(claimed_by) = self.claimed_by {
            return Err(DomainError::TicketAlreadyClaimed { ticket_id: self.id, claimed_by });
        }

        self.claimed_by = Some(staff_id);
        Ok(())
    }

    pub fn close(&mut self, closed_at: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.can_transition_to(TicketStatus::Closed) {
            return Err(DomainError::InvalidTicketTransition {
                from: self.status,
                to: TicketStatus::Closed,
            });
        }

        self.status = TicketStatus::Closed;
        self.closed_at = Some(closed_at);
        Ok(())
    }

    /// Leading slice of the initial message used in staff notifications.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.initial_message.chars();
        let preview: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{preview}…")
        } else {
            preview
        }
    }
}
