//! Direct-message routing.
//!
//! Priority, first match wins:
//!
//! 1. the sender owns an open ticket: relay to the claimer, or tell the sender
//!    to wait if nobody has claimed it yet;
//! 2. the sender has claimed an open ticket: relay to the ticket owner;
//! 3. otherwise: open a new ticket.
//!
//! A sender who owns an open ticket and also claims someone else's is always
//! treated as the owner.

use serde::Serialize;

use crate::domain::ids::{TicketId, UserId};
use crate::store::TicketStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender_id: UserId,
    pub sender_display_name: String,
    pub sender_is_bot: bool,
    pub text: String,
    /// Opaque attachment URLs, relayed as-is.
    pub attachments: Vec<String>,
}

impl InboundMessage {
    pub fn new(
        sender_id: UserId,
        sender_display_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id,
            sender_display_name: sender_display_name.into(),
            sender_is_bot: false,
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, url: impl Into<String>) -> Self {
        self.attachments.push(url.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayDirection {
    FromOwner,
    FromStaff,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelayPayload {
    pub ticket_id: TicketId,
    pub author_display_name: String,
    pub text: String,
    pub attachments: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingOutcome {
    Forward { to: UserId, direction: RelayDirection, payload: RelayPayload },
    AutoReply { ticket_id: TicketId },
    Create { owner_id: UserId, owner_display_name: String, text: String },
    Ignore,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MessageRouter;

impl MessageRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn route(&self, store: &TicketStore, message: &InboundMessage) -> RoutingOutcome {
        if message.sender_is_bot {
            return RoutingOutcome::Ignore;
        }

        if let Some(ticket) = store.open_ticket(message.sender_id) {
            return match ticket.claimed_by {
                Some(staff_id) => RoutingOutcome::Forward {
                    to: staff_id,
                    direction: RelayDirection::FromOwner,
                    payload: relay_payload(ticket.id, message),
                },
                None => RoutingOutcome::AutoReply { ticket_id: ticket.id },
            };
        }

        if let Some(ticket) = store.find_open_claimed_by(message.sender_id) {
            return RoutingOutcome::Forward {
                to: ticket.owner_id,
                direction: RelayDirection::FromStaff,
                payload: relay_payload(ticket.id, message),
            };
        }

        RoutingOutcome::Create {
            owner_id: message.sender_id,
            owner_display_name: message.sender_display_name.clone(),
            text: message.text.clone(),
        }
    }
}

fn relay_payload(ticket_id: TicketId, message: &InboundMessage) -> RelayPayload {
    RelayPayload {
        ticket_id,
        author_display_name: message.sender_display_name.clone(),
        text: message.text.clone(),
        attachments: message.attachments.clone(),
    }
}
