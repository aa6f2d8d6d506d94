use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::RwLock;

use ticketry_core::domain::ids::{TicketId, UserId};

pub const CLAIM_ACTION_ID: &str = "ticket.claim.v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClaimTarget {
    pub ticket_id: TicketId,
    pub owner_id: UserId,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimValueError {
    #[error("claim action carried no payload")]
    Missing,
    #[error("malformed claim payload `{0}`")]
    Malformed(String),
}

/// Encodes the claim button payload as `<ticket_id>:<owner_id>`.
pub fn claim_button_value(ticket_id: TicketId, owner_id: UserId) -> String {
    format!("{}:{}", ticket_id.0, owner_id.0)
}

pub fn parse_claim_value(value: Option<&str>) -> Result<ClaimTarget, ClaimValueError> {
    let value = value.map(str::trim).filter(|value| !value.is_empty()).ok_or(ClaimValueError::Missing)?;
    let malformed = || ClaimValueError::Malformed(value.to_owned());

    let (ticket_id, owner_id) = value.split_once(':').ok_or_else(malformed)?;
    let ticket_id = ticket_id.parse::<TicketId>().map_err(|_| malformed())?;
    let owner_id = owner_id.parse::<UserId>().map_err(|_| malformed())?;
    if ticket_id.0 == 0 {
        return Err(malformed());
    }

    Ok(ClaimTarget { ticket_id, owner_id })
}

/// Claim prompts that no longer accept clicks, keyed by ticket and owner.
///
/// A target lands here once it has been claimed through any prompt, so the
/// copies sent to other staff members are refused without touching the
/// ticket store. Legacy ticket files can repeat an id across owners, so the
/// owner is part of the key.
#[derive(Default)]
pub struct ClaimRegistry {
    disabled: RwLock<HashSet<ClaimTarget>>,
}

impl ClaimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_disabled(&self, target: ClaimTarget) -> bool {
        self.disabled.read().await.contains(&target)
    }

    /// Returns `false` if the prompt was already disabled.
    pub async fn disable(&self, target: ClaimTarget) -> bool {
        self.disabled.write().await.insert(target)
    }

    pub async fn len(&self) -> usize {
        self.disabled.read().await.len()
    }
}
