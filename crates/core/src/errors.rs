use thiserror::Error;

use crate::domain::ids::{GroupId, TicketId, UserId};
use crate::domain::ticket::TicketStatus;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid ticket transition from {from:?} to {to:?}")]
    InvalidTicketTransition { from: TicketStatus, to: TicketStatus },
    #[error("ticket {ticket_id} is not open")]
    TicketNotOpen { ticket_id: TicketId },
    #[error("ticket {ticket_id} is already claimed by {claimed_by}")]
    TicketAlreadyClaimed { ticket_id: TicketId, claimed_by: UserId },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StaffConfigError {
    #[error("at least one staff group is required")]
    NoGroups,
    #[error("group {0} is already a staff group")]
    AlreadyStaffGroup(GroupId),
    #[error("group {0} is not a staff group")]
    NotStaffGroup(GroupId),
}

/// Rejections produced by ticket lifecycle operations.
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("user {owner_id} already has open ticket {ticket_id}")]
    AlreadyOpen { owner_id: UserId, ticket_id: TicketId },
    #[error("ticket {ticket_id} is already claimed by {claimed_by}")]
    AlreadyClaimed { ticket_id: TicketId, claimed_by: UserId },
    #[error("no open ticket found for {0}")]
    NotFound(UserId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TicketError {
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("user {0} does not accept direct messages")]
    RecipientUnreachable(UserId),
    #[error("delivery to {recipient} failed: {reason}")]
    Failed { recipient: UserId, reason: String },
}

impl DeliveryError {
    pub fn recipient(&self) -> UserId {
        match self {
            Self::RecipientUnreachable(recipient) | Self::Failed { recipient, .. } => *recipient,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("group {0} is unknown to the directory")]
    UnknownGroup(GroupId),
    #[error("directory lookup for group {group} failed: {reason}")]
    Lookup { group: GroupId, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<TicketError> for ApplicationError {
    fn from(value: TicketError) -> Self {
        match value {
            TicketError::Store(error) => error.into(),
            rejection => Self::Domain(DomainError::InvariantViolation(rejection.to_string())),
        }
    }
}

impl From<DeliveryError> for ApplicationError {
    fn from(value: DeliveryError) -> Self {
        Self::Integration(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The ticket service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::domain::ids::{TicketId, UserId};
    use crate::errors::{ApplicationError, DeliveryError, DomainError, InterfaceError, TicketError};
    use crate::store::StoreError;

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::TicketNotOpen { ticket_id: TicketId(4) })
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let store_error = StoreError::Write {
            path: PathBuf::from("tickets.json"),
            source: std::io::Error::other("disk full"),
        };
        let interface = ApplicationError::from(store_error).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
        assert_eq!(
            interface.user_message(),
            "The ticket service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("missing bot token".to_owned()).into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn delivery_error_exposes_recipient() {
        let error = DeliveryError::Failed { recipient: UserId(9), reason: "timeout".to_owned() };
        assert_eq!(error.recipient(), UserId(9));
        assert!(matches!(ApplicationError::from(error), ApplicationError::Integration(_)));
    }

    #[test]
    fn store_failures_are_not_rejections() {
        assert!(TicketError::NotFound(UserId(1)).is_rejection());
        let store = TicketError::from(StoreError::Encode(
            serde_json::from_str::<u8>("x").expect_err("invalid json"),
        ));
        assert!(!store.is_rejection());
        assert!(matches!(ApplicationError::from(store), ApplicationError::Persistence(_)));
        assert!(matches!(
            ApplicationError::from(TicketError::NotFound(UserId(1))),
            ApplicationError::Domain(DomainError::InvariantViolation(_))
        ));
    }
}
