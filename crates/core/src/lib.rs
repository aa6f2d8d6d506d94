pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod fanout;
pub mod lifecycle;
pub mod routing;
pub mod store;

pub use audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use domain::ids::{GroupId, TicketId, UserId};
pub use domain::staff::StaffConfig;
pub use domain::ticket::{Ticket, TicketStatus};
pub use errors::{
    ApplicationError, DeliveryError, DirectoryError, DomainError, InterfaceError,
    StaffConfigError, TicketError,
};
pub use fanout::{
    ClaimPrompt, ClaimPromptSender, FanoutReport, GroupMember, NotificationFanout, StaffDirectory,
};
pub use lifecycle::TicketLifecycle;
pub use routing::{InboundMessage, MessageRouter, RelayDirection, RelayPayload, RoutingOutcome};
pub use store::{StaffConfigStore, StaffUpdateError, StoreError, TicketStore};
