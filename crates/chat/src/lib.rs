//! Chat-platform surface for ticketry.
//!
//! - **Gateway** (`gateway`) - connection loop with reconnect backoff
//! - **Events** (`events`) - inbound envelopes and the handler dispatcher
//! - **Commands** (`commands`) - `!setup`, `!close`, `!tickets` and friends
//! - **Claim** (`claim`) - claim button payloads and the disabled-prompt registry
//! - **Desk** (`desk`) - executes routing outcomes and commands against the platform
//! - **Blocks** (`blocks`) - message templates
//!
//! ```text
//! Gateway → EventDispatcher → TicketDesk → TicketLifecycle / MessageRouter / NotificationFanout
//!                                 ↓
//!                            Messenger ← MessageTemplate
//! ```

pub mod blocks;
pub mod claim;
pub mod commands;
pub mod desk;
pub mod events;
pub mod gateway;
