use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use ticketry_chat::desk::{DeskSettings, NoopDirectory, NoopMessenger, TicketDesk};
use ticketry_chat::events::dispatcher_for;
use ticketry_chat::gateway::{GatewayRunner, NoopGatewayTransport, ReconnectPolicy};
use ticketry_core::audit::TracingAuditSink;
use ticketry_core::config::{AppConfig, ConfigError, LoadOptions};
use ticketry_core::lifecycle::TicketLifecycle;
use ticketry_core::store::{StaffConfigStore, StoreError, TicketStore};

pub struct Application {
    pub config: AppConfig,
    pub desk: Arc<TicketDesk>,
    pub gateway: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("ticket store could not be opened: {0}")]
    TicketStore(#[source] StoreError),
    #[error("staff configuration could not be opened: {0}")]
    StaffConfig(#[source] StoreError),
}

#[cfg(test)]
pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    bootstrap_with_config(AppConfig::load(options)?)
}

/// Opens both state files and wires the desk to the gateway. Unreadable or
/// corrupt state is fatal; missing files start empty.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let tickets =
        TicketStore::open(&config.storage.tickets_path).map_err(BootstrapError::TicketStore)?;
    let staff = StaffConfigStore::open(&config.storage.staff_config_path)
        .map_err(BootstrapError::StaffConfig)?;
    info!(
        event_name = "system.bootstrap.state_loaded",
        correlation_id = "bootstrap",
        tickets = tickets.len(),
        staff_configured = staff.snapshot().is_configured(),
        "state files loaded"
    );

    let audit = Arc::new(TracingAuditSink);
    let desk = Arc::new(TicketDesk::new(
        Arc::new(TicketLifecycle::new(tickets, audit.clone())),
        staff,
        Arc::new(NoopMessenger),
        Arc::new(NoopDirectory),
        audit,
        DeskSettings {
            command_prefix: config.chat.command_prefix.clone(),
            preview_chars: config.chat.preview_chars,
        },
    ));
    let gateway = GatewayRunner::new(
        Arc::new(NoopGatewayTransport),
        dispatcher_for(Arc::clone(&desk)),
        ReconnectPolicy::default(),
    );
    info!(
        event_name = "system.bootstrap.gateway_ready",
        correlation_id = "bootstrap",
        transport_mode = "noop",
        "chat gateway initialized"
    );

    Ok(Application { config, desk, gateway })
}
