use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use ticketry_chat::desk::TicketDesk;

#[derive(Clone)]
pub struct HealthState {
    desk: Arc<TicketDesk>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub storage: HealthCheck,
    pub staff: HealthCheck,
    pub open_tickets: usize,
    pub checked_at: String,
}

pub fn router(desk: Arc<TicketDesk>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { desk })
}

pub async fn spawn(bind_address: &str, port: u16, desk: Arc<TicketDesk>) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(desk)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// An unconfigured desk still opens tickets, so it reports `degraded`
/// rather than failing the check.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let open_tickets = state.desk.lifecycle().open_tickets().await.len();
    let backing_file = state
        .desk
        .lifecycle()
        .read(|store| store.path().map(|path| path.display().to_string()))
        .await;
    let storage = HealthCheck {
        status: "ready",
        detail: match backing_file {
            Some(path) => format!("tickets loaded from `{path}`"),
            None => "tickets held in memory only".to_string(),
        },
    };
    let staff_config = state.desk.staff_config().await;

    let staff = if staff_config.is_configured() {
        HealthCheck {
            status: "ready",
            detail: format!("{} staff roles configured", staff_config.staff_group_ids.len()),
        }
    } else {
        HealthCheck {
            status: "degraded",
            detail: "staff roles not configured; new tickets are not announced".to_string(),
        }
    };

    let payload = HealthResponse {
        status: staff.status,
        service: HealthCheck {
            status: "ready",
            detail: "ticketry-server runtime initialized".to_string(),
        },
        storage,
        staff,
        open_tickets,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
