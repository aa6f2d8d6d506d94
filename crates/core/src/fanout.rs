use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::ids::{GroupId, TicketId, UserId};
use crate::domain::staff::StaffConfig;
use crate::domain::ticket::Ticket;
use crate::errors::{DeliveryError, DirectoryError};

pub const DEFAULT_PREVIEW_CHARS: usize = 500;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupMember {
    pub user_id: UserId,
    pub display_name: String,
    pub is_bot: bool,
}

/// Resolves staff groups to their members within the home group.
#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn group_members(
        &self,
        home_group_id: GroupId,
        group_id: GroupId,
    ) -> Result<Vec<GroupMember>, DirectoryError>;

    /// Display name of the group, or `None` if it no longer exists.
    async fn group_name(
        &self,
        home_group_id: GroupId,
        group_id: GroupId,
    ) -> Result<Option<String>, DirectoryError>;
}

/// What a staff member receives when a ticket opens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimPrompt {
    pub ticket_id: TicketId,
    pub owner_id: UserId,
    pub owner_display_name: String,
    pub preview: String,
}

impl ClaimPrompt {
    pub fn for_ticket(ticket: &Ticket, preview_chars: usize) -> Self {
        Self {
            ticket_id: ticket.id,
            owner_id: ticket.owner_id,
            owner_display_name: ticket.owner_display_name.clone(),
            preview: ticket.preview(preview_chars),
        }
    }
}

#[async_trait]
pub trait ClaimPromptSender: Send + Sync {
    async fn send_claim_prompt(
        &self,
        recipient: UserId,
        prompt: &ClaimPrompt,
    ) -> Result<(), DeliveryError>;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub notified: Vec<UserId>,
    pub skipped_bots: usize,
    pub skipped_unconfigured: bool,
    pub delivery_failures: Vec<DeliveryError>,
    pub directory_failures: Vec<DirectoryError>,
}

pub struct NotificationFanout {
    audit: Arc<dyn AuditSink>,
    preview_chars: usize,
}

impl NotificationFanout {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit, preview_chars: DEFAULT_PREVIEW_CHARS }
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    /// Sends one claim prompt to every distinct human member of the staff
    /// groups. Failures are recorded per group or recipient and never stop
    /// the remaining sends.
    pub async fn notify(
        &self,
        ticket: &Ticket,
        config: &StaffConfig,
        directory: &dyn StaffDirectory,
        sender: &dyn ClaimPromptSender,
    ) -> FanoutReport {
        let mut report = FanoutReport::default();
        let Some(home_group_id) = config.home_group_id.filter(|_| config.is_configured()) else {
            info!(
                event_name = "fanout.skipped",
                ticket_id = ticket.id.0,
                "staff groups not configured; no claim prompts sent"
            );
            report.skipped_unconfigured = true;
            return report;
        };

        let prompt = ClaimPrompt::for_ticket(ticket, self.preview_chars);
        let mut already_notified: HashSet<UserId> = HashSet::new();

        for group_id in &config.staff_group_ids {
            let members = match directory.group_members(home_group_id, *group_id).await {
                Ok(members) => members,
                Err(error) => {
                    warn!(
                        event_name = "fanout.directory_failed",
                        ticket_id = ticket.id.0,
                        group_id = group_id.0,
                        error = %error,
                        "could not resolve staff group"
                    );
                    self.audit.emit(
                        AuditEvent::new(
                            Some(ticket.id),
                            "fanout.directory_failed",
                            AuditCategory::Fanout,
                            "fanout",
                            AuditOutcome::Failed,
                        )
                        .with_metadata("group_id", group_id.to_string())
                        .with_metadata("error", error.to_string()),
                    );
                    report.directory_failures.push(error);
                    continue;
                }
            };

            for member in members {
                if member.is_bot {
                    report.skipped_bots += 1;
                    continue;
                }
                if !already_notified.insert(member.user_id) {
                    continue;
                }

                match sender.send_claim_prompt(member.user_id, &prompt).await {
                    Ok(()) => report.notified.push(member.user_id),
                    Err(error) => {
                        warn!(
                            event_name = "fanout.delivery_failed",
                            ticket_id = ticket.id.0,
                            user_id = member.user_id.0,
                            error = %error,
                            "claim prompt not delivered"
                        );
                        self.audit.emit(
                            AuditEvent::new(
                                Some(ticket.id),
                                "fanout.delivery_failed",
                                AuditCategory::Delivery,
                                "fanout",
                                AuditOutcome::Failed,
                            )
                            .with_metadata("recipient", member.user_id.to_string())
                            .with_metadata("error", error.to_string()),
                        );
                        report.delivery_failures.push(error);
                    }
                }
            }
        }

        info!(
            event_name = "fanout.completed",
            ticket_id = ticket.id.0,
            notified = report.notified.len(),
            delivery_failures = report.delivery_failures.len(),
            directory_failures = report.directory_failures.len(),
            "claim prompts sent"
        );
        report
    }
}
