//! `TicketDesk` is the service behind the dispatcher: it turns inbound
//! messages, claim clicks and prefix commands into lifecycle operations and
//! sends the resulting messages through a [`Messenger`].

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use ticketry_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use ticketry_core::domain::ids::{GroupId, UserId};
use ticketry_core::domain::staff::StaffConfig;
use ticketry_core::errors::{
    ApplicationError, DeliveryError, DirectoryError, StaffConfigError, TicketError,
};
use ticketry_core::fanout::{
    ClaimPrompt, ClaimPromptSender, GroupMember, NotificationFanout, StaffDirectory,
    DEFAULT_PREVIEW_CHARS,
};
use ticketry_core::lifecycle::TicketLifecycle;
use ticketry_core::routing::{MessageRouter, RelayDirection, RelayPayload, RoutingOutcome};
use ticketry_core::store::{StaffConfigStore, StaffUpdateError};

use crate::blocks::{self, MessageTemplate};
use crate::claim::{parse_claim_value, ClaimRegistry, CLAIM_ACTION_ID};
use crate::commands::{
    CommandContext, CommandRouteError, CommandRouter, TicketCommand, TicketCommandService,
};
use crate::events::{
    ComponentActionEvent, ComponentActionService, EventContext, EventHandlerError, HandlerResult,
    MessageChannel, MessageEvent, MessageRef, MessageService,
};

pub const DELIVERED_REACTION: &str = "✅";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MessageEditError {
    #[error("message {message_id} in {channel_id} could not be updated: {reason}")]
    Failed { channel_id: String, message_id: String, reason: String },
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_direct(
        &self,
        recipient: UserId,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError>;

    async fn add_reaction(&self, message: &MessageRef, emoji: &str) -> Result<(), MessageEditError>;

    /// Replaces the content of a message that was already sent.
    async fn update_message(
        &self,
        message: &MessageRef,
        updated: &MessageTemplate,
    ) -> Result<(), MessageEditError>;
}

#[derive(Default)]
pub struct NoopMessenger;

#[async_trait]
impl Messenger for NoopMessenger {
    async fn send_direct(
        &self,
        recipient: UserId,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        info!(
            event_name = "egress.chat.noop_send",
            user_id = recipient.0,
            fallback_text = %message.fallback_text,
            "no chat transport wired; dropping direct message"
        );
        Ok(())
    }

    async fn add_reaction(
        &self,
        _message: &MessageRef,
        _emoji: &str,
    ) -> Result<(), MessageEditError> {
        Ok(())
    }

    async fn update_message(
        &self,
        message: &MessageRef,
        updated: &MessageTemplate,
    ) -> Result<(), MessageEditError> {
        info!(
            event_name = "egress.chat.noop_update",
            channel_id = %message.channel_id,
            message_id = %message.message_id,
            fallback_text = %updated.fallback_text,
            "no chat transport wired; dropping message update"
        );
        Ok(())
    }
}

/// Directory that knows no groups.
#[derive(Default)]
pub struct NoopDirectory;

#[async_trait]
impl StaffDirectory for NoopDirectory {
    async fn group_members(
        &self,
        _home_group_id: GroupId,
        group_id: GroupId,
    ) -> Result<Vec<GroupMember>, DirectoryError> {
        Err(DirectoryError::UnknownGroup(group_id))
    }

    async fn group_name(
        &self,
        _home_group_id: GroupId,
        _group_id: GroupId,
    ) -> Result<Option<String>, DirectoryError> {
        Ok(None)
    }
}

struct MessengerPromptSender<'a> {
    messenger: &'a dyn Messenger,
}

#[async_trait]
impl<'a> ClaimPromptSender for MessengerPromptSender<'a> {
    async fn send_claim_prompt(
        &self,
        recipient: UserId,
        prompt: &ClaimPrompt,
    ) -> Result<(), DeliveryError> {
        self.messenger.send_direct(recipient, &blocks::claim_prompt_message(prompt)).await
    }
}

#[derive(Clone, Debug)]
pub struct DeskSettings {
    pub command_prefix: String,
    pub preview_chars: usize,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self { command_prefix: "!".to_owned(), preview_chars: DEFAULT_PREVIEW_CHARS }
    }
}

pub struct TicketDesk {
    lifecycle: Arc<TicketLifecycle>,
    staff: Mutex<StaffConfigStore>,
    router: MessageRouter,
    fanout: NotificationFanout,
    commands: CommandRouter,
    claims: ClaimRegistry,
    messenger: Arc<dyn Messenger>,
    directory: Arc<dyn StaffDirectory>,
    audit: Arc<dyn AuditSink>,
    preview_chars: usize,
}

impl TicketDesk {
    pub fn new(
        lifecycle: Arc<TicketLifecycle>,
        staff: StaffConfigStore,
        messenger: Arc<dyn Messenger>,
        directory: Arc<dyn StaffDirectory>,
        audit: Arc<dyn AuditSink>,
        settings: DeskSettings,
    ) -> Self {
        Self {
            lifecycle,
            staff: Mutex::new(staff),
            router: MessageRouter::new(),
            fanout: NotificationFanout::new(Arc::clone(&audit))
                .with_preview_chars(settings.preview_chars),
            commands: CommandRouter::new(settings.command_prefix),
            claims: ClaimRegistry::new(),
            messenger,
            directory,
            audit,
            preview_chars: settings.preview_chars,
        }
    }

    pub fn lifecycle(&self) -> &Arc<TicketLifecycle> {
        &self.lifecycle
    }

    pub async fn staff_config(&self) -> StaffConfig {
        self.staff.lock().await.snapshot().clone()
    }

    async fn relay(
        &self,
        source: &MessageRef,
        to: UserId,
        direction: RelayDirection,
        payload: RelayPayload,
        ctx: &EventContext,
    ) -> HandlerResult {
        let message = blocks::relay_message(direction, &payload);
        if let Err(error) = self.messenger.send_direct(to, &message).await {
            warn!(
                event_name = "ticket.relay_failed",
                ticket_id = payload.ticket_id.0,
                user_id = to.0,
                correlation_id = %ctx.correlation_id,
                error = %error,
                "relayed message not delivered"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(payload.ticket_id),
                    "ticket.relay_failed",
                    AuditCategory::Delivery,
                    "desk",
                    AuditOutcome::Failed,
                )
                .with_metadata("recipient", to.to_string())
                .with_metadata("error", error.to_string()),
            );
            return HandlerResult::Responded(blocks::delivery_failed_message(direction));
        }

        info!(
            event_name = "ticket.message_relayed",
            ticket_id = payload.ticket_id.0,
            user_id = to.0,
            direction = ?direction,
            attachments = payload.attachments.len(),
            correlation_id = %ctx.correlation_id,
            "message relayed"
        );
        if let Err(error) = self.messenger.add_reaction(source, DELIVERED_REACTION).await {
            warn!(
                event_name = "ticket.reaction_failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "could not mark message as delivered"
            );
        }
        HandlerResult::Processed
    }

    async fn open_ticket(
        &self,
        owner_id: UserId,
        owner_display_name: &str,
        text: &str,
        ctx: &EventContext,
    ) -> HandlerResult {
        let ticket = match self.lifecycle.create(owner_id, owner_display_name, text).await {
            Ok(ticket) => ticket,
            Err(TicketError::AlreadyOpen { .. }) => {
                return HandlerResult::Responded(blocks::already_open_message())
            }
            Err(error) => return HandlerResult::Responded(unavailable(error, ctx)),
        };

        let config = self.staff_config().await;
        let sender = MessengerPromptSender { messenger: self.messenger.as_ref() };
        let report = self.fanout.notify(&ticket, &config, self.directory.as_ref(), &sender).await;
        if report.notified.is_empty() && !report.skipped_unconfigured {
            warn!(
                event_name = "ticket.unannounced",
                ticket_id = ticket.id.0,
                correlation_id = %ctx.correlation_id,
                "no staff member received the claim prompt"
            );
        }

        HandlerResult::Responded(blocks::ticket_created_message(ticket.id))
    }

    async fn notify_closed(&self, recipient: UserId, message: &MessageTemplate) {
        if let Err(error) = self.messenger.send_direct(recipient, message).await {
            warn!(
                event_name = "ticket.close_notice_failed",
                user_id = recipient.0,
                error = %error,
                "close notice not delivered"
            );
        }
    }

    async fn is_staff(&self, caller: UserId) -> bool {
        let config = self.staff_config().await;
        let Some(home_group_id) = config.home_group_id.filter(|_| config.is_configured()) else {
            return false;
        };

        for group_id in &config.staff_group_ids {
            match self.directory.group_members(home_group_id, *group_id).await {
                Ok(members) if members.iter().any(|member| member.user_id == caller) => {
                    return true
                }
                Ok(_) => {}
                Err(error) => warn!(
                    event_name = "staff.lookup_failed",
                    group_id = group_id.0,
                    error = %error,
                    "could not resolve staff group"
                ),
            }
        }
        false
    }

    fn audit_staff_change(&self, event_type: &str, ctx: &CommandContext, config: &StaffConfig) {
        info!(
            event_name = event_type,
            user_id = ctx.caller_id.0,
            staff_groups = config.staff_group_ids.len(),
            correlation_id = %ctx.correlation_id,
            "staff configuration updated"
        );
        let groups =
            config.staff_group_ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        self.audit.emit(
            AuditEvent::new(
                None,
                event_type,
                AuditCategory::Configuration,
                format!("user:{}", ctx.caller_id),
                AuditOutcome::Success,
            )
            .with_metadata("staff_group_ids", groups),
        );
    }
}

fn unavailable(error: impl Into<ApplicationError>, ctx: &EventContext) -> MessageTemplate {
    let error: ApplicationError = error.into();
    let interface = error.into_interface(ctx.correlation_id.clone());
    warn!(
        event_name = "desk.operation_failed",
        correlation_id = %ctx.correlation_id,
        error = %interface,
        "ticket operation failed"
    );
    blocks::error_message(interface.user_message(), interface.correlation_id())
}

fn staff_update_failure(error: StaffUpdateError) -> Result<MessageTemplate, CommandRouteError> {
    match error {
        StaffUpdateError::Rejected(StaffConfigError::NoGroups) => {
            Ok(blocks::failure_message("Please provide at least one staff role."))
        }
        StaffUpdateError::Rejected(StaffConfigError::AlreadyStaffGroup(group)) => {
            Ok(blocks::failure_message(&format!("<@&{group}> is already a staff role.")))
        }
        StaffUpdateError::Rejected(StaffConfigError::NotStaffGroup(group)) => {
            Ok(blocks::failure_message(&format!("<@&{group}> is not a staff role.")))
        }
        StaffUpdateError::Store(error) => Err(ApplicationError::from(error).into()),
    }
}

fn group_mentions(groups: &[GroupId]) -> String {
    groups.iter().map(|group| format!("<@&{group}>")).collect::<Vec<_>>().join(", ")
}

#[async_trait]
impl MessageService for TicketDesk {
    async fn handle_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let direct = event.channel == MessageChannel::Direct;
        let parsed = self.commands.parse(&event.text).filter(|parsed| {
            !(direct && matches!(parsed, Ok(TicketCommand::Unknown { .. })))
        });
        if let Some(parsed) = parsed {
            let reply = match parsed {
                Ok(command) => {
                    let command_ctx = CommandContext {
                        caller_id: event.author.user_id,
                        caller_is_admin: event.author.is_admin,
                        group_id: event.channel.group_id(),
                        correlation_id: ctx.correlation_id.clone(),
                    };
                    match self.commands.route(self, command, &command_ctx).await {
                        Ok(reply) => reply,
                        Err(CommandRouteError::Application(error)) => unavailable(error, ctx),
                    }
                }
                Err(error) => blocks::failure_message(&error.user_message(self.commands.prefix())),
            };
            return Ok(HandlerResult::Responded(reply));
        }

        if !direct {
            return Ok(HandlerResult::Ignored);
        }

        let inbound = event.to_inbound();
        let outcome = self.lifecycle.read(|store| self.router.route(store, &inbound)).await;

        Ok(match outcome {
            RoutingOutcome::Forward { to, direction, payload } => {
                self.relay(&event.message, to, direction, payload, ctx).await
            }
            RoutingOutcome::AutoReply { ticket_id } => {
                info!(
                    event_name = "ticket.awaiting_claim",
                    ticket_id = ticket_id.0,
                    user_id = inbound.sender_id.0,
                    correlation_id = %ctx.correlation_id,
                    "owner messaged an unclaimed ticket"
                );
                HandlerResult::Responded(blocks::waiting_for_claim_message())
            }
            RoutingOutcome::Create { owner_id, owner_display_name, text } => {
                self.open_ticket(owner_id, &owner_display_name, &text, ctx).await
            }
            RoutingOutcome::Ignore => HandlerResult::Ignored,
        })
    }
}

#[async_trait]
impl ComponentActionService for TicketDesk {
    async fn handle_component_action(
        &self,
        event: &ComponentActionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        if event.action_id != CLAIM_ACTION_ID {
            return Ok(HandlerResult::Ignored);
        }

        let target = match parse_claim_value(event.value.as_deref()) {
            Ok(target) => target,
            Err(error) => {
                warn!(
                    event_name = "ticket.claim_payload_invalid",
                    user_id = event.user_id.0,
                    correlation_id = %ctx.correlation_id,
                    error = %error,
                    "claim action carried an unusable payload"
                );
                return Ok(HandlerResult::Responded(blocks::claim_unavailable_message()));
            }
        };

        if self.claims.is_disabled(target).await {
            return Ok(HandlerResult::Responded(blocks::claim_taken_message()));
        }

        let result =
            self.lifecycle.claim_ticket(target.ticket_id, target.owner_id, event.user_id).await;
        let ticket = match result {
            Ok(ticket) => ticket,
            Err(TicketError::AlreadyClaimed { .. }) => {
                self.claims.disable(target).await;
                return Ok(HandlerResult::Responded(blocks::claim_taken_message()));
            }
            Err(TicketError::NotFound(_)) => {
                return Ok(HandlerResult::Responded(blocks::claim_unavailable_message()));
            }
            Err(error) => return Ok(HandlerResult::Responded(unavailable(error, ctx))),
        };

        self.claims.disable(target).await;
        let claimed_prompt =
            blocks::claim_prompt_message(&ClaimPrompt::for_ticket(&ticket, self.preview_chars))
                .with_action_disabled(CLAIM_ACTION_ID);
        if let Err(error) = self.messenger.update_message(&event.message, &claimed_prompt).await {
            warn!(
                event_name = "ticket.claim_button_not_disabled",
                ticket_id = ticket.id.0,
                correlation_id = %ctx.correlation_id,
                error = %error,
                "claim button left enabled"
            );
        }

        let notice = blocks::staff_assigned_message(&event.user_display_name);
        if let Err(error) = self.messenger.send_direct(ticket.owner_id, &notice).await {
            warn!(
                event_name = "ticket.assignment_notice_failed",
                ticket_id = ticket.id.0,
                user_id = ticket.owner_id.0,
                correlation_id = %ctx.correlation_id,
                error = %error,
                "owner was not told about the assignment"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(ticket.id),
                    "ticket.assignment_notice_failed",
                    AuditCategory::Delivery,
                    "desk",
                    AuditOutcome::Failed,
                )
                .with_metadata("recipient", ticket.owner_id.to_string()),
            );
        }

        Ok(HandlerResult::Responded(blocks::claim_confirmation_message(ticket.id)))
    }
}

#[async_trait]
impl TicketCommandService for TicketDesk {
    async fn setup(
        &self,
        group_id: GroupId,
        staff_groups: Vec<GroupId>,
        ctx: &CommandContext,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let result = self.staff.lock().await.configure(group_id, staff_groups);
        match result {
            Ok(config) => {
                self.audit_staff_change("staff.configured", ctx, &config);
                Ok(blocks::success_message(&format!(
                    "Bot configured! Staff roles set to: {}",
                    group_mentions(&config.staff_group_ids)
                )))
            }
            Err(error) => staff_update_failure(error),
        }
    }

    async fn add_staff_group(
        &self,
        group: GroupId,
        ctx: &CommandContext,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let result = self.staff.lock().await.add_group(group);
        match result {
            Ok(config) => {
                self.audit_staff_change("staff.group_added", ctx, &config);
                Ok(blocks::success_message(&format!("Added <@&{group}> as a staff role.")))
            }
            Err(error) => staff_update_failure(error),
        }
    }

    async fn remove_staff_group(
        &self,
        group: GroupId,
        ctx: &CommandContext,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let result = self.staff.lock().await.remove_group(group);
        match result {
            Ok(config) => {
                self.audit_staff_change("staff.group_removed", ctx, &config);
                Ok(blocks::success_message(&format!("Removed <@&{group}> from staff roles.")))
            }
            Err(error) => staff_update_failure(error),
        }
    }

    async fn view_staff_groups(
        &self,
        ctx: &CommandContext,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let config = self.staff_config().await;
        if config.staff_group_ids.is_empty() {
            return Ok(blocks::failure_message(&format!(
                "No staff roles configured. Use `{}setup @Role` to set them up.",
                self.commands.prefix()
            )));
        }
        let Some(home_group_id) = ctx.group_id.or(config.home_group_id) else {
            return Ok(blocks::failure_message("No valid staff roles found."));
        };

        let mut known = Vec::new();
        for group_id in &config.staff_group_ids {
            match self.directory.group_name(home_group_id, *group_id).await {
                Ok(Some(name)) => known.push((*group_id, name)),
                Ok(None) => {}
                Err(error) => warn!(
                    event_name = "staff.lookup_failed",
                    group_id = group_id.0,
                    correlation_id = %ctx.correlation_id,
                    error = %error,
                    "could not resolve staff group name"
                ),
            }
        }

        if known.is_empty() {
            return Ok(blocks::failure_message("No valid staff roles found."));
        }
        Ok(blocks::staff_groups_message(&known))
    }

    async fn list_open_tickets(
        &self,
        ctx: &CommandContext,
    ) -> Result<MessageTemplate, CommandRouteError> {
        if !self.is_staff(ctx.caller_id).await {
            info!(
                event_name = "command.denied",
                command = "tickets",
                user_id = ctx.caller_id.0,
                correlation_id = %ctx.correlation_id,
                "ticket listing refused for non-staff caller"
            );
            return Ok(blocks::permission_denied_message());
        }

        let open = self.lifecycle.open_tickets().await;
        Ok(blocks::open_tickets_message(&open))
    }

    async fn close_ticket(
        &self,
        ctx: &CommandContext,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let ticket = match self.lifecycle.close(ctx.caller_id).await {
            Ok(ticket) => ticket,
            Err(TicketError::NotFound(_)) => return Ok(blocks::no_active_ticket_message()),
            Err(error) => return Err(ApplicationError::from(error).into()),
        };

        let notice = blocks::ticket_closed_notice(ticket.id);
        self.notify_closed(ticket.owner_id, &notice).await;
        if let Some(staff_id) = ticket.claimed_by {
            self.notify_closed(staff_id, &notice).await;
        }

        Ok(blocks::close_confirmation_message(ticket.id))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;
    use ticketry_core::audit::InMemoryAuditSink;
    use ticketry_core::domain::ids::{GroupId, TicketId, UserId};
    use ticketry_core::domain::staff::StaffConfig;
    use ticketry_core::domain::ticket::Ticket;
    use ticketry_core::errors::{DeliveryError, DirectoryError};
    use ticketry_core::fanout::{GroupMember, StaffDirectory};
    use ticketry_core::lifecycle::TicketLifecycle;
    use ticketry_core::routing::RelayDirection;
    use ticketry_core::store::{StaffConfigStore, TicketStore};

    use super::{DeskSettings, MessageEditError, Messenger, TicketDesk};
    use crate::blocks::{self, MessageTemplate};
    use crate::claim::{claim_button_value, CLAIM_ACTION_ID};
    use crate::events::{
        ComponentActionEvent, ComponentActionService, EventContext, HandlerResult, MessageAuthor,
        MessageChannel, MessageEvent, MessageRef, MessageService,
    };

    const HOME: GroupId = GroupId(1);
    const SUPPORT: GroupId = GroupId(10);
    const ALICE: UserId = UserId(100);
    const BOB: UserId = UserId(200);
    const MALLORY: UserId = UserId(666);

    #[derive(Default)]
    struct RecordingMessenger {
        unreachable: Vec<UserId>,
        sent: Mutex<Vec<(UserId, MessageTemplate)>>,
        reactions: Mutex<Vec<MessageRef>>,
        updated: Mutex<Vec<(MessageRef, MessageTemplate)>>,
    }

    impl RecordingMessenger {
        fn sent_to(&self, user: UserId) -> Vec<MessageTemplate> {
            self.sent
                .lock()
                .expect("lock")
                .iter()
                .filter(|(recipient, _)| *recipient == user)
                .map(|(_, message)| message.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_direct(
            &self,
            recipient: UserId,
            message: &MessageTemplate,
        ) -> Result<(), DeliveryError> {
            if self.unreachable.contains(&recipient) {
                return Err(DeliveryError::RecipientUnreachable(recipient));
            }
            self.sent.lock().expect("lock").push((recipient, message.clone()));
            Ok(())
        }

        async fn add_reaction(
            &self,
            message: &MessageRef,
            _emoji: &str,
        ) -> Result<(), MessageEditError> {
            self.reactions.lock().expect("lock").push(message.clone());
            Ok(())
        }

        async fn update_message(
            &self,
            message: &MessageRef,
            updated: &MessageTemplate,
        ) -> Result<(), MessageEditError> {
            self.updated.lock().expect("lock").push((message.clone(), updated.clone()));
            Ok(())
        }
    }

    struct FixedDirectory {
        groups: HashMap<GroupId, (String, Vec<GroupMember>)>,
    }

    #[async_trait]
    impl StaffDirectory for FixedDirectory {
        async fn group_members(
            &self,
            _home_group_id: GroupId,
            group_id: GroupId,
        ) -> Result<Vec<GroupMember>, DirectoryError> {
            self.groups
                .get(&group_id)
                .map(|(_, members)| members.clone())
                .ok_or(DirectoryError::UnknownGroup(group_id))
        }

        async fn group_name(
            &self,
            _home_group_id: GroupId,
            group_id: GroupId,
        ) -> Result<Option<String>, DirectoryError> {
            Ok(self.groups.get(&group_id).map(|(name, _)| name.clone()))
        }
    }

    fn directory() -> FixedDirectory {
        let bob = GroupMember { user_id: BOB, display_name: "bob".to_owned(), is_bot: false };
        FixedDirectory { groups: HashMap::from([(SUPPORT, ("Support".to_owned(), vec![bob]))]) }
    }

    fn desk_with(messenger: Arc<RecordingMessenger>, staff: StaffConfig) -> TicketDesk {
        let audit = Arc::new(InMemoryAuditSink::default());
        TicketDesk::new(
            Arc::new(TicketLifecycle::new(TicketStore::in_memory(), audit.clone())),
            StaffConfigStore::in_memory(staff),
            messenger,
            Arc::new(directory()),
            audit,
            DeskSettings::default(),
        )
    }

    fn configured() -> StaffConfig {
        StaffConfig { home_group_id: Some(HOME), staff_group_ids: vec![SUPPORT] }
    }

    fn message(from: UserId, name: &str, text: &str, channel: MessageChannel) -> MessageEvent {
        MessageEvent {
            message: MessageRef { channel_id: format!("D{from}"), message_id: "M1".to_owned() },
            channel,
            author: MessageAuthor {
                user_id: from,
                display_name: name.to_owned(),
                is_bot: false,
                is_admin: false,
            },
            text: text.to_owned(),
            attachments: Vec::new(),
        }
    }

    fn admin_message(text: &str) -> MessageEvent {
        let mut event = message(UserId(1), "admin", text, MessageChannel::Group { group_id: HOME });
        event.author.is_admin = true;
        event
    }

    fn responded(result: HandlerResult) -> MessageTemplate {
        match result {
            HandlerResult::Responded(message) => message,
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn relay_failure_is_reported_to_the_sender() {
        let messenger =
            Arc::new(RecordingMessenger { unreachable: vec![BOB], ..RecordingMessenger::default() });
        let desk = desk_with(messenger.clone(), configured());
        let ctx = EventContext::default();
        desk.lifecycle().create(ALICE, "alice", "help").await.expect("create");
        desk.lifecycle().claim(ALICE, BOB).await.expect("claim");

        let reply = responded(
            desk.handle_message(&message(ALICE, "alice", "hello?", MessageChannel::Direct), &ctx)
                .await
                .expect("handle"),
        );

        assert_eq!(reply, blocks::delivery_failed_message(RelayDirection::FromOwner));
        assert!(messenger.reactions.lock().expect("lock").is_empty());
        assert!(messenger.sent_to(BOB).is_empty());
    }

    #[tokio::test]
    async fn group_channel_chatter_is_not_ticket_traffic() {
        let messenger = Arc::new(RecordingMessenger::default());
        let desk = desk_with(messenger.clone(), configured());

        let result = desk
            .handle_message(
                &message(ALICE, "alice", "hello all", MessageChannel::Group { group_id: HOME }),
                &EventContext::default(),
            )
            .await
            .expect("handle");

        assert_eq!(result, HandlerResult::Ignored);
        assert!(desk.lifecycle().open_tickets().await.is_empty());
    }

    #[tokio::test]
    async fn commands_in_direct_messages_are_not_relayed() {
        let messenger = Arc::new(RecordingMessenger::default());
        let desk = desk_with(messenger.clone(), configured());
        let ctx = EventContext::default();

        let reply = responded(
            desk.handle_message(&message(ALICE, "alice", "!close", MessageChannel::Direct), &ctx)
                .await
                .expect("handle"),
        );

        assert_eq!(reply, blocks::no_active_ticket_message());
        assert!(desk.lifecycle().open_tickets().await.is_empty());
    }

    #[tokio::test]
    async fn unrecognised_prefixed_text_is_relayed_to_the_claimer() {
        let messenger = Arc::new(RecordingMessenger::default());
        let desk = desk_with(messenger.clone(), configured());
        let ctx = EventContext::default();
        desk.lifecycle().create(ALICE, "alice", "help").await.expect("create");
        desk.lifecycle().claim(ALICE, BOB).await.expect("claim");

        let result = desk
            .handle_message(
                &message(ALICE, "alice", "!urgent printer is on fire", MessageChannel::Direct),
                &ctx,
            )
            .await
            .expect("handle");

        assert_eq!(result, HandlerResult::Processed);
        let relayed = messenger.sent_to(BOB);
        assert_eq!(relayed.len(), 1);
        assert!(relayed[0].fallback_text.contains("!urgent printer is on fire"));
    }

    #[tokio::test]
    async fn unrecognised_prefixed_first_message_opens_a_ticket() {
        let messenger = Arc::new(RecordingMessenger::default());
        let desk = desk_with(messenger.clone(), configured());

        let reply = responded(
            desk.handle_message(
                &message(ALICE, "alice", "!!! cannot log in", MessageChannel::Direct),
                &EventContext::default(),
            )
            .await
            .expect("handle"),
        );

        let open = desk.lifecycle().open_tickets().await;
        assert_eq!(open.len(), 1);
        assert_eq!(reply, blocks::ticket_created_message(open[0].id));
        assert_eq!(open[0].initial_message, "!!! cannot log in");
    }

    #[tokio::test]
    async fn unrecognised_commands_in_group_channels_get_a_hint() {
        let messenger = Arc::new(RecordingMessenger::default());
        let desk = desk_with(messenger, configured());

        let reply = responded(
            desk.handle_message(&admin_message("!reopen"), &EventContext::default())
                .await
                .expect("handle"),
        );

        assert!(reply.fallback_text.contains("Unknown command `!reopen`"));
    }

    #[tokio::test]
    async fn staff_roles_can_be_configured_and_listed() {
        let messenger = Arc::new(RecordingMessenger::default());
        let desk = desk_with(messenger, StaffConfig::default());
        let ctx = EventContext::default();

        let empty = responded(
            desk.handle_message(&admin_message("!view_staff_roles"), &ctx).await.expect("view"),
        );
        assert!(empty.fallback_text.contains("No staff roles configured. Use `!setup @Role`"));

        let setup = responded(
            desk.handle_message(&admin_message("!setup <@&10> <@&11>"), &ctx).await.expect("setup"),
        );
        assert_eq!(
            setup.fallback_text,
            "✅ Bot configured! Staff roles set to: <@&10>, <@&11>"
        );
        assert_eq!(
            desk.staff_config().await,
            StaffConfig { home_group_id: Some(HOME), staff_group_ids: vec![SUPPORT, GroupId(11)] }
        );

        let duplicate = responded(
            desk.handle_message(&admin_message("!add_staff_role <@&10>"), &ctx).await.expect("add"),
        );
        assert_eq!(duplicate.fallback_text, "❌ <@&10> is already a staff role.");

        let removed = responded(
            desk.handle_message(&admin_message("!remove_staff_role 11"), &ctx).await.expect("rm"),
        );
        assert_eq!(removed.fallback_text, "✅ Removed <@&11> from staff roles.");

        let missing = responded(
            desk.handle_message(&admin_message("!remove_staff_role 11"), &ctx).await.expect("rm"),
        );
        assert_eq!(missing.fallback_text, "❌ <@&11> is not a staff role.");

        let listed = responded(
            desk.handle_message(&admin_message("!view_staff_roles"), &ctx).await.expect("view"),
        );
        assert_eq!(listed, blocks::staff_groups_message(&[(SUPPORT, "Support".to_owned())]));
    }

    #[tokio::test]
    async fn deleted_staff_roles_are_filtered_from_listing() {
        let messenger = Arc::new(RecordingMessenger::default());
        let stale = StaffConfig { home_group_id: Some(HOME), staff_group_ids: vec![GroupId(99)] };
        let desk = desk_with(messenger, stale);

        let reply = responded(
            desk.handle_message(&admin_message("!view_staff_roles"), &EventContext::default())
                .await
                .expect("view"),
        );
        assert_eq!(reply.fallback_text, "❌ No valid staff roles found.");
    }

    #[tokio::test]
    async fn non_admins_cannot_change_staff_roles() {
        let messenger = Arc::new(RecordingMessenger::default());
        let desk = desk_with(messenger, StaffConfig::default());
        let event =
            message(MALLORY, "mallory", "!setup <@&10>", MessageChannel::Group { group_id: HOME });

        let reply = responded(
            desk.handle_message(&event, &EventContext::default()).await.expect("handle"),
        );
        assert_eq!(reply, blocks::permission_denied_message());
        assert_eq!(desk.staff_config().await, StaffConfig::default());
    }

    #[tokio::test]
    async fn ticket_listing_is_staff_only() {
        let messenger = Arc::new(RecordingMessenger::default());
        let desk = desk_with(messenger, configured());
        let ctx = EventContext::default();
        desk.lifecycle().create(ALICE, "alice", "help").await.expect("create");

        let denied = responded(
            desk.handle_message(&message(MALLORY, "mallory", "!tickets", MessageChannel::Direct), &ctx)
                .await
                .expect("handle"),
        );
        assert_eq!(denied, blocks::permission_denied_message());

        let listed = responded(
            desk.handle_message(&message(BOB, "bob", "!tickets", MessageChannel::Direct), &ctx)
                .await
                .expect("handle"),
        );
        assert_eq!(listed, blocks::open_tickets_message(&desk.lifecycle().open_tickets().await));
        assert_eq!(listed.fallback_text, "1 open tickets");
    }

    #[tokio::test]
    async fn malformed_and_foreign_actions_are_handled() {
        let messenger = Arc::new(RecordingMessenger::default());
        let desk = desk_with(messenger, configured());
        let ctx = EventContext::default();
        let action = |action_id: &str, value: Option<&str>| ComponentActionEvent {
            message: MessageRef { channel_id: "D200".to_owned(), message_id: "P1".to_owned() },
            user_id: BOB,
            user_display_name: "bob".to_owned(),
            action_id: action_id.to_owned(),
            value: value.map(str::to_owned),
        };

        let foreign =
            desk.handle_component_action(&action("poll.vote.v1", None), &ctx).await.expect("act");
        assert_eq!(foreign, HandlerResult::Ignored);

        let malformed = desk
            .handle_component_action(&action(CLAIM_ACTION_ID, Some("garbage")), &ctx)
            .await
            .expect("act");
        assert_eq!(responded(malformed), blocks::claim_unavailable_message());

        let missing = desk
            .handle_component_action(&action(CLAIM_ACTION_ID, Some("5:100")), &ctx)
            .await
            .expect("act");
        assert_eq!(responded(missing), blocks::claim_unavailable_message());
        assert_eq!(desk.lifecycle().ticket_for(ALICE).await.map(|t| t.id), None::<TicketId>);
    }

    #[tokio::test]
    async fn repeated_legacy_ids_are_claimed_independently() {
        let mut store = TicketStore::in_memory();
        for owner in [ALICE, MALLORY] {
            store.put(Ticket::open(TicketId(3), owner, "user", "help", Utc::now())).expect("put");
        }
        let audit = Arc::new(InMemoryAuditSink::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let desk = TicketDesk::new(
            Arc::new(TicketLifecycle::new(store, audit.clone())),
            StaffConfigStore::in_memory(configured()),
            messenger.clone(),
            Arc::new(directory()),
            audit,
            DeskSettings::default(),
        );
        let ctx = EventContext::default();
        let claim = |owner: UserId| ComponentActionEvent {
            message: MessageRef { channel_id: "D200".to_owned(), message_id: format!("P{owner}") },
            user_id: BOB,
            user_display_name: "bob".to_owned(),
            action_id: CLAIM_ACTION_ID.to_owned(),
            value: Some(claim_button_value(TicketId(3), owner)),
        };

        let first = desk.handle_component_action(&claim(ALICE), &ctx).await.expect("claim");
        let second = desk.handle_component_action(&claim(MALLORY), &ctx).await.expect("claim");

        assert_eq!(responded(first), blocks::claim_confirmation_message(TicketId(3)));
        assert_eq!(responded(second), blocks::claim_confirmation_message(TicketId(3)));
        let mallory = desk.lifecycle().ticket_for(MALLORY).await.expect("ticket");
        assert_eq!(mallory.claimed_by, Some(BOB));

        let updated = messenger.updated.lock().expect("lock").clone();
        let prompts: Vec<&str> =
            updated.iter().map(|(message, _)| message.message_id.as_str()).collect();
        assert_eq!(prompts, vec![format!("P{ALICE}"), format!("P{MALLORY}")]);
        assert!(updated.iter().all(|(_, prompt)| prompt.buttons().all(|button| button.disabled)));
    }

    #[tokio::test]
    async fn setup_persists_to_the_staff_file() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path: PathBuf = dir.path().join("config.json");
        let audit = Arc::new(InMemoryAuditSink::default());
        let desk = TicketDesk::new(
            Arc::new(TicketLifecycle::new(TicketStore::in_memory(), audit.clone())),
            StaffConfigStore::open(&path).expect("open staff config"),
            Arc::new(RecordingMessenger::default()),
            Arc::new(directory()),
            audit.clone(),
            DeskSettings::default(),
        );

        desk.handle_message(&admin_message("!setup <@&10>"), &EventContext::default())
            .await
            .expect("setup");

        let reloaded = StaffConfigStore::open(&path).expect("reopen");
        assert_eq!(reloaded.snapshot(), &configured());
        assert_eq!(audit.events_of_type("staff.configured").len(), 1);
    }
}
