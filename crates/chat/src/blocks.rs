use serde::Serialize;

use ticketry_core::domain::ids::{GroupId, TicketId};
use ticketry_core::domain::ticket::Ticket;
use ticketry_core::fanout::ClaimPrompt;
use ticketry_core::routing::{RelayDirection, RelayPayload};

use crate::claim::{claim_button_value, CLAIM_ACTION_ID};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Markdown { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self::Markdown { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Markdown { text } => text,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Success,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
            disabled: false,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { block_id: String, text: TextObject },
    Section { block_id: String, text: TextObject },
    Fields { block_id: String, fields: Vec<Field> },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    /// Copy of this message with every button bound to `action_id` disabled.
    pub fn with_action_disabled(&self, action_id: &str) -> Self {
        let mut message = self.clone();
        for block in &mut message.blocks {
            if let Block::Actions { elements, .. } = block {
                elements
                    .iter_mut()
                    .filter(|button| button.action_id == action_id)
                    .for_each(|button| button.disabled = true);
            }
        }
        message
    }

    pub fn buttons(&self) -> impl Iterator<Item = &ButtonElement> {
        self.blocks.iter().flat_map(|block| match block {
            Block::Actions { elements, .. } => elements.as_slice(),
            _ => &[][..],
        })
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn header(mut self, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.blocks
            .push(Block::Header { block_id: block_id.into(), text: TextObject::plain(text) });
        self
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn fields<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut FieldsBuilder),
    {
        let mut builder = FieldsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Fields { block_id: block_id.into(), fields: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn markdown(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::markdown(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct FieldsBuilder {
    fields: Vec<Field>,
}

impl FieldsBuilder {
    pub fn field(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fields.push(Field { name: name.into(), value: value.into() });
        self
    }

    fn build(self) -> Vec<Field> {
        self.fields
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

pub fn success_message(text: &str) -> MessageTemplate {
    MessageBuilder::new(format!("✅ {text}"))
        .section("ticket.notice.success.v1", |section| {
            section.markdown(format!("✅ {text}"));
        })
        .build()
}

pub fn failure_message(text: &str) -> MessageTemplate {
    MessageBuilder::new(format!("❌ {text}"))
        .section("ticket.notice.failure.v1", |section| {
            section.markdown(format!("❌ {text}"));
        })
        .build()
}

pub fn ticket_created_message(ticket_id: TicketId) -> MessageTemplate {
    MessageBuilder::new(format!("Ticket {ticket_id} created"))
        .header("ticket.created.header.v1", "Ticket Created")
        .section("ticket.created.body.v1", |section| {
            section.plain(format!(
                "Your ticket ({ticket_id}) has been created! A staff member will be with you shortly."
            ));
        })
        .build()
}

pub fn waiting_for_claim_message() -> MessageTemplate {
    MessageBuilder::new("Your ticket is waiting to be claimed")
        .section("ticket.waiting.v1", |section| {
            section.plain(
                "⏳ Your ticket is waiting to be claimed by a staff member. Please be patient!",
            );
        })
        .build()
}

pub fn already_open_message() -> MessageTemplate {
    failure_message("You already have an open ticket! Please wait for a staff member to respond.")
}

pub fn claim_prompt_message(prompt: &ClaimPrompt) -> MessageTemplate {
    MessageBuilder::new(format!("New ticket {} from {}", prompt.ticket_id, prompt.owner_display_name))
        .header("ticket.claim_prompt.header.v1", format!("🎫 New Ticket {}", prompt.ticket_id))
        .section("ticket.claim_prompt.body.v1", |section| {
            section.markdown(format!(
                "**From:** <@{owner}> ({name})\n**Message:** {preview}",
                owner = prompt.owner_id,
                name = prompt.owner_display_name,
                preview = prompt.preview,
            ));
        })
        .actions("ticket.claim_prompt.actions.v1", |actions| {
            actions.button(
                ButtonElement::new(CLAIM_ACTION_ID, "Claim Ticket")
                    .style(ButtonStyle::Success)
                    .value(claim_button_value(prompt.ticket_id, prompt.owner_id)),
            );
        })
        .build()
}

pub fn relay_message(direction: RelayDirection, payload: &RelayPayload) -> MessageTemplate {
    let title = match direction {
        RelayDirection::FromOwner => format!("Message from {}", payload.author_display_name),
        RelayDirection::FromStaff => format!("Staff Response from {}", payload.author_display_name),
    };

    let mut builder = MessageBuilder::new(format!("{title}: {}", payload.text))
        .header("ticket.relay.header.v1", title)
        .section("ticket.relay.body.v1", |section| {
            section.plain(payload.text.clone());
        });
    if !payload.attachments.is_empty() {
        builder = builder.fields("ticket.relay.attachments.v1", |fields| {
            fields.field("Attachments", payload.attachments.join("\n"));
        });
    }
    builder
        .context("ticket.relay.footer.v1", |context| {
            context.plain(format!("Ticket {}", payload.ticket_id));
        })
        .build()
}

pub fn delivery_failed_message(direction: RelayDirection) -> MessageTemplate {
    match direction {
        RelayDirection::FromOwner => failure_message("Error sending message to staff member."),
        RelayDirection::FromStaff => failure_message("Error sending message to user."),
    }
}

pub fn claim_confirmation_message(ticket_id: TicketId) -> MessageTemplate {
    success_message(&format!(
        "You have claimed ticket {ticket_id}! You can now respond to the user via DM."
    ))
}

pub fn claim_taken_message() -> MessageTemplate {
    failure_message("This ticket has already been claimed by another staff member.")
}

pub fn claim_unavailable_message() -> MessageTemplate {
    failure_message("This ticket is no longer available.")
}

pub fn staff_assigned_message(staff_display_name: &str) -> MessageTemplate {
    MessageBuilder::new(format!("{staff_display_name} is now handling your ticket"))
        .header("ticket.assigned.header.v1", "Staff Member Assigned")
        .section("ticket.assigned.body.v1", |section| {
            section.markdown(format!(
                "**{staff_display_name}** is now handling your ticket! They will respond shortly."
            ));
        })
        .build()
}

pub fn ticket_closed_notice(ticket_id: TicketId) -> MessageTemplate {
    MessageBuilder::new(format!("Ticket {ticket_id} has been closed"))
        .section("ticket.closed.notice.v1", |section| {
            section.plain(format!("🔒 Ticket {ticket_id} has been closed."));
        })
        .build()
}

pub fn close_confirmation_message(ticket_id: TicketId) -> MessageTemplate {
    success_message(&format!("Ticket {ticket_id} has been closed."))
}

pub fn no_active_ticket_message() -> MessageTemplate {
    failure_message("You don't have an active ticket.")
}

pub fn permission_denied_message() -> MessageTemplate {
    failure_message("You don't have permission to use this command.")
}

pub fn open_tickets_message(tickets: &[Ticket]) -> MessageTemplate {
    if tickets.is_empty() {
        return MessageBuilder::new("No open tickets")
            .section("ticket.list.empty.v1", |section| {
                section.plain("📭 No open tickets.");
            })
            .build();
    }

    MessageBuilder::new(format!("{} open tickets", tickets.len()))
        .header("ticket.list.header.v1", "📋 Open Tickets")
        .fields("ticket.list.entries.v1", |fields| {
            for ticket in tickets {
                let claimed = if ticket.is_claimed() { "✅ Claimed" } else { "⏳ Unclaimed" };
                fields.field(
                    format!("Ticket {} - {claimed}", ticket.id),
                    format!(
                        "**User:** {}\n**Created:** {}",
                        ticket.owner_display_name,
                        ticket.created_at.format("%Y-%m-%d")
                    ),
                );
            }
        })
        .build()
}

pub fn staff_groups_message(groups: &[(GroupId, String)]) -> MessageTemplate {
    let listing =
        groups.iter().map(|(group_id, _)| format!("• <@&{group_id}>")).collect::<Vec<_>>();
    let names = groups.iter().map(|(_, name)| name.as_str()).collect::<Vec<_>>().join(", ");

    MessageBuilder::new(format!("Staff roles: {names}"))
        .header("staff.roles.header.v1", "📋 Staff Roles")
        .section("staff.roles.list.v1", |section| {
            section.markdown(listing.join("\n"));
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("ticket.error.summary.v1", |section| {
            section.markdown(format!("⚠️ {summary}"));
        })
        .context("ticket.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn help_message(prefix: &str) -> MessageTemplate {
    MessageBuilder::new("Ticket command help")
        .section("ticket.help.summary.v1", |section| {
            section.markdown(format!(
                "*Available commands*\n\
                 • `{prefix}close` close your ticket or the ticket you handle\n\
                 • `{prefix}tickets` list open tickets (staff)\n\
                 • `{prefix}setup @Role...` configure staff roles (admin)\n\
                 • `{prefix}add_staff_role @Role` / `{prefix}remove_staff_role @Role` (admin)\n\
                 • `{prefix}view_staff_roles` (admin)"
            ));
        })
        .build()
}
