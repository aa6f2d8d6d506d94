use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use ticketry_core::domain::ids::{GroupId, UserId};
use ticketry_core::routing::InboundMessage;

use crate::blocks::MessageTemplate;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEnvelope {
    pub envelope_id: String,
    pub event: ChatEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    Message(MessageEvent),
    ComponentAction(ComponentActionEvent),
    Unsupported { event_type: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::Message(_) => ChatEventType::Message,
            Self::ComponentAction(_) => ChatEventType::ComponentAction,
            Self::Unsupported { .. } => ChatEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    Message,
    ComponentAction,
    Unsupported,
}

/// Location of a message the bot may react to or edit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageChannel {
    Direct,
    Group { group_id: GroupId },
}

impl MessageChannel {
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Self::Direct => None,
            Self::Group { group_id } => Some(*group_id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageAuthor {
    pub user_id: UserId,
    pub display_name: String,
    pub is_bot: bool,
    /// Administrator permission in the channel's group, as reported by the platform.
    pub is_admin: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub message: MessageRef,
    pub channel: MessageChannel,
    pub author: MessageAuthor,
    pub text: String,
    pub attachments: Vec<String>,
}

impl MessageEvent {
    pub fn to_inbound(&self) -> InboundMessage {
        InboundMessage {
            sender_id: self.author.user_id,
            sender_display_name: self.author.display_name.clone(),
            sender_is_bot: self.author.is_bot,
            text: self.text.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

/// A button press on a message the bot sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentActionEvent {
    pub message: MessageRef,
    pub user_id: UserId,
    pub user_display_name: String,
    pub action_id: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// `Responded` goes back to the invoker: in the same channel for messages,
/// privately for component actions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("message handler failure: {0}")]
    Message(String),
    #[error("component action handler failure: {0}")]
    ComponentAction(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChatEventType;
    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChatEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait]
pub trait MessageService: Send + Sync {
    async fn handle_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

pub struct MessageHandler<S: ?Sized> {
    service: Arc<S>,
}

impl<S> MessageHandler<S>
where
    S: MessageService + ?Sized,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MessageHandler<S>
where
    S: MessageService + ?Sized + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Message
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.author.is_bot {
            return Ok(HandlerResult::Ignored);
        }

        self.service.handle_message(event, ctx).await
    }
}

#[async_trait]
pub trait ComponentActionService: Send + Sync {
    async fn handle_component_action(
        &self,
        event: &ComponentActionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

pub struct ComponentActionHandler<S: ?Sized> {
    service: Arc<S>,
}

impl<S> ComponentActionHandler<S>
where
    S: ComponentActionService + ?Sized,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ComponentActionHandler<S>
where
    S: ComponentActionService + ?Sized + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::ComponentAction
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::ComponentAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.service.handle_component_action(event, ctx).await
    }
}

/// Dispatcher wired to a single service handling both messages and actions.
pub fn dispatcher_for<S>(service: Arc<S>) -> EventDispatcher
where
    S: MessageService + ComponentActionService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(Arc::clone(&service)));
    dispatcher.register(ComponentActionHandler::new(service));
    dispatcher
}
