use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use ticketry_core::domain::ids::{GroupId, UserId};
use ticketry_core::errors::ApplicationError;

use crate::blocks::{self, MessageTemplate};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketCommand {
    Setup { groups: Vec<GroupId> },
    AddStaffRole { group: GroupId },
    RemoveStaffRole { group: GroupId },
    ViewStaffRoles,
    Tickets,
    Close,
    Help,
    Unknown { verb: String },
}

impl TicketCommand {
    pub fn name(&self) -> &str {
        match self {
            Self::Setup { .. } => "setup",
            Self::AddStaffRole { .. } => "add_staff_role",
            Self::RemoveStaffRole { .. } => "remove_staff_role",
            Self::ViewStaffRoles => "view_staff_roles",
            Self::Tickets => "tickets",
            Self::Close => "close",
            Self::Help => "help",
            Self::Unknown { verb } => verb,
        }
    }

    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Self::Setup { .. }
                | Self::AddStaffRole { .. }
                | Self::RemoveStaffRole { .. }
                | Self::ViewStaffRoles
        )
    }

    /// Commands that act on the group the message was posted in.
    pub fn requires_group_channel(&self) -> bool {
        self.requires_admin()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("`setup` needs at least one staff role")]
    MissingGroups,
    #[error("`{command}` needs a staff role")]
    MissingGroup { command: &'static str },
    #[error("`{token}` is not a role mention or id")]
    InvalidGroup { token: String },
}

impl CommandParseError {
    pub fn user_message(&self, prefix: &str) -> String {
        match self {
            Self::MissingGroups => format!(
                "Please provide at least one staff role.\nUsage: `{prefix}setup @Role1 @Role2 @Role3`"
            ),
            Self::MissingGroup { command } => {
                format!("Please provide a staff role.\nUsage: `{prefix}{command} @Role`")
            }
            Self::InvalidGroup { token } => format!("`{token}` is not a role."),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

/// Who issued a command and where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandContext {
    pub caller_id: UserId,
    pub caller_is_admin: bool,
    /// Group the command was posted in; `None` for direct messages.
    pub group_id: Option<GroupId>,
    pub correlation_id: String,
}

/// Parses `text` as a prefix command. Returns `None` when the text is not a
/// command at all, so it can be routed as ticket traffic instead.
pub fn parse_prefix_command(
    prefix: &str,
    text: &str,
) -> Option<Result<TicketCommand, CommandParseError>> {
    let body = text.trim_start().strip_prefix(prefix)?;
    let mut parts = body.split_whitespace();
    let verb = parts.next()?.to_ascii_lowercase();
    if body.starts_with(char::is_whitespace) {
        return None;
    }
    let args: Vec<&str> = parts.collect();

    Some(classify_command(&verb, &args))
}

fn classify_command(verb: &str, args: &[&str]) -> Result<TicketCommand, CommandParseError> {
    match verb {
        "setup" => {
            let groups = parse_groups(args)?;
            if groups.is_empty() {
                return Err(CommandParseError::MissingGroups);
            }
            Ok(TicketCommand::Setup { groups })
        }
        "add_staff_role" => {
            Ok(TicketCommand::AddStaffRole { group: single_group("add_staff_role", args)? })
        }
        "remove_staff_role" => {
            Ok(TicketCommand::RemoveStaffRole { group: single_group("remove_staff_role", args)? })
        }
        "view_staff_roles" => Ok(TicketCommand::ViewStaffRoles),
        "tickets" => Ok(TicketCommand::Tickets),
        "close" => Ok(TicketCommand::Close),
        "help" => Ok(TicketCommand::Help),
        _ => Ok(TicketCommand::Unknown { verb: verb.to_owned() }),
    }
}

fn parse_groups(args: &[&str]) -> Result<Vec<GroupId>, CommandParseError> {
    args.iter()
        .map(|token| {
            parse_group_mention(token)
                .ok_or_else(|| CommandParseError::InvalidGroup { token: (*token).to_owned() })
        })
        .collect()
}

fn single_group(command: &'static str, args: &[&str]) -> Result<GroupId, CommandParseError> {
    let token = args.first().ok_or(CommandParseError::MissingGroup { command })?;
    parse_group_mention(token)
        .ok_or_else(|| CommandParseError::InvalidGroup { token: (*token).to_owned() })
}

/// Accepts a role mention (`<@&123>`) or a bare numeric id.
pub fn parse_group_mention(token: &str) -> Option<GroupId> {
    let token = token.trim().trim_end_matches(',');
    let raw = token
        .strip_prefix("<@&")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(token);
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    raw.parse::<GroupId>().ok()
}

#[async_trait]
pub trait TicketCommandService: Send + Sync {
    async fn setup(
        &self,
        group_id: GroupId,
        staff_groups: Vec<GroupId>,
        ctx: &CommandContext,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn add_staff_group(
        &self,
        group: GroupId,
        ctx: &CommandContext,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn remove_staff_group(
        &self,
        group: GroupId,
        ctx: &CommandContext,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn view_staff_groups(
        &self,
        ctx: &CommandContext,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn list_open_tickets(
        &self,
        ctx: &CommandContext,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn close_ticket(&self, ctx: &CommandContext)
        -> Result<MessageTemplate, CommandRouteError>;
}

const GROUP_ONLY: &str = "This command can only be used in a server.";

/// Applies permission gates and hands the command to the service.
pub struct CommandRouter {
    prefix: String,
}

impl CommandRouter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn parse(&self, text: &str) -> Option<Result<TicketCommand, CommandParseError>> {
        parse_prefix_command(&self.prefix, text)
    }

    pub async fn route<S>(
        &self,
        service: &S,
        command: TicketCommand,
        ctx: &CommandContext,
    ) -> Result<MessageTemplate, CommandRouteError>
    where
        S: TicketCommandService + ?Sized,
    {
        if command.requires_admin() && !ctx.caller_is_admin {
            info!(
                event_name = "command.denied",
                command = command.name(),
                user_id = ctx.caller_id.0,
                correlation_id = %ctx.correlation_id,
                "administrator command refused"
            );
            return Ok(blocks::permission_denied_message());
        }
        if command.requires_group_channel() && ctx.group_id.is_none() {
            return Ok(blocks::failure_message(GROUP_ONLY));
        }

        info!(
            event_name = "command.received",
            command = command.name(),
            user_id = ctx.caller_id.0,
            correlation_id = %ctx.correlation_id,
            "routing command"
        );

        match command {
            TicketCommand::Setup { groups } => match ctx.group_id {
                Some(group_id) => service.setup(group_id, groups, ctx).await,
                None => Ok(blocks::failure_message(GROUP_ONLY)),
            },
            TicketCommand::AddStaffRole { group } => service.add_staff_group(group, ctx).await,
            TicketCommand::RemoveStaffRole { group } => {
                service.remove_staff_group(group, ctx).await
            }
            TicketCommand::ViewStaffRoles => service.view_staff_groups(ctx).await,
            TicketCommand::Tickets => service.list_open_tickets(ctx).await,
            TicketCommand::Close => service.close_ticket(ctx).await,
            TicketCommand::Help => Ok(blocks::help_message(&self.prefix)),
            TicketCommand::Unknown { verb } => Ok(blocks::failure_message(&format!(
                "Unknown command `{prefix}{verb}`. Try `{prefix}help`.",
                prefix = self.prefix
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use ticketry_core::domain::ids::{GroupId, UserId};

    use super::{
        parse_group_mention, parse_prefix_command, CommandContext, CommandParseError,
        CommandRouteError, CommandRouter, TicketCommand, TicketCommandService,
    };
    use crate::blocks::{self, MessageTemplate};

    #[test]
    fn parses_known_commands_with_role_mentions() {
        assert_eq!(
            parse_prefix_command("!", "!setup <@&10> 11"),
            Some(Ok(TicketCommand::Setup { groups: vec![GroupId(10), GroupId(11)] }))
        );
        assert_eq!(
            parse_prefix_command("!", "  !ADD_STAFF_ROLE <@&12>"),
            Some(Ok(TicketCommand::AddStaffRole { group: GroupId(12) }))
        );
        assert_eq!(
            parse_prefix_command("!", "!remove_staff_role 12"),
            Some(Ok(TicketCommand::RemoveStaffRole { group: GroupId(12) }))
        );
        assert_eq!(parse_prefix_command("!", "!close"), Some(Ok(TicketCommand::Close)));
        assert_eq!(parse_prefix_command("!", "!tickets"), Some(Ok(TicketCommand::Tickets)));
        assert_eq!(
            parse_prefix_command("!", "!view_staff_roles"),
            Some(Ok(TicketCommand::ViewStaffRoles))
        );
        assert_eq!(
            parse_prefix_command("!", "!reopen 4"),
            Some(Ok(TicketCommand::Unknown { verb: "reopen".to_owned() }))
        );
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_prefix_command("!", "my printer is on fire!"), None);
        assert_eq!(parse_prefix_command("!", "! close"), None);
        assert_eq!(parse_prefix_command("!", "!"), None);
        assert_eq!(parse_prefix_command("?", "!close"), None);
    }

    #[test]
    fn argument_errors_are_reported() {
        assert_eq!(parse_prefix_command("!", "!setup"), Some(Err(CommandParseError::MissingGroups)));
        assert_eq!(
            parse_prefix_command("!", "!add_staff_role"),
            Some(Err(CommandParseError::MissingGroup { command: "add_staff_role" }))
        );
        assert_eq!(
            parse_prefix_command("!", "!setup <@123>"),
            Some(Err(CommandParseError::InvalidGroup { token: "<@123>".to_owned() }))
        );
        assert!(CommandParseError::MissingGroups.user_message("!").contains("`!setup @Role1"));
    }

    #[test]
    fn group_mentions_accept_mention_or_bare_id() {
        assert_eq!(parse_group_mention("<@&42>"), Some(GroupId(42)));
        assert_eq!(parse_group_mention("42,"), Some(GroupId(42)));
        assert_eq!(parse_group_mention("<@!42>"), None);
        assert_eq!(parse_group_mention("<@&>"), None);
        assert_eq!(parse_group_mention("-42"), None);
    }

    #[derive(Default)]
    struct RecordingService {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingService {
        fn record(&self, call: String) -> Result<MessageTemplate, CommandRouteError> {
            self.calls.lock().expect("lock").push(call.clone());
            Ok(blocks::success_message(&call))
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl TicketCommandService for RecordingService {
        async fn setup(
            &self,
            group_id: GroupId,
            staff_groups: Vec<GroupId>,
            _ctx: &CommandContext,
        ) -> Result<MessageTemplate, CommandRouteError> {
            self.record(format!("setup {group_id} {}", staff_groups.len()))
        }

        async fn add_staff_group(
            &self,
            group: GroupId,
            _ctx: &CommandContext,
        ) -> Result<MessageTemplate, CommandRouteError> {
            self.record(format!("add {group}"))
        }

        async fn remove_staff_group(
            &self,
            group: GroupId,
            _ctx: &CommandContext,
        ) -> Result<MessageTemplate, CommandRouteError> {
            self.record(format!("remove {group}"))
        }

        async fn view_staff_groups(
            &self,
            _ctx: &CommandContext,
        ) -> Result<MessageTemplate, CommandRouteError> {
            self.record("view".to_owned())
        }

        async fn list_open_tickets(
            &self,
            _ctx: &CommandContext,
        ) -> Result<MessageTemplate, CommandRouteError> {
            self.record("tickets".to_owned())
        }

        async fn close_ticket(
            &self,
            _ctx: &CommandContext,
        ) -> Result<MessageTemplate, CommandRouteError> {
            self.record("close".to_owned())
        }
    }

    fn ctx(caller_is_admin: bool, group_id: Option<GroupId>) -> CommandContext {
        CommandContext {
            caller_id: UserId(7),
            caller_is_admin,
            group_id,
            correlation_id: "req-1".to_owned(),
        }
    }

    #[tokio::test]
    async fn router_gates_admin_commands() {
        let router = CommandRouter::new("!");
        let service = RecordingService::default();

        let denied = router
            .route(&service, TicketCommand::ViewStaffRoles, &ctx(false, Some(GroupId(1))))
            .await
            .expect("route");
        assert_eq!(denied, blocks::permission_denied_message());

        let direct = router
            .route(
                &service,
                TicketCommand::Setup { groups: vec![GroupId(10)] },
                &ctx(true, None),
            )
            .await
            .expect("route");
        assert!(direct.fallback_text.contains("only be used in a server"));
        assert!(service.calls().is_empty());

        router
            .route(
                &service,
                TicketCommand::Setup { groups: vec![GroupId(10), GroupId(11)] },
                &ctx(true, Some(GroupId(1))),
            )
            .await
            .expect("route");
        assert_eq!(service.calls(), vec!["setup 1 2".to_owned()]);
    }

    #[tokio::test]
    async fn router_lets_anyone_close_and_list_from_direct_messages() {
        let router = CommandRouter::new("!");
        let service = RecordingService::default();

        router.route(&service, TicketCommand::Close, &ctx(false, None)).await.expect("close");
        router.route(&service, TicketCommand::Tickets, &ctx(false, None)).await.expect("tickets");
        let unknown = router
            .route(&service, TicketCommand::Unknown { verb: "reopen".to_owned() }, &ctx(false, None))
            .await
            .expect("unknown");

        assert_eq!(service.calls(), vec!["close".to_owned(), "tickets".to_owned()]);
        assert!(unknown.fallback_text.contains("Try `!help`"));
    }
}
