//! Built-in command set registered by the server at startup.

use serde_json::json;
use uuid::Uuid;

use crate::error::ShellError;
use crate::identity::{availability, AuthorityRequirement};
use crate::pipeline::Payload;
use crate::session;

use super::{handler, CommandAction, CommandContext, CommandRegistry, CommandResult, CommandSpec};

pub const ADMIN_AUTHORITY: &str = "ADMIN";

pub fn builtin_commands() -> CommandRegistry {
    let mut reg = CommandRegistry::new();
    reg.register(CommandSpec::new(
        "help",
        "list commands and their availability",
        handler(help),
    ));
    reg.register(CommandSpec::new("echo", "print the given text", handler(echo)));
    reg.register(CommandSpec::new(
        "whoami",
        "show the authenticated identity",
        handler(whoami),
    ));
    reg.register(CommandSpec::new(
        "stacktrace",
        "show the last error captured in this session",
        handler(stacktrace),
    ));
    reg.register(CommandSpec::new(
        "postprocessors",
        "list result post-processors usable after '|'",
        handler(postprocessors),
    ));
    reg.register(CommandSpec::new(
        "welcome",
        "ask for your name and greet you",
        handler(welcome),
    ));
    reg.register(
        CommandSpec::new("sessions", "list live sessions", handler(sessions))
            .requires(AuthorityRequirement::any_of([ADMIN_AUTHORITY])),
    );
    reg.register(
        CommandSpec::new(
            "close-session",
            "close a session by id (asks for confirmation)",
            handler(close_session),
        )
        .requires(AuthorityRequirement::any_of([ADMIN_AUTHORITY])),
    );
    reg.register(CommandSpec::new(
        "exit",
        "end the current session",
        handler(exit),
    ));
    reg.register(CommandSpec::new("quit", "alias for exit", handler(exit)));
    reg
}

async fn help(ctx: CommandContext) -> CommandResult {
    let session = session::current()?;
    let mut lines: Vec<String> = vec!["commands:".to_string()];
    for spec in ctx.state.commands.list() {
        let mut line = format!("  {:<16} {}", spec.name, spec.description);
        if let Some(req) = &spec.requirement {
            let decision = availability(&session.identity, req);
            if let Some(reason) = decision.reason() {
                line.push_str(&format!(" (unavailable: {})", reason));
            }
        }
        lines.push(line);
    }
    lines.push(String::new());
    lines.push("append '| <stage> [args]' to post-process a result; see 'postprocessors'".to_string());
    Ok(CommandAction::Output(Payload::Text(lines.join("\n"))))
}

async fn echo(ctx: CommandContext) -> CommandResult {
    Ok(CommandAction::Output(Payload::Text(ctx.raw_args)))
}

async fn whoami(_ctx: CommandContext) -> CommandResult {
    let session = session::current()?;
    let value = serde_json::to_value(&session.identity)
        .map_err(|e| ShellError::command(format!("identity serialization failed: {}", e)))?;
    Ok(CommandAction::Output(Payload::Structured(value)))
}

async fn stacktrace(_ctx: CommandContext) -> CommandResult {
    let session = session::current()?;
    let text = match session.last_error() {
        Some(err) => format!("last error [{}]: {}", err.kind(), err),
        None => "no error recorded for this session".to_string(),
    };
    Ok(CommandAction::Output(Payload::Text(text)))
}

async fn postprocessors(ctx: CommandContext) -> CommandResult {
    let mut lines: Vec<String> = vec!["result post-processors:".to_string()];
    for stage in ctx.state.stages.list() {
        lines.push(format!(
            "  {:<8} [{}] {}",
            stage.name(),
            stage.expects(),
            stage.description()
        ));
    }
    Ok(CommandAction::Output(Payload::Text(lines.join("\n"))))
}

async fn welcome(ctx: CommandContext) -> CommandResult {
    ctx.state.helper.print("You are now in the welcome command")?;
    let name = ctx.state.helper.read("What's your name? ").await?;
    let name = name.trim();
    Ok(CommandAction::Output(Payload::Text(format!(
        "Hello, '{}'!",
        name
    ))))
}

async fn sessions(ctx: CommandContext) -> CommandResult {
    let rows: Vec<serde_json::Value> = ctx
        .state
        .registry
        .list()
        .iter()
        .map(|s| {
            json!({
                "id": s.id.to_string(),
                "user": s.identity.name,
                "peer": s.peer,
                "opened_at": s.opened_at.to_rfc3339(),
            })
        })
        .collect();
    Ok(CommandAction::Output(Payload::Structured(
        serde_json::Value::Array(rows),
    )))
}

async fn close_session(ctx: CommandContext) -> CommandResult {
    let Some(raw_id) = ctx.args.first() else {
        return Err(ShellError::command("usage: close-session <session-id>"));
    };
    let id = Uuid::parse_str(raw_id)
        .map_err(|_| ShellError::command(format!("invalid session id '{}'", raw_id)))?;
    let Some(target) = ctx.state.registry.get(&id) else {
        return Ok(CommandAction::Output(Payload::Text(format!(
            "no session with id {}",
            id
        ))));
    };
    let question = format!("close session {} (user '{}')?", id, target.identity.name);
    if !ctx.state.helper.confirm(&question).await? {
        return Ok(CommandAction::Output(Payload::Text("aborted".to_string())));
    }
    let own = session::current()?.id == id;
    ctx.state.registry.close(&id);
    if own {
        // closed ourselves; the surrounding loop ends with us
        return Ok(CommandAction::Exit);
    }
    Ok(CommandAction::Output(Payload::Text(format!(
        "closed session {}",
        id
    ))))
}

async fn exit(_ctx: CommandContext) -> CommandResult {
    Ok(CommandAction::Exit)
}
