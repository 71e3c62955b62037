//! Named commands: the registry the dispatcher resolves against, plus the
//! declaration surface used by the built-ins and by embedding code.

pub mod builtin;

pub use builtin::builtin_commands;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::ShellResult;
use crate::identity::AuthorityRequirement;
use crate::pipeline::Payload;
use crate::server::ShellState;

/// What a command asks the dispatcher to do after it ran.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandAction {
    /// A result to post-process and display.
    Output(Payload),
    /// The command did all its own terminal I/O.
    Silent,
    /// End the current session.
    Exit,
}

pub type CommandResult = ShellResult<CommandAction>;

pub type CommandHandler =
    Arc<dyn Fn(CommandContext) -> BoxFuture<'static, CommandResult> + Send + Sync>;

/// Per-invocation context handed to a command body. The owning session is
/// deliberately absent: command bodies resolve it through
/// `session::current()` like every other helper.
#[derive(Clone)]
pub struct CommandContext {
    pub state: Arc<ShellState>,
    /// Whitespace-split arguments.
    pub args: Vec<String>,
    /// Argument text exactly as typed, inner spacing preserved.
    pub raw_args: String,
}

/// Adapts a plain async fn into the boxed handler shape the registry stores.
pub fn handler<F, Fut>(f: F) -> CommandHandler
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CommandResult> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// One named command: description for `help`, the optional authority
/// requirement read by the gate, and the body.
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub requirement: Option<AuthorityRequirement>,
    handler: CommandHandler,
}

impl CommandSpec {
    pub fn new(name: &str, description: &str, handler: CommandHandler) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            requirement: None,
            handler,
        }
    }

    pub fn requires(mut self, requirement: AuthorityRequirement) -> Self {
        self.requirement = Some(requirement);
        self
    }

    pub fn invoke(&self, ctx: CommandContext) -> BoxFuture<'static, CommandResult> {
        (self.handler)(ctx)
    }
}

/// Name -> command table. Commands are registered explicitly at startup;
/// embedding code may add its own alongside the built-ins.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<CommandSpec>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: CommandSpec) {
        self.commands.insert(spec.name.clone(), Arc::new(spec));
    }

    pub fn get(&self, name: &str) -> Option<Arc<CommandSpec>> {
        self.commands.get(name).cloned()
    }

    /// Commands in name order, for `help`.
    pub fn list(&self) -> Vec<Arc<CommandSpec>> {
        self.commands.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
