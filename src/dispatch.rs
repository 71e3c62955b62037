//! Result dispatcher: runs one submitted line end to end. The trailing
//! pipeline is validated before the command executes; on success the result
//! flows through the stages, on any failure the error lands in the invoking
//! session's error slot and is shown on that session's terminal only.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt; // for catch_unwind on async blocks
use tracing::{debug, warn};

use crate::commands::{CommandAction, CommandContext};
use crate::error::ShellError;
use crate::pipeline;
use crate::server::ShellState;
use crate::session::{self, SessionTerminal};

/// Per-invocation lifecycle, surfaced in debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvocationState {
    Idle,
    Executing,
    Succeeded,
    Failed,
}

/// What the connection loop should do after a line was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    Exit,
}

pub struct Dispatcher {
    state: Arc<ShellState>,
}

impl Dispatcher {
    pub fn new(state: Arc<ShellState>) -> Self {
        Self { state }
    }

    /// Handles one submitted line within the current session's scope.
    pub async fn dispatch_line(&self, line: &str) -> DispatchOutcome {
        if line.trim().is_empty() {
            return DispatchOutcome::Continue;
        }
        let mut st = InvocationState::Idle;

        let (head, trailing) = pipeline::split_command_line(line);
        let pipeline = match pipeline::parse(trailing.unwrap_or(""), &self.state.stages) {
            Ok(p) => p,
            Err(e) => {
                self.fail(e);
                return DispatchOutcome::Continue;
            }
        };

        let head = head.trim();
        let Some(name) = head.split_whitespace().next() else {
            self.fail(ShellError::PipelineParse(
                "missing command before '|'".to_string(),
            ));
            return DispatchOutcome::Continue;
        };
        let raw_args = head
            .strip_prefix(name)
            .unwrap_or_default()
            .trim()
            .to_string();
        let args: Vec<String> = raw_args.split_whitespace().map(str::to_string).collect();

        let Some(spec) = self.state.commands.get(name) else {
            self.fail(ShellError::command(format!(
                "unknown command '{}'; try 'help'",
                name
            )));
            return DispatchOutcome::Continue;
        };

        // Gate immediately before execution; the same decision `help` showed.
        if let Some(req) = &spec.requirement {
            let identity = match session::current() {
                Ok(s) => s.identity.clone(),
                Err(_) => return DispatchOutcome::Exit,
            };
            if let Some(reason) = crate::identity::availability(&identity, req).reason() {
                // The command neither ran nor threw, so the error slot is
                // left alone.
                if self
                    .say(&format!("command '{}' is unavailable: {}", name, reason))
                    .is_err()
                {
                    return DispatchOutcome::Exit;
                }
                return DispatchOutcome::Continue;
            }
        }

        st = transition(name, st, InvocationState::Executing);
        let ctx = CommandContext {
            state: self.state.clone(),
            args,
            raw_args,
        };
        let invoked = AssertUnwindSafe(spec.invoke(ctx)).catch_unwind().await;
        let action = match invoked {
            Ok(Ok(action)) => action,
            Ok(Err(ShellError::ConnectionClosed)) => return DispatchOutcome::Exit,
            Ok(Err(e)) => {
                transition(name, st, InvocationState::Failed);
                self.fail(e);
                return DispatchOutcome::Continue;
            }
            Err(panic) => {
                transition(name, st, InvocationState::Failed);
                warn!(target: "dispatch", "command '{}' panicked", name);
                self.fail(ShellError::command(format!(
                    "command '{}' panicked: {}",
                    name,
                    panic_message(panic.as_ref())
                )));
                return DispatchOutcome::Continue;
            }
        };

        match action {
            CommandAction::Output(payload) => {
                match pipeline.apply(&self.state.stages, payload) {
                    Ok(result) => {
                        transition(name, st, InvocationState::Succeeded);
                        if self.say(&result.render()).is_err() {
                            return DispatchOutcome::Exit;
                        }
                    }
                    Err(e) => {
                        // Partial stage output is discarded with the error.
                        transition(name, st, InvocationState::Failed);
                        self.fail(e);
                    }
                }
            }
            CommandAction::Silent => {
                transition(name, st, InvocationState::Succeeded);
            }
            CommandAction::Exit => {
                transition(name, st, InvocationState::Succeeded);
                return DispatchOutcome::Exit;
            }
        }
        DispatchOutcome::Continue
    }

    fn say(&self, text: &str) -> Result<(), ShellError> {
        SessionTerminal::write_line(text)
    }

    /// Captures the error into the invoking session's slot (overwriting any
    /// previous one) and shows it on that session's terminal.
    fn fail(&self, err: ShellError) {
        if err.is_user_input() {
            debug!(target: "dispatch", "input error: {}", err);
        } else {
            warn!(target: "dispatch", "command error [{}]: {}", err.kind(), err);
        }
        match session::current() {
            Ok(session) => {
                session.record_error(err.clone());
                let _ = session.terminal.write_line(&format!("ERROR: {}", err));
            }
            Err(_) => {
                warn!(target: "dispatch", "error outside any session dropped: {}", err);
            }
        }
    }
}

fn transition(command: &str, from: InvocationState, to: InvocationState) -> InvocationState {
    debug!(target: "dispatch", "cmd='{}' {:?} -> {:?}", command, from, to);
    to
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
