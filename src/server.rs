//!
//! shellwire connection server
//! ---------------------------
//! Line-oriented TCP front end standing in for the black-box remote-terminal
//! transport. One task per accepted connection: login handshake, session
//! open, then a prompt/read/dispatch loop until the peer leaves or an admin
//! closes the session.
//!
//! Responsibilities:
//! - Wiring each socket to a per-session Terminal via two pump tasks.
//! - Opening the session through the registry (which authenticates).
//! - Binding the whole connection future to its session with session::scope.
//! - Tearing everything down idempotently on any exit path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::commands::{builtin_commands, CommandRegistry};
use crate::config::{AuthStrategy, ShellConfig};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::helper::ShellHelper;
use crate::identity::{CredentialProvider, Credentials, FixedCredentialProvider};
use crate::pipeline::StageRegistry;
use crate::session::{self, SessionRegistry, Terminal, TerminalPipe};

static CONN_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

const BANNER: &str = "shellwire interactive shell";

/// Shared server state injected into every connection and command.
pub struct ShellState {
    pub config: ShellConfig,
    pub registry: SessionRegistry,
    pub commands: Arc<CommandRegistry>,
    pub stages: Arc<StageRegistry>,
    pub helper: ShellHelper,
    pub auth: Arc<dyn CredentialProvider>,
}

impl ShellState {
    /// State with the built-in commands and stages and an explicit provider.
    pub fn new(config: ShellConfig, auth: Arc<dyn CredentialProvider>) -> Arc<Self> {
        Self::with_commands(config, auth, builtin_commands())
    }

    /// Same, with extra commands registered alongside the built-ins.
    pub fn with_commands(
        config: ShellConfig,
        auth: Arc<dyn CredentialProvider>,
        commands: CommandRegistry,
    ) -> Arc<Self> {
        let helper = ShellHelper::new(config.confirmation_words.clone());
        Arc::new(Self {
            registry: SessionRegistry::new(),
            commands: Arc::new(commands),
            stages: Arc::new(StageRegistry::with_builtins()),
            helper,
            auth,
            config,
        })
    }

    /// Builds the provider the config selects. Delegated deployments must
    /// construct their authenticator in code and go through [`ShellState::new`].
    pub fn from_config(config: ShellConfig) -> Result<Arc<Self>> {
        let auth: Arc<dyn CredentialProvider> = match &config.auth {
            AuthStrategy::Fixed {
                user,
                secret,
                authorities,
            } => Arc::new(FixedCredentialProvider::new(
                user,
                secret,
                authorities.iter().cloned(),
            )),
            AuthStrategy::Delegated => anyhow::bail!(
                "delegated authentication needs an external authenticator; \
                 construct the state with ShellState::new"
            ),
        };
        Ok(Self::new(config, auth))
    }
}

/// Bind and serve forever.
pub async fn run(state: Arc<ShellState>) -> Result<()> {
    let listener = TcpListener::bind(&state.config.bind)
        .await
        .with_context(|| format!("failed to bind {}", state.config.bind))?;
    serve(listener, state).await
}

/// Accept loop over an already-bound listener (tests bind their own).
pub async fn serve(listener: TcpListener, state: Arc<ShellState>) -> Result<()> {
    info!(target: "server", "listening on {}", listener.local_addr()?);
    loop {
        let (socket, peer) = listener.accept().await?;
        let state = state.clone();
        let conn_id = CONN_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            if let Err(e) = handle_conn(socket, state, conn_id, &peer.to_string()).await {
                error!(target: "server", "conn_id={} peer={} error: {}", conn_id, peer, e);
            }
        });
    }
}

/// Couples a socket to a Terminal with two pump tasks and returns their
/// join handles. The reader strips CR so CRLF peers look like LF peers.
fn spawn_pumps(
    socket: TcpStream,
    pipe: TerminalPipe,
) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    let (read_half, mut write_half) = socket.into_split();
    let TerminalPipe {
        to_terminal,
        mut from_terminal,
    } = pipe;

    let writer = tokio::spawn(async move {
        while let Some(chunk) = from_terminal.recv().await {
            if write_half.write_all(chunk.as_bytes()).await.is_err() {
                break;
            }
            if write_half.flush().await.is_err() {
                break;
            }
        }
    });

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim_end_matches('\r').to_string();
                    if to_terminal.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        // dropping to_terminal ends any pending terminal read
    });

    (reader, writer)
}

async fn handle_conn(
    socket: TcpStream,
    state: Arc<ShellState>,
    conn_id: u64,
    peer: &str,
) -> Result<()> {
    debug!(target: "server", "conn_id={} new connection from {}", conn_id, peer);
    let (terminal, pipe) = Terminal::pipe();
    let (reader_task, writer_task) = spawn_pumps(socket, pipe);

    terminal.write_line(BANNER).ok();
    let username = match terminal.prompt("login: ").await {
        Ok(v) => v.trim().to_string(),
        Err(_) => return Ok(()),
    };
    let password = match terminal.prompt("password: ").await {
        Ok(v) => v,
        Err(_) => return Ok(()),
    };
    let creds = Credentials {
        username,
        password,
        peer: Some(peer.to_string()),
    };

    let session = match state.registry.open(state.auth.as_ref(), &creds, terminal, peer) {
        Ok(s) => s,
        Err(e) => {
            info!(target: "server", "conn_id={} rejected: {}", conn_id, e);
            // writer drains the rejection message before its channel closes
            reader_task.abort();
            let _ = writer_task.await;
            return Ok(());
        }
    };
    let sid = session.id;

    let dispatcher = Dispatcher::new(state.clone());
    let prompt = state.config.prompt.clone();
    session::scope(session.clone(), async move {
        let _ = session.terminal.write_line(&format!(
            "Welcome, {}! Type 'help' to list commands.",
            session.identity.name
        ));
        loop {
            if session.terminal.write(&prompt).is_err() {
                break;
            }
            let line = match session.terminal.read_line().await {
                Ok(line) => line,
                Err(_) => break,
            };
            match dispatcher.dispatch_line(&line).await {
                DispatchOutcome::Continue => {}
                DispatchOutcome::Exit => break,
            }
        }
    })
    .await;

    state.registry.close(&sid);
    debug!(target: "server", "conn_id={} session {} finished", conn_id, sid);
    reader_task.abort();
    let _ = writer_task.await;
    Ok(())
}
