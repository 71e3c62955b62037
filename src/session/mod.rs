//! Session lifecycle: one record per connection, bound to that connection's
//! task so arbitrarily deep call sites can resolve their own session without
//! threading a handle through the surrounding framework code.

mod terminal;

pub use terminal::{SessionTerminal, Terminal, TerminalPipe};

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ShellError, ShellResult};
use crate::identity::{CredentialProvider, Credentials, Identity};

/// Isolated state owned by one connection for its lifetime: the authenticated
/// identity, the terminal, and the most recent unhandled error. The error slot
/// is only written and read from the owning session's task, so a plain mutex
/// around the option is all the protection it needs.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub identity: Identity,
    pub terminal: Terminal,
    pub peer: String,
    pub opened_at: DateTime<Utc>,
    // monotonic opening order; opened_at can tie at clock resolution
    seq: u64,
    closed: AtomicBool,
    last_error: Mutex<Option<ShellError>>,
}

static SESSION_SEQ: AtomicU64 = AtomicU64::new(1);

impl Session {
    fn new(identity: Identity, terminal: Terminal, peer: &str) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            identity,
            terminal,
            peer: peer.to_string(),
            opened_at: Utc::now(),
            seq: SESSION_SEQ.fetch_add(1, Ordering::Relaxed),
            closed: AtomicBool::new(false),
            last_error: Mutex::new(None),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Overwrites any previously captured error.
    pub fn record_error(&self, err: ShellError) {
        debug!(target: "session", "sid={} captured error: {}", self.id, err);
        *self.last_error.lock() = Some(err);
    }

    pub fn last_error(&self) -> Option<ShellError> {
        self.last_error.lock().clone()
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
        self.terminal.shutdown();
    }
}

tokio::task_local! {
    static CURRENT_SESSION: Arc<Session>;
}

/// Runs `fut` with `session` bound as the current session for every call
/// site reached from it. The server wraps each connection's whole handling
/// future in one scope.
pub async fn scope<F>(session: Arc<Session>, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_SESSION.scope(session, fut).await
}

/// The session bound to the calling task. Fails with NoActiveSession outside
/// any scope, and once the bound session has been closed.
pub fn current() -> ShellResult<Arc<Session>> {
    let session = CURRENT_SESSION
        .try_with(|s| s.clone())
        .map_err(|_| ShellError::NoActiveSession)?;
    if session.is_closed() {
        return Err(ShellError::NoActiveSession);
    }
    Ok(session)
}

/// Tracks every live session. Cheap to clone; the inner map is the only
/// synchronization point shared across sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticates the presented credentials and, on success, constructs
    /// and tracks the session. The caller is expected to run the connection's
    /// handling future inside [`scope`] with the returned session. A rejected
    /// credential is reported once on the terminal before it is released;
    /// retrying is the transport's business, not ours.
    pub fn open(
        &self,
        provider: &dyn CredentialProvider,
        creds: &Credentials,
        terminal: Terminal,
        peer: &str,
    ) -> ShellResult<Arc<Session>> {
        let identity = match provider.authenticate(creds) {
            Ok(identity) => identity,
            Err(e) => {
                let _ = terminal.write_line(&e.to_string());
                return Err(e);
            }
        };
        let session = Session::new(identity, terminal, peer);
        self.inner.write().insert(session.id, session.clone());
        info!(
            target: "session",
            "opened sid={} user='{}' peer={}",
            session.id, session.identity.name, session.peer
        );
        Ok(session)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.inner.read().get(id).cloned()
    }

    /// Live sessions in opening order.
    pub fn list(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<Arc<Session>> = self.inner.read().values().cloned().collect();
        sessions.sort_by_key(|s| s.seq);
        sessions
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Releases the session and its resources, unblocking any read pending
    /// on its terminal. Closing an unknown or already-closed id is a no-op
    /// since shutdown ordering with the transport is not guaranteed.
    pub fn close(&self, id: &Uuid) {
        let removed = self.inner.write().remove(id);
        if let Some(session) = removed {
            session.mark_closed();
            info!(target: "session", "closed sid={} user='{}'", id, session.identity.name);
        } else {
            debug!(target: "session", "close for unknown sid={} ignored", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FixedCredentialProvider;

    fn provider() -> FixedCredentialProvider {
        FixedCredentialProvider::new("u", "p", ["ADMIN"])
    }

    fn open_one(reg: &SessionRegistry) -> Arc<Session> {
        let (terminal, _pipe) = Terminal::pipe();
        reg.open(&provider(), &Credentials::new("u", "p"), terminal, "test")
            .unwrap()
    }

    #[tokio::test]
    async fn open_rejects_bad_credentials() {
        let reg = SessionRegistry::new();
        let (terminal, _pipe) = Terminal::pipe();
        let err = reg
            .open(&provider(), &Credentials::new("u", "nope"), terminal, "test")
            .unwrap_err();
        assert_eq!(err.kind(), "auth");
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn current_resolves_inside_scope_only() {
        let reg = SessionRegistry::new();
        let session = open_one(&reg);
        assert_eq!(current().unwrap_err(), ShellError::NoActiveSession);
        let sid = session.id;
        scope(session, async move {
            assert_eq!(current().unwrap().id, sid);
        })
        .await;
        assert_eq!(current().unwrap_err(), ShellError::NoActiveSession);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_invalidates_current() {
        let reg = SessionRegistry::new();
        let session = open_one(&reg);
        let id = session.id;
        reg.close(&id);
        reg.close(&id);
        reg.close(&Uuid::new_v4());
        assert!(reg.get(&id).is_none());
        scope(session, async {
            assert_eq!(current().unwrap_err(), ShellError::NoActiveSession);
        })
        .await;
    }

    #[tokio::test]
    async fn error_slot_overwrites_and_survives_reads() {
        let reg = SessionRegistry::new();
        let session = open_one(&reg);
        assert!(session.last_error().is_none());
        session.record_error(ShellError::command("first"));
        session.record_error(ShellError::command("second"));
        assert_eq!(session.last_error(), Some(ShellError::command("second")));
        // reading does not consume
        assert_eq!(session.last_error(), Some(ShellError::command("second")));
    }
}
