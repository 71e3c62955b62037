use tokio::sync::{mpsc, watch, Mutex};

use crate::error::{ShellError, ShellResult};
use crate::session;

/// Per-session terminal handle. Writes go out through an unbounded channel
/// drained by the connection's socket-writer task; reads come in through a
/// channel fed by the socket-reader task. A watch flag carries shutdown so a
/// pending read is unblocked the moment the session is closed, from any task.
#[derive(Debug)]
pub struct Terminal {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: Mutex<mpsc::UnboundedReceiver<String>>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

/// Transport-side ends of a terminal. The TCP server couples these to the
/// socket pump tasks; tests drive them directly.
pub struct TerminalPipe {
    pub to_terminal: mpsc::UnboundedSender<String>,
    pub from_terminal: mpsc::UnboundedReceiver<String>,
}

impl Terminal {
    pub fn pipe() -> (Terminal, TerminalPipe) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let terminal = Terminal {
            outgoing: out_tx,
            incoming: Mutex::new(in_rx),
            closed_tx,
            closed_rx,
        };
        let pipe = TerminalPipe {
            to_terminal: in_tx,
            from_terminal: out_rx,
        };
        (terminal, pipe)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// Marks the terminal closed and wakes any pending read. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.closed_tx.send(true);
    }

    /// Queue raw text for the peer, no newline added.
    pub fn write(&self, text: &str) -> ShellResult<()> {
        if self.is_closed() {
            return Err(ShellError::ConnectionClosed);
        }
        self.outgoing
            .send(text.to_string())
            .map_err(|_| ShellError::ConnectionClosed)
    }

    pub fn write_line(&self, text: &str) -> ShellResult<()> {
        self.write(&format!("{}\n", text))
    }

    /// Next line from the peer. Fails with ConnectionClosed once the peer
    /// disconnects or the session is closed, whichever happens first.
    pub async fn read_line(&self) -> ShellResult<String> {
        let mut rx = self.incoming.lock().await;
        let mut closed = self.closed_rx.clone();
        tokio::select! {
            line = rx.recv() => line.ok_or(ShellError::ConnectionClosed),
            _ = closed.wait_for(|c| *c) => Err(ShellError::ConnectionClosed),
        }
    }

    /// Write a prompt (no newline) and read the answer line.
    pub async fn prompt(&self, message: &str) -> ShellResult<String> {
        self.write(message)?;
        self.read_line().await
    }
}

/// Session-scoped terminal delegate. Every operation resolves the session
/// bound to the calling task and forwards to its real terminal, so shared
/// helpers never need an explicit terminal handle. Invoking any of these
/// outside a session scope is a caller bug and fails with NoActiveSession.
pub struct SessionTerminal;

impl SessionTerminal {
    pub fn write(text: &str) -> ShellResult<()> {
        session::current()?.terminal.write(text)
    }

    pub fn write_line(text: &str) -> ShellResult<()> {
        session::current()?.terminal.write_line(text)
    }

    pub async fn read_line() -> ShellResult<String> {
        let s = session::current()?;
        s.terminal.read_line().await
    }

    pub async fn prompt(message: &str) -> ShellResult<String> {
        let s = session::current()?;
        s.terminal.prompt(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_and_read_round_trip() {
        let (term, mut pipe) = Terminal::pipe();
        term.write_line("hello").unwrap();
        assert_eq!(pipe.from_terminal.recv().await.unwrap(), "hello\n");

        pipe.to_terminal.send("input".to_string()).unwrap();
        assert_eq!(term.read_line().await.unwrap(), "input");
    }

    #[tokio::test]
    async fn shutdown_unblocks_pending_read() {
        let (term, _pipe) = Terminal::pipe();
        let term = std::sync::Arc::new(term);
        let reader = {
            let term = term.clone();
            tokio::spawn(async move { term.read_line().await })
        };
        tokio::task::yield_now().await;
        term.shutdown();
        assert_eq!(reader.await.unwrap(), Err(ShellError::ConnectionClosed));
        assert_eq!(term.write("x"), Err(ShellError::ConnectionClosed));
    }

    #[tokio::test]
    async fn peer_disconnect_ends_reads() {
        let (term, pipe) = Terminal::pipe();
        drop(pipe.to_terminal);
        assert_eq!(term.read_line().await, Err(ShellError::ConnectionClosed));
    }

    #[tokio::test]
    async fn delegate_without_session_is_a_caller_error() {
        assert_eq!(
            SessionTerminal::write_line("x"),
            Err(ShellError::NoActiveSession)
        );
        assert_eq!(
            SessionTerminal::read_line().await,
            Err(ShellError::NoActiveSession)
        );
    }
}
