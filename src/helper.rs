//! Cross-cutting helpers available to every command body: terminal prompts,
//! yes/no confirmation, authority checks, identity and last-error lookup.
//! All I/O goes through the session-scoped terminal delegate, so these work
//! from arbitrarily deep call sites without an explicit session handle.

use crate::error::{ShellError, ShellResult};
use crate::identity::{availability, AuthorityRequirement, Identity};
use crate::session::{self, SessionTerminal};

#[derive(Clone)]
pub struct ShellHelper {
    confirmation_words: Vec<String>,
}

impl ShellHelper {
    pub fn new(confirmation_words: Vec<String>) -> Self {
        Self { confirmation_words }
    }

    pub fn print(&self, text: &str) -> ShellResult<()> {
        SessionTerminal::write_line(text)
    }

    pub fn print_error(&self, text: &str) -> ShellResult<()> {
        SessionTerminal::write_line(&format!("ERROR: {}", text))
    }

    /// Write a prompt and read the answer line.
    pub async fn read(&self, prompt: &str) -> ShellResult<String> {
        SessionTerminal::prompt(prompt).await
    }

    /// Ask a yes/no question; only a configured confirmation word counts as
    /// yes. A single answer is read, anything else is no.
    pub async fn confirm(&self, question: &str) -> ShellResult<bool> {
        let prompt = format!("{} [{}] ", question, self.confirmation_words.join("/"));
        let answer = SessionTerminal::prompt(&prompt).await?;
        Ok(self.is_affirmative(&answer))
    }

    pub fn is_affirmative(&self, answer: &str) -> bool {
        let answer = answer.trim();
        self.confirmation_words
            .iter()
            .any(|w| w.eq_ignore_ascii_case(answer))
    }

    /// Whether the current session's identity holds at least one of the
    /// given authorities.
    pub fn check_authorities<I, S>(&self, labels: I) -> ShellResult<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let session = session::current()?;
        let req = AuthorityRequirement::any_of(labels);
        Ok(availability(&session.identity, &req).is_available())
    }

    pub fn authentication(&self) -> ShellResult<Identity> {
        Ok(session::current()?.identity.clone())
    }

    pub fn last_error(&self) -> ShellResult<Option<ShellError>> {
        Ok(session::current()?.last_error())
    }
}
