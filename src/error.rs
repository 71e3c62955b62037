//! Unified error model for the shell core.
//! One enum is shared by the credential providers, the session registry, the
//! pipeline and the dispatcher, so a session's error slot can hold any failure
//! that reaches the terminal. Sources are flattened to strings to keep every
//! variant cheap to clone into that slot.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellError {
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),
    #[error("no session is bound to the current task")]
    NoActiveSession,
    #[error("unknown post-processor '{0}'")]
    UnknownStage(String),
    #[error("invalid pipeline: {0}")]
    PipelineParse(String),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("{0}")]
    CommandFailed(String),
    #[error("connection closed")]
    ConnectionClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("path '{0}' not found in result")]
    PathNotFound(String),
    #[error("cannot write '{path}': {detail}")]
    WriteFailure { path: String, detail: String },
    #[error("post-processor '{stage}' expects {expected} input, got {actual}")]
    ShapeMismatch {
        stage: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("post-processor '{stage}': {detail}")]
    BadArguments { stage: &'static str, detail: String },
}

impl ShellError {
    /// Short classification label used in log lines and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            ShellError::AuthenticationFailure(_) => "auth",
            ShellError::NoActiveSession => "no_active_session",
            ShellError::UnknownStage(_) => "unknown_stage",
            ShellError::PipelineParse(_) => "pipeline_parse",
            ShellError::Stage(_) => "stage",
            ShellError::CommandFailed(_) => "command",
            ShellError::ConnectionClosed => "connection_closed",
        }
    }

    /// Whether the failure indicates bad user input rather than a fault in
    /// the command or the server. Input errors are shown but logged at a
    /// lower level.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            ShellError::UnknownStage(_) | ShellError::PipelineParse(_) | ShellError::Stage(_)
        )
    }

    pub fn command<S: Into<String>>(msg: S) -> Self {
        ShellError::CommandFailed(msg.into())
    }
}

pub type ShellResult<T> = Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_mapping() {
        assert_eq!(ShellError::AuthenticationFailure("no".into()).kind(), "auth");
        assert_eq!(ShellError::NoActiveSession.kind(), "no_active_session");
        assert_eq!(ShellError::UnknownStage("x".into()).kind(), "unknown_stage");
        assert_eq!(ShellError::PipelineParse("y".into()).kind(), "pipeline_parse");
        assert_eq!(
            ShellError::Stage(StageError::PathNotFound("/a".into())).kind(),
            "stage"
        );
        assert_eq!(ShellError::command("boom").kind(), "command");
        assert_eq!(ShellError::ConnectionClosed.kind(), "connection_closed");
    }

    #[test]
    fn display_text() {
        let e = ShellError::UnknownStage("nosuchstage".into());
        assert_eq!(e.to_string(), "unknown post-processor 'nosuchstage'");
        let e = ShellError::Stage(StageError::WriteFailure {
            path: "/tmp/out".into(),
            detail: "denied".into(),
        });
        assert_eq!(e.to_string(), "cannot write '/tmp/out': denied");
        let e = ShellError::Stage(StageError::ShapeMismatch {
            stage: "grep",
            expected: "text",
            actual: "structured",
        });
        assert_eq!(
            e.to_string(),
            "post-processor 'grep' expects text input, got structured"
        );
    }

    #[test]
    fn user_input_classification() {
        assert!(ShellError::UnknownStage("x".into()).is_user_input());
        assert!(ShellError::Stage(StageError::PathNotFound("/z".into())).is_user_input());
        assert!(!ShellError::command("boom").is_user_input());
        assert!(!ShellError::NoActiveSession.is_user_input());
    }
}
