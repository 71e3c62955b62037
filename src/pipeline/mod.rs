//! Trailing-pipeline parsing and application.
//! A submitted line is split once into command text and a trailing expression
//! at the first unescaped `|`; the expression is then validated into an
//! ordered stage list before anything executes, so a mistyped stage name can
//! never half-run a pipeline.

pub mod stages;

pub use stages::{MismatchPolicy, PostProcessor, StageRegistry};

use serde_json::Value;
use tracing::debug;

use crate::error::{ShellError, ShellResult, StageError};

/// Value flowing from a command through the stages: plain display text or a
/// structured (JSON-shaped) result.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Structured(Value),
}

impl Payload {
    pub fn shape(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Structured(_) => "structured",
        }
    }

    /// What the terminal shows when the payload reaches the end of the
    /// pipeline. Structured results stay compact; `pretty` is the opt-in
    /// indented form.
    pub fn render(&self) -> String {
        match self {
            Payload::Text(t) => t.clone(),
            Payload::Structured(v) => v.to_string(),
        }
    }

    /// Canonical text form used by `save` and `pretty`: text as-is,
    /// structured values pretty-printed with stable key order (serde_json
    /// keeps object keys sorted).
    pub fn canonical_text(&self) -> String {
        match self {
            Payload::Text(t) => t.clone(),
            Payload::Structured(v) => {
                serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
            }
        }
    }
}

/// One stage call: name plus the raw argument string exactly as typed
/// (leading/trailing whitespace normalized away).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInvocation {
    pub name: String,
    pub args: String,
}

/// Ordered stage list, applied left to right. The empty pipeline is valid
/// and means "no transformation".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<StageInvocation>,
}

impl Pipeline {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the payload through every stage. Stages that do not accept the
    /// current shape are skipped or fail according to their own policy; the
    /// first error aborts the pipeline.
    pub fn apply(&self, registry: &StageRegistry, input: Payload) -> ShellResult<Payload> {
        let mut value = input;
        for inv in &self.stages {
            let stage = registry
                .get(&inv.name)
                .ok_or_else(|| ShellError::UnknownStage(inv.name.clone()))?;
            if !stage.accepts(&value) {
                match stage.on_mismatch() {
                    MismatchPolicy::Skip => {
                        debug!(
                            target: "dispatch",
                            "stage '{}' skipped: {} input",
                            inv.name,
                            value.shape()
                        );
                        continue;
                    }
                    MismatchPolicy::Fail => {
                        return Err(StageError::ShapeMismatch {
                            stage: stage.name(),
                            expected: stage.expects(),
                            actual: value.shape(),
                        }
                        .into());
                    }
                }
            }
            value = stage.apply(value, &inv.args)?;
        }
        Ok(value)
    }
}

/// Splits a submitted line into command text and the trailing pipeline
/// expression at the first unescaped `|`. Backslash escapes `|` and itself;
/// escapes in the command text are resolved here, escapes in the trailing
/// expression are resolved by [`parse`].
pub fn split_command_line(line: &str) -> (String, Option<&str>) {
    let mut head = String::with_capacity(line.len());
    let mut chars = line.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, '|')) => head.push('|'),
                Some((_, '\\')) => head.push('\\'),
                Some((_, other)) => {
                    head.push('\\');
                    head.push(other);
                }
                None => head.push('\\'),
            },
            '|' => return (head, Some(&line[i + 1..])),
            other => head.push(other),
        }
    }
    (head, None)
}

/// Splits on every unescaped `|`, resolving `\|` and `\\` inside tokens.
fn split_unescaped_pipes(expr: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut chars = expr.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('|') => cur.push('|'),
                Some('\\') => cur.push('\\'),
                Some(other) => {
                    cur.push('\\');
                    cur.push(other);
                }
                None => cur.push('\\'),
            },
            '|' => {
                parts.push(std::mem::take(&mut cur));
            }
            other => cur.push(other),
        }
    }
    parts.push(cur);
    parts
}

/// Parses a trailing expression into a validated pipeline. Unknown stage
/// names fail here, before any stage or command side effect runs; an empty
/// expression is the identity pipeline.
pub fn parse(expr: &str, registry: &StageRegistry) -> ShellResult<Pipeline> {
    if expr.trim().is_empty() {
        return Ok(Pipeline::default());
    }
    let mut stages = Vec::new();
    for token in split_unescaped_pipes(expr) {
        let token = token.trim();
        if token.is_empty() {
            return Err(ShellError::PipelineParse(
                "empty stage between '|' separators".to_string(),
            ));
        }
        let (name, args) = match token.find(char::is_whitespace) {
            Some(i) => (&token[..i], token[i..].trim()),
            None => (token, ""),
        };
        if !registry.contains(name) {
            return Err(ShellError::UnknownStage(name.to_string()));
        }
        stages.push(StageInvocation {
            name: name.to_string(),
            args: args.to_string(),
        });
    }
    Ok(Pipeline { stages })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StageRegistry {
        StageRegistry::with_builtins()
    }

    #[test]
    fn split_finds_first_unescaped_pipe() {
        let (head, tail) = split_command_line("echo hello | grep h | save /tmp/x");
        assert_eq!(head, "echo hello ");
        assert_eq!(tail, Some(" grep h | save /tmp/x"));

        let (head, tail) = split_command_line(r"echo a\|b");
        assert_eq!(head, "echo a|b");
        assert_eq!(tail, None);

        let (head, tail) = split_command_line(r"echo a\\ | grep a");
        assert_eq!(head, r"echo a\ ");
        assert_eq!(tail, Some(" grep a"));
    }

    #[test]
    fn parse_two_stages_with_args() {
        let p = parse("grep -i foo | json", &registry()).unwrap();
        assert_eq!(
            p.stages,
            vec![
                StageInvocation {
                    name: "grep".to_string(),
                    args: "-i foo".to_string()
                },
                StageInvocation {
                    name: "json".to_string(),
                    args: String::new()
                },
            ]
        );
    }

    #[test]
    fn parse_empty_expression_is_identity() {
        assert!(parse("", &registry()).unwrap().is_empty());
        assert!(parse("   ", &registry()).unwrap().is_empty());
    }

    #[test]
    fn parse_unknown_stage_fails() {
        let err = parse("nosuchstage x", &registry()).unwrap_err();
        assert_eq!(err, ShellError::UnknownStage("nosuchstage".to_string()));
    }

    #[test]
    fn parse_normalizes_whitespace_only_args() {
        let p = parse("grep foo |  pretty   ", &registry()).unwrap();
        assert_eq!(p.stages[1].args, "");
    }

    #[test]
    fn parse_rejects_empty_stage_token() {
        let err = parse("grep a | | pretty", &registry()).unwrap_err();
        assert_eq!(err.kind(), "pipeline_parse");
    }

    #[test]
    fn escaped_pipe_stays_inside_stage_args() {
        let p = parse(r"grep a\|b", &registry()).unwrap();
        assert_eq!(p.stages[0].args, "a|b");
    }

    #[test]
    fn render_forms() {
        let text = Payload::Text("plain".to_string());
        assert_eq!(text.render(), "plain");
        assert_eq!(text.canonical_text(), "plain");

        let value = Payload::Structured(serde_json::json!({"b": 1, "a": 2}));
        assert_eq!(value.render(), r#"{"a":2,"b":1}"#);
        assert_eq!(value.canonical_text(), "{\n  \"a\": 2,\n  \"b\": 1\n}");
    }

    #[test]
    fn apply_skips_and_fails_per_policy() {
        let reg = registry();
        // pretty skips text input untouched
        let p = parse("pretty", &reg).unwrap();
        let out = p.apply(&reg, Payload::Text("raw".to_string())).unwrap();
        assert_eq!(out, Payload::Text("raw".to_string()));

        // grep fails on structured input
        let p = parse("grep x", &reg).unwrap();
        let err = p
            .apply(&reg, Payload::Structured(serde_json::json!({})))
            .unwrap_err();
        assert_eq!(err.kind(), "stage");
    }
}
