//! The provided post-processors and their registry.
//! Each stage declares which payload shapes it accepts and what happens on a
//! mismatch: `pretty` and `json` step aside for plain text, while `grep` and
//! `save` are explicit about shapes they cannot honor.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use regex::RegexBuilder;

use crate::error::StageError;

use super::Payload;

/// What the pipeline does when a stage does not accept the current payload
/// shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchPolicy {
    Skip,
    Fail,
}

/// One named, composable transformation applied to a command's result.
pub trait PostProcessor: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Human label for the accepted input shape, used in mismatch errors
    /// and the `postprocessors` listing.
    fn expects(&self) -> &'static str;
    fn accepts(&self, input: &Payload) -> bool;
    fn on_mismatch(&self) -> MismatchPolicy {
        MismatchPolicy::Skip
    }
    fn apply(&self, input: Payload, raw_args: &str) -> Result<Payload, StageError>;
}

/// Name -> stage table consulted at parse time and during application.
/// The four provided stages are always present; further implementations
/// register alongside them.
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: BTreeMap<&'static str, Arc<dyn PostProcessor>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(GrepStage));
        reg.register(Arc::new(PrettyStage));
        reg.register(Arc::new(JsonPointerStage));
        reg.register(Arc::new(SaveStage));
        reg
    }

    pub fn register(&mut self, stage: Arc<dyn PostProcessor>) {
        self.stages.insert(stage.name(), stage);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PostProcessor>> {
        self.stages.get(name).cloned()
    }

    /// Stages in name order.
    pub fn list(&self) -> Vec<Arc<dyn PostProcessor>> {
        self.stages.values().cloned().collect()
    }
}

/// Consumes `flag` plus trailing whitespace off the front of `rest`, or
/// returns None when `rest` does not start with the flag as its own token.
fn strip_flag<'a>(rest: &'a str, flag: &str) -> Option<&'a str> {
    let r = rest.strip_prefix(flag)?;
    if r.is_empty() {
        Some(r)
    } else if r.starts_with(char::is_whitespace) {
        Some(r.trim_start())
    } else {
        None
    }
}

/// Line filter over plain text. Args: optional `-i` (case-insensitive) and
/// `-v` (invert) flags, then a regular expression matched per line.
pub struct GrepStage;

impl PostProcessor for GrepStage {
    fn name(&self) -> &'static str {
        "grep"
    }
    fn description(&self) -> &'static str {
        "keep lines matching a pattern (-i case-insensitive, -v invert)"
    }
    fn expects(&self) -> &'static str {
        "text"
    }
    fn accepts(&self, input: &Payload) -> bool {
        matches!(input, Payload::Text(_))
    }
    fn on_mismatch(&self) -> MismatchPolicy {
        MismatchPolicy::Fail
    }
    fn apply(&self, input: Payload, raw_args: &str) -> Result<Payload, StageError> {
        let text = match input {
            Payload::Text(t) => t,
            other => {
                return Err(StageError::ShapeMismatch {
                    stage: self.name(),
                    expected: self.expects(),
                    actual: other.shape(),
                })
            }
        };
        let mut rest = raw_args.trim_start();
        let mut case_insensitive = false;
        let mut invert = false;
        loop {
            if let Some(r) = strip_flag(rest, "-i") {
                case_insensitive = true;
                rest = r;
                continue;
            }
            if let Some(r) = strip_flag(rest, "-v") {
                invert = true;
                rest = r;
                continue;
            }
            break;
        }
        if rest.is_empty() {
            return Err(StageError::BadArguments {
                stage: self.name(),
                detail: "missing pattern".to_string(),
            });
        }
        let re = RegexBuilder::new(rest)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| StageError::BadArguments {
                stage: self.name(),
                detail: format!("invalid pattern: {}", e),
            })?;
        let kept: Vec<&str> = text
            .lines()
            .filter(|line| re.is_match(line) != invert)
            .collect();
        Ok(Payload::Text(kept.join("\n")))
    }
}

/// Indented re-serialization of structured results with stable key order.
/// Plain text passes through untouched.
pub struct PrettyStage;

impl PostProcessor for PrettyStage {
    fn name(&self) -> &'static str {
        "pretty"
    }
    fn description(&self) -> &'static str {
        "pretty-print a structured result"
    }
    fn expects(&self) -> &'static str {
        "structured"
    }
    fn accepts(&self, input: &Payload) -> bool {
        matches!(input, Payload::Structured(_))
    }
    fn apply(&self, input: Payload, _raw_args: &str) -> Result<Payload, StageError> {
        Ok(Payload::Text(input.canonical_text()))
    }
}

/// Extracts the substructure addressed by a JSON Pointer. The result stays
/// structured so further stages can keep working on it.
pub struct JsonPointerStage;

impl PostProcessor for JsonPointerStage {
    fn name(&self) -> &'static str {
        "json"
    }
    fn description(&self) -> &'static str {
        "extract a substructure by JSON Pointer (e.g. /a/b/0)"
    }
    fn expects(&self) -> &'static str {
        "structured"
    }
    fn accepts(&self, input: &Payload) -> bool {
        matches!(input, Payload::Structured(_))
    }
    fn apply(&self, input: Payload, raw_args: &str) -> Result<Payload, StageError> {
        let value = match input {
            Payload::Structured(v) => v,
            other => {
                return Err(StageError::ShapeMismatch {
                    stage: self.name(),
                    expected: self.expects(),
                    actual: other.shape(),
                })
            }
        };
        let pointer = raw_args.trim();
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(StageError::BadArguments {
                stage: self.name(),
                detail: format!("pointer must start with '/': '{}'", pointer),
            });
        }
        match value.pointer(pointer) {
            Some(sub) => Ok(Payload::Structured(sub.clone())),
            None => Err(StageError::PathNotFound(pointer.to_string())),
        }
    }
}

/// Persists the payload's canonical text to a file and passes the original
/// payload through unchanged; the write is a side effect, not a
/// transformation. Args: optional `-a` to append, then the destination path.
pub struct SaveStage;

impl PostProcessor for SaveStage {
    fn name(&self) -> &'static str {
        "save"
    }
    fn description(&self) -> &'static str {
        "write the result to a file (-a append) and pass it through"
    }
    fn expects(&self) -> &'static str {
        "any"
    }
    fn accepts(&self, _input: &Payload) -> bool {
        true
    }
    fn on_mismatch(&self) -> MismatchPolicy {
        MismatchPolicy::Fail
    }
    fn apply(&self, input: Payload, raw_args: &str) -> Result<Payload, StageError> {
        let mut rest = raw_args.trim_start();
        let mut append = false;
        if let Some(r) = strip_flag(rest, "-a") {
            append = true;
            rest = r;
        }
        let path = rest.trim();
        if path.is_empty() {
            return Err(StageError::BadArguments {
                stage: self.name(),
                detail: "missing destination path".to_string(),
            });
        }
        let mut content = input.canonical_text();
        if !content.ends_with('\n') {
            content.push('\n');
        }
        let result = if append {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut f| f.write_all(content.as_bytes()))
        } else {
            std::fs::write(path, content.as_bytes())
        };
        result.map_err(|e| StageError::WriteFailure {
            path: path.to_string(),
            detail: e.to_string(),
        })?;
        Ok(input)
    }
}
