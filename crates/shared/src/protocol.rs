use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{CommandId, CommandSource},
    error::{CommandParseError, ErrorKind},
};

/// Everything after this character on a command line is ignored.
pub const COMMENT: char = '#';

/// A parsed unit of work: `<namespace> [sub-action] [args...]`.
///
/// Built once by [`Command::parse`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    source: CommandSource,
    raw: String,
    verb: String,
    args: Vec<String>,
    received_at: DateTime<Utc>,
}

impl Command {
    pub fn parse(source: CommandSource, raw: impl Into<String>) -> Result<Self, CommandParseError> {
        let raw = raw.into();
        let body = strip_comment(&raw);
        let mut tokens = body.split_whitespace().map(str::to_string);
        let verb = tokens.next().ok_or(CommandParseError::Empty)?;
        let args = tokens.collect();

        Ok(Self {
            source,
            raw,
            verb,
            args,
            received_at: Utc::now(),
        })
    }

    pub fn source(&self) -> CommandSource {
        self.source
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// First token; addresses a plugin namespace.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn sub_action(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

fn strip_comment(raw: &str) -> &str {
    raw.split_once(COMMENT)
        .map(|(before, _)| before)
        .unwrap_or(raw)
}

/// Outcome of dispatching one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub command_id: CommandId,
    pub ok: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl DispatchResult {
    pub fn success(command_id: CommandId, output: impl Into<String>) -> Self {
        Self {
            command_id,
            ok: true,
            output: output.into(),
            error_kind: None,
        }
    }

    pub fn failure(command_id: CommandId, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            command_id,
            ok: false,
            output: message.into(),
            error_kind: Some(kind),
        }
    }
}

/// Latest renderable output of one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelState {
    pub plugin_name: String,
    pub rendered_lines: Vec<String>,
    pub dirty: bool,
    pub updated_at: DateTime<Utc>,
}

impl PanelState {
    pub fn new(plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            rendered_lines: Vec::new(),
            dirty: false,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmdRequest {
    pub cmd: String,
}

/// Body of every `POST /cmd` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CmdResponse {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            output: None,
            error: Some(kind),
            message: Some(message.into()),
        }
    }
}

impl From<DispatchResult> for CmdResponse {
    fn from(result: DispatchResult) -> Self {
        if result.ok {
            Self {
                ok: true,
                output: Some(result.output),
                error: None,
                message: None,
            }
        } else {
            Self {
                ok: false,
                output: None,
                error: result.error_kind,
                message: Some(result.output),
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
