//! # Session State
//!
//! A `Session` owns the conversation history of one agent run sequence together with the
//! workspace it operates on. The history is append-only: turns can be pushed and read,
//! never edited or removed. Serializing the turn sequence is all it takes to persist a
//! session and resume it later.

use crate::error::{ErrorCode, ToolError};
use crate::workspace::Workspace;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// The user's goal for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task(String);

impl Task {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The outcome of one tool invocation as recorded in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success {
        output: Value,
    },
    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error { .. })
    }

    /// The JSON payload handed back to the model.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<Result<Value, ToolError>> for ToolOutcome {
    fn from(result: Result<Value, ToolError>) -> Self {
        match result {
            Ok(output) => ToolOutcome::Success { output },
            Err(e) => ToolOutcome::Error {
                code: e.code(),
                message: e.to_string(),
                details: e.details(),
            },
        }
    }
}

/// One immutable event in the session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    UserMessage {
        text: String,
    },
    AssistantMessage {
        text: String,
    },
    ToolCall {
        call_id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        call_id: String,
        name: String,
        outcome: ToolOutcome,
    },
    FinalAnswer {
        text: String,
    },
}

/// Append-only, ordered sequence of turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

pub struct Session {
    workspace: Option<Workspace>,
    history: History,
}

/// On-disk form of a session.
#[derive(Serialize, Deserialize)]
struct SessionFile {
    workspace_root: Option<PathBuf>,
    history: History,
}

impl Session {
    pub fn new(workspace: Option<Workspace>) -> Self {
        Self {
            workspace,
            history: History::new(),
        }
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn push(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    /// Starts over with an empty history on the same workspace.
    pub fn reset(&self) -> Self {
        Self::new(self.workspace.clone())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = SessionFile {
            workspace_root: self.workspace.as_ref().map(|w| w.root().to_path_buf()),
            history: self.history.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write session to '{}'", path.display()))?;
        Ok(())
    }

    /// Loads a saved session. The workspace is reopened with `ignored_paths`.
    pub fn load(path: &Path, ignored_paths: Vec<String>) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session from '{}'", path.display()))?;
        let file: SessionFile = serde_json::from_str(&json)
            .with_context(|| format!("'{}' is not a valid session file", path.display()))?;
        let workspace = match file.workspace_root {
            Some(root) => Some(
                Workspace::open(&root)
                    .map_err(|e| anyhow::anyhow!("{e}"))?
                    .with_ignored_paths(ignored_paths),
            ),
            None => None,
        };
        Ok(Self {
            workspace,
            history: file.history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::Builder;

    #[test]
    fn test_turns_serialize_with_kind_tag() {
        let turn = Turn::ToolResult {
            call_id: "call_1".to_string(),
            name: "read_file".to_string(),
            outcome: ToolOutcome::Error {
                code: ErrorCode::NotFound,
                message: "File not found: 'a.txt'".to_string(),
                details: None,
            },
        };
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "tool_result",
                "call_id": "call_1",
                "name": "read_file",
                "outcome": {
                    "status": "error",
                    "code": "NOT_FOUND",
                    "message": "File not found: 'a.txt'"
                }
            })
        );
    }

    #[test]
    fn test_session_round_trips_through_disk() {
        let tmp_dir = Builder::new().prefix("test-session").tempdir().unwrap();
        let workspace = Workspace::open(tmp_dir.path()).unwrap();
        let mut session = Session::new(Some(workspace));
        session.push(Turn::UserMessage {
            text: "add a README".to_string(),
        });
        session.push(Turn::FinalAnswer {
            text: "done".to_string(),
        });

        let file = tmp_dir.path().join("session.json");
        session.save(&file).unwrap();
        let restored = Session::load(&file, vec![]).unwrap();

        assert_eq!(restored.history(), session.history());
        assert_eq!(
            restored.workspace().unwrap().root(),
            session.workspace().unwrap().root()
        );
    }

    #[test]
    fn test_reset_keeps_workspace_and_drops_history() {
        let tmp_dir = Builder::new().prefix("test-session").tempdir().unwrap();
        let mut session = Session::new(Some(Workspace::open(tmp_dir.path()).unwrap()));
        session.push(Turn::UserMessage {
            text: "hi".to_string(),
        });

        let fresh = session.reset();
        assert!(fresh.history().is_empty());
        assert!(fresh.workspace().is_some());
        assert_eq!(session.history().len(), 1);
    }
}
