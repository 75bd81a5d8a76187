//! # Tool Trait
//!
//! This module defines the core `Tool` trait that all workspace tools implement, together
//! with the declarative `ToolSpec` each tool publishes. Specs are provider-neutral: every
//! provider adapter renders them into its own wire format.

use crate::error::ToolError;
use crate::fuzzy_edit::FuzzyEditor;
use crate::workspace::Workspace;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::Duration;

pub mod apply_file_edit;
pub mod create_directory;
pub mod delete_file;
pub mod list_files;
pub mod read_file;
pub mod verify;
pub mod write_file;

pub use self::apply_file_edit::FileEditorTool;
pub use self::create_directory::CreateDirectoryTool;
pub use self::delete_file::DeleteFileTool;
pub use self::list_files::ListFilesTool;
pub use self::read_file::FileReaderTool;
pub use self::verify::VerifyTool;
pub use self::write_file::FileWriterTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
}

impl ParamKind {
    fn json_type(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_u64() || value.is_i64(),
            ParamKind::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }
}

/// Declared name, description and parameter schema of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParamSpec>,
}

impl ToolSpec {
    /// Renders the parameter list as a JSON schema object.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            properties.insert(
                param.name.to_string(),
                json!({
                    "type": param.kind.json_type(),
                    "description": param.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Checks `args` against the declared parameters.
    pub fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let Some(object) = args.as_object() else {
            return Err(ToolError::invalid_request(format!(
                "Arguments for '{}' must be a JSON object, got: {args}",
                self.name
            )));
        };

        for key in object.keys() {
            if !self.parameters.iter().any(|p| p.name == key) {
                return Err(ToolError::invalid_request(format!(
                    "Unknown parameter '{key}' for '{}'. Expected: {}.",
                    self.name,
                    self.parameter_names()
                )));
            }
        }

        for param in &self.parameters {
            match object.get(param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(ToolError::invalid_request(format!(
                        "Missing required parameter '{}' for '{}'.",
                        param.name, self.name
                    )));
                }
                Some(value) if !value.is_null() && !param.kind.accepts(value) => {
                    return Err(ToolError::invalid_request(format!(
                        "Parameter '{}' for '{}' must be of type {}.",
                        param.name,
                        self.name,
                        param.kind.json_type()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn parameter_names(&self) -> String {
        self.parameters
            .iter()
            .map(|p| p.name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Settings for the `verify` tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySettings {
    pub default_command: Option<String>,
    pub allowed_command_prefixes: Vec<String>,
    pub timeout: Duration,
    pub max_output_chars: usize,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            default_command: None,
            allowed_command_prefixes: Vec::new(),
            timeout: Duration::from_secs(300),
            max_output_chars: 8000,
        }
    }
}

/// Everything a tool may touch while executing.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub workspace: Option<Workspace>,
    pub editor: FuzzyEditor,
    pub verify: VerifySettings,
}

impl ToolContext {
    pub fn new(workspace: Option<Workspace>) -> Self {
        Self {
            workspace,
            ..Default::default()
        }
    }

    /// The workspace, or `InvalidState` when none has been set yet.
    pub fn workspace(&self) -> Result<&Workspace, ToolError> {
        self.workspace.as_ref().ok_or_else(|| {
            ToolError::InvalidState(
                "No workspace is set. Use /workspace <path> before running tools.".to_string(),
            )
        })
    }
}

/// A trait representing a self-contained, executable tool.
///
/// This trait is designed to be object-safe, allowing for dynamic dispatch
/// via `Box<dyn Tool>`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique, static name of the tool.
    fn name(&self) -> &'static str;

    /// Returns the declared parameter schema, used both for the LLM and for validation.
    fn spec(&self) -> ToolSpec;

    /// Executes the tool with arguments that already passed `spec().validate`.
    ///
    /// On success, returns a concise JSON payload containing only what the model needs.
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

/// Deserializes validated arguments into a tool's typed argument struct.
pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone())
        .map_err(|e| ToolError::invalid_request(format!("Invalid arguments for '{tool}': {e}")))
}

/// A context over a fresh temporary workspace, for tool tests.
#[cfg(test)]
pub(crate) fn test_context(prefix: &str) -> (tempfile::TempDir, ToolContext) {
    let tmp_dir = tempfile::Builder::new().prefix(prefix).tempdir().unwrap();
    let workspace = Workspace::open(tmp_dir.path()).unwrap();
    (tmp_dir, ToolContext::new(Some(workspace)))
}
