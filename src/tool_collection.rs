//! # Tool Collection
//!
//! The `ToolCollection` is the central hub for discovering and executing tools.
//! It maintains a registry of all available tools and dispatches calls to the appropriate
//! implementation based on the tool name.

use crate::error::ToolError;
use crate::session::ToolOutcome;
use crate::tools::{
    CreateDirectoryTool, DeleteFileTool, FileEditorTool, FileReaderTool, FileWriterTool,
    ListFilesTool, Tool, ToolContext, ToolSpec, VerifyTool,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// A collection responsible for registering and dispatching tool calls.
pub struct ToolCollection {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolCollection {
    /// Creates a new, empty `ToolCollection`.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Creates a collection holding every built-in workspace tool.
    pub fn with_default_tools() -> Self {
        let mut collection = Self::new();
        collection.register(Box::new(ListFilesTool));
        collection.register(Box::new(FileReaderTool));
        collection.register(Box::new(FileWriterTool));
        collection.register(Box::new(FileEditorTool));
        collection.register(Box::new(CreateDirectoryTool));
        collection.register(Box::new(DeleteFileTool));
        collection.register(Box::new(VerifyTool));
        collection
    }

    /// Registers a new tool with the collection.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Gathers the specs of all registered tools to be sent to the LLM, ordered by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec()).collect()
    }

    /// Executes a tool call and returns its outcome.
    /// This function is designed to always succeed from the caller's perspective:
    /// unknown tools, malformed arguments and execution failures are all captured as
    /// `ToolOutcome::Error`.
    pub async fn dispatch(&self, name: &str, arguments: &Value, ctx: &ToolContext) -> ToolOutcome {
        let result = async {
            let tool = self.tools.get(name).ok_or_else(|| {
                ToolError::invalid_request(format!(
                    "Unknown tool: '{name}'. Available tools: {}.",
                    self.tools.keys().cloned().collect::<Vec<_>>().join(", ")
                ))
            })?;
            tool.spec().validate(arguments)?;
            tool.execute(arguments, ctx).await
        }
        .await;

        if let Err(e) = &result {
            tracing::debug!(tool = name, code = %e.code(), "tool call failed: {e}");
        }
        ToolOutcome::from(result)
    }
}

impl Default for ToolCollection {
    fn default() -> Self {
        Self::with_default_tools()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::tools::test_context;
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_default_tools_are_registered() {
        let names: Vec<&str> = ToolCollection::with_default_tools()
            .specs()
            .iter()
            .map(|spec| spec.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "apply_file_edit",
                "create_directory",
                "delete_file",
                "list_files",
                "read_file",
                "verify",
                "write_file"
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_request() {
        let (_tmp_dir, ctx) = test_context("test-tool-collection");
        let outcome = ToolCollection::with_default_tools()
            .dispatch("launch_rockets", &json!({}), &ctx)
            .await;

        match outcome {
            ToolOutcome::Error { code, message, .. } => {
                assert_eq!(code, ErrorCode::InvalidRequest);
                assert!(message.contains("launch_rockets"));
            }
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_schema_violation_is_invalid_request() {
        let (_tmp_dir, ctx) = test_context("test-tool-collection");
        let outcome = ToolCollection::with_default_tools()
            .dispatch("read_file", &json!({"file": "a.txt"}), &ctx)
            .await;
        assert!(matches!(
            outcome,
            ToolOutcome::Error {
                code: ErrorCode::InvalidRequest,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let (tmp_dir, ctx) = test_context("test-tool-collection");
        fs::write(tmp_dir.path().join("a.txt"), "hi").unwrap();

        let outcome = ToolCollection::with_default_tools()
            .dispatch("read_file", &json!({"path": "a.txt"}), &ctx)
            .await;
        match outcome {
            ToolOutcome::Success { output } => assert_eq!(output["content"], "hi"),
            other => panic!("expected success, got {other:?}"),
        }
    }
}
