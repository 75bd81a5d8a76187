//! # File Editor Tool
//!
//! This module provides `apply_file_edit`, the agent's only way to modify an existing
//! file. The target region is located by the fuzzy edit engine, so a search block with
//! drifted indentation still lands on the right lines; the replacement is re-indented to
//! the file's real indentation before it is written.

use super::{ParamKind, ParamSpec, Tool, ToolContext, ToolSpec, parse_args};
use crate::error::ToolError;
use crate::fuzzy_edit::{EditRequest, LineRange, Locator};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize, Debug)]
pub struct FileEditArgs {
    pub path: String,
    pub search_block: Option<String>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub replace_block: String,
}

impl FileEditArgs {
    /// Builds the edit request, insisting on exactly one way of addressing the target.
    fn into_request(self) -> Result<EditRequest, ToolError> {
        let locator = match (self.search_block, self.start_line, self.end_line) {
            (Some(anchor), None, None) => Locator::Anchor(anchor),
            (None, Some(start), Some(end)) => Locator::LineRange(LineRange::new(start, end)),
            (Some(_), _, _) => {
                return Err(ToolError::invalid_request(
                    "Provide either 'search_block' or 'start_line' and 'end_line', not both.",
                ));
            }
            (None, None, None) => {
                return Err(ToolError::invalid_request(
                    "Missing target: provide 'search_block', or 'start_line' and 'end_line'.",
                ));
            }
            (None, _, _) => {
                return Err(ToolError::invalid_request(
                    "A line range needs both 'start_line' and 'end_line'.",
                ));
            }
        };
        Ok(EditRequest {
            path: self.path,
            locator,
            replacement: self.replace_block,
        })
    }
}

pub struct FileEditorTool;

#[async_trait]
impl Tool for FileEditorTool {
    fn name(&self) -> &'static str {
        "apply_file_edit"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name(),
            description: r#"Modifies an existing file by replacing one block of lines. Use this for ALL modifications to existing files.

Address the block in one of two ways:
- `search_block`: a distinct block copied from the current file. It must be unique; if the code appears multiple times, include more surrounding lines. Whitespace differences are tolerated, but the text content must match.
- `start_line` and `end_line`: the 1-indexed, inclusive line range to replace.

`replace_block` is the new code. Its indentation is corrected to match the file, but keep it accurate anyway. An empty `replace_block` deletes the block.

On failure the result explains why (no confident match, ambiguous match) and may include the closest candidate. Re-read the file before retrying."#,
            parameters: vec![
                ParamSpec::required(
                    "path",
                    ParamKind::String,
                    "The path of the file to edit, relative to the workspace root.",
                ),
                ParamSpec::optional(
                    "search_block",
                    ParamKind::String,
                    "The exact block of existing code to replace.",
                ),
                ParamSpec::optional(
                    "start_line",
                    ParamKind::Integer,
                    "The 1-indexed, inclusive first line to replace. Use with end_line instead of search_block.",
                ),
                ParamSpec::optional(
                    "end_line",
                    ParamKind::Integer,
                    "The 1-indexed, inclusive last line to replace.",
                ),
                ParamSpec::required(
                    "replace_block",
                    ParamKind::String,
                    "The new code that replaces the block.",
                ),
            ],
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let request = parse_args::<FileEditArgs>(self.name(), args)?.into_request()?;
        let workspace = ctx.workspace()?;

        let content = workspace.read_file(&request.path)?;
        let outcome = ctx.editor.apply(&content, &request)?;
        workspace.write_file(&request.path, &outcome.content)?;

        tracing::debug!(
            path = %request.path,
            strategy = ?outcome.strategy,
            lines = %outcome.matched,
            changed = outcome.lines_changed,
            "applied edit"
        );

        let message = if outcome.is_noop() {
            format!(
                "No changes: the replacement is identical to lines {} of '{}'.",
                outcome.matched, request.path
            )
        } else {
            format!(
                "Edited lines {} of '{}'. Read the file to verify the change.",
                outcome.matched, request.path
            )
        };

        let mut result = outcome.summary();
        if let Value::Object(map) = &mut result {
            map.insert("path".to_string(), json!(request.path));
            map.insert("message".to_string(), json!(message));
        }
        Ok(result)
    }
}

#[cfg(test)]
#[path = "apply_file_edit_tests.rs"]
mod tests;
