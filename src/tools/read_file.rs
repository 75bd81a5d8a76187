use super::{ParamKind, ParamSpec, Tool, ToolContext, ToolSpec, parse_args};
use crate::error::ToolError;
use crate::fuzzy_edit::short_hash;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize, Debug)]
pub struct FileReadArgs {
    pub path: String,
}

pub struct FileReaderTool;

#[async_trait]
impl Tool for FileReaderTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name(),
            description: "Reads the full text content of a file in the workspace. Never guess file contents: read a file before editing it, and read it again after an edit to verify the change.",
            parameters: vec![ParamSpec::required(
                "path",
                ParamKind::String,
                "The path of the file to read, relative to the workspace root.",
            )],
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: FileReadArgs = parse_args(self.name(), args)?;
        let content = ctx.workspace()?.read_file(&args.path)?;

        Ok(json!({
            "path": args.path,
            "lines": content.lines().count(),
            "content_hash": short_hash(&content),
            "content": content,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::tools::test_context;
    use std::fs;

    #[tokio::test]
    async fn test_read_file_returns_content_and_hash() {
        let (tmp_dir, ctx) = test_context("test-read-file");
        fs::write(tmp_dir.path().join("a.txt"), "one\ntwo\n").unwrap();

        let result = FileReaderTool
            .execute(&json!({"path": "a.txt"}), &ctx)
            .await
            .unwrap();

        assert_eq!(result["content"], "one\ntwo\n");
        assert_eq!(result["lines"], 2);
        assert_eq!(result["content_hash"], short_hash("one\ntwo\n"));
    }

    #[tokio::test]
    async fn test_read_missing_file_is_not_found() {
        let (_tmp_dir, ctx) = test_context("test-read-file");
        let err = FileReaderTool
            .execute(&json!({"path": "missing.txt"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_read_outside_root_is_out_of_bounds() {
        let (_tmp_dir, ctx) = test_context("test-read-file");
        let err = FileReaderTool
            .execute(&json!({"path": "../../etc/passwd"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfBounds);
    }
}
