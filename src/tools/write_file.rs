use super::{ParamKind, ParamSpec, Tool, ToolContext, ToolSpec, parse_args};
use crate::error::ToolError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize, Debug)]
pub struct FileWriteArgs {
    pub path: String,
    pub content: String,
}

pub struct FileWriterTool;

#[async_trait]
impl Tool for FileWriterTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name(),
            description: "Creates a new file with the given content, creating parent directories as needed. Use this ONLY for brand new files; an existing file is overwritten completely. Use apply_file_edit to modify existing files.",
            parameters: vec![
                ParamSpec::required(
                    "path",
                    ParamKind::String,
                    "The path of the file to write, relative to the workspace root.",
                ),
                ParamSpec::required(
                    "content",
                    ParamKind::String,
                    "The full content of the file.",
                ),
            ],
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: FileWriteArgs = parse_args(self.name(), args)?;
        let workspace = ctx.workspace()?;

        let existed = workspace.resolve(&args.path)?.is_file();
        let receipt = workspace.write_file(&args.path, &args.content)?;

        Ok(json!({
            "path": receipt.path,
            "bytes": receipt.bytes,
            "content_hash": receipt.content_hash,
            "overwritten": existed,
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
    async fn test_write_new_file() {
        let (tmp_dir, ctx) = test_context("test-write-file");
        let result = FileWriterTool
            .execute(&json!({"path": "src/lib.rs", "content": "pub fn a() {}\n"}), &ctx)
            .await
            .unwrap();

        assert_eq!(result["path"], "src/lib.rs");
        assert_eq!(result["overwritten"], false);
        assert_eq!(
            fs::read_to_string(tmp_dir.path().join("src/lib.rs")).unwrap(),
            "pub fn a() {}\n"
        );
    }

    #[tokio::test]
    async fn test_overwrite_is_reported() {
        let (tmp_dir, ctx) = test_context("test-write-file");
        fs::write(tmp_dir.path().join("a.txt"), "old").unwrap();

        let result = FileWriterTool
            .execute(&json!({"path": "a.txt", "content": "new"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["overwritten"], true);
        assert_eq!(fs::read_to_string(tmp_dir.path().join("a.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_write_outside_root_touches_nothing() {
        let (tmp_dir, ctx) = test_context("test-write-file");
        let err = FileWriterTool
            .execute(&json!({"path": "../escaped.txt", "content": "x"}), &ctx)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::OutOfBounds);
        assert!(!tmp_dir.path().parent().unwrap().join("escaped.txt").exists());
    }
}
