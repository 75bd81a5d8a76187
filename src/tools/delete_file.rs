use super::{ParamKind, ParamSpec, Tool, ToolContext, ToolSpec, parse_args};
use crate::error::ToolError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize, Debug)]
pub struct DeleteFileArgs {
    pub path: String,
}

pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &'static str {
        "delete_file"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name(),
            description: "Deletes a single file. Directories cannot be deleted.",
            parameters: vec![ParamSpec::required(
                "path",
                ParamKind::String,
                "The file to delete, relative to the workspace root.",
            )],
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: DeleteFileArgs = parse_args(self.name(), args)?;
        ctx.workspace()?.delete_file(&args.path)?;
        tracing::debug!(path = %args.path, "deleted file");
        Ok(json!({ "path": args.path, "deleted": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::tools::test_context;
    use std::fs;

    #[tokio::test]
    async fn test_delete_file() {
        let (tmp_dir, ctx) = test_context("test-delete-file");
        fs::write(tmp_dir.path().join("a.txt"), "x").unwrap();

        let result = DeleteFileTool
            .execute(&json!({"path": "a.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["deleted"], true);
        assert!(!tmp_dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_directory_is_not_deleted() {
        let (tmp_dir, ctx) = test_context("test-delete-file");
        fs::create_dir(tmp_dir.path().join("dir")).unwrap();

        let err = DeleteFileTool
            .execute(&json!({"path": "dir"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(tmp_dir.path().join("dir").is_dir());
    }
}
