use super::{ParamKind, ParamSpec, Tool, ToolContext, ToolSpec, parse_args};
use crate::error::ToolError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize, Debug)]
pub struct CreateDirectoryArgs {
    pub path: String,
}

pub struct CreateDirectoryTool;

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn name(&self) -> &'static str {
        "create_directory"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name(),
            description: "Creates a directory, including any missing parent directories. Succeeds if it already exists.",
            parameters: vec![ParamSpec::required(
                "path",
                ParamKind::String,
                "The directory to create, relative to the workspace root.",
            )],
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: CreateDirectoryArgs = parse_args(self.name(), args)?;
        ctx.workspace()?.create_directory(&args.path)?;
        Ok(json!({ "path": args.path, "created": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::tools::test_context;
    use std::fs;

    #[tokio::test]
    async fn test_create_nested_directory() {
        let (tmp_dir, ctx) = test_context("test-create-dir");
        CreateDirectoryTool
            .execute(&json!({"path": "a/b/c"}), &ctx)
            .await
            .unwrap();
        assert!(tmp_dir.path().join("a/b/c").is_dir());
    }

    #[tokio::test]
    async fn test_existing_file_is_rejected() {
        let (tmp_dir, ctx) = test_context("test-create-dir");
        fs::write(tmp_dir.path().join("a"), "file").unwrap();
        let err = CreateDirectoryTool
            .execute(&json!({"path": "a"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }
}
