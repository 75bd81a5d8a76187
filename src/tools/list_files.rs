use super::{ParamKind, ParamSpec, Tool, ToolContext, ToolSpec, parse_args};
use crate::error::ToolError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

/// Upper bound on the number of paths returned by one call.
const MAX_LISTED_FILES: usize = 1000;

#[derive(Deserialize, Debug)]
pub struct ListFilesArgs {
    #[serde(default = "default_path")]
    pub path: String,
    pub max_depth: Option<usize>,
}

fn default_path() -> String {
    ".".to_string()
}

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &'static str {
        "list_files"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name(),
            description: "Lists all files in a directory of the workspace, recursively, respecting .gitignore, .agentignore and configured ignore rules. Paths are relative to the workspace root. Always start by listing files to understand the project structure.",
            parameters: vec![
                ParamSpec::optional(
                    "path",
                    ParamKind::String,
                    "The directory to list, relative to the workspace root. Defaults to '.'.",
                ),
                ParamSpec::optional(
                    "max_depth",
                    ParamKind::Integer,
                    "Maximum recursion depth. Omit for unlimited.",
                ),
            ],
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: ListFilesArgs = parse_args(self.name(), args)?;
        let workspace = ctx.workspace()?;

        let mut listing = workspace.list_files(&args.path, args.max_depth)?;
        let files: Vec<String> = listing.by_ref().take(MAX_LISTED_FILES).collect();
        let truncated = listing.next().is_some();

        Ok(json!({
            "path": args.path,
            "count": files.len(),
            "truncated": truncated,
            "files": files,
        }))
    }
}
