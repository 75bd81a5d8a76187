//! # Verify Tool
//!
//! Runs a verification command (a linter, a type checker, a test suite) in the workspace
//! root and reports `pass`, `fail` or `could_not_run` along with its captured output.

use super::{ParamKind, ParamSpec, Tool, ToolContext, ToolSpec, parse_args};
use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strip_ansi_escapes::strip_str;
use tokio::process::Command;

/// Placeholder substituted with the requested path.
pub const PATH_PLACEHOLDER: &str = "{path}";

#[derive(Deserialize, Debug)]
pub struct VerifyArgs {
    pub command: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    Pass,
    Fail,
    CouldNotRun,
}

pub struct VerifyTool;

#[async_trait]
impl Tool for VerifyTool {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name(),
            description: "Runs a verification command (for example a linter or the test suite) in the workspace root and reports pass, fail or could_not_run with the captured output. Without 'command' the configured default verification command is used. Use it after editing to check your work.",
            parameters: vec![
                ParamSpec::optional(
                    "command",
                    ParamKind::String,
                    "The shell command to run. Must start with one of the allowed command prefixes.",
                ),
                ParamSpec::optional(
                    "path",
                    ParamKind::String,
                    "A workspace path substituted for '{path}' in the command.",
                ),
            ],
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: VerifyArgs = parse_args(self.name(), args)?;
        let workspace = ctx.workspace()?;
        let settings = &ctx.verify;

        let template = match (&args.command, &settings.default_command) {
            (Some(command), _) => {
                let allowed = settings.default_command.as_deref() == Some(command.as_str())
                    || settings
                        .allowed_command_prefixes
                        .iter()
                        .any(|prefix| command.starts_with(prefix.as_str()));
                if !allowed {
                    return Err(ToolError::invalid_request(format!(
                        "Command '{command}' is not allowed. Only commands starting with {:?} are permitted.",
                        settings.allowed_command_prefixes
                    )));
                }
                command.clone()
            }
            (None, Some(default)) => default.clone(),
            (None, None) => {
                return Err(ToolError::invalid_request(
                    "No verification command is configured. Pass 'command' explicitly.",
                ));
            }
        };

        let target = match &args.path {
            Some(path) => {
                workspace.resolve(path)?;
                path.trim().to_string()
            }
            None => ".".to_string(),
        };
        let command = template.replace(PATH_PLACEHOLDER, &target);
        tracing::debug!(%command, "running verification");

        let child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(workspace.root())
            .kill_on_drop(true)
            .output();

        let (status, exit_code, output) =
            match tokio::time::timeout(settings.timeout, child).await {
                Err(_) => (
                    VerifyStatus::CouldNotRun,
                    None,
                    format!(
                        "Command timed out after {} seconds.",
                        settings.timeout.as_secs()
                    ),
                ),
                Ok(Err(e)) => (
                    VerifyStatus::CouldNotRun,
                    None,
                    format!("Failed to start command: {e}"),
                ),
                Ok(Ok(output)) => {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let status = if output.status.success() {
                        VerifyStatus::Pass
                    } else {
                        VerifyStatus::Fail
                    };
                    (
                        status,
                        output.status.code(),
                        strip_str(format!("{stdout}{stderr}")),
                    )
                }
            };

        let (output, truncated) = keep_tail(&output, settings.max_output_chars);
        Ok(json!({
            "status": status,
            "command": command,
            "exit_code": exit_code,
            "output": output,
            "truncated": truncated,
        }))
    }
}

/// Keeps the last `max_chars` characters of `output`, where failures are usually reported.
fn keep_tail(output: &str, max_chars: usize) -> (String, bool) {
    let total = output.chars().count();
    if total <= max_chars {
        return (output.to_string(), false);
    }
    let tail: String = output.chars().skip(total - max_chars).collect();
    (format!("[... {} characters omitted]\n{tail}", total - max_chars), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::tools::test_context;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn test_keep_tail() {
        assert_eq!(keep_tail("short", 10), ("short".to_string(), false));
        let (kept, truncated) = keep_tail("0123456789", 4);
        assert!(truncated);
        assert!(kept.ends_with("\n6789"));
        assert!(kept.starts_with("[... 6 characters omitted]"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_passing_and_failing_commands() {
        let (_tmp_dir, mut ctx) = test_context("test-verify");
        ctx.verify.allowed_command_prefixes = vec!["echo".to_string(), "false".to_string()];

        let result = VerifyTool
            .execute(&json!({"command": "echo ok"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["status"], "pass");
        assert_eq!(result["output"], "ok\n");
        assert_eq!(result["exit_code"], 0);

        let result = VerifyTool
            .execute(&json!({"command": "false"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["status"], "fail");
        assert_eq!(result["exit_code"], 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_default_command_with_path_placeholder() {
        let (tmp_dir, mut ctx) = test_context("test-verify");
        fs::write(tmp_dir.path().join("a.txt"), "hello").unwrap();
        ctx.verify.default_command = Some("cat {path}".to_string());

        let result = VerifyTool
            .execute(&json!({"path": "a.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["status"], "pass");
        assert_eq!(result["command"], "cat a.txt");
        assert_eq!(result["output"], "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_could_not_run() {
        let (_tmp_dir, mut ctx) = test_context("test-verify");
        ctx.verify.allowed_command_prefixes = vec!["sleep".to_string()];
        ctx.verify.timeout = Duration::from_millis(100);

        let result = VerifyTool
            .execute(&json!({"command": "sleep 5"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["status"], "could_not_run");
        assert!(result["exit_code"].is_null());
    }

    #[tokio::test]
    async fn test_disallowed_command_is_rejected() {
        let (_tmp_dir, mut ctx) = test_context("test-verify");
        ctx.verify.allowed_command_prefixes = vec!["cargo test".to_string()];

        let err = VerifyTool
            .execute(&json!({"command": "rm -rf /"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn test_path_outside_root_is_rejected() {
        let (_tmp_dir, mut ctx) = test_context("test-verify");
        ctx.verify.default_command = Some("cat {path}".to_string());

        let err = VerifyTool
            .execute(&json!({"path": "../x"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfBounds);
    }

    #[tokio::test]
    async fn test_missing_command_is_rejected() {
        let (_tmp_dir, ctx) = test_context("test-verify");
        let err = VerifyTool.execute(&json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }
}
