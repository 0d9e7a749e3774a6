//! Command tool: run shell commands in the workspace root.
//!
//! Supports command allowlisting and a hard timeout; the child is killed when
//! the timeout fires.

use editstage_core::error::ToolError;
use editstage_core::tool::{RUN_COMMAND, RunCommandInput, ToolOutcome};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::workspace::WorkspaceTools;

impl WorkspaceTools {
    pub(crate) async fn run_command(&self, input: RunCommandInput) -> Result<ToolOutcome, ToolError> {
        let command = input.command.as_str();
        editstage_security::check_command(command, &self.allowed_commands).map_err(|e| {
            ToolError::PermissionDenied {
                tool_name: RUN_COMMAND.into(),
                reason: e.to_string(),
            }
        })?;

        debug!(command = %command, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&self.root).kill_on_drop(true);

        let output = match tokio::time::timeout(self.command_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: RUN_COMMAND.into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command, "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: RUN_COMMAND.into(),
                    timeout_secs: self.command_timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            let text = if stderr.is_empty() {
                stdout.to_string()
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            };
            Ok(ToolOutcome::ok(text.trim()))
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            let text = format!("[exit code: {code}]\n{stdout}\n{stderr}");
            Ok(ToolOutcome::fail(text.trim()))
        }
    }
}
