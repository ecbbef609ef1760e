//! Open a file or directory with the desktop's default application

use async_trait::async_trait;
use parley_agent::tool::{Tool, ToolContext, ToolResult};
use serde_json::json;
use tokio::process::Command;

use crate::utils::expand_home;

pub struct OpenPathTool;

impl OpenPathTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OpenPathTool {
    fn default() -> Self {
        Self::new()
    }
}

fn opener(path: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]).arg(path);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(path);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(path);
        c
    }
}

#[async_trait]
impl Tool for OpenPathTool {
    fn name(&self) -> &str {
        "open_path"
    }

    fn description(&self) -> &str {
        "Open a file or directory using the default application. Directories open in the file manager. Files open with their associated program."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute path to the file or directory to open"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> ToolResult {
        let path_str = match arguments.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::error("Missing 'path' argument"),
        };
        let path = expand_home(path_str);

        if let Err(e) = tokio::fs::metadata(&path).await {
            return ToolResult::error(format!("Failed to open path: {}: {}", path.display(), e));
        }

        let display_path = path.display().to_string();
        tracing::info!(tool = "open_path", path = %display_path, "opening path");

        match opener(&display_path).status().await {
            Ok(status) if status.success() => ToolResult::text(format!("Opened: {}", display_path)),
            Ok(status) => ToolResult::error(format!("Failed to open path: opener exited with {}", status)),
            Err(e) => ToolResult::error(format!("Failed to open path: {}", e)),
        }
    }
}
