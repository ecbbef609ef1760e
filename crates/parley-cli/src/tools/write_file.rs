//! File writing tool

use async_trait::async_trait;
use parley_agent::tool::{Tool, ToolContext, ToolResult};
use serde_json::json;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::utils::resolve_in;

/// Tool for writing or appending to files, relative to the workspace directory
pub struct WriteFileTool {
    workspace: PathBuf,
}

impl WriteFileTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Relative paths are resolved against the research workspace. Creates directories automatically. Use to save notes, literature maps, and analysis."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path (relative to the workspace, or absolute)"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                },
                "append": {
                    "type": "boolean",
                    "description": "Append instead of overwrite (default: false)"
                }
            },
            "required": ["path", "content"]
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
        let content = match arguments.get("content").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("Missing 'content' argument"),
        };
        let append = arguments
            .get("append")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let path = resolve_in(&self.workspace, path_str);
        tracing::info!(tool = "write_file", path = %path.display(), append, "writing file");

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolResult::error(format!("Error writing file: {}", e));
            }
        }

        let written = if append {
            append_to(&path, content).await
        } else {
            fs::write(&path, content).await
        };

        match written {
            Ok(()) => ToolResult::text(format!(
                "File {}: {} ({} chars)",
                if append { "appended" } else { "written" },
                path.display(),
                content.chars().count()
            )),
            Err(e) => ToolResult::error(format!("Error writing file: {}", e)),
        }
    }
}

async fn append_to(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::context;

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(dir.path());

        let result = tool
            .execute(
                "1",
                json!({"path": "maps/topic/overview.md", "content": "hello"}),
                &context(),
            )
            .await;
        assert!(!result.is_error);
        assert!(result.text_content().starts_with("File written:"));
        assert!(result.text_content().ends_with("(5 chars)"));
        let written = std::fs::read_to_string(dir.path().join("maps/topic/overview.md")).unwrap();
        assert_eq!(written, "hello");
    }

    #[tokio::test]
    async fn test_overwrite_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(dir.path());

        tool.execute("1", json!({"path": "log.txt", "content": "one"}), &context())
            .await;
        tool.execute("2", json!({"path": "log.txt", "content": "two"}), &context())
            .await;
        let result = tool
            .execute(
                "3",
                json!({"path": "log.txt", "content": "+three", "append": true}),
                &context(),
            )
            .await;

        assert!(result.text_content().starts_with("File appended:"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("log.txt")).unwrap(),
            "two+three"
        );
    }

    #[tokio::test]
    async fn test_missing_content() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(dir.path());
        let result = tool.execute("1", json!({"path": "x"}), &context()).await;
        assert!(result.is_error);
    }
}
