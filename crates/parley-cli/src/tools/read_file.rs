//! File reading tool

use async_trait::async_trait;
use parley_agent::tool::{Tool, ToolContext, ToolResult};
use serde_json::json;
use std::path::PathBuf;
use tokio::fs;

use crate::utils::resolve_in;

const DEFAULT_MAX_LENGTH: usize = 50_000;

/// Tool for reading text files, relative to the workspace directory
pub struct ReadFileTool {
    workspace: PathBuf,
}

impl ReadFileTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file. Relative paths are resolved against the research workspace. Use to review notes, read papers, or check existing work."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path (relative to the workspace, or absolute)"
                },
                "max_length": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum characters to read (default 50000)"
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
        let limit = arguments
            .get("max_length")
            .and_then(|v| v.as_u64())
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_MAX_LENGTH);

        let path = resolve_in(&self.workspace, path_str);
        tracing::info!(tool = "read_file", path = %path.display(), "reading file");

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Error reading file: {}", e)),
        };

        if content.is_empty() {
            return ToolResult::text("(empty file)");
        }

        let total = content.chars().count();
        if total > limit {
            let head: String = content.chars().take(limit).collect();
            return ToolResult::text(format!(
                "{}\n\n...(truncated at {} chars, total {})",
                head, limit, total
            ));
        }

        ToolResult::text(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::context;

    #[tokio::test]
    async fn test_reads_relative_to_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("notes")).unwrap();
        std::fs::write(dir.path().join("notes/a.md"), "# Notes\nline two").unwrap();

        let tool = ReadFileTool::new(dir.path());
        let result = tool
            .execute("1", json!({"path": "notes/a.md"}), &context())
            .await;
        assert!(!result.is_error);
        assert_eq!(result.text_content(), "# Notes\nline two");
    }

    #[tokio::test]
    async fn test_absolute_path_and_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("long.txt");
        std::fs::write(&file, "abcdefghij").unwrap();

        let tool = ReadFileTool::new("/nonexistent-workspace");
        let result = tool
            .execute(
                "1",
                json!({"path": file.to_string_lossy(), "max_length": 4}),
                &context(),
            )
            .await;
        assert_eq!(
            result.text_content(),
            "abcd\n\n...(truncated at 4 chars, total 10)"
        );
    }

    #[tokio::test]
    async fn test_empty_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.txt"), "").unwrap();
        let tool = ReadFileTool::new(dir.path());

        let result = tool.execute("1", json!({"path": "empty.txt"}), &context()).await;
        assert_eq!(result.text_content(), "(empty file)");

        let result = tool.execute("1", json!({"path": "missing.txt"}), &context()).await;
        assert!(result.is_error);
        assert!(result.text_content().starts_with("Error reading file:"));
    }
}
