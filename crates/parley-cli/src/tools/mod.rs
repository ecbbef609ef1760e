//! Built-in tools for the research assistant

mod open_path;
mod plan;
mod read_file;
mod screenshot;
mod shell;
mod web_search;
mod write_file;

pub use open_path::OpenPathTool;
pub use plan::PlanTool;
pub use read_file::ReadFileTool;
pub use screenshot::ScreenshotTool;
pub use shell::ShellTool;
pub use web_search::WebSearchTool;
pub use write_file::WriteFileTool;

use parley_agent::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

/// The full tool set, in manifest order
pub fn build_registry(cfg: &Config) -> ToolRegistry {
    let timeout = Duration::from_secs(cfg.tools.shell_timeout_secs);
    let workspace = cfg.workspace_dir();
    let planner = parley_ai::models::resolve_model(&cfg.tools.planner_model);

    ToolRegistry::with_tools([
        Arc::new(ScreenshotTool::new(timeout)) as parley_agent::BoxedTool,
        Arc::new(ShellTool::new(timeout, cfg.tools.max_output_chars)),
        Arc::new(OpenPathTool::new()),
        Arc::new(PlanTool::new(planner, cfg.tools.planner_max_tokens)),
        Arc::new(WebSearchTool::new(cfg.brave_api_key(), cfg.tools.search_results)),
        Arc::new(ReadFileTool::new(workspace.clone())),
        Arc::new(WriteFileTool::new(workspace)),
    ])
}
