//! Configuration file support

use parley_agent::{AgentConfig, DispatchConfig, StoreConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::expand_home;

/// Configuration for parley
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentSettings,
    pub memory: MemorySettings,
    pub dispatch: DispatchSettings,
    pub tools: ToolSettings,
    /// API keys (alternative to environment variables)
    pub api_keys: ApiKeys,
}

/// `[agent]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub model: String,
    pub max_tokens: u32,
    pub max_tool_iterations: u32,
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: parley_ai::models::DEFAULT_MODEL_ID.to_string(),
            max_tokens: 1024,
            max_tool_iterations: 15,
            system_prompt: None,
        }
    }
}

/// `[memory]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub max_messages: usize,
    pub keep_recent: usize,
    /// Characters, not tokens
    pub compact_threshold: usize,
    pub summary_snippet_chars: usize,
    pub state_file: Option<String>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        let store = StoreConfig::default();
        Self {
            max_messages: store.max_messages,
            keep_recent: store.keep_recent,
            compact_threshold: store.compact_threshold,
            summary_snippet_chars: store.summary_snippet_chars,
            state_file: None,
        }
    }
}

/// `[dispatch]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub overload_cooldown_secs: u64,
    pub allowed_identities: Vec<String>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            overload_cooldown_secs: 5,
            allowed_identities: vec![],
        }
    }
}

/// `[tools]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub shell_timeout_secs: u64,
    pub max_output_chars: usize,
    pub workspace_dir: Option<String>,
    pub planner_model: String,
    pub planner_max_tokens: u32,
    pub search_results: u32,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            shell_timeout_secs: 30,
            max_output_chars: 10_000,
            workspace_dir: None,
            planner_model: parley_ai::models::DEFAULT_PLANNER_MODEL_ID.to_string(),
            planner_max_tokens: 4096,
            search_results: 8,
        }
    }
}

/// API key configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub anthropic: Option<String>,
    pub brave: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PARLEY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from a file; a missing or broken file yields defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse config file");
                Self::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read config file");
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init(path: &Path) -> std::io::Result<PathBuf> {
        if !path.exists() {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(path, example_config())?;
        }
        Ok(path.to_path_buf())
    }

    /// Anthropic key from the config, then `ANTHROPIC_API_KEY`
    pub fn anthropic_api_key(&self) -> Option<String> {
        non_blank(self.api_keys.anthropic.clone())
            .or_else(|| non_blank(std::env::var("ANTHROPIC_API_KEY").ok()))
    }

    /// Brave Search key from the config, then `BRAVE_SEARCH_API_KEY`
    pub fn brave_api_key(&self) -> Option<String> {
        non_blank(self.api_keys.brave.clone())
            .or_else(|| non_blank(std::env::var("BRAVE_SEARCH_API_KEY").ok()))
    }

    /// Where conversations are persisted
    pub fn state_file(&self) -> PathBuf {
        match &self.memory.state_file {
            Some(path) => expand_home(path),
            None => data_dir().join("conversations.json"),
        }
    }

    /// Base directory for relative file-tool paths
    pub fn workspace_dir(&self) -> PathBuf {
        match &self.tools.workspace_dir {
            Some(path) => expand_home(path),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("research"),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_messages: self.memory.max_messages,
            keep_recent: self.memory.keep_recent,
            compact_threshold: self.memory.compact_threshold,
            summary_snippet_chars: self.memory.summary_snippet_chars,
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            overload_cooldown: Duration::from_secs(self.dispatch.overload_cooldown_secs),
            allowed_identities: self.dispatch.allowed_identities.clone(),
        }
    }

    /// Agent settings; `model_override` wins over the file
    pub fn agent_config(&self, model_override: Option<&str>) -> AgentConfig {
        let model_id = model_override.unwrap_or(&self.agent.model);
        let defaults = AgentConfig::default();
        AgentConfig {
            system_prompt: self
                .agent
                .system_prompt
                .clone()
                .or(defaults.system_prompt),
            model: parley_ai::models::resolve_model(model_id),
            max_tokens: Some(self.agent.max_tokens),
            max_tool_iterations: self.agent.max_tool_iterations,
        }
    }
}

/// `<data_local_dir>/parley`
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parley")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# parley configuration file
# Place at ~/.config/parley/config.toml (Linux), ~/Library/Application Support/parley/config.toml (macOS)
# or %APPDATA%\parley\config.toml (Windows). PARLEY_CONFIG_PATH overrides the location.

[agent]
model = "claude-haiku-4-5-20251001"
max_tokens = 1024
max_tool_iterations = 15
# system_prompt = "You are a helpful assistant."

[memory]
max_messages = 30
keep_recent = 10
# Characters of history that trigger compaction
compact_threshold = 40000
summary_snippet_chars = 200
# state_file = "~/.local/share/parley/conversations.json"

[dispatch]
overload_cooldown_secs = 5
# Local parts (before '@' or ':') allowed to talk to the bot. Empty allows everyone.
allowed_identities = []

[tools]
shell_timeout_secs = 30
max_output_chars = 10000
# workspace_dir = "~/research"
planner_model = "claude-opus-4-1-20250805"
planner_max_tokens = 4096
search_results = 8

# API keys (optional - environment variables ANTHROPIC_API_KEY and
# BRAVE_SEARCH_API_KEY are used otherwise)
[api_keys]
# anthropic = "sk-ant-..."
# brave = "..."
"#
}
