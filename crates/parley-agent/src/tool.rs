//! Tool trait and execution context

use async_trait::async_trait;
use parley_ai::{Content, Message};
use std::fmt;
use std::sync::Arc;

use crate::transport::Transport;

/// Binary produced by a tool that should reach the chat user (e.g. a screenshot)
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl Attachment {
    pub fn png(data: Vec<u8>) -> Self {
        Self {
            data,
            mime_type: "image/png".to_string(),
        }
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Result of a tool execution
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Content returned to the model
    pub content: Vec<Content>,
    /// Whether the execution resulted in an error
    pub is_error: bool,
    /// Optional binary forwarded to the user
    pub attachment: Option<Attachment>,
}

impl ToolResult {
    /// Create a successful text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
            attachment: None,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
            attachment: None,
        }
    }

    /// Create a result with multiple content blocks
    pub fn with_content(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: false,
            attachment: None,
        }
    }

    /// Attach a binary for the user
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Get the text content as a single string
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What a tool may see besides its arguments
#[derive(Clone)]
pub struct ToolContext {
    /// Conversation identity the turn belongs to
    pub identity: String,
    /// The model endpoint, for tools that delegate to another model
    pub transport: Arc<dyn Transport>,
    /// Turn log as it stood when the tool was called
    pub turn_log: Arc<Vec<Message>>,
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("identity", &self.identity)
            .field("turn_log_len", &self.turn_log.len())
            .finish()
    }
}

/// Trait for executable tools
///
/// Failures are reported through [`ToolResult::error`], never by panicking;
/// the model needs to see what went wrong.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in API calls)
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments
    async fn execute(
        &self,
        tool_call_id: &str,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> ToolResult;
}

/// Type alias for a shared tool
pub type BoxedTool = Arc<dyn Tool>;

/// Convert a Tool to a parley_ai::Tool for API calls
pub fn to_api_tool(tool: &dyn Tool) -> parley_ai::Tool {
    parley_ai::Tool {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters_schema(),
    }
}
