//! Agent event types

use parley_ai::Usage;
use serde::{Deserialize, Serialize};

use crate::compaction::CompactionReason;

/// Events emitted while handling a conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Agent loop started for an identity
    AgentStart { identity: String },

    /// A model request is about to be made
    TurnStart { iteration: u32 },

    /// Tool execution started
    ToolExecutionStart {
        tool_call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed
    ToolExecutionEnd {
        tool_call_id: String,
        tool_name: String,
        result: String,
        is_error: bool,
    },

    /// A model response was received
    TurnEnd { iteration: u32, usage: Usage },

    /// Agent loop finished
    AgentEnd {
        iterations: u32,
        total_usage: Usage,
        exhausted: bool,
    },

    /// Conversation compaction started
    CompactionStart {
        identity: String,
        reason: CompactionReason,
    },

    /// Conversation compaction completed
    CompactionEnd {
        identity: String,
        chars_before: usize,
        chars_after: usize,
    },

    /// Error occurred
    Error { message: String },
}
