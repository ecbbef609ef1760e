//! Local, lossy compaction of conversation history
//!
//! Older messages are folded into one synthetic user message that lists a
//! truncated snippet of each. No model call is involved, so compaction works
//! even while the endpoint is overloaded.

use serde::{Deserialize, Serialize};

use crate::store::{ChatMessage, Role};

/// Opening tag of a compaction summary message
pub const SUMMARY_MARKER: &str = "<context-summary>";
const SUMMARY_CLOSE: &str = "</context-summary>";

/// Reason for compaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionReason {
    /// History grew past the size threshold
    Threshold,
    /// The model endpoint reported overload / rate limiting
    Overload,
    /// `/compact` command
    Manual,
}

/// Approximate conversation size: total characters of message content
pub fn estimate_chars(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| m.content.chars().count()).sum()
}

/// Truncate to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Render the summary that replaces `old`.
pub fn render_summary(old: &[ChatMessage], snippet_chars: usize) -> String {
    let mut out = String::new();
    out.push_str(SUMMARY_MARKER);
    out.push('\n');
    out.push_str(&format!(
        "Earlier conversation ({} messages, compacted):\n",
        old.len()
    ));

    for msg in old {
        let label = match msg.role {
            Role::User => "[User]: ",
            Role::Assistant => "[Assistant]: ",
        };
        // One line per message
        let flat = msg.content.split_whitespace().collect::<Vec<_>>().join(" ");
        out.push_str(label);
        out.push_str(&truncate_chars(&flat, snippet_chars));
        out.push('\n');
    }

    out.push_str(SUMMARY_CLOSE);
    out
}
