//! Escalate planning to a stronger model

use async_trait::async_trait;
use parley_agent::tool::{Tool, ToolContext, ToolResult};
use parley_agent::transport::AgentRunConfig;
use parley_ai::{Message, Model};
use serde_json::json;

/// How much of the turn log the planner sees
const RECENT_MESSAGES: usize = 20;

const PLANNER_PROMPT: &str = "You are a senior research strategist. A research assistant needs help planning or analyzing something complex.

Review the conversation context and the specific task, then provide a clear, actionable plan.

Be specific about:
- What searches to perform and what terms to use
- What to look for in results
- How to organize findings
- What files to create and their structure in the research workspace
- The order of operations

The assistant has these tools: web_search, read_file, write_file, shell, screenshot, open_path.

Give concrete search queries, file names, and structure. No vague advice.";

pub struct PlanTool {
    model: Model,
    max_tokens: u32,
}

impl PlanTool {
    pub fn new(model: Model, max_tokens: u32) -> Self {
        Self { model, max_tokens }
    }
}

/// Flatten the tail of the turn log into a transcript.
///
/// Tool-call and tool-result blocks are left out; a partial exchange would
/// not be a valid request on its own.
fn render_context(turn_log: &[Message]) -> String {
    let start = turn_log.len().saturating_sub(RECENT_MESSAGES);
    turn_log[start..]
        .iter()
        .filter_map(|m| {
            let text = m.text();
            if text.trim().is_empty() {
                return None;
            }
            match m {
                Message::User { .. } => Some(format!("[User]: {}", text)),
                Message::Assistant { .. } => Some(format!("[Assistant]: {}", text)),
                Message::ToolResults { .. } => None,
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn planner_request(turn_log: &[Message], task: &str) -> Message {
    let transcript = render_context(turn_log);
    let ask = format!("Create a plan for the following task:\n\n{}", task);
    if transcript.is_empty() {
        Message::user(ask)
    } else {
        Message::user(format!("Recent conversation:\n{}\n\n{}", transcript, ask))
    }
}

#[async_trait]
impl Tool for PlanTool {
    fn name(&self) -> &str {
        "plan"
    }

    fn description(&self) -> &str {
        "Escalate to a stronger reasoning model for strategic planning, complex analysis, or important decisions. Use this when starting a complex research task, synthesizing findings from multiple sources, or when the user explicitly asks you to plan. Returns a detailed plan you should follow."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "What you need planned or analyzed. Be specific about the research question, what you have found so far, and what decisions you need help with."
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> ToolResult {
        let task = match arguments.get("task").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolResult::error("Missing 'task' argument"),
        };

        let config = AgentRunConfig {
            system_prompt: Some(PLANNER_PROMPT.to_string()),
            tools: vec![],
            model: self.model.clone(),
            max_tokens: Some(self.max_tokens),
            temperature: None,
        };
        let messages = vec![planner_request(&ctx.turn_log, task)];

        tracing::info!(tool = "plan", identity = %ctx.identity, model = %self.model.id, "escalating to planner");

        match ctx.transport.complete(messages, &config).await {
            Ok(reply) => {
                let usage = reply.usage();
                tracing::info!(
                    tool = "plan",
                    input_tokens = usage.input,
                    output_tokens = usage.output,
                    "plan received"
                );
                ToolResult::text(format!("[PLAN]\n\n{}", reply.text()))
            }
            Err(e) => {
                tracing::warn!(tool = "plan", error = %e, "planner request failed");
                ToolResult::error(format!("Plan failed: {}", e))
            }
        }
    }
}
