//! The bounded tool-calling loop

use parley_ai::{Message, Model, StopReason, ToolResultBlock, Usage};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::{
    error::Result,
    events::AgentEvent,
    registry::ToolRegistry,
    store::ChatMessage,
    tool::{Attachment, ToolContext},
    transport::{AgentRunConfig, Transport},
};

/// Reply text when the iteration cap is hit
pub const MAX_STEPS_TEXT: &str = "Maximum steps reached.";

/// Default system prompt: short replies suited to a phone chat
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a collaborative research assistant reached through a chat app.
Keep responses concise and conversational; this is a chat, not an essay.
Use short paragraphs and avoid markdown, which most chat apps render poorly.
Be technical when appropriate. If you don't know something, say so honestly.
You can use tools to act on the host machine; use them when they help answer the request.";

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// System prompt
    pub system_prompt: Option<String>,
    /// Model to use
    pub model: Model,
    /// Maximum tokens per response
    pub max_tokens: Option<u32>,
    /// Hard cap on model requests per turn
    pub max_tool_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            model: parley_ai::models::default_model(),
            max_tokens: Some(1024),
            max_tool_iterations: 15,
        }
    }
}

/// Outcome of one agent run
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// Final answer (or the max-steps text)
    pub text: String,
    /// Binaries produced by tools, in production order
    pub attachments: Vec<Attachment>,
    /// Model requests made
    pub iterations: u32,
    /// Usage summed over all requests
    pub usage: Usage,
    /// Whether the iteration cap ended the run
    pub exhausted: bool,
}

/// Drives model requests and tool execution for one conversation turn.
///
/// The agent holds no conversation state; every `run` owns its turn log, so
/// one agent can serve many identities concurrently.
pub struct Agent {
    config: AgentConfig,
    tools: Arc<ToolRegistry>,
    transport: Arc<dyn Transport>,
    event_tx: broadcast::Sender<AgentEvent>,
}

impl Agent {
    /// Create a new agent
    pub fn new(config: AgentConfig, tools: ToolRegistry, transport: Arc<dyn Transport>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            tools: Arc::new(tools),
            transport,
            event_tx,
        }
    }

    /// Subscribe to agent events
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.event_tx.subscribe()
    }

    /// Sender for components that publish on the same event stream
    pub fn event_sender(&self) -> broadcast::Sender<AgentEvent> {
        self.event_tx.clone()
    }

    /// Get the agent config
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn emit(&self, event: AgentEvent) {
        let _ = self.event_tx.send(event);
    }

    fn build_run_config(&self) -> AgentRunConfig {
        AgentRunConfig {
            system_prompt: self.config.system_prompt.clone(),
            tools: self.tools.definitions(),
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: None,
        }
    }

    /// Run the loop over a conversation history.
    ///
    /// Model failures are returned as errors. Tool failures never are: they
    /// reach the model as error content.
    pub async fn run(&self, identity: &str, history: &[ChatMessage]) -> Result<AgentReply> {
        let run_config = self.build_run_config();
        let mut turn_log: Vec<Message> = history.iter().map(ChatMessage::to_model_message).collect();
        let mut attachments: Vec<Attachment> = Vec::new();
        let mut total_usage = Usage::default();

        self.emit(AgentEvent::AgentStart {
            identity: identity.to_string(),
        });

        for iteration in 1..=self.config.max_tool_iterations {
            self.emit(AgentEvent::TurnStart { iteration });

            let response = match self.transport.complete(turn_log.clone(), &run_config).await {
                Ok(response) => response,
                Err(e) => {
                    self.emit(AgentEvent::Error {
                        message: e.to_string(),
                    });
                    return Err(e.into());
                }
            };

            let usage = response.usage();
            total_usage.accumulate(&usage);
            tracing::debug!(
                identity,
                iteration,
                input_tokens = usage.input,
                output_tokens = usage.output,
                stop_reason = ?response.stop_reason(),
                "model response"
            );
            self.emit(AgentEvent::TurnEnd {
                iteration,
                usage: usage.clone(),
            });

            let tool_calls: Vec<(String, String, serde_json::Value)> = response
                .tool_calls()
                .into_iter()
                .map(|(id, name, args)| (id.to_string(), name.to_string(), args.clone()))
                .collect();

            if response.stop_reason() != Some(StopReason::ToolUse) || tool_calls.is_empty() {
                let text = response.text();
                self.finish(identity, iteration, &total_usage, false);
                return Ok(AgentReply {
                    text,
                    attachments,
                    iterations: iteration,
                    usage: total_usage,
                    exhausted: false,
                });
            }

            // Narration that came with the tool calls stays in the log
            turn_log.push(response);

            let ctx = ToolContext {
                identity: identity.to_string(),
                transport: self.transport.clone(),
                turn_log: Arc::new(turn_log.clone()),
            };

            let mut results = Vec::with_capacity(tool_calls.len());
            for (id, name, args) in tool_calls {
                self.emit(AgentEvent::ToolExecutionStart {
                    tool_call_id: id.clone(),
                    tool_name: name.clone(),
                    arguments: args.clone(),
                });
                tracing::debug!(identity, iteration, tool = %name, "executing tool");

                let result = self.tools.execute(&id, &name, args, &ctx).await;
                if result.is_error {
                    tracing::warn!(identity, tool = %name, error = %result.text_content(), "tool reported an error");
                }

                self.emit(AgentEvent::ToolExecutionEnd {
                    tool_call_id: id.clone(),
                    tool_name: name.clone(),
                    result: result.text_content(),
                    is_error: result.is_error,
                });

                if let Some(attachment) = result.attachment {
                    attachments.push(attachment);
                }
                results.push(ToolResultBlock {
                    tool_call_id: id,
                    tool_name: name,
                    content: result.content,
                    is_error: result.is_error,
                });
            }

            turn_log.push(Message::tool_results(results));
        }

        let iterations = self.config.max_tool_iterations;
        tracing::warn!(identity, iterations, "tool loop hit the iteration cap");
        self.finish(identity, iterations, &total_usage, true);
        Ok(AgentReply {
            text: MAX_STEPS_TEXT.to_string(),
            attachments,
            iterations,
            usage: total_usage,
            exhausted: true,
        })
    }

    fn finish(&self, identity: &str, iterations: u32, usage: &Usage, exhausted: bool) {
        tracing::info!(
            identity,
            iterations,
            input_tokens = usage.input,
            output_tokens = usage.output,
            exhausted,
            "agent run finished"
        );
        self.emit(AgentEvent::AgentEnd {
            iterations,
            total_usage: usage.clone(),
            exhausted,
        });
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::tool::{Tool, ToolResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use parley_ai::{AssistantMetadata, Content};

    /// A scripted transport. Each call pops the next response; when the
    /// script runs out it answers "done".
    pub struct MockTransport {
        pub responses: Arc<Mutex<Vec<parley_ai::Result<Message>>>>,
        pub requests: Arc<Mutex<Vec<Vec<Message>>>>,
        pub call_times: Arc<Mutex<Vec<tokio::time::Instant>>>,
    }

    impl MockTransport {
        pub fn new(responses: Vec<parley_ai::Result<Message>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(responses)),
                requests: Arc::new(Mutex::new(vec![])),
                call_times: Arc::new(Mutex::new(vec![])),
            }
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn complete(
            &self,
            messages: Vec<Message>,
            _config: &AgentRunConfig,
        ) -> parley_ai::Result<Message> {
            self.requests.lock().push(messages);
            self.call_times.lock().push(tokio::time::Instant::now());
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Ok(final_text("done"))
            } else {
                responses.remove(0)
            }
        }
    }

    /// Transport that always asks for another tool call
    pub struct LoopingTransport {
        pub calls: Mutex<u32>,
    }

    #[async_trait]
    impl Transport for LoopingTransport {
        async fn complete(
            &self,
            _messages: Vec<Message>,
            _config: &AgentRunConfig,
        ) -> parley_ai::Result<Message> {
            let n = {
                let mut calls = self.calls.lock();
                *calls += 1;
                *calls
            };
            Ok(wants_tools(vec![(format!("c{}", n), "noop")]))
        }
    }

    pub fn final_text(text: &str) -> Message {
        Message::Assistant {
            content: vec![Content::text(text)],
            metadata: AssistantMetadata {
                stop_reason: Some(StopReason::Stop),
                usage: Usage {
                    input: 10,
                    output: 2,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    pub fn wants_tools(calls: Vec<(String, &str)>) -> Message {
        Message::Assistant {
            content: calls
                .into_iter()
                .map(|(id, name)| Content::tool_call(id, name, serde_json::json!({})))
                .collect(),
            metadata: AssistantMetadata {
                stop_reason: Some(StopReason::ToolUse),
                usage: Usage {
                    input: 10,
                    output: 2,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    /// A no-op tool that records the order in which tools ran
    pub struct NoopTool {
        pub tool_name: String,
        pub log: Arc<Mutex<Vec<String>>>,
        pub attachment: Option<Vec<u8>>,
    }

    impl NoopTool {
        pub fn new(name: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                tool_name: name.to_string(),
                log,
                attachment: None,
            }
        }
    }

    #[async_trait]
    impl Tool for NoopTool {
        fn name(&self) -> &str {
            &self.tool_name
        }
        fn description(&self) -> &str {
            "A no-op tool"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            tool_call_id: &str,
            _arguments: serde_json::Value,
            _ctx: &ToolContext,
        ) -> ToolResult {
            self.log.lock().push(tool_call_id.to_string());
            let result = ToolResult::text("ok");
            match &self.attachment {
                Some(bytes) => result.with_attachment(Attachment::png(bytes.clone())),
                None => result,
            }
        }
    }

    pub fn test_config(max_tool_iterations: u32) -> AgentConfig {
        AgentConfig {
            system_prompt: Some("test".into()),
            model: parley_ai::models::resolve_model("test-model"),
            max_tokens: Some(256),
            max_tool_iterations,
        }
    }
}
