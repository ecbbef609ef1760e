//! Anthropic Messages API provider

use crate::{
    error::{Error, Result},
    providers::LlmProvider,
    stream::{MessageEvent, MessageEventStream, parse_arguments},
    types::{Content, Context, Message, Model, StopReason, StreamOptions, Tool, Usage},
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

const API_VERSION: &str = "2023-06-01";

/// Anthropic API client
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    fn headers(&self, model: &Model) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| Error::InvalidApiKey)?,
        );
        headers.insert("accept", HeaderValue::from_static("application/json"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));

        for (key, value) in &model.headers {
            if let (Ok(name), Ok(val)) = (
                key.parse::<HeaderName>(),
                value.parse::<HeaderValue>(),
            ) {
                headers.insert(name, val);
            }
        }
        Ok(headers)
    }

    fn build_request(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> AnthropicRequest {
        let tools = if context.tools.is_empty() {
            None
        } else {
            Some(convert_tools(&context.tools))
        };

        AnthropicRequest {
            model: model.id.clone(),
            messages: convert_messages(&context.messages),
            max_tokens: options.max_tokens.unwrap_or(model.max_tokens),
            stream: true,
            system: context.system_prompt.as_ref().map(|prompt| {
                vec![SystemBlock {
                    block_type: "text".to_string(),
                    text: prompt.clone(),
                    cache_control: Some(CacheControl {
                        control_type: "ephemeral".to_string(),
                    }),
                }]
            }),
            temperature: options.temperature,
            tools,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<MessageEventStream> {
        let request = self.build_request(model, context, options);
        let url = format!("{}/v1/messages", model.base_url);

        tracing::debug!(
            url = %url,
            model = %model.id,
            messages = request.messages.len(),
            "sending model request"
        );

        let request_builder = self
            .client
            .post(&url)
            .headers(self.headers(model)?)
            .json(&request);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source, model.id.clone())))
    }
}

/// Create the event stream from SSE events
fn create_stream(
    mut event_source: EventSource,
    model_id: String,
) -> impl futures::Stream<Item = MessageEvent> {
    stream! {
        let mut usage = Usage::default();
        let mut stop_reason = StopReason::Stop;
        let mut content_blocks: Vec<ContentBlock> = vec![];
        let mut error_message: Option<String> = None;

        yield MessageEvent::Start {
            message: Message::assistant_empty(),
        };

        while let Some(event_result) = event_source.next().await {
            match event_result {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => match message.event.as_str() {
                    "message_start" => {
                        if let Ok(data) = serde_json::from_str::<MessageStartEvent>(&message.data) {
                            usage = data.message.usage.into_usage();
                        }
                    }
                    "content_block_start" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockStartEvent>(&message.data) {
                            let index = data.index as usize;
                            while content_blocks.len() <= index {
                                content_blocks.push(ContentBlock::default());
                            }

                            match data.content_block.block_type.as_str() {
                                "text" => {
                                    content_blocks[index] = ContentBlock::Text {
                                        text: String::new(),
                                    };
                                    yield MessageEvent::TextStart { content_index: index };
                                }
                                "tool_use" => {
                                    let id = data.content_block.id.unwrap_or_default();
                                    let name = data.content_block.name.unwrap_or_default();
                                    content_blocks[index] = ContentBlock::ToolCall {
                                        id: id.clone(),
                                        name: name.clone(),
                                        arguments_json: String::new(),
                                    };
                                    yield MessageEvent::ToolCallStart {
                                        content_index: index,
                                        id,
                                        name,
                                    };
                                }
                                other => {
                                    tracing::trace!(block_type = other, "ignoring content block");
                                }
                            }
                        }
                    }
                    "content_block_delta" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockDeltaEvent>(&message.data) {
                            let index = data.index as usize;
                            match (content_blocks.get_mut(index), data.delta.delta_type.as_str()) {
                                (Some(ContentBlock::Text { text }), "text_delta") => {
                                    let delta = data.delta.text.unwrap_or_default();
                                    text.push_str(&delta);
                                    yield MessageEvent::TextDelta {
                                        content_index: index,
                                        delta,
                                    };
                                }
                                (Some(ContentBlock::ToolCall { arguments_json, .. }), "input_json_delta") => {
                                    let delta = data.delta.partial_json.unwrap_or_default();
                                    arguments_json.push_str(&delta);
                                    yield MessageEvent::ToolCallDelta {
                                        content_index: index,
                                        delta,
                                    };
                                }
                                _ => {}
                            }
                        }
                    }
                    "content_block_stop" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockStopEvent>(&message.data) {
                            let index = data.index as usize;
                            match content_blocks.get(index) {
                                Some(ContentBlock::Text { text }) => {
                                    yield MessageEvent::TextEnd {
                                        content_index: index,
                                        text: text.clone(),
                                    };
                                }
                                Some(ContentBlock::ToolCall { id, name, arguments_json }) => {
                                    yield MessageEvent::ToolCallEnd {
                                        content_index: index,
                                        id: id.clone(),
                                        name: name.clone(),
                                        arguments: parse_arguments(arguments_json),
                                    };
                                }
                                _ => {}
                            }
                        }
                    }
                    "message_delta" => {
                        if let Ok(data) = serde_json::from_str::<MessageDeltaEvent>(&message.data) {
                            if let Some(reason) = data.delta.stop_reason {
                                stop_reason = map_stop_reason(&reason);
                            }
                            // message_delta carries cumulative output; input was reported at start
                            usage.output = data.usage.output_tokens;
                        }
                    }
                    "message_stop" => break,
                    "error" => {
                        error_message = Some(
                            match serde_json::from_str::<ErrorEvent>(&message.data) {
                                Ok(data) => format!("{}: {}", data.error.error_type, data.error.message),
                                Err(_) => message.data.clone(),
                            },
                        );
                        stop_reason = StopReason::Error;
                        break;
                    }
                    _ => {}
                },
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    error_message = Some(describe_status_error(status.as_u16(), &body));
                    stop_reason = StopReason::Error;
                    break;
                }
                Err(e) => {
                    error_message = Some(e.to_string());
                    stop_reason = StopReason::Error;
                    break;
                }
            }
        }
        event_source.close();

        if let Some(error_msg) = error_message {
            tracing::warn!(model = %model_id, error = %error_msg, "model stream failed");
            yield MessageEvent::Error { message: error_msg };
        } else {
            let content: Vec<Content> = content_blocks
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(Content::Text { text }),
                    ContentBlock::ToolCall { id, name, arguments_json } => Some(Content::ToolCall {
                        id,
                        name,
                        arguments: parse_arguments(&arguments_json),
                    }),
                    ContentBlock::Empty => None,
                })
                .collect();

            let final_message = Message::Assistant {
                content,
                metadata: crate::types::AssistantMetadata {
                    model: Some(model_id.clone()),
                    usage: usage.clone(),
                    stop_reason: Some(stop_reason),
                    error_message: None,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                },
            };

            yield MessageEvent::Done {
                message: final_message,
                stop_reason,
                usage,
            };
        }
    }
}

/// Render a non-success HTTP response as `STATUS (error_type): message`.
fn describe_status_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorEvent>(body) {
        Ok(data) => format!("{} ({}): {}", status, data.error.error_type, data.error.message),
        Err(_) if body.trim().is_empty() => format!("{} (http_error): empty response body", status),
        Err(_) => format!("{} (http_error): {}", status, body.trim()),
    }
}

#[derive(Debug, Default)]
enum ContentBlock {
    #[default]
    Empty,
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments_json: String,
    },
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<Vec<SystemBlock>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Debug, Serialize)]
struct SystemBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    control_type: String,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

// ============================================================================
// Response event types
// ============================================================================

#[derive(Debug, Deserialize)]
struct MessageStartEvent {
    message: MessageInfo,
}

#[derive(Debug, Deserialize)]
struct MessageInfo {
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    cache_read_input_tokens: Option<u32>,
    cache_creation_input_tokens: Option<u32>,
}

impl UsageInfo {
    fn into_usage(self) -> Usage {
        Usage {
            input: self.input_tokens,
            output: self.output_tokens,
            cache_read: self.cache_read_input_tokens.unwrap_or(0),
            cache_write: self.cache_creation_input_tokens.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentBlockStartEvent {
    index: u32,
    content_block: ContentBlockInfo,
}

#[derive(Debug, Deserialize)]
struct ContentBlockInfo {
    #[serde(rename = "type")]
    block_type: String,
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDeltaEvent {
    index: u32,
    delta: DeltaInfo,
}

#[derive(Debug, Deserialize)]
struct DeltaInfo {
    #[serde(rename = "type")]
    delta_type: String,
    text: Option<String>,
    partial_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockStopEvent {
    index: u32,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaEvent {
    delta: MessageDelta,
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

// ============================================================================
// Conversion functions
// ============================================================================

fn convert_content(content: &Content) -> Option<serde_json::Value> {
    match content {
        Content::Text { text } => Some(serde_json::json!({ "type": "text", "text": text })),
        Content::Image { data, mime_type } => Some(serde_json::json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": mime_type,
                "data": data
            }
        })),
        Content::ToolCall { .. } => None,
    }
}

fn convert_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    let mut result = vec![];

    for message in messages {
        match message {
            Message::User { content, .. } => {
                let blocks: Vec<serde_json::Value> =
                    content.iter().filter_map(convert_content).collect();

                result.push(AnthropicMessage {
                    role: "user".to_string(),
                    content: serde_json::Value::Array(blocks),
                });
            }
            Message::Assistant { content, .. } => {
                let blocks: Vec<serde_json::Value> = content
                    .iter()
                    .filter_map(|c| match c {
                        Content::ToolCall {
                            id,
                            name,
                            arguments,
                        } => Some(serde_json::json!({
                            "type": "tool_use",
                            "id": id,
                            "name": name,
                            "input": arguments
                        })),
                        Content::Text { text } if text.is_empty() => None,
                        other => convert_content(other),
                    })
                    .collect();

                if !blocks.is_empty() {
                    result.push(AnthropicMessage {
                        role: "assistant".to_string(),
                        content: serde_json::Value::Array(blocks),
                    });
                }
            }
            Message::ToolResults { results, .. } => {
                // One user turn carrying every result of the iteration
                let blocks: Vec<serde_json::Value> = results
                    .iter()
                    .map(|r| {
                        let content: Vec<serde_json::Value> =
                            r.content.iter().filter_map(convert_content).collect();
                        serde_json::json!({
                            "type": "tool_result",
                            "tool_use_id": r.tool_call_id,
                            "content": content,
                            "is_error": r.is_error
                        })
                    })
                    .collect();

                if !blocks.is_empty() {
                    result.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: serde_json::Value::Array(blocks),
                    });
                }
            }
        }
    }

    result
}

fn convert_tools(tools: &[Tool]) -> Vec<AnthropicTool> {
    tools
        .iter()
        .map(|tool| {
            let input_schema = if tool.parameters.is_object() {
                let mut schema = tool.parameters.clone();
                if let Some(obj) = schema.as_object_mut() {
                    obj.entry("type").or_insert(serde_json::json!("object"));
                }
                schema
            } else {
                serde_json::json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                })
            };

            AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema,
            }
        })
        .collect()
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" | "stop_sequence" => StopReason::Stop,
        "max_tokens" => StopReason::Length,
        "tool_use" => StopReason::ToolUse,
        _ => StopReason::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolResultBlock;

    #[test]
    fn test_tool_results_become_one_user_turn() {
        let msg = Message::tool_results(vec![
            ToolResultBlock {
                tool_call_id: "a".into(),
                tool_name: "shell".into(),
                content: vec![Content::text("ok")],
                is_error: false,
            },
            ToolResultBlock {
                tool_call_id: "b".into(),
                tool_name: "screenshot".into(),
                content: vec![Content::image("QUJD", "image/png")],
                is_error: false,
            },
        ]);
        let converted = convert_messages(&[msg]);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].role, "user");

        let blocks = converted[0].content.as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["tool_use_id"], "a");
        assert_eq!(blocks[1]["tool_use_id"], "b");
        assert_eq!(blocks[1]["content"][0]["type"], "image");
        assert_eq!(blocks[1]["content"][0]["source"]["media_type"], "image/png");
    }

    #[test]
    fn test_assistant_tool_use_block() {
        let msg = Message::Assistant {
            content: vec![
                Content::text(""),
                Content::tool_call("t1", "shell", serde_json::json!({"command": "ls"})),
            ],
            metadata: Default::default(),
        };
        let converted = convert_messages(&[msg]);
        let blocks = converted[0].content.as_array().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["type"], "tool_use");
        assert_eq!(blocks[0]["input"]["command"], "ls");
    }

    #[test]
    fn test_convert_tools_defaults_schema_type() {
        let tools = vec![
            Tool::new("a", "A", serde_json::json!({"properties": {}})),
            Tool::new("b", "B", serde_json::Value::Null),
        ];
        let converted = convert_tools(&tools);
        assert_eq!(converted[0].input_schema["type"], "object");
        assert_eq!(converted[1].input_schema["type"], "object");
    }

    #[test]
    fn test_map_stop_reason() {
        assert_eq!(map_stop_reason("tool_use"), StopReason::ToolUse);
        assert_eq!(map_stop_reason("max_tokens"), StopReason::Length);
        assert_eq!(map_stop_reason("end_turn"), StopReason::Stop);
    }

    #[test]
    fn test_describe_status_error() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let text = describe_status_error(529, body);
        assert_eq!(text, "529 (overloaded_error): Overloaded");
        assert!(Error::from_stream_message(text).is_overloaded());

        assert_eq!(
            describe_status_error(502, ""),
            "502 (http_error): empty response body"
        );
    }

    #[test]
    fn test_request_uses_model_max_tokens() {
        let provider = AnthropicProvider::new("key");
        let model = crate::models::default_model();
        let ctx = Context::with_system("be brief");
        let req = provider.build_request(&model, &ctx, &StreamOptions::default());
        assert_eq!(req.max_tokens, model.max_tokens);
        assert_eq!(req.system.as_ref().map(|s| s.len()), Some(1));
        assert!(req.tools.is_none());
    }
}
