//! Streaming event types and utilities

use crate::error::{Error, Result};
use crate::types::{Message, StopReason, Usage};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted during message streaming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageEvent {
    /// Initial message structure
    Start { message: Message },
    /// Text content started
    TextStart { content_index: usize },
    /// Text content delta
    TextDelta { content_index: usize, delta: String },
    /// Text content completed
    TextEnd { content_index: usize, text: String },
    /// Tool call started
    ToolCallStart {
        content_index: usize,
        id: String,
        name: String,
    },
    /// Tool call arguments delta (partial JSON)
    ToolCallDelta { content_index: usize, delta: String },
    /// Tool call completed
    ToolCallEnd {
        content_index: usize,
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// Message completed successfully
    Done {
        message: Message,
        stop_reason: StopReason,
        usage: Usage,
    },
    /// Error occurred
    Error { message: String },
}

/// A stream of message events
pub type MessageEventStream = Pin<Box<dyn Stream<Item = MessageEvent> + Send>>;

/// Drain a response stream into the final assistant message.
///
/// Providers end every stream with `Done` or `Error`; a stream that stops
/// before either is an unexpected response.
pub async fn collect_message(mut stream: MessageEventStream) -> Result<Message> {
    while let Some(event) = stream.next().await {
        match event {
            MessageEvent::Done { message, .. } => return Ok(message),
            MessageEvent::Error { message } => return Err(Error::from_stream_message(message)),
            _ => {}
        }
    }

    Err(Error::UnexpectedResponse(
        "stream ended without a response".to_string(),
    ))
}

/// Parse accumulated tool-call JSON. A tool with no parameters streams an
/// empty string, which means `{}`.
pub(crate) fn parse_arguments(arguments_json: &str) -> serde_json::Value {
    if arguments_json.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(arguments_json).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(events: Vec<MessageEvent>) -> MessageEventStream {
        Box::pin(futures::stream::iter(events))
    }

    #[tokio::test]
    async fn test_collect_prefers_done_message() {
        let done = Message::assistant("final");
        let stream = boxed(vec![
            MessageEvent::TextStart { content_index: 0 },
            MessageEvent::TextDelta {
                content_index: 0,
                delta: "fin".into(),
            },
            MessageEvent::Done {
                message: done,
                stop_reason: StopReason::Stop,
                usage: Usage::default(),
            },
        ]);
        let msg = collect_message(stream).await.unwrap();
        assert_eq!(msg.text(), "final");
    }

    #[tokio::test]
    async fn test_collect_error_is_classified() {
        let stream = boxed(vec![MessageEvent::Error {
            message: "overloaded_error: Overloaded".into(),
        }]);
        let err = collect_message(stream).await.unwrap_err();
        assert!(err.is_overloaded());
    }

    #[tokio::test]
    async fn test_collect_empty_stream_is_error() {
        let err = collect_message(boxed(vec![])).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_collect_truncated_stream_is_error() {
        let stream = boxed(vec![
            MessageEvent::TextStart { content_index: 0 },
            MessageEvent::TextDelta {
                content_index: 0,
                delta: "looking".into(),
            },
            MessageEvent::ToolCallStart {
                content_index: 1,
                id: "t1".into(),
                name: "screenshot".into(),
            },
        ]);
        let err = collect_message(stream).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments(""), serde_json::json!({}));
        assert_eq!(
            parse_arguments(r#"{"command":"ls"}"#),
            serde_json::json!({"command": "ls"})
        );
        assert_eq!(parse_arguments("{broken"), serde_json::Value::Null);
    }
}
