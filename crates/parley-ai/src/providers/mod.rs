//! Model endpoint providers

pub mod anthropic;

use crate::{Context, MessageEventStream, Model, Result, StreamOptions};
use async_trait::async_trait;

/// Trait for model endpoint providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stream a response from the model
    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<MessageEventStream>;
}
