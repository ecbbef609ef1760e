//! Model endpoint boundary for the agent loop

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parley_ai::{
    AnthropicProvider, Context, LlmProvider, Message, Model, Result, StreamOptions,
    collect_message,
};

/// Retry configuration for transient transport failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Everything about a model request except the messages
#[derive(Debug, Clone)]
pub struct AgentRunConfig {
    /// System prompt
    pub system_prompt: Option<String>,
    /// Tool manifest advertised with every request
    pub tools: Vec<parley_ai::Tool>,
    /// Model to use
    pub model: Model,
    /// Maximum tokens per response
    pub max_tokens: Option<u32>,
    /// Temperature
    pub temperature: Option<f32>,
}

/// One request/response exchange with the model endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the turn log and return the complete assistant message
    async fn complete(&self, messages: Vec<Message>, config: &AgentRunConfig) -> Result<Message>;
}

/// Transport that streams from a provider and folds the stream into one message.
///
/// Transient network failures are retried with backoff. Overload and rate-limit
/// failures are returned to the caller untouched.
pub struct ProviderTransport {
    provider: Arc<dyn LlmProvider>,
    retry_config: RetryConfig,
}

impl ProviderTransport {
    /// Create a transport over any provider
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            retry_config: RetryConfig::default(),
        }
    }

    /// Create an Anthropic transport with a specific API key
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self::new(Arc::new(AnthropicProvider::new(api_key)))
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    async fn attempt(&self, context: &Context, options: &StreamOptions, model: &Model) -> Result<Message> {
        let stream = self.provider.stream(model, context, options).await?;
        collect_message(stream).await
    }
}

#[async_trait]
impl Transport for ProviderTransport {
    async fn complete(&self, messages: Vec<Message>, config: &AgentRunConfig) -> Result<Message> {
        let context = Context {
            system_prompt: config.system_prompt.clone(),
            messages,
            tools: config.tools.clone(),
        };
        let options = StreamOptions {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        let mut attempt = 0u32;
        loop {
            match self.attempt(&context, &options, &config.model).await {
                Ok(message) => return Ok(message),
                Err(e) if e.is_retryable() && attempt < self.retry_config.max_retries => {
                    let delay = self.retry_config.delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.retry_config.max_retries + 1,
                        error = %e,
                        ?delay,
                        "model request failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
