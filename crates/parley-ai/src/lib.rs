//! parley-ai: model endpoint abstraction
//!
//! Message and content types shared by the rest of the workspace, the error
//! taxonomy of the endpoint, and a streaming Anthropic Messages provider.

pub mod error;
pub mod models;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use providers::LlmProvider;
pub use providers::anthropic::AnthropicProvider;
pub use stream::{MessageEvent, MessageEventStream, collect_message};
pub use types::*;
