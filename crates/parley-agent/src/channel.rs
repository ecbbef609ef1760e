//! Outbound side of the chat transport

use async_trait::async_trait;

use crate::error::Result;

/// Where replies go. Implemented by the chat transport (or a console stand-in).
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send a text message to an identity
    async fn send_text(&self, identity: &str, text: &str) -> Result<()>;

    /// Send an image to an identity
    async fn send_image(&self, identity: &str, data: &[u8], caption: Option<&str>) -> Result<()>;
}
