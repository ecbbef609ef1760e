//! parley-agent: the conversational core
//!
//! Bounded per-identity conversation memory with local compaction, the
//! tool-calling agent loop, and the dispatcher that turns one inbound chat
//! message into outbound replies.

pub mod agent;
pub mod channel;
pub mod compaction;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod registry;
pub mod store;
pub mod tool;
pub mod transport;

pub use agent::{Agent, AgentConfig, AgentReply, MAX_STEPS_TEXT};
pub use channel::Channel;
pub use compaction::CompactionReason;
pub use dispatcher::{APOLOGY_TEXT, DispatchConfig, Dispatcher};
pub use error::{Error, Result};
pub use events::AgentEvent;
pub use registry::ToolRegistry;
pub use store::{
    ChatMessage, ConversationStore, JsonFilePersistence, MemoryPersistence, Persistence, Role,
    Snapshot, StoreConfig,
};
pub use tool::{Attachment, BoxedTool, Tool, ToolContext, ToolResult};
pub use transport::{AgentRunConfig, ProviderTransport, RetryConfig, Transport};
