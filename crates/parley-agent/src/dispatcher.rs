//! Turn dispatcher: one inbound chat message in, replies out

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::{
    agent::Agent,
    channel::Channel,
    compaction::CompactionReason,
    error::Result,
    events::AgentEvent,
    store::{ConversationStore, Role},
};

/// The only failure text users ever see
pub const APOLOGY_TEXT: &str = "Sorry, something went wrong. Please try again.";

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Wait between an overload failure and the single retry
    pub overload_cooldown: Duration,
    /// Allowed identity local parts; empty allows everyone
    pub allowed_identities: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            overload_cooldown: Duration::from_secs(5),
            allowed_identities: vec![],
        }
    }
}

/// Handles inbound messages end to end.
///
/// `handle` never fails: every error becomes a log line plus, where the user
/// is waiting on a reply, the apology text. Turns for one identity run one at
/// a time; different identities proceed in parallel.
pub struct Dispatcher {
    store: Arc<ConversationStore>,
    agent: Arc<Agent>,
    channel: Arc<dyn Channel>,
    config: DispatchConfig,
    identity_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    event_tx: broadcast::Sender<AgentEvent>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<ConversationStore>,
        agent: Arc<Agent>,
        channel: Arc<dyn Channel>,
        config: DispatchConfig,
    ) -> Self {
        let event_tx = agent.event_sender();
        Self {
            store,
            agent,
            channel,
            config,
            identity_locks: Mutex::new(HashMap::new()),
            event_tx,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Subscribe to agent and compaction events
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.event_tx.subscribe()
    }

    /// Whether an identity passes the allow-list
    pub fn is_allowed(&self, identity: &str) -> bool {
        if self.config.allowed_identities.is_empty() {
            return true;
        }
        let local = local_part(identity);
        self.config
            .allowed_identities
            .iter()
            .any(|allowed| allowed.trim().trim_start_matches('+') == local)
    }

    fn identity_lock(&self, identity: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.identity_locks
            .lock()
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    /// Drop an identity's lock once no turn holds or awaits it
    fn release_identity_lock(&self, identity: &str) {
        let mut locks = self.identity_locks.lock();
        if locks
            .get(identity)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(identity);
        }
    }

    /// Process one inbound message to completion.
    pub async fn handle(&self, identity: &str, text: &str) {
        if !self.is_allowed(identity) {
            tracing::info!(identity, "ignoring message from identity not on the allow-list");
            return;
        }

        if text.trim().is_empty() {
            tracing::debug!(identity, "ignoring empty message");
            return;
        }

        let lock = self.identity_lock(identity);
        {
            let _guard = lock.lock().await;
            self.handle_locked(identity, text).await;
        }
        drop(lock);
        self.release_identity_lock(identity);
    }

    async fn handle_locked(&self, identity: &str, text: &str) {
        tracing::info!(identity, chars = text.chars().count(), "handling message");

        if let Some(reply) = self.run_command(identity, text.trim()) {
            self.send_text_logged(identity, &reply).await;
            return;
        }

        if let Err(e) = self.process(identity, text).await {
            tracing::error!(identity, error = %e, "turn failed");
            let _ = self.event_tx.send(AgentEvent::Error {
                message: e.to_string(),
            });
            self.send_text_logged(identity, APOLOGY_TEXT).await;
        }
    }

    fn run_command(&self, identity: &str, text: &str) -> Option<String> {
        match text.to_lowercase().as_str() {
            "/reset" => {
                self.store.clear(identity);
                tracing::info!(identity, "conversation reset");
                Some("Conversation cleared.".to_string())
            }
            "/compact" => {
                if self.compact(identity, CompactionReason::Manual) {
                    Some("Conversation compacted.".to_string())
                } else {
                    Some("Nothing to compact yet.".to_string())
                }
            }
            _ => None,
        }
    }

    async fn process(&self, identity: &str, text: &str) -> Result<()> {
        self.store.append(identity, Role::User, text);

        if self.store.needs_compaction(identity) {
            self.compact(identity, CompactionReason::Threshold);
        }

        match self.run_and_deliver(identity).await {
            Err(e) if e.is_overloaded() => {
                tracing::warn!(
                    identity,
                    error = %e,
                    cooldown = ?self.config.overload_cooldown,
                    "model overloaded, compacting before a single retry"
                );
                self.compact(identity, CompactionReason::Overload);
                tokio::time::sleep(self.config.overload_cooldown).await;
                self.run_and_deliver(identity).await
            }
            other => other,
        }
    }

    async fn run_and_deliver(&self, identity: &str) -> Result<()> {
        let history = self.store.history(identity);
        let reply = self.agent.run(identity, &history).await?;

        self.store.append(identity, Role::Assistant, reply.text.clone());

        for attachment in &reply.attachments {
            if let Err(e) = self
                .channel
                .send_image(identity, &attachment.data, None)
                .await
            {
                tracing::warn!(identity, error = %e, "failed to send attachment");
            }
        }

        if !reply.text.trim().is_empty() {
            self.channel.send_text(identity, &reply.text).await?;
        }
        Ok(())
    }

    fn compact(&self, identity: &str, reason: CompactionReason) -> bool {
        if !self.store.can_compact(identity) {
            tracing::debug!(identity, ?reason, "history too short to compact");
            return false;
        }

        let _ = self.event_tx.send(AgentEvent::CompactionStart {
            identity: identity.to_string(),
            reason,
        });
        let chars_before = self.store.estimated_size(identity);
        let compacted = self.store.compact(identity);
        let chars_after = self.store.estimated_size(identity);
        tracing::info!(identity, ?reason, compacted, chars_before, chars_after, "compaction");
        let _ = self.event_tx.send(AgentEvent::CompactionEnd {
            identity: identity.to_string(),
            chars_before,
            chars_after,
        });
        compacted
    }

    async fn send_text_logged(&self, identity: &str, text: &str) {
        if let Err(e) = self.channel.send_text(identity, text).await {
            tracing::error!(identity, error = %e, "failed to send message");
        }
    }
}

/// Local part of an identity: text before `@`, then before `:`, without `+`
fn local_part(identity: &str) -> &str {
    let user = identity.split('@').next().unwrap_or(identity);
    let user = user.split(':').next().unwrap_or(user);
    user.trim_start_matches('+')
}
