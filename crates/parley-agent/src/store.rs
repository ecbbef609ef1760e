//! Per-identity conversation memory with FIFO bounds and durable snapshots

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::compaction;
use crate::error::Result;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One remembered chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Convert to the model endpoint's message type
    pub fn to_model_message(&self) -> parley_ai::Message {
        match self.role {
            Role::User => parley_ai::Message::user(&self.content),
            Role::Assistant => parley_ai::Message::assistant(&self.content),
        }
    }
}

/// Persisted layout: identity -> ordered messages
pub type Snapshot = BTreeMap<String, Vec<ChatMessage>>;

/// Durable storage for the whole store
pub trait Persistence: Send + Sync {
    /// Load the last saved snapshot (empty if nothing was saved yet)
    fn load(&self) -> Result<Snapshot>;

    /// Replace the saved snapshot
    fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// JSON file persistence. Writes go to `<path>.tmp` and are renamed over
/// the real file so a crash mid-write leaves the previous snapshot intact.
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl Persistence for JsonFilePersistence {
    fn load(&self) -> Result<Snapshot> {
        if !self.path.exists() {
            return Ok(Snapshot::new());
        }
        let data = fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(Snapshot::new());
        }
        Ok(serde_json::from_str(&data)?)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(snapshot)?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory persistence, for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryPersistence {
    snapshot: Mutex<Snapshot>,
    saves: AtomicUsize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of completed saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Last saved snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().clone()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> Result<Snapshot> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        *self.snapshot.lock() = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Store bounds
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// FIFO cap per conversation
    pub max_messages: usize,
    /// Messages kept verbatim by compaction
    pub keep_recent: usize,
    /// Character count above which compaction is due
    pub compact_threshold: usize,
    /// Per-message budget inside a compaction summary
    pub summary_snippet_chars: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_messages: 30,
            keep_recent: 10,
            compact_threshold: 40_000,
            summary_snippet_chars: 200,
        }
    }
}

type Conversation = Arc<Mutex<Vec<ChatMessage>>>;

/// Conversation memory keyed by identity.
///
/// Each conversation has its own lock, so different identities never contend
/// beyond the brief map lookup. Every mutation is followed by a best-effort
/// save; save failures are logged and the in-memory state stays authoritative.
pub struct ConversationStore {
    config: StoreConfig,
    conversations: RwLock<HashMap<String, Conversation>>,
    persistence: Arc<dyn Persistence>,
    /// Serializes snapshot + write
    save_lock: Mutex<()>,
}

impl ConversationStore {
    /// Create an empty store
    pub fn new(config: StoreConfig, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            config,
            conversations: RwLock::new(HashMap::new()),
            persistence,
            save_lock: Mutex::new(()),
        }
    }

    /// Create a store from whatever the persistence layer holds.
    /// A failed load starts empty.
    pub fn load(config: StoreConfig, persistence: Arc<dyn Persistence>) -> Self {
        let snapshot = match persistence.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load conversations, starting empty");
                Snapshot::new()
            }
        };

        let store = Self::new(config, persistence);
        {
            let mut map = store.conversations.write();
            for (identity, mut messages) in snapshot {
                let excess = messages.len().saturating_sub(store.config.max_messages);
                messages.drain(..excess);
                map.insert(identity, Arc::new(Mutex::new(messages)));
            }
            tracing::info!(conversations = map.len(), "conversation store loaded");
        }
        store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn conversation(&self, identity: &str) -> Option<Conversation> {
        self.conversations.read().get(identity).cloned()
    }

    fn conversation_or_insert(&self, identity: &str) -> Conversation {
        if let Some(conv) = self.conversation(identity) {
            return conv;
        }
        self.conversations
            .write()
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    /// Add a message, evicting the oldest beyond the cap, then persist.
    pub fn append(&self, identity: &str, role: Role, content: impl Into<String>) {
        let conv = self.conversation_or_insert(identity);
        {
            let mut messages = conv.lock();
            messages.push(ChatMessage {
                role,
                content: content.into(),
            });
            let excess = messages.len().saturating_sub(self.config.max_messages);
            if excess > 0 {
                messages.drain(..excess);
            }
        }
        self.persist();
    }

    /// Messages for an identity, oldest first. Unknown identities are empty.
    pub fn history(&self, identity: &str) -> Vec<ChatMessage> {
        self.conversation(identity)
            .map(|conv| conv.lock().clone())
            .unwrap_or_default()
    }

    /// Total characters of retained content
    pub fn estimated_size(&self, identity: &str) -> usize {
        self.conversation(identity)
            .map(|conv| compaction::estimate_chars(&conv.lock()))
            .unwrap_or(0)
    }

    pub fn needs_compaction(&self, identity: &str) -> bool {
        self.estimated_size(identity) > self.config.compact_threshold
    }

    /// Whether the history is longer than `keep_recent`
    pub fn can_compact(&self, identity: &str) -> bool {
        self.conversation(identity)
            .is_some_and(|conv| conv.lock().len() > self.config.keep_recent)
    }

    /// Fold everything but the last `keep_recent` messages into one summary.
    /// Returns false (and changes nothing) when the history is already short.
    pub fn compact(&self, identity: &str) -> bool {
        let Some(conv) = self.conversation(identity) else {
            return false;
        };

        let (chars_before, chars_after, folded) = {
            let mut messages = conv.lock();
            let n = messages.len();
            if n <= self.config.keep_recent {
                return false;
            }

            let chars_before = compaction::estimate_chars(&messages);
            let recent = messages.split_off(n - self.config.keep_recent);
            let summary =
                compaction::render_summary(&messages, self.config.summary_snippet_chars);
            let folded = messages.len();

            *messages = std::iter::once(ChatMessage::user(summary))
                .chain(recent)
                .collect();
            (chars_before, compaction::estimate_chars(&messages), folded)
        };

        tracing::info!(
            identity,
            folded,
            chars_before,
            chars_after,
            "conversation compacted"
        );
        self.persist();
        true
    }

    /// Forget one conversation
    pub fn clear(&self, identity: &str) {
        let removed = self.conversations.write().remove(identity).is_some();
        if removed {
            self.persist();
        }
    }

    /// Forget every conversation
    pub fn clear_all(&self) {
        self.conversations.write().clear();
        self.persist();
    }

    /// Known identities, sorted
    pub fn identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.conversations.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn snapshot(&self) -> Snapshot {
        let map = self.conversations.read();
        map.iter()
            .map(|(identity, conv)| (identity.clone(), conv.lock().clone()))
            .collect()
    }

    /// Saves inline on the calling thread: a mutation is on disk when it
    /// returns, and saves land in mutation order.
    fn persist(&self) {
        let _guard = self.save_lock.lock();
        let snapshot = self.snapshot();
        if let Err(e) = self.persistence.save(&snapshot) {
            tracing::warn!(error = %e, "failed to save conversations");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compaction::SUMMARY_MARKER;
    use crate::error::Error;

    fn store_with(config: StoreConfig) -> (ConversationStore, Arc<MemoryPersistence>) {
        let persistence = Arc::new(MemoryPersistence::new());
        (ConversationStore::new(config, persistence.clone()), persistence)
    }

    fn store() -> (ConversationStore, Arc<MemoryPersistence>) {
        store_with(StoreConfig::default())
    }

    struct FailingPersistence;

    impl Persistence for FailingPersistence {
        fn load(&self) -> Result<Snapshot> {
            Err(Error::Store("unreadable".into()))
        }
        fn save(&self, _snapshot: &Snapshot) -> Result<()> {
            Err(Error::Store("disk full".into()))
        }
    }

    #[test]
    fn test_fifo_cap_keeps_last_messages_in_order() {
        let (store, _) = store();
        for i in 0..35 {
            store.append("alice", Role::User, format!("msg-{}", i));
        }

        let history = store.history("alice");
        assert_eq!(history.len(), 30);
        let expected: Vec<String> = (5..35).map(|i| format!("msg-{}", i)).collect();
        let actual: Vec<String> = history.into_iter().map(|m| m.content).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_unknown_identity_is_empty() {
        let (store, _) = store();
        assert!(store.history("nobody").is_empty());
        assert_eq!(store.estimated_size("nobody"), 0);
        assert!(!store.needs_compaction("nobody"));
        assert!(!store.compact("nobody"));
    }

    #[test]
    fn test_every_mutation_persists() {
        let (store, persistence) = store();
        store.append("alice", Role::User, "hi");
        store.append("alice", Role::Assistant, "hello");
        assert_eq!(persistence.save_count(), 2);
        assert_eq!(persistence.snapshot()["alice"].len(), 2);

        store.clear("alice");
        assert_eq!(persistence.save_count(), 3);
        assert!(persistence.snapshot().is_empty());
    }

    #[test]
    fn test_failed_save_is_not_fatal() {
        let store = ConversationStore::new(StoreConfig::default(), Arc::new(FailingPersistence));
        store.append("alice", Role::User, "still here");
        assert_eq!(store.history("alice").len(), 1);
    }

    #[test]
    fn test_failed_load_starts_empty() {
        let store = ConversationStore::load(StoreConfig::default(), Arc::new(FailingPersistence));
        assert!(store.identities().is_empty());
    }

    #[test]
    fn test_size_and_threshold() {
        let (store, _) = store_with(StoreConfig {
            compact_threshold: 10,
            ..Default::default()
        });
        store.append("a", Role::User, "12345");
        store.append("a", Role::Assistant, "12345");
        assert_eq!(store.estimated_size("a"), 10);
        assert!(!store.needs_compaction("a"));
        store.append("a", Role::User, "1");
        assert!(store.needs_compaction("a"));
    }

    #[test]
    fn test_compact_short_history_is_noop() {
        let (store, persistence) = store();
        for i in 0..10 {
            store.append("a", Role::User, format!("m{}", i));
        }
        let before = store.history("a");
        let saves = persistence.save_count();

        assert!(!store.compact("a"));
        assert_eq!(store.history("a"), before);
        assert_eq!(persistence.save_count(), saves);
    }

    #[test]
    fn test_can_compact_tracks_keep_recent() {
        let (store, _) = store_with(StoreConfig {
            keep_recent: 2,
            ..Default::default()
        });
        assert!(!store.can_compact("alice"));
        store.append("alice", Role::User, "a");
        store.append("alice", Role::Assistant, "b");
        assert!(!store.can_compact("alice"));
        store.append("alice", Role::User, "c");
        assert!(store.can_compact("alice"));
        assert!(store.compact("alice"));
        // summary plus two recent messages
        assert!(store.can_compact("alice"));
    }

    #[test]
    fn test_compact_shape() {
        let (store, _) = store();
        for i in 0..25 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store.append("a", role, format!("message number {}", i));
        }
        let original = store.history("a");

        assert!(store.compact("a"));

        let history = store.history("a");
        assert_eq!(history.len(), 11);
        assert_eq!(history[0].role, Role::User);
        assert!(history[0].content.contains(SUMMARY_MARKER));
        assert!(history[0].content.contains("(15 messages, compacted)"));
        assert!(history[0].content.contains("[User]: message number 0"));
        assert!(history[0].content.contains("[Assistant]: message number 1"));
        assert_eq!(&history[1..], &original[15..]);
    }

    #[test]
    fn test_compact_bounds_long_messages() {
        let (store, _) = store_with(StoreConfig {
            compact_threshold: 1_000,
            ..Default::default()
        });
        for _ in 0..20 {
            store.append("a", Role::User, "y".repeat(5_000));
        }
        assert!(store.needs_compaction("a"));
        assert!(store.compact("a"));
        // 10 verbatim messages remain, the summary itself stays small
        let history = store.history("a");
        assert!(history[0].content.chars().count() < 10 * 220 + 100);
    }

    #[test]
    fn test_isolation_between_identities() {
        let (store, _) = store();
        store.append("a", Role::User, "from a");
        store.append("b", Role::User, "from b");

        assert!(store.history("b").iter().all(|m| m.content != "from a"));

        store.clear("a");
        assert!(store.history("a").is_empty());
        assert_eq!(store.history("b"), vec![ChatMessage::user("from b")]);
    }

    #[test]
    fn test_clear_all_and_identities() {
        let (store, _) = store();
        store.append("zed", Role::User, "1");
        store.append("amy", Role::User, "2");
        assert_eq!(store.identities(), vec!["amy".to_string(), "zed".to_string()]);

        store.clear_all();
        assert!(store.identities().is_empty());
    }

    #[test]
    fn test_load_trims_oversized_conversations() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "a".into(),
            (0..40).map(|i| ChatMessage::user(format!("m{}", i))).collect(),
        );
        let store = ConversationStore::load(
            StoreConfig::default(),
            Arc::new(MemoryPersistence::with_snapshot(snapshot)),
        );
        let history = store.history("a");
        assert_eq!(history.len(), 30);
        assert_eq!(history[0].content, "m10");
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("conversations.json");
        let persistence = Arc::new(JsonFilePersistence::new(&path));

        {
            let store = ConversationStore::load(StoreConfig::default(), persistence.clone());
            store.append("alice", Role::User, "remember me");
            store.append("alice", Role::Assistant, "I will");
        }

        assert!(path.exists());
        assert!(!persistence.tmp_path().exists());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["alice"][0]["role"], "user");
        assert_eq!(raw["alice"][1]["content"], "I will");

        let reloaded = ConversationStore::load(StoreConfig::default(), persistence);
        assert_eq!(reloaded.history("alice").len(), 2);
    }

    #[tokio::test]
    async fn test_mutations_are_saved_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = ConversationStore::new(
            StoreConfig::default(),
            Arc::new(JsonFilePersistence::new(&path)),
        );

        store.append("alice", Role::User, "first");
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["alice"][0]["content"], "first");

        store.append("alice", Role::Assistant, "second");
        store.clear("alice");
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get("alice").is_none());
    }

    #[test]
    fn test_json_file_missing_or_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let persistence = JsonFilePersistence::new(&path);
        assert!(persistence.load().unwrap().is_empty());

        std::fs::write(&path, "{not json").unwrap();
        assert!(persistence.load().is_err());
        let store = ConversationStore::load(StoreConfig::default(), Arc::new(persistence));
        assert!(store.identities().is_empty());
    }

    #[test]
    fn test_to_model_message() {
        let msg = ChatMessage::assistant("hi").to_model_message();
        assert_eq!(msg.role(), "assistant");
        assert_eq!(msg.text(), "hi");
    }
}
