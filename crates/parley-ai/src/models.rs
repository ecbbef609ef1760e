//! Model registry with public lookup API.

use crate::Model;

/// Default conversational model: fast and cheap, good enough for chat turns.
pub const DEFAULT_MODEL_ID: &str = "claude-haiku-4-5-20251001";

/// Default model for the `plan` delegate.
pub const DEFAULT_PLANNER_MODEL_ID: &str = "claude-opus-4-1-20250805";

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

struct ModelEntry {
    id: &'static str,
    name: &'static str,
    context_window: u32,
    max_tokens: u32,
}

const MODEL_ENTRIES: &[ModelEntry] = &[
    ModelEntry {
        id: "claude-haiku-4-5-20251001",
        name: "Claude Haiku 4.5",
        context_window: 200_000,
        max_tokens: 64_000,
    },
    ModelEntry {
        id: "claude-sonnet-4-5-20250929",
        name: "Claude Sonnet 4.5",
        context_window: 200_000,
        max_tokens: 64_000,
    },
    ModelEntry {
        id: "claude-opus-4-1-20250805",
        name: "Claude Opus 4.1",
        context_window: 200_000,
        max_tokens: 32_000,
    },
];

impl ModelEntry {
    fn to_model(&self) -> Model {
        Model {
            id: self.id.to_string(),
            name: self.name.to_string(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            context_window: self.context_window,
            max_tokens: self.max_tokens,
            headers: Default::default(),
        }
    }
}

/// Look up a registered model by ID.
pub fn get_model_by_id(id: &str) -> Option<Model> {
    MODEL_ENTRIES
        .iter()
        .find(|e| e.id == id)
        .map(|e| e.to_model())
}

/// Resolve a model ID, falling back to a generic Anthropic model definition
/// for IDs the registry does not know (newer snapshots, aliases).
pub fn resolve_model(id: &str) -> Model {
    get_model_by_id(id).unwrap_or_else(|| {
        tracing::debug!(model = id, "model not in registry, using generic definition");
        Model {
            id: id.to_string(),
            name: id.to_string(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            context_window: 200_000,
            max_tokens: 8_192,
            headers: Default::default(),
        }
    })
}

/// The default conversational model.
pub fn default_model() -> Model {
    resolve_model(DEFAULT_MODEL_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_registered() {
        assert!(get_model_by_id(DEFAULT_MODEL_ID).is_some());
        assert!(get_model_by_id(DEFAULT_PLANNER_MODEL_ID).is_some());
    }

    #[test]
    fn test_resolve_unknown_model() {
        let model = resolve_model("claude-future-9");
        assert_eq!(model.id, "claude-future-9");
        assert_eq!(model.base_url, ANTHROPIC_BASE_URL);
    }
}
