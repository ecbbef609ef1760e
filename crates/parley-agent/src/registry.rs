//! Named tool lookup, argument validation and panic isolation

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::tool::{BoxedTool, ToolContext, ToolResult, to_api_tool};

/// The set of tools the model may call.
///
/// Registration order is the order of the manifest sent to the model.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<BoxedTool>,
    /// Compiled JSON schema validators keyed by tool name
    schema_cache: HashMap<String, Arc<jsonschema::Validator>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of tools
    pub fn with_tools(tools: impl IntoIterator<Item = BoxedTool>) -> Self {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    /// Add a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: BoxedTool) {
        self.cache_tool_schema(&tool);
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    fn cache_tool_schema(&mut self, tool: &BoxedTool) {
        let schema = tool.parameters_schema();
        match jsonschema::validator_for(&schema) {
            Ok(validator) => {
                self.schema_cache
                    .insert(tool.name().to_string(), Arc::new(validator));
            }
            Err(e) => {
                self.schema_cache.remove(tool.name());
                tracing::warn!(
                    tool = tool.name(),
                    error = %e,
                    "invalid tool parameter schema, skipping validation"
                );
            }
        }
    }

    /// Tool definitions for the model request
    pub fn definitions(&self) -> Vec<parley_ai::Tool> {
        self.tools.iter().map(|t| to_api_tool(t.as_ref())).collect()
    }

    /// Registered tool names, in manifest order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run a tool by name. Always produces a result: unknown names, invalid
    /// arguments and panics all come back as error content.
    pub async fn execute(
        &self,
        tool_call_id: &str,
        name: &str,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> ToolResult {
        let Some(tool) = self.get(name) else {
            tracing::warn!(tool = name, "model requested unknown tool");
            return ToolResult::error(format!("Unknown tool: {}", name));
        };

        if let Some(err) = self
            .schema_cache
            .get(name)
            .and_then(|validator| validate_with_validator(&arguments, validator))
        {
            return ToolResult::error(err);
        }

        match AssertUnwindSafe(tool.execute(tool_call_id, arguments, ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::error!(tool = name, panic = %detail, "tool panicked");
                ToolResult::error(format!("Tool '{}' failed: {}", name, detail))
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Validate tool arguments using a pre-compiled validator.
/// Returns `Some(error_message)` if validation fails, `None` if valid.
fn validate_with_validator(
    args: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Tool argument validation failed:\n{}",
            errors.join("\n")
        ))
    }
}
