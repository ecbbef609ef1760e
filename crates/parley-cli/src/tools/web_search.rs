//! Web search through the Brave Search API

use async_trait::async_trait;
use parley_agent::tool::{Tool, ToolContext, ToolResult};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const MAX_SEARCH_COUNT: u64 = 20;

pub struct WebSearchTool {
    client: Client,
    api_key: Option<String>,
    default_count: u64,
}

impl WebSearchTool {
    pub fn new(api_key: Option<String>, default_count: u32) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            default_count: u64::from(default_count).clamp(1, MAX_SEARCH_COUNT),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

/// `N. title\n   url\n   description`, blank line between hits
pub fn format_results(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("{}. {}\n   {}\n   {}", i + 1, hit.title, hit.url, hit.description))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn parse_hits(body: &str) -> serde_json::Result<Vec<SearchHit>> {
    let payload: BraveResponse = serde_json::from_str(body)?;
    Ok(payload.web.map(|w| w.results).unwrap_or_default())
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web using Brave Search. Returns titles, URLs, and snippets for top results. Use for finding papers, articles, documentation, and any web research."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query. Use specific academic terms when searching for papers."
                },
                "count": {
                    "type": "integer",
                    "description": format!("Number of results (1-20, default {})", self.default_count)
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> ToolResult {
        let query = match arguments
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
        {
            Some(q) => q,
            None => return ToolResult::error("Missing 'query' argument"),
        };

        let api_key = match &self.api_key {
            Some(key) => key,
            None => {
                return ToolResult::error(
                    "Error: no Brave Search API key configured (set BRAVE_SEARCH_API_KEY).",
                );
            }
        };

        let count = arguments
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.default_count)
            .clamp(1, MAX_SEARCH_COUNT);

        let url = format!(
            "{}?q={}&count={}",
            BRAVE_SEARCH_URL,
            urlencoding::encode(query),
            count
        );
        tracing::info!(tool = "web_search", query, count, "searching the web");

        let response = match self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Search failed: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            return ToolResult::error(format!("Search API error: {}", status));
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::error(format!("Search failed: {}", e)),
        };
        let hits = match parse_hits(&body) {
            Ok(h) => h,
            Err(e) => return ToolResult::error(format!("Search failed: invalid response: {}", e)),
        };

        if hits.is_empty() {
            return ToolResult::text(format!("No results found for: \"{}\"", query));
        }

        tracing::debug!(tool = "web_search", results = hits.len(), "search results");
        ToolResult::text(format_results(&hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::context;

    #[test]
    fn test_format_results() {
        let hits = vec![
            SearchHit {
                title: "Attention Is All You Need".into(),
                url: "https://arxiv.org/abs/1706.03762".into(),
                description: "Transformer paper".into(),
            },
            SearchHit {
                title: "Second".into(),
                url: "https://example.com".into(),
                description: String::new(),
            },
        ];
        assert_eq!(
            format_results(&hits),
            "1. Attention Is All You Need\n   https://arxiv.org/abs/1706.03762\n   Transformer paper\n\n2. Second\n   https://example.com\n   "
        );
    }

    #[test]
    fn test_parse_hits() {
        let body = r#"{"web":{"results":[{"title":"T","url":"https://u","description":"D","extra":1}]}}"#;
        let hits = parse_hits(body).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "T");

        assert!(parse_hits(r#"{"query":{}}"#).unwrap().is_empty());
    }

    #[test]
    fn test_default_count_is_clamped() {
        assert_eq!(WebSearchTool::new(None, 0).default_count, 1);
        assert_eq!(WebSearchTool::new(None, 50).default_count, 20);
        assert_eq!(WebSearchTool::new(None, 8).default_count, 8);
    }

    #[tokio::test]
    async fn test_missing_key_is_reported_as_text() {
        let tool = WebSearchTool::new(None, 8);
        let result = tool.execute("1", json!({"query": "rust"}), &context()).await;
        assert!(result.is_error);
        assert!(result.text_content().contains("BRAVE_SEARCH_API_KEY"));
    }
}
