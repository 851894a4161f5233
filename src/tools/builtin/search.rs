//! News search tool backed by the Tavily search API
//!
//! The number of results handed back to the agent is capped by
//! `search.max_results` no matter what the model asks for.

use crate::config::SearchSection;
use crate::tools::{Tool, ToolDescription, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Web search tool using the Tavily API
pub struct TavilySearchTool {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_results: usize,
}

impl TavilySearchTool {
    pub fn new(section: &SearchSection, api_key: String) -> Result<Self, ToolError> {
        if api_key.trim().is_empty() {
            return Err(ToolError::InitializationError(
                "Search API key is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .map_err(|e| ToolError::InitializationError(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: section.base_url.trim_end_matches('/').to_string(),
            max_results: section.max_results.max(1),
        })
    }

    /// Number of results to request: the model's ask, never above the cap (pure function)
    fn effective_num_results(parameters: &Value, max_results: usize) -> usize {
        parameters
            .get("num_results")
            .and_then(|n| n.as_u64())
            .map(|n| (n as usize).clamp(1, max_results))
            .unwrap_or(max_results)
    }

    /// Build search payload (pure function)
    fn build_search_payload(query: &str, num_results: usize) -> Value {
        json!({
            "query": query,
            "max_results": num_results,
            "topic": "news",
            "search_depth": "basic",
            "include_answer": false
        })
    }

    /// Pull (title, url, snippet) triples out of a Tavily response (pure function)
    fn parse_search_response(search_result: &Value, num_results: usize) -> Vec<Value> {
        search_result
            .get("results")
            .and_then(|r| r.as_array())
            .map(|results| {
                results
                    .iter()
                    .filter_map(|result| {
                        let url = result.get("url").and_then(|u| u.as_str())?;
                        let title = result
                            .get("title")
                            .and_then(|t| t.as_str())
                            .unwrap_or(url);
                        let snippet = result
                            .get("content")
                            .and_then(|s| s.as_str())
                            .unwrap_or("");
                        Some(json!({
                            "title": title,
                            "url": url,
                            "snippet": snippet
                        }))
                    })
                    .take(num_results)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Format final search response (pure function)
    fn format_search_response(query: &str, results: Vec<Value>) -> Value {
        json!({
            "query": query,
            "results": results
        })
    }
}

#[async_trait]
impl Tool for TavilySearchTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "search".to_string(),
            description: format!(
                "Search the web for recent news articles. Returns at most {} results, each with title, url and snippet.",
                self.max_results
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Search query"
                    },
                    "num_results": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": self.max_results,
                        "description": "How many results to return"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let query = parameters["query"]
            .as_str()
            .ok_or_else(|| ToolError::ExecutionError("Query parameter is required".to_string()))?;
        let num_results = Self::effective_num_results(parameters, self.max_results);

        debug!(query, num_results, "Running news search");

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&Self::build_search_payload(query, num_results))
            .send()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ToolError::ExecutionError(format!(
                "Search API error ({}): {}",
                status.as_u16(),
                error_text
            )));
        }

        let search_result: Value = response
            .json()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Failed to parse response: {e}")))?;

        let results = Self::parse_search_response(&search_result, num_results);
        Ok(Self::format_search_response(query, results))
    }
}
