//! Tool system used by the research agent
//!
//! A tool describes itself with a JSON schema and executes against JSON
//! arguments. The registry validates arguments against that schema before
//! any tool code runs, so tools can assume well-formed input.

use crate::config::AppConfig;
use crate::observability::metrics::metrics;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;

pub mod builtin;

/// Tool interface
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and JSON schema of the accepted arguments
    fn describe(&self) -> ToolDescription;

    /// Run the tool. Arguments have already been validated against `describe()`.
    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError>;
}

/// Tool description as advertised to the LLM
#[derive(Debug, Clone)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Registry of available tools, keyed by name
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Build the search and scrape tools from configuration
    pub fn from_config(config: &AppConfig, search_api_key: String) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        registry.register(Box::new(builtin::TavilySearchTool::new(
            &config.search,
            search_api_key,
        )?))?;
        registry.register(Box::new(builtin::ScrapeWebsiteTool::new(&config.scrape)?))?;
        Ok(registry)
    }

    /// Register a tool; names must be unique
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.describe().name;
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get tool description
    pub fn describe_tool(&self, tool_name: &str) -> Option<ToolDescription> {
        self.tools.get(tool_name).map(|tool| tool.describe())
    }

    /// Descriptions of the named tools only; unknown names are skipped
    pub fn describe_subset(&self, names: &[String]) -> Vec<ToolDescription> {
        names
            .iter()
            .filter_map(|name| self.describe_tool(name))
            .collect()
    }

    /// Execute tool with validated parameters
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: &Value,
    ) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        Self::validate_parameters(&tool.describe(), parameters)?;

        let started = Instant::now();
        let result = tool.execute(parameters).await;
        metrics().tool_executed(tool_name, started.elapsed(), result.is_ok());
        result
    }

    /// Validate parameters against the tool's schema (pure function)
    fn validate_parameters(description: &ToolDescription, parameters: &Value) -> Result<(), ToolError> {
        let validator = jsonschema::validator_for(&description.parameters)
            .map_err(|e| ToolError::SchemaError(format!("Schema compilation error: {e}")))?;

        validator.validate(parameters).map_err(|errors| {
            let error_messages: Vec<String> = errors
                .map(|e| format!("At '{}': {}", e.instance_path, e))
                .collect();
            ToolError::ValidationError(error_messages.join("; "))
        })
    }

    /// Get list of available tools
    pub fn list_tools(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Tool system errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),
    #[error("Tool initialization failed: {0}")]
    InitializationError(String),
    #[error("Parameter validation failed: {0}")]
    ValidationError(String),
    #[error("Schema error: {0}")]
    SchemaError(String),
    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}
