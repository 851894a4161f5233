//! Role-scoped agents and their tool loop
//!
//! An agent is a persona (role, goal, backstory) plus the subset of tools it
//! may call. Running an agent alternates LLM calls with tool execution until
//! the model answers without requesting tools, bounded by [`BudgetConfig`].

use crate::config::{AppConfig, BudgetConfig};
use crate::error::{AppError, AppResult};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, LlmProvider, Message, ResponseFormat, ToolCall,
};
use crate::tool_span;
use crate::tools::{ToolDescription, ToolRegistry};
use std::sync::Arc;
use tracing::{debug, info, Instrument};

/// Persona and tool access for one agent
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    /// Names of registry tools this agent may call
    pub tools: Vec<String>,
}

impl AgentSpec {
    /// Searches the web and scrapes the chosen articles
    pub fn researcher(max_articles: usize) -> Self {
        Self {
            role: "Expert News Researcher".to_string(),
            goal: format!(
                "Find and extract the full content of the top {max_articles} most relevant news articles on a given topic."
            ),
            backstory: "You are a master news researcher, skilled in using search tools to find the most \
                accurate and recent information. You are also an expert at extracting clean, \
                readable text from websites, ignoring ads and other clutter."
                .to_string(),
            tools: vec!["search".to_string(), "scrape".to_string()],
        }
    }

    /// Summarizes researched articles; has no tools
    pub fn analyst() -> Self {
        Self {
            role: "Professional News Analyst".to_string(),
            goal: "Analyze the provided news articles and write a concise, insightful summary for each."
                .to_string(),
            backstory: "As a professional news analyst, you have a keen eye for detail and a talent for \
                distilling complex topics into clear, easy-to-understand summaries. You present \
                the key findings of each article objectively, making sure to cite your sources."
                .to_string(),
            tools: Vec::new(),
        }
    }

    /// System prompt for this persona (pure function)
    pub fn system_prompt(&self) -> String {
        let now = chrono::Utc::now();
        format!(
            "You are {role}.\n{backstory}\n\nYour personal goal is: {goal}\n\nCurrent date: {date}",
            role = self.role,
            backstory = self.backstory,
            goal = self.goal,
            date = now.format("%Y-%m-%d"),
        )
    }
}

/// Model parameters shared by every agent in a crew
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub budget: BudgetConfig,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            budget: config.budget.clone(),
        }
    }
}

/// How a single turn of the agent is run
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    /// Offer the agent's tools to the model
    pub use_tools: bool,
    pub response_format: Option<ResponseFormat>,
}

impl TurnOptions {
    pub fn with_tools() -> Self {
        Self {
            use_tools: true,
            response_format: None,
        }
    }

    pub fn structured(format: ResponseFormat) -> Self {
        Self {
            use_tools: false,
            response_format: Some(format),
        }
    }
}

/// Message history plus running totals for one agent step
#[derive(Debug, Clone)]
pub struct Conversation {
    pub messages: Vec<Message>,
    pub iterations: u32,
    pub tool_calls: u32,
}

impl Conversation {
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}

/// An agent bound to a provider and tool registry
pub struct Agent {
    spec: AgentSpec,
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    settings: AgentSettings,
}

impl Agent {
    pub fn new(
        spec: AgentSpec,
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            spec,
            provider,
            tools,
            settings,
        }
    }

    pub fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    /// Start a conversation with the persona prompt and a task prompt
    pub fn start(&self, task_prompt: impl Into<String>) -> Conversation {
        Conversation {
            messages: vec![
                Message::system(self.spec.system_prompt()),
                Message::user(task_prompt),
            ],
            iterations: 0,
            tool_calls: 0,
        }
    }

    /// Tool descriptions this agent may use (pure function)
    fn available_tools(&self) -> Vec<ToolDescription> {
        self.tools.describe_subset(&self.spec.tools)
    }

    /// Build completion request (pure function)
    fn create_completion_request(
        &self,
        messages: Vec<Message>,
        available_tools: &[ToolDescription],
        response_format: Option<ResponseFormat>,
    ) -> CompletionRequest {
        let mut request = CompletionRequest::new(self.settings.model.clone(), messages);
        request.temperature = self.settings.temperature;
        request.max_tokens = self.settings.max_tokens;
        request.response_format = response_format;
        if !available_tools.is_empty() {
            request.tools = Some(available_tools.to_vec());
        }
        request
            .metadata
            .insert("agent_role".to_string(), self.spec.role.clone());
        request
    }

    /// Check iteration limit (pure validation)
    fn check_iteration_limit(iteration: u32, max_iterations: u32) -> AppResult<()> {
        if iteration > max_iterations {
            return Err(AppError::budget_exceeded(format!(
                "agent exceeded maximum iterations ({max_iterations})"
            )));
        }
        Ok(())
    }

    /// Check tool call budget before running a batch (pure validation)
    fn check_tool_budget(used: u32, requested: usize, max_tool_calls: u32) -> AppResult<()> {
        let total = used as usize + requested;
        if total > max_tool_calls as usize {
            return Err(AppError::budget_exceeded(format!(
                "agent requested {total} tool calls, limit is {max_tool_calls}"
            )));
        }
        Ok(())
    }

    /// Add assistant response to messages (pure function)
    fn add_assistant_response(messages: &mut Vec<Message>, response: &CompletionResponse) {
        let content = response.content.clone().unwrap_or_default();
        let content = match &response.tool_calls {
            Some(calls) if !calls.is_empty() => {
                let requested: Vec<String> = calls
                    .iter()
                    .map(|call| format!("{}({})", call.name, call.arguments))
                    .collect();
                format!("{content}\n[tool calls: {}]", requested.join(", "))
                    .trim()
                    .to_string()
            }
            _ => content,
        };
        if !content.is_empty() {
            messages.push(Message::assistant(content));
        }
    }

    /// Add tool results to messages (pure function)
    fn add_tool_results(messages: &mut Vec<Message>, tool_results: &[String]) {
        if !tool_results.is_empty() {
            messages.push(Message::user(format!(
                "Tool results:\n{}",
                tool_results.join("\n")
            )));
        }
    }

    /// Run one tool call; failures become text for the model
    async fn execute_single_tool_call(&self, tool_call: &ToolCall) -> String {
        if !self.spec.tools.contains(&tool_call.name) {
            return format!(
                "Tool {} failed: tool is not available to {}",
                tool_call.name, self.spec.role
            );
        }

        let span = tool_span!(tool = %tool_call.name, call_id = %tool_call.id);
        async {
            debug!(arguments = %tool_call.arguments, "Executing tool");
            match self
                .tools
                .execute_tool(&tool_call.name, &tool_call.arguments)
                .await
            {
                Ok(result) => format!("Tool {} returned: {}", tool_call.name, result),
                Err(e) => {
                    info!(error = %e, "Tool call failed");
                    format!("Tool {} failed: {}", tool_call.name, e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Drive the conversation until the model gives a final answer.
    ///
    /// Budgets apply to each call separately, so a follow-up turn after a
    /// correction starts with the full allowance. Returns the final assistant
    /// content, which is also appended to the conversation.
    pub async fn execute(
        &self,
        conversation: &mut Conversation,
        options: &TurnOptions,
    ) -> AppResult<String> {
        let available_tools = if options.use_tools {
            self.available_tools()
        } else {
            Vec::new()
        };
        let budget = &self.settings.budget;
        let mut iterations = 0;
        let mut tool_calls_used = 0;

        loop {
            iterations += 1;
            conversation.iterations += 1;
            Self::check_iteration_limit(iterations, budget.max_iterations)?;

            let request = self.create_completion_request(
                conversation.messages.clone(),
                &available_tools,
                options.response_format.clone(),
            );

            let response = self
                .provider
                .complete(request)
                .await
                .map_err(|e| AppError::llm_error(e.to_string()))?;

            Self::add_assistant_response(&mut conversation.messages, &response);

            match response.tool_calls.as_deref() {
                Some(tool_calls) if response.has_tool_calls() && !available_tools.is_empty() => {
                    Self::check_tool_budget(tool_calls_used, tool_calls.len(), budget.max_tool_calls)?;
                    tool_calls_used += tool_calls.len() as u32;
                    conversation.tool_calls += tool_calls.len() as u32;

                    debug!(
                        role = %self.spec.role,
                        iteration = iterations,
                        tool_count = tool_calls.len(),
                        "Processing tool calls"
                    );

                    let mut tool_results = Vec::with_capacity(tool_calls.len());
                    for tool_call in tool_calls {
                        tool_results.push(self.execute_single_tool_call(tool_call).await);
                    }
                    Self::add_tool_results(&mut conversation.messages, &tool_results);
                }
                _ => {
                    info!(
                        role = %self.spec.role,
                        iterations = conversation.iterations,
                        tool_calls = conversation.tool_calls,
                        "Agent produced final answer"
                    );
                    return Ok(response.content.unwrap_or_default());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockLlmProvider, MockReply, MockTool};
    use serde_json::json;

    fn settings(max_iterations: u32, max_tool_calls: u32) -> AgentSettings {
        AgentSettings {
            model: "mock-model".to_string(),
            temperature: Some(0.2),
            max_tokens: None,
            budget: BudgetConfig {
                max_tool_calls,
                max_iterations,
            },
        }
    }

    fn registry_with_search() -> (Arc<ToolRegistry>, Arc<tokio::sync::Mutex<Vec<serde_json::Value>>>) {
        let mut registry = ToolRegistry::new();
        let tool = MockTool::new("search", json!({"results": []}));
        let calls = tool.calls();
        registry.register(Box::new(tool)).unwrap();
        (Arc::new(registry), calls)
    }

    #[test]
    fn test_system_prompt_contains_persona() {
        let prompt = AgentSpec::researcher(2).system_prompt();
        assert!(prompt.starts_with("You are Expert News Researcher."));
        assert!(prompt.contains("top 2 most relevant"));
        assert!(prompt.contains("Current date:"));
    }

    #[test]
    fn test_budget_checks() {
        assert!(Agent::check_iteration_limit(8, 8).is_ok());
        assert!(Agent::check_iteration_limit(9, 8).is_err());
        assert!(Agent::check_tool_budget(8, 2, 10).is_ok());
        let err = Agent::check_tool_budget(9, 2, 10).unwrap_err();
        assert!(matches!(err, AppError::BudgetExceeded { .. }));
    }

    #[tokio::test]
    async fn test_tool_loop_feeds_results_back() {
        let provider = MockLlmProvider::new(vec![
            MockReply::tool_call("search", json!({"query": "rust"})),
            MockReply::text("final answer"),
        ]);
        let requests = provider.requests();
        let (tools, calls) = registry_with_search();
        let agent = Agent::new(
            AgentSpec::researcher(2),
            Arc::new(provider),
            tools,
            settings(8, 10),
        );

        let mut conversation = agent.start("find news");
        let answer = agent
            .execute(&mut conversation, &TurnOptions::with_tools())
            .await
            .unwrap();

        assert_eq!(answer, "final answer");
        assert_eq!(conversation.iterations, 2);
        assert_eq!(conversation.tool_calls, 1);
        assert_eq!(calls.lock().await.len(), 1);

        let requests = requests.lock().await;
        // Only registered tools from the agent's list are offered
        assert_eq!(requests[0].tools.as_ref().unwrap().len(), 1);
        let last = requests[1].messages.last().unwrap();
        assert!(last.content.starts_with("Tool results:\nTool search returned:"));
    }

    #[tokio::test]
    async fn test_tool_failure_is_reported_to_model() {
        let provider = MockLlmProvider::new(vec![
            MockReply::tool_call("search", json!({"query": 7})),
            MockReply::text("gave up"),
        ]);
        let requests = provider.requests();
        let (tools, _) = registry_with_search();
        let agent = Agent::new(
            AgentSpec::researcher(2),
            Arc::new(provider),
            tools,
            settings(8, 10),
        );

        let mut conversation = agent.start("find news");
        let answer = agent
            .execute(&mut conversation, &TurnOptions::with_tools())
            .await
            .unwrap();

        assert_eq!(answer, "gave up");
        let requests = requests.lock().await;
        let feedback = &requests[1].messages.last().unwrap().content;
        assert!(feedback.contains("Tool search failed:"));
    }

    #[tokio::test]
    async fn test_iteration_budget_exceeded() {
        let provider =
            MockLlmProvider::new(vec![MockReply::tool_call("search", json!({"query": "loop"}))]);
        let (tools, _) = registry_with_search();
        let agent = Agent::new(
            AgentSpec::researcher(2),
            Arc::new(provider),
            tools,
            settings(3, 100),
        );

        let mut conversation = agent.start("find news");
        let err = agent
            .execute(&mut conversation, &TurnOptions::with_tools())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BudgetExceeded { .. }));
        assert_eq!(conversation.tool_calls, 3);
    }

    #[tokio::test]
    async fn test_tool_call_budget_exceeded() {
        let provider =
            MockLlmProvider::new(vec![MockReply::tool_call("search", json!({"query": "loop"}))]);
        let (tools, calls) = registry_with_search();
        let agent = Agent::new(
            AgentSpec::researcher(2),
            Arc::new(provider),
            tools,
            settings(10, 2),
        );

        let mut conversation = agent.start("find news");
        let err = agent
            .execute(&mut conversation, &TurnOptions::with_tools())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BudgetExceeded { .. }));
        assert_eq!(calls.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_budget_applies_per_execute_call() {
        let provider = MockLlmProvider::new(vec![
            MockReply::tool_call("search", json!({"query": "rust"})),
            MockReply::text("first answer"),
            MockReply::tool_call("search", json!({"query": "again"})),
            MockReply::text("second answer"),
        ]);
        let (tools, calls) = registry_with_search();
        let agent = Agent::new(
            AgentSpec::researcher(2),
            Arc::new(provider),
            tools,
            settings(2, 1),
        );

        let mut conversation = agent.start("find news");
        let first = agent
            .execute(&mut conversation, &TurnOptions::with_tools())
            .await
            .unwrap();
        assert_eq!(first, "first answer");

        conversation.push(Message::user("try again"));
        let second = agent
            .execute(&mut conversation, &TurnOptions::with_tools())
            .await
            .unwrap();

        assert_eq!(second, "second answer");
        assert_eq!(conversation.iterations, 4);
        assert_eq!(conversation.tool_calls, 2);
        assert_eq!(calls.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_llm_failure_maps_to_llm_error() {
        let (tools, _) = registry_with_search();
        let agent = Agent::new(
            AgentSpec::analyst(),
            Arc::new(MockLlmProvider::with_failure()),
            tools,
            settings(8, 10),
        );

        let mut conversation = agent.start("summarize");
        let err = agent
            .execute(&mut conversation, &TurnOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LlmError { .. }));
    }

    #[tokio::test]
    async fn test_analyst_is_offered_no_tools() {
        let provider = MockLlmProvider::single_response("1. Summary\nSource: https://a.example");
        let requests = provider.requests();
        let (tools, _) = registry_with_search();
        let agent = Agent::new(AgentSpec::analyst(), Arc::new(provider), tools, settings(8, 10));

        let mut conversation = agent.start("summarize");
        agent
            .execute(&mut conversation, &TurnOptions::with_tools())
            .await
            .unwrap();

        assert!(requests.lock().await[0].tools.is_none());
        assert_eq!(conversation.messages.len(), 3);
    }
}
