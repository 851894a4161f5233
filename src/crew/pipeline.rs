//! The news crew: research then analysis, in strict sequence
//!
//! [`NewsCrew::kickoff`] never returns an error. Every failure is caught
//! here and turned into [`PipelineOutcome::Failure`].

use crate::config::AppConfig;
use crate::crew::agent::{Agent, AgentSettings, AgentSpec, Conversation, TurnOptions};
use crate::crew::output::{NewsSummary, ResearchReport};
use crate::crew::task::{TaskOutput, TaskSpec};
use crate::crew_span;
use crate::error::{sanitize_error_message, AppError, AppResult, ErrorDetails};
use crate::llm::provider::{LlmProvider, Message};
use crate::tools::ToolRegistry;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

/// Prefix of every human-readable failure text
pub const FAILURE_PREFIX: &str = "An error occurred while running the crew:";

/// Crew-level settings
#[derive(Debug, Clone)]
pub struct CrewSettings {
    pub agent: AgentSettings,
    pub max_articles: usize,
    pub max_parse_retries: u32,
}

impl CrewSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            agent: AgentSettings::from_config(config),
            max_articles: config.crew.max_articles,
            max_parse_retries: config.crew.max_parse_retries,
        }
    }
}

/// Result of one pipeline run
#[derive(Debug)]
pub enum PipelineOutcome {
    Success {
        report: ResearchReport,
        summary: NewsSummary,
    },
    Failure {
        error: AppError,
    },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success { .. })
    }

    /// Text returned to the caller: the markdown summary, or the failure line
    pub fn text(&self) -> String {
        match self {
            PipelineOutcome::Success { summary, .. } => summary.markdown.clone(),
            PipelineOutcome::Failure { error } => failure_text(error),
        }
    }

    /// Error payload, if the run failed
    pub fn error_details(&self) -> Option<ErrorDetails> {
        match self {
            PipelineOutcome::Success { .. } => None,
            PipelineOutcome::Failure { error } => Some(error.to_error_details()),
        }
    }
}

/// Human-readable failure line (pure function)
pub fn failure_text(error: &AppError) -> String {
    format!(
        "{FAILURE_PREFIX} {}",
        sanitize_error_message(&error.to_string())
    )
}

/// Two-agent sequential crew
pub struct NewsCrew {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    settings: CrewSettings,
}

impl NewsCrew {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        settings: CrewSettings,
    ) -> Self {
        Self {
            provider,
            tools,
            settings,
        }
    }

    fn agent(&self, spec: AgentSpec) -> Agent {
        Agent::new(
            spec,
            Arc::clone(&self.provider),
            Arc::clone(&self.tools),
            self.settings.agent.clone(),
        )
    }

    /// Run the crew for `topic`
    pub async fn kickoff(&self, topic: &str) -> PipelineOutcome {
        match self.run(topic).await {
            Ok((report, summary)) => {
                info!(
                    articles = report.articles.len(),
                    sections = summary.sections.len(),
                    "Crew finished"
                );
                PipelineOutcome::Success { report, summary }
            }
            Err(error) => {
                warn!(error = %error, code = ?error.code(), "Crew failed");
                PipelineOutcome::Failure { error }
            }
        }
    }

    async fn run(&self, topic: &str) -> AppResult<(ResearchReport, NewsSummary)> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(AppError::invalid_input("topic must not be empty"));
        }

        let report = self
            .research(topic)
            .instrument(crew_span!(step = "research"))
            .await?;

        let summary = self
            .analyze(&report)
            .instrument(crew_span!(step = "analysis", articles = report.articles.len()))
            .await?;

        Ok((report, summary))
    }

    async fn research(&self, topic: &str) -> AppResult<ResearchReport> {
        let agent = self.agent(AgentSpec::researcher(self.settings.max_articles));
        let task = TaskSpec::research(topic, self.settings.max_articles);
        let mut conversation = agent.start(task.render_prompt(&[]));
        let max_articles = self.settings.max_articles;

        let report = self
            .run_with_parse_retries(
                &agent,
                &mut conversation,
                TurnOptions::with_tools(),
                TurnOptions::structured(ResearchReport::response_format()),
                |raw| ResearchReport::parse(raw, max_articles),
            )
            .await?;

        info!(
            articles = report.articles.len(),
            tool_calls = conversation.tool_calls,
            "Research complete"
        );
        Ok(report)
    }

    async fn analyze(&self, report: &ResearchReport) -> AppResult<NewsSummary> {
        let agent = self.agent(AgentSpec::analyst());
        let task = TaskSpec::analysis(report.articles.len());

        let context = TaskOutput {
            task: "research".to_string(),
            agent_role: AgentSpec::researcher(self.settings.max_articles).role,
            raw: serde_json::to_string_pretty(report)
                .map_err(|e| AppError::internal_error(e.to_string()))?,
        };
        let mut conversation = agent.start(task.render_prompt(&[context]));

        self.run_with_parse_retries(
            &agent,
            &mut conversation,
            TurnOptions::default(),
            TurnOptions::default(),
            |raw| NewsSummary::parse(raw, &report.articles),
        )
        .await
    }

    /// Execute the agent and parse its answer; on a retryable parse error,
    /// ask again with a correction up to `max_parse_retries` times
    async fn run_with_parse_retries<T, F>(
        &self,
        agent: &Agent,
        conversation: &mut Conversation,
        first: TurnOptions,
        retry: TurnOptions,
        parse: F,
    ) -> AppResult<T>
    where
        F: Fn(&str) -> AppResult<T>,
    {
        let mut options = first;
        let mut attempt = 0;

        loop {
            let raw = agent.execute(conversation, &options).await?;
            match parse(&raw) {
                Ok(parsed) => return Ok(parsed),
                Err(error) if error.is_retryable() && attempt < self.settings.max_parse_retries => {
                    attempt += 1;
                    warn!(
                        role = %agent.spec().role,
                        attempt,
                        error = %error,
                        "Agent output did not parse, asking again"
                    );
                    conversation.push(Message::user(correction_prompt(&error)));
                    options = retry.clone();
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Follow-up message after unparseable output (pure function)
fn correction_prompt(error: &AppError) -> String {
    format!(
        "Your previous answer could not be used: {error}.\n\
         Reply again with the complete final answer in exactly the expected format, and nothing else."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockLlmProvider, MockReply, MockTool};
    use crate::error::ErrorCode;
    use serde_json::json;

    fn settings() -> CrewSettings {
        CrewSettings::from_config(&AppConfig::default())
    }

    fn tools() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry
            .register(Box::new(MockTool::new("search", json!({"results": []}))))
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_empty_topic_rejected_without_llm_call() {
        let provider = MockLlmProvider::single_response("unused");
        let requests = provider.requests();
        let crew = NewsCrew::new(Arc::new(provider), tools(), settings());

        let outcome = crew.kickoff("   ").await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.error_details().unwrap().code, ErrorCode::InvalidInput);
        assert!(outcome.text().starts_with(FAILURE_PREFIX));
        assert!(requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_parse_retry_switches_to_structured_output() {
        let provider = MockLlmProvider::new(vec![
            MockReply::text("I found some things but forgot the JSON"),
            MockReply::text(r#"{"articles": [{"title": "A", "url": "https://a.example", "content": "x"}]}"#),
            MockReply::text("1. Summary of A.\nSource: https://a.example"),
        ]);
        let requests = provider.requests();
        let crew = NewsCrew::new(Arc::new(provider), tools(), settings());

        let outcome = crew.kickoff("rust").await;
        assert!(outcome.is_success(), "{}", outcome.text());

        let requests = requests.lock().await;
        assert_eq!(requests.len(), 3);
        assert!(requests[0].tools.is_some());
        assert!(requests[1].tools.is_none());
        assert!(requests[1].response_format.is_some());
        assert!(requests[1]
            .messages
            .last()
            .unwrap()
            .content
            .starts_with("Your previous answer could not be used"));
    }

    #[tokio::test]
    async fn test_parse_retry_gets_fresh_iteration_budget() {
        let mut settings = settings();
        settings.agent.budget.max_iterations = 2;
        let provider = MockLlmProvider::new(vec![
            MockReply::tool_call("search", json!({"query": "rust"})),
            MockReply::text("forgot the json"),
            MockReply::text(r#"{"articles": [{"title": "A", "url": "https://a.example", "content": "x"}]}"#),
            MockReply::text("1. Summary of A.\nSource: https://a.example"),
        ]);
        let crew = NewsCrew::new(Arc::new(provider), tools(), settings);

        let outcome = crew.kickoff("rust").await;

        assert!(outcome.is_success(), "{}", outcome.text());
    }

    #[tokio::test]
    async fn test_parse_retries_exhausted() {
        let provider = MockLlmProvider::single_response("no json here");
        let requests = provider.requests();
        let crew = NewsCrew::new(Arc::new(provider), tools(), settings());

        let outcome = crew.kickoff("rust").await;

        let details = outcome.error_details().unwrap();
        assert_eq!(details.code, ErrorCode::OutputParse);
        assert!(details.retryable);
        // One attempt plus one retry
        assert_eq!(requests.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_llm_failure_not_retried() {
        let provider = MockLlmProvider::with_failure();
        let requests = provider.requests();
        let crew = NewsCrew::new(Arc::new(provider), tools(), settings());

        let outcome = crew.kickoff("rust").await;

        assert_eq!(outcome.error_details().unwrap().code, ErrorCode::LlmError);
        assert!(outcome
            .text()
            .starts_with("An error occurred while running the crew: LLM provider error"));
        assert_eq!(requests.lock().await.len(), 1);
    }

    #[test]
    fn test_failure_text_is_sanitized() {
        let text = failure_text(&AppError::llm_error("bad api_key=sk-12345"));
        assert!(text.starts_with(FAILURE_PREFIX));
        assert!(!text.contains("sk-12345"));
    }
}
