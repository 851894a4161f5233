//! Mock implementations for testing
//!
//! Provides a scripted [`LlmProvider`] and a configurable [`Tool`] so the crew
//! and HTTP layers can be exercised without Ollama or Tavily.

use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
    ToolCall,
};
use crate::tools::{Tool, ToolDescription, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One scripted LLM turn
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Final assistant text
    Text(String),
    /// Request tool calls as (name, arguments)
    ToolCalls(Vec<(String, Value)>),
    /// Fail the completion
    Fail(LlmError),
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        MockReply::Text(content.into())
    }

    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        MockReply::ToolCalls(vec![(name.into(), arguments)])
    }

    /// Turn the reply into a provider result
    pub fn into_response(self) -> Result<CompletionResponse, LlmError> {
        match self {
            MockReply::Text(content) => Ok(mock_response(Some(content), None)),
            MockReply::ToolCalls(calls) => {
                let tool_calls = calls
                    .into_iter()
                    .enumerate()
                    .map(|(index, (name, arguments))| ToolCall {
                        id: format!("call_{index}"),
                        name,
                        arguments,
                    })
                    .collect();
                Ok(mock_response(None, Some(tool_calls)))
            }
            MockReply::Fail(error) => Err(error),
        }
    }
}

fn mock_response(content: Option<String>, tool_calls: Option<Vec<ToolCall>>) -> CompletionResponse {
    let finish_reason = if tool_calls.is_some() {
        FinishReason::ToolCalls
    } else {
        FinishReason::Stop
    };

    CompletionResponse {
        content,
        model: "mock-model".to_string(),
        usage: TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        },
        finish_reason,
        tool_calls,
        metadata: HashMap::new(),
    }
}

type Responder = dyn Fn(&CompletionRequest) -> MockReply + Send + Sync;

/// Mock LLM provider for testing
///
/// Either plays back a script (cycling once it runs out) or answers each
/// request through a closure, which keeps concurrent runs independent.
pub struct MockLlmProvider {
    script: Vec<MockReply>,
    responder: Option<Arc<Responder>>,
    current_response: Arc<Mutex<usize>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmProvider {
    pub fn new(script: Vec<MockReply>) -> Self {
        Self {
            script,
            responder: None,
            current_response: Arc::new(Mutex::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![MockReply::text(response)])
    }

    pub fn with_failure() -> Self {
        Self::new(vec![MockReply::Fail(LlmError::RequestFailed(
            "Mock LLM failure".to_string(),
        ))])
    }

    /// Answer every request with `f`
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&CompletionRequest) -> MockReply + Send + Sync + 'static,
    {
        Self {
            responder: Some(Arc::new(f)),
            ..Self::new(Vec::new())
        }
    }

    /// Shared handle to every request seen so far
    pub fn requests(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let reply = match &self.responder {
            Some(responder) => responder(&request),
            None if self.script.is_empty() => MockReply::text("Mock response"),
            None => {
                let mut current = self.current_response.lock().await;
                let reply = self.script[*current % self.script.len()].clone();
                *current += 1;
                reply
            }
        };

        self.requests.lock().await.push(request);
        reply.into_response()
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

type ToolResponder = dyn Fn(&Value) -> Result<Value, ToolError> + Send + Sync;

/// Mock tool taking a single required string parameter
pub struct MockTool {
    name: String,
    param: String,
    responder: Arc<ToolResponder>,
    calls: Arc<Mutex<Vec<Value>>>,
}

impl MockTool {
    /// Tool requiring a string `query` that always returns `result`
    pub fn new(name: impl Into<String>, result: Value) -> Self {
        Self::from_fn(name, "query", move |_| Ok(result.clone()))
    }

    /// Tool that always fails with `message`
    pub fn with_failure(name: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::from_fn(name, "query", move |_| {
            Err(ToolError::ExecutionError(message.clone()))
        })
    }

    /// Tool requiring string parameter `param`, answered by `f`
    pub fn from_fn<F>(name: impl Into<String>, param: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            param: param.into(),
            responder: Arc::new(f),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Rename the required parameter
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = param.into();
        self
    }

    /// Shared handle to the arguments of every call
    pub fn calls(&self) -> Arc<Mutex<Vec<Value>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Tool for MockTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: self.name.clone(),
            description: format!("Mock {} tool", self.name),
            parameters: json!({
                "type": "object",
                "properties": {
                    self.param.clone(): {"type": "string"}
                },
                "required": [self.param.clone()]
            }),
        }
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        self.calls.lock().await.push(parameters.clone());
        (self.responder)(parameters)
    }
}
