//! OpenAI-compatible chat completions provider
//!
//! Works against api.openai.com and against Ollama's `/v1` compatibility
//! layer. Each completion is sent exactly once; a failure goes straight
//! back to the caller.

use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, Message,
    MessageRole, ResponseFormat, TokenUsage, ToolCall as ProviderToolCall,
};
use crate::observability::metrics::metrics;
use crate::tools::ToolDescription;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Provider configuration
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// Name reported by [`LlmProvider::name`]
    pub provider_name: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub requires_api_key: bool,
}

impl Default for OpenAiCompatibleConfig {
    fn default() -> Self {
        Self {
            provider_name: "openai".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
            requires_api_key: true,
        }
    }
}

/// Chat completions client
pub struct OpenAiCompatibleProvider {
    config: OpenAiCompatibleConfig,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, LlmError> {
        let has_key = config
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if config.requires_api_key && !has_key {
            return Err(LlmError::NotConfigured(format!(
                "{} API key is required",
                config.provider_name
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Rough token estimate used only for logging (pure function)
    fn estimate_token_count(messages: &[ChatMessage]) -> usize {
        messages.iter().map(|m| m.content.len() / 4).sum()
    }

    fn convert_message(message: &Message) -> ChatMessage {
        ChatMessage {
            role: match message.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            }
            .to_string(),
            content: message.content.clone(),
        }
    }

    fn convert_tool(tool: &ToolDescription) -> ChatTool {
        ChatTool {
            tool_type: "function".to_string(),
            function: ChatFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }

    fn convert_response_format(format: &ResponseFormat) -> ChatResponseFormat {
        match format {
            ResponseFormat::JsonSchema { json_schema } => ChatResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: ChatJsonSchema {
                    name: json_schema.name.clone(),
                    strict: json_schema.strict,
                    schema: json_schema.schema.clone(),
                },
            },
        }
    }

    /// Build the wire request (pure function)
    fn build_chat_request(request: &CompletionRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(Self::convert_message).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: request
                .tools
                .as_ref()
                .filter(|tools| !tools.is_empty())
                .map(|tools| tools.iter().map(Self::convert_tool).collect()),
            response_format: request
                .response_format
                .as_ref()
                .map(Self::convert_response_format),
            stream: false,
        }
    }

    /// Parse the wire response (pure function)
    fn parse_chat_response(
        response: ChatCompletionResponse,
        metadata: HashMap<String, String>,
    ) -> Result<CompletionResponse, LlmError> {
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            LlmError::InvalidResponse("No choices returned by the model".to_string())
        })?;

        let usage = response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        let tool_calls = choice
            .message
            .tool_calls
            .as_deref()
            .map(Self::extract_tool_calls)
            .filter(|calls| !calls.is_empty());

        Ok(CompletionResponse {
            content: choice.message.content.filter(|c| !c.is_empty()),
            model: response.model,
            usage,
            finish_reason: Self::convert_finish_reason(choice.finish_reason.as_deref()),
            tool_calls,
            metadata,
        })
    }

    /// Tool call arguments arrive as a JSON string; some local models send an
    /// object instead, so both are accepted.
    fn extract_tool_calls(calls: &[ChatToolCall]) -> Vec<ProviderToolCall> {
        calls
            .iter()
            .enumerate()
            .filter_map(|(index, call)| {
                let arguments = match &call.function.arguments {
                    serde_json::Value::String(raw) => {
                        match serde_json::from_str::<serde_json::Value>(raw) {
                            Ok(args) => args,
                            Err(e) => {
                                error!(
                                    tool = %call.function.name,
                                    "Failed to parse tool call arguments: {}", e
                                );
                                return None;
                            }
                        }
                    }
                    other => other.clone(),
                };

                Some(ProviderToolCall {
                    id: call
                        .id
                        .clone()
                        .unwrap_or_else(|| format!("call_{index}")),
                    name: call.function.name.clone(),
                    arguments,
                })
            })
            .collect()
    }

    fn convert_finish_reason(reason: Option<&str>) -> FinishReason {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Error,
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Classify a non-success status (pure function)
    fn classify_status(status: StatusCode, body: &str) -> LlmError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                LlmError::AuthenticationFailed(format!("{status} - {body}"))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                LlmError::RateLimitExceeded(format!("{status} - {body}"))
            }
            s if s.is_server_error() => {
                LlmError::ApiError(format!("server error: {status} - {body}"))
            }
            _ => LlmError::ApiError(format!("{status} - {body}")),
        }
    }

    async fn send_once(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let builder = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .json(request);

        let response = self.authorize(builder).send().await.map_err(|e| {
            warn!(
                is_connect = e.is_connect(),
                is_timeout = e.is_timeout(),
                "{} network error: {}",
                self.config.provider_name,
                e
            );
            LlmError::NetworkError(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    async fn complete_once(
        &self,
        request: ChatCompletionRequest,
        metadata: HashMap<String, String>,
    ) -> Result<CompletionResponse, LlmError> {
        let raw = self.send_once(&request).await.map_err(|e| {
            error!("{} completion failed: {}", self.config.provider_name, e);
            e
        })?;

        let response = Self::parse_chat_response(raw, metadata)?;
        debug!(
            provider = %self.config.provider_name,
            total_tokens = response.usage.total_tokens,
            tool_calls = response.tool_calls.as_ref().map(|c| c.len()).unwrap_or(0),
            finish_reason = ?response.finish_reason,
            "Completion received"
        );
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.config.provider_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let chat_request = Self::build_chat_request(&request);
        debug!(
            provider = %self.config.provider_name,
            model = %chat_request.model,
            messages = chat_request.messages.len(),
            estimated_tokens = Self::estimate_token_count(&chat_request.messages),
            "Sending completion request"
        );

        metrics().llm_request();
        let result = self.complete_once(chat_request, request.metadata).await;
        if result.is_err() {
            metrics().llm_request_failed();
        }
        result
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let builder = self
            .client
            .get(format!("{}/models", self.config.base_url));
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Self::classify_status(status, &body))
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ChatResponseFormat>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    id: Option<String>,
    function: ChatFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ChatFunctionCall {
    name: String,
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: ChatJsonSchema,
}

#[derive(Debug, Serialize)]
struct ChatJsonSchema {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    strict: Option<bool>,
    schema: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::JsonSchemaDefinition;
    use serde_json::json;

    #[test]
    fn test_config_default() {
        let config = OpenAiCompatibleConfig::default();
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_requires_key_when_configured() {
        let result = OpenAiCompatibleProvider::new(OpenAiCompatibleConfig::default());
        assert!(matches!(result, Err(LlmError::NotConfigured(_))));

        let blank = OpenAiCompatibleProvider::new(OpenAiCompatibleConfig {
            api_key: Some("   ".to_string()),
            ..Default::default()
        });
        assert!(blank.is_err());
    }

    #[test]
    fn test_keyless_provider_allowed() {
        let provider = OpenAiCompatibleProvider::new(OpenAiCompatibleConfig {
            provider_name: "ollama".to_string(),
            requires_api_key: false,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn test_build_chat_request_omits_empty_tools() {
        let mut request = CompletionRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        request.tools = Some(vec![]);
        request.temperature = Some(0.2);

        let wire = OpenAiCompatibleProvider::build_chat_request(&request);
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["stream"], false);
        assert!(json.get("tools").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_build_chat_request_with_tools_and_schema() {
        let mut request = CompletionRequest::new("m", vec![Message::system("s")]);
        request.tools = Some(vec![ToolDescription {
            name: "search".to_string(),
            description: "Search news".to_string(),
            parameters: json!({"type": "object"}),
        }]);
        request.response_format = Some(ResponseFormat::JsonSchema {
            json_schema: JsonSchemaDefinition {
                name: "ResearchReport".to_string(),
                strict: None,
                schema: json!({"type": "object"}),
            },
        });

        let json = serde_json::to_value(OpenAiCompatibleProvider::build_chat_request(&request))
            .unwrap();

        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "search");
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["name"], "ResearchReport");
        assert!(json["response_format"]["json_schema"].get("strict").is_none());
    }

    #[test]
    fn test_extract_tool_calls_accepts_string_and_object_arguments() {
        let calls = vec![
            ChatToolCall {
                id: Some("call_a".to_string()),
                function: ChatFunctionCall {
                    name: "search".to_string(),
                    arguments: json!("{\"query\": \"rust\"}"),
                },
            },
            ChatToolCall {
                id: None,
                function: ChatFunctionCall {
                    name: "scrape".to_string(),
                    arguments: json!({"url": "https://example.com"}),
                },
            },
            ChatToolCall {
                id: Some("call_bad".to_string()),
                function: ChatFunctionCall {
                    name: "search".to_string(),
                    arguments: json!("{not json"),
                },
            },
        ];

        let extracted = OpenAiCompatibleProvider::extract_tool_calls(&calls);
        assert_eq!(extracted.len(), 2);
        assert_eq!(extracted[0].id, "call_a");
        assert_eq!(extracted[0].arguments["query"], "rust");
        assert_eq!(extracted[1].id, "call_1");
        assert_eq!(extracted[1].arguments["url"], "https://example.com");
    }

    #[test]
    fn test_finish_reason_conversion() {
        assert!(matches!(
            OpenAiCompatibleProvider::convert_finish_reason(Some("stop")),
            FinishReason::Stop
        ));
        assert!(matches!(
            OpenAiCompatibleProvider::convert_finish_reason(Some("tool_calls")),
            FinishReason::ToolCalls
        ));
        assert!(matches!(
            OpenAiCompatibleProvider::convert_finish_reason(None),
            FinishReason::Error
        ));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            OpenAiCompatibleProvider::classify_status(StatusCode::UNAUTHORIZED, ""),
            LlmError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            OpenAiCompatibleProvider::classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            LlmError::RateLimitExceeded(_)
        ));
        assert!(matches!(
            OpenAiCompatibleProvider::classify_status(StatusCode::BAD_GATEWAY, "upstream"),
            LlmError::ApiError(ref m) if m.starts_with("server error")
        ));
    }

    #[test]
    fn test_parse_response_without_choices() {
        let raw = ChatCompletionResponse {
            model: "m".to_string(),
            choices: vec![],
            usage: None,
        };
        let result = OpenAiCompatibleProvider::parse_chat_response(raw, HashMap::new());
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
    }
}
