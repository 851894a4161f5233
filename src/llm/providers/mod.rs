//! LLM provider implementations
//!
//! Both supported backends speak the OpenAI chat completions dialect, so a
//! single implementation serves them; the factory only differs in defaults.

pub mod openai_compatible;

pub use openai_compatible::*;

use crate::config::LlmSection;
use crate::llm::provider::{LlmError, LlmProvider};
use std::sync::Arc;
use std::time::Duration;

/// Build the configured provider. `api_key` has already been resolved from
/// the environment by the caller.
pub fn build_provider(
    section: &LlmSection,
    api_key: Option<String>,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let requires_key = match section.provider.as_str() {
        "openai" => true,
        "ollama" => false,
        other => {
            return Err(LlmError::NotConfigured(format!(
                "Unsupported LLM provider: {other}"
            )))
        }
    };

    let config = OpenAiCompatibleConfig {
        provider_name: section.provider.clone(),
        api_key,
        base_url: section.base_url.trim_end_matches('/').to_string(),
        timeout: Duration::from_secs(section.timeout_secs),
        requires_api_key: requires_key,
        ..Default::default()
    };

    Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
}
