//! LLM provider abstraction layer
//!
//! Provider-agnostic request/response types plus the OpenAI-compatible
//! backend used for both hosted OpenAI and local Ollama models.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;
