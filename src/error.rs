//! Error types for the news agent
//!
//! Every failure inside a pipeline run ends up as an [`AppError`]. At the
//! HTTP boundary it is mapped to an [`ErrorCode`] and a sanitized message.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum AppError {
    #[error("LLM provider error: {message}")]
    LlmError { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Could not parse {stage} output: {message}")]
    OutputParse { stage: String, message: String },

    #[error("Budget exceeded: {message}")]
    BudgetExceeded { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Tool error: {0}")]
    ToolError(#[from] crate::tools::ToolError),
}

/// Machine-readable failure codes surfaced to HTTP callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ToolError,
    LlmError,
    InvalidInput,
    OutputParse,
    BudgetExceeded,
    Internal,
}

/// Error payload attached to failed responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl AppError {
    /// Protocol code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::ToolError(_) => ErrorCode::ToolError,
            AppError::LlmError { .. } => ErrorCode::LlmError,
            AppError::InvalidInput { .. } => ErrorCode::InvalidInput,
            AppError::OutputParse { .. } => ErrorCode::OutputParse,
            AppError::BudgetExceeded { .. } => ErrorCode::BudgetExceeded,
            AppError::InternalError { .. } | AppError::ConfigError(_) => ErrorCode::Internal,
        }
    }

    /// Only malformed model output is worth asking for again
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::OutputParse { .. })
    }

    /// Convert to the sanitized payload sent back to callers
    pub fn to_error_details(&self) -> ErrorDetails {
        ErrorDetails {
            code: self.code(),
            message: sanitize_error_message(&self.to_string()),
            retryable: self.is_retryable(),
        }
    }

    /// Create LLM error
    pub fn llm_error<S: Into<String>>(message: S) -> Self {
        Self::LlmError {
            message: message.into(),
        }
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create output parse error for a named pipeline stage
    pub fn output_parse<S: Into<String>, M: Into<String>>(stage: S, message: M) -> Self {
        Self::OutputParse {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create budget exceeded error
    pub fn budget_exceeded<S: Into<String>>(message: S) -> Self {
        Self::BudgetExceeded {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Strip credentials and sensitive paths, then cap the length
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for pipeline operations
pub type AppResult<T> = Result<T, AppError>;
