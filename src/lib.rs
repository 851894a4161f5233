//! News Agent
//!
//! An HTTP service that takes a topic, has a research agent search the web
//! and scrape the most relevant articles, then has an analyst agent write a
//! numbered markdown summary citing each source.
//!
//! # Overview
//!
//! - [`server`]: warp routes and the bounded worker pool
//! - [`crew`]: agents, tasks and the sequential pipeline
//! - [`tools`]: schema-validated search and scrape tools
//! - [`llm`]: OpenAI-compatible chat completion providers (Ollama, OpenAI)
//!
//! # Quick Start
//!
//! ```rust
//! use news_agent::crew::{NewsSummary, ResearchArticle};
//!
//! let articles = vec![ResearchArticle {
//!     title: "Launch".to_string(),
//!     url: "https://example.com/launch".to_string(),
//!     content: "A rocket launched.".to_string(),
//! }];
//!
//! let summary = NewsSummary::parse(
//!     "1. A rocket launched today.\n   Source: https://example.com/launch",
//!     &articles,
//! )
//! .unwrap();
//! assert_eq!(summary.sections[0].source_url, "https://example.com/launch");
//! ```

pub mod config;
pub mod crew;
pub mod error;
pub mod llm;
pub mod observability;
pub mod server;
pub mod testing;
pub mod tools;

pub use config::*;
pub use crew::{NewsCrew, PipelineOutcome};
pub use error::{AppError, AppResult, ErrorCode, ErrorDetails};
pub use tools::{Tool, ToolDescription, ToolError, ToolRegistry};
