//! News crew: two role-scoped agents run as a fixed sequential pipeline
//!
//! The researcher searches and scrapes, producing a [`ResearchReport`]; the
//! analyst turns that report into a numbered markdown [`NewsSummary`].

pub mod agent;
pub mod output;
pub mod pipeline;
pub mod task;

pub use agent::{Agent, AgentSettings, AgentSpec, Conversation, TurnOptions};
pub use output::{NewsSummary, ResearchArticle, ResearchReport, SummarySection};
pub use pipeline::{failure_text, CrewSettings, NewsCrew, PipelineOutcome, FAILURE_PREFIX};
pub use task::{TaskOutput, TaskSpec};
