//! Builtin tools available to the research agent
//!
//! Each tool keeps its pure helpers separate from the I/O in `execute`.

pub mod scrape;
pub mod search;

pub use scrape::ScrapeWebsiteTool;
pub use search::TavilySearchTool;
