//! Website scraping tool
//!
//! Fetches a page with GET and returns its readable text. Extraction uses
//! article_scraper (Mozilla Readability) with a tag-stripping fallback.

use crate::config::ScrapeSection;
use crate::tools::{Tool, ToolDescription, ToolError};
use article_scraper::Readability;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));

/// Scrape tool - fetches a URL and extracts article text
pub struct ScrapeWebsiteTool {
    client: reqwest::Client,
    max_response_size: usize,
    max_content_chars: usize,
}

impl ScrapeWebsiteTool {
    pub fn new(section: &ScrapeSection) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .user_agent(concat!("news-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::InitializationError(e.to_string()))?;

        Ok(Self {
            client,
            max_response_size: section.max_response_size,
            max_content_chars: section.max_content_chars,
        })
    }

    /// Only absolute http(s) URLs are fetched (pure function)
    fn parse_target_url(raw: &str) -> Result<Url, ToolError> {
        let url = Url::parse(raw)
            .map_err(|e| ToolError::ExecutionError(format!("Invalid URL '{raw}': {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ToolError::ExecutionError(format!(
                "Unsupported URL scheme '{other}', only http and https are allowed"
            ))),
        }
    }

    /// Extract readable content from HTML using article_scraper
    async fn extract_readable_content(html: &str, url: &Url) -> Result<String, String> {
        // article_scraper can panic on malformed HTML
        let html_owned = html.to_string();
        let url_owned = url.clone();
        let result = tokio::task::spawn_blocking(move || {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                tokio::runtime::Handle::current()
                    .block_on(async { Readability::extract(&html_owned, Some(url_owned)).await })
            }))
        })
        .await;

        match result {
            Ok(Ok(Ok(article_html))) => {
                let text = simple_html_to_text(&article_html);
                if text.is_empty() {
                    Ok(simple_html_to_text(html))
                } else {
                    Ok(text)
                }
            }
            Ok(Ok(Err(e))) => {
                tracing::debug!(
                    "Article extraction failed: {}, falling back to simple extraction",
                    e
                );
                Ok(simple_html_to_text(html))
            }
            Ok(Err(_panic)) => Err(format!(
                "Content extraction failed for URL '{url}': HTML parsing library encountered an error with this page's structure"
            )),
            Err(e) => {
                tracing::warn!("Article extraction task failed: {}", e);
                Ok(simple_html_to_text(html))
            }
        }
    }

    /// Cut text to at most `max_chars` characters (pure function)
    fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
        match text.char_indices().nth(max_chars) {
            Some((byte_index, _)) => (text[..byte_index].to_string(), true),
            None => (text.to_string(), false),
        }
    }

    /// Page title from the <title> element (pure function)
    fn extract_title(html: &str) -> Option<String> {
        TITLE_RE
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|title| !title.is_empty())
    }

    /// Format tool result (pure function)
    fn format_response(url: &str, title: Option<String>, content: String, truncated: bool) -> Value {
        json!({
            "url": url,
            "title": title,
            "content": content,
            "truncated": truncated
        })
    }
}

/// Simple HTML to text conversion fallback (pure function)
pub(crate) fn simple_html_to_text(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;
    let mut tag_name = String::new();

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag_name.clear();
            }
            '>' if in_tag => {
                let tag_lower = tag_name
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_lowercase();

                match tag_lower.as_str() {
                    "script" => in_script = true,
                    "/script" => in_script = false,
                    "style" => in_style = true,
                    "/style" => in_style = false,
                    _ => {}
                }

                if matches!(
                    tag_lower.trim_start_matches('/').trim_end_matches('/'),
                    "div" | "p" | "br" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "tr"
                ) {
                    result.push('\n');
                }

                in_tag = false;
                tag_name.clear();
            }
            _ => {
                if in_tag {
                    tag_name.push(ch);
                } else if !in_script && !in_style {
                    if ch.is_whitespace() {
                        if !result.ends_with(' ') && !result.ends_with('\n') {
                            result.push(' ');
                        }
                    } else {
                        result.push(ch);
                    }
                }
            }
        }
    }

    result
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

impl ScrapeWebsiteTool {
    /// Read the body chunk by chunk, giving up as soon as it passes
    /// `max_response_size`
    async fn read_capped_body(&self, mut response: reqwest::Response) -> Result<String, ToolError> {
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Reading response failed: {e}")))?
        {
            if body.len() + chunk.len() > self.max_response_size {
                return Err(ToolError::ExecutionError(format!(
                    "Response too large: more than {} bytes",
                    self.max_response_size
                )));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl Tool for ScrapeWebsiteTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "scrape".to_string(),
            description: "Fetch a web page and return its main article text, with navigation and ads removed".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Absolute http(s) URL of the article"
                    }
                },
                "required": ["url"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let raw_url = parameters["url"]
            .as_str()
            .ok_or_else(|| ToolError::ExecutionError("URL parameter is required".to_string()))?;
        let url = Self::parse_target_url(raw_url)?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::ExecutionError(format!(
                "Fetching {url} returned HTTP {}",
                status.as_u16()
            )));
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_response_size {
                return Err(ToolError::ExecutionError(format!(
                    "Response too large: {} bytes (max: {})",
                    length, self.max_response_size
                )));
            }
        }

        let body = self.read_capped_body(response).await?;

        let title = Self::extract_title(&body);
        let text = Self::extract_readable_content(&body, &url)
            .await
            .map_err(ToolError::ExecutionError)?;
        let (content, truncated) = Self::truncate_chars(&text, self.max_content_chars);

        Ok(Self::format_response(url.as_str(), title, content, truncated))
    }
}
