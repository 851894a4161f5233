//! Structured outputs of the crew steps
//!
//! The research step must produce a JSON [`ResearchReport`]; the analysis
//! step produces markdown that is parsed into a [`NewsSummary`]. Parse
//! failures are reported as retryable `OutputParse` errors.

use crate::error::{AppError, AppResult};
use crate::llm::provider::{JsonSchemaDefinition, ResponseFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// One researched article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchArticle {
    /// Headline of the article
    #[serde(default)]
    pub title: String,
    /// Full URL the content was scraped from
    pub url: String,
    /// Scraped article text
    #[serde(default)]
    pub content: String,
}

/// Research step output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchReport {
    pub articles: Vec<ResearchArticle>,
}

impl ResearchReport {
    /// JSON schema of the report, derived from the type
    pub fn json_schema() -> Value {
        serde_json::to_value(schemars::schema_for!(ResearchReport)).unwrap_or(Value::Null)
    }

    /// Response format asking the model for a schema-conforming report
    pub fn response_format() -> ResponseFormat {
        ResponseFormat::JsonSchema {
            json_schema: JsonSchemaDefinition {
                name: "ResearchReport".to_string(),
                strict: None,
                schema: Self::json_schema(),
            },
        }
    }

    /// Parse, validate and normalize a report from model output
    pub fn parse(text: &str, max_articles: usize) -> AppResult<Self> {
        let value = extract_json(text).ok_or_else(|| {
            AppError::output_parse("research", "response does not contain a JSON object")
        })?;

        validate_against_schema(&Self::json_schema(), &value)
            .map_err(|e| AppError::output_parse("research", e))?;

        let report: ResearchReport = serde_json::from_value(value)
            .map_err(|e| AppError::output_parse("research", e.to_string()))?;

        Ok(report.normalized(max_articles))
    }

    /// Drop articles without an http(s) URL, de-duplicate by URL and keep
    /// the first `max_articles` (pure function)
    pub fn normalized(self, max_articles: usize) -> Self {
        let mut seen = HashSet::new();
        let articles = self
            .articles
            .into_iter()
            .filter_map(|mut article| {
                article.url = article.url.trim().to_string();
                let is_web_url =
                    article.url.starts_with("http://") || article.url.starts_with("https://");
                (is_web_url && seen.insert(normalize_url(&article.url))).then_some(article)
            })
            .take(max_articles)
            .collect();
        Self { articles }
    }

    pub fn urls(&self) -> Vec<&str> {
        self.articles.iter().map(|a| a.url.as_str()).collect()
    }
}

/// One numbered section of the analyst's report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummarySection {
    pub number: u32,
    pub summary: String,
    pub source_url: String,
}

/// Analysis step output: parsed sections plus the original markdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsSummary {
    pub sections: Vec<SummarySection>,
    pub markdown: String,
}

/// Section starts sit at column 0 or behind a heading marker; indented
/// numbered lines are list items inside a section
static SECTION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:#{1,6}\s*)?(?:\*\*)?(\d{1,2})[.)](?:\*\*)?\s+(.*)$")
        .expect("section regex is valid")
});

static SOURCE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:[-*]\s*)?(?:\*\*|_)?source(?:\*\*|_)?\s*:(?:\*\*)?\s*(.*)$")
        .expect("source regex is valid")
});

static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s)>\]"'*]+"#).expect("url regex is valid"));

impl NewsSummary {
    /// Parse the analyst's markdown.
    ///
    /// With researched articles, there must be exactly one section per
    /// article, numbered from 1, each citing a different researched URL.
    /// With none, any non-empty text is accepted.
    pub fn parse(text: &str, articles: &[ResearchArticle]) -> AppResult<Self> {
        let markdown = text.trim();
        if markdown.is_empty() {
            return Err(AppError::output_parse("analysis", "response is empty"));
        }

        let sections = parse_sections(markdown);

        if articles.is_empty() {
            return Ok(Self {
                sections: sections.into_iter().filter_map(Result::ok).collect(),
                markdown: markdown.to_string(),
            });
        }

        let sections = sections
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::output_parse("analysis", e))?;

        if sections.len() != articles.len() {
            return Err(AppError::output_parse(
                "analysis",
                format!(
                    "expected {} numbered sections, found {}",
                    articles.len(),
                    sections.len()
                ),
            ));
        }

        if let Some((expected, section)) = sections
            .iter()
            .enumerate()
            .map(|(i, section)| (i as u32 + 1, section))
            .find(|(expected, section)| section.number != *expected)
        {
            return Err(AppError::output_parse(
                "analysis",
                format!(
                    "sections must be numbered 1 to {} in order, found {} where {expected} was expected",
                    articles.len(),
                    section.number
                ),
            ));
        }

        let known: HashSet<String> = articles.iter().map(|a| normalize_url(&a.url)).collect();
        let mut cited = HashSet::new();
        for section in &sections {
            let url = normalize_url(&section.source_url);
            if !known.contains(&url) {
                return Err(AppError::output_parse(
                    "analysis",
                    format!(
                        "section {} cites {} which is not one of the researched articles",
                        section.number, section.source_url
                    ),
                ));
            }
            if !cited.insert(url) {
                return Err(AppError::output_parse(
                    "analysis",
                    format!(
                        "section {} cites {} again; each article needs its own section",
                        section.number, section.source_url
                    ),
                ));
            }
        }

        Ok(Self {
            sections,
            markdown: markdown.to_string(),
        })
    }
}

/// Split markdown into numbered sections (pure function)
fn parse_sections(markdown: &str) -> Vec<Result<SummarySection, String>> {
    let mut sections = Vec::new();
    let mut current: Option<(u32, Vec<String>, Option<String>)> = None;

    let finish = |section: (u32, Vec<String>, Option<String>)| {
        let (number, lines, source) = section;
        let summary = lines.join(" ").trim().to_string();
        match source {
            Some(source_url) if !source_url.is_empty() => Ok(SummarySection {
                number,
                summary,
                source_url,
            }),
            _ => Err(format!("section {number} has no 'Source:' line")),
        }
    };

    for line in markdown.lines() {
        if let Some(caps) = SECTION_START.captures(line) {
            if let Some(section) = current.take() {
                sections.push(finish(section));
            }
            let number = caps[1].parse().unwrap_or(0);
            current = Some((number, vec![caps[2].trim().to_string()], None));
        } else if let Some(caps) = SOURCE_LINE.captures(line) {
            if let Some((_, _, source)) = current.as_mut() {
                let rest = caps[1].trim();
                let url = URL
                    .find(rest)
                    .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
                    .unwrap_or_else(|| rest.to_string());
                source.get_or_insert(url);
            }
        } else if let Some((_, lines, _)) = current.as_mut() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
    }

    if let Some(section) = current.take() {
        sections.push(finish(section));
    }

    sections
}

/// Comparable form of a URL: trimmed, without fragment or trailing slash
fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split('#').next().unwrap_or(url);
    url.trim_end_matches('/').to_lowercase()
}

/// Extract the first JSON object from model output.
///
/// Tries the whole text, then a fenced code block, then the first balanced
/// object that parses.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(block) = extract_json_from_markdown(trimmed) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&block) {
            return Some(value);
        }
    }

    find_json_object(trimmed).and_then(|s| serde_json::from_str(&s).ok())
}

/// Extract JSON from markdown code blocks
fn extract_json_from_markdown(text: &str) -> Option<String> {
    if let Some(start) = text.find("```json") {
        let content = &text[start + 7..];
        if let Some(end) = content.find("```") {
            return Some(content[..end].trim().to_string());
        }
    }

    if let Some(start) = text.find("```") {
        let content = &text[start + 3..];
        if let Some(end) = content.find("```") {
            let potential_json = content[..end].trim();
            if potential_json.starts_with('{') && potential_json.ends_with('}') {
                return Some(potential_json.to_string());
            }
        }
    }

    None
}

/// Find the first balanced `{...}` that is valid JSON, skipping braces
/// inside string literals
fn find_json_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start_pos = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if start_pos.is_some() => in_string = true,
            '{' => {
                if start_pos.is_none() {
                    start_pos = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = start_pos.take() {
                        let candidate = &text[start..=i];
                        if serde_json::from_str::<Value>(candidate).is_ok() {
                            return Some(candidate.to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    None
}

/// Validate `value` against `schema`, joining every violation
fn validate_against_schema(schema: &Value, value: &Value) -> Result<(), String> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| format!("schema compilation error: {e}"))?;

    validator.validate(value).map_err(|errors| {
        let error_messages: Vec<String> = errors
            .map(|e| format!("at '{}': {}", e.instance_path, e))
            .collect();
        error_messages.join("; ")
    })
}
