//! Task definitions for the two crew steps

use serde::Serialize;

/// Instruction and expected output handed to one agent
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: &'static str,
    pub description: String,
    pub expected_output: String,
}

/// Output of a finished task, used as context by later tasks
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutput {
    pub task: String,
    pub agent_role: String,
    pub raw: String,
}

impl TaskSpec {
    /// Search, scrape and report on the top articles for `topic`
    pub fn research(topic: &str, max_articles: usize) -> Self {
        Self {
            name: "research",
            description: format!(
                "1. Search for the most relevant and recent news articles on the topic: '{topic}'.\n\
                 2. For each of the top {max_articles} articles found, use the scrape tool to get its full content.\n\
                 3. Compile all the scraped content and URLs into a final report.\n\
                 IMPORTANT: Make sure to scrape the ACTUAL articles found in the search results. \
                 If the search finds fewer articles, report only those; never invent URLs."
            ),
            expected_output: format!(
                "A single JSON object and nothing else, shaped like:\n\
                 {{\"articles\": [{{\"title\": \"...\", \"url\": \"https://...\", \"content\": \"scraped text\"}}]}}\n\
                 with at most {max_articles} articles relevant to the topic '{topic}', each with its full URL \
                 and the actual scraped text content."
            ),
        }
    }

    /// Summarize each researched article with a cited source
    pub fn analysis(article_count: usize) -> Self {
        let expected_output = if article_count == 0 {
            "A short markdown note explaining that no relevant articles were found for the topic."
                .to_string()
        } else {
            let format_lines: Vec<String> = (1..=article_count)
                .map(|n| {
                    format!(
                        "{n}. [Your detailed summary here]...\n   Source: [actual URL from scraped content]"
                    )
                })
                .collect();
            let sections = if article_count == 1 {
                "1 numbered section".to_string()
            } else {
                format!("{article_count} numbered sections")
            };
            format!(
                "A clean, well-formatted markdown report with {sections}. \
                 Each section must contain:\n\
                 - A detailed summary paragraph of one article\n\
                 - The source URL on a new line starting with 'Source:'\n\n\
                 Format:\n{}",
                format_lines.join("\n\n")
            )
        };

        Self {
            name: "analysis",
            description: "Review the full content of each news article provided in the context. \
                For each article, write a detailed, one-paragraph summary that captures the \
                key points and main arguments. IMPORTANT: Use ONLY the articles that were actually \
                scraped by the researcher, not any example URLs."
                .to_string(),
            expected_output,
        }
    }

    /// Render the user prompt, including outputs of earlier tasks (pure function)
    pub fn render_prompt(&self, context: &[TaskOutput]) -> String {
        let mut prompt = format!(
            "Current Task: {}\n\nThis is the expected criteria for your final answer: {}\n\
             You MUST return the actual complete content as the final answer, not a summary.",
            self.description, self.expected_output
        );

        if !context.is_empty() {
            prompt.push_str("\n\nThis is the context you're working with:\n");
            for output in context {
                prompt.push_str(&format!(
                    "\n--- Output of the {} task ({}) ---\n{}\n",
                    output.task, output.agent_role, output.raw
                ));
            }
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_research_task_mentions_topic_and_count() {
        let task = TaskSpec::research("quantum computing", 2);
        assert_eq!(task.name, "research");
        assert!(task.description.contains("'quantum computing'"));
        assert!(task.description.contains("top 2 articles"));
        assert!(task.expected_output.contains("\"articles\""));
    }

    #[test]
    fn test_analysis_task_sections_follow_article_count() {
        let task = TaskSpec::analysis(2);
        assert!(task.expected_output.contains("2 numbered sections"));
        assert!(task.expected_output.contains("1. [Your detailed summary here]"));
        assert!(task.expected_output.contains("2. [Your detailed summary here]"));

        let single = TaskSpec::analysis(1);
        assert!(single.expected_output.contains("with 1 numbered section."));
        assert!(!single.expected_output.contains("numbered sections"));
        assert!(!single.expected_output.contains("2. [Your"));

        let none = TaskSpec::analysis(0);
        assert!(none.expected_output.contains("no relevant articles"));
    }

    #[test]
    fn test_render_prompt_with_context() {
        let task = TaskSpec::analysis(1);
        assert!(!task.render_prompt(&[]).contains("context you're working with"));

        let context = vec![TaskOutput {
            task: "research".to_string(),
            agent_role: "Expert News Researcher".to_string(),
            raw: "{\"articles\": []}".to_string(),
        }];
        let prompt = task.render_prompt(&context);
        assert!(prompt.contains("Output of the research task (Expert News Researcher)"));
        assert!(prompt.contains("{\"articles\": []}"));
    }
}
