//! Relevance filtering of Reddit stories and export to the CSV news database.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::dialogue::{OpenAiChat, extract_json, system_message, user_message};
use crate::error::DebateError;
use crate::reddit::NewsStory;

pub const STORY_TOPICS: &[&str] = &[
    "technology",
    "politics",
    "business",
    "science",
    "health",
    "entertainment",
    "sports",
    "other",
];

/// An LLM's verdict on how newsworthy a story is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRelevanceScore {
    pub score: f64,
    pub topics: Vec<String>,
    pub explanation: String,
}

impl StoryRelevanceScore {
    pub fn validate(&self) -> Result<(), DebateError> {
        if !(1.0..=10.0).contains(&self.score) {
            return Err(DebateError::Generation(format!(
                "relevance score {} out of range",
                self.score
            )));
        }
        if let Some(topic) = self
            .topics
            .iter()
            .find(|t| !STORY_TOPICS.contains(&t.as_str()))
        {
            return Err(DebateError::Generation(format!("unknown story topic '{}'", topic)));
        }
        Ok(())
    }
}

/// A story that passed filtering, with its score attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredNewsStory {
    #[serde(flatten)]
    pub story: NewsStory,
    pub relevance_score: f64,
    pub topics: Vec<String>,
    pub is_relevant: bool,
}

#[async_trait]
pub trait StoryScorer: Send + Sync {
    async fn score(&self, story: &NewsStory) -> Result<StoryRelevanceScore, DebateError>;
}

#[derive(Debug, Clone, Copy)]
pub struct FilterOptions {
    pub min_relevance_score: f64,
    pub max_stories: usize,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            min_relevance_score: 7.0,
            max_stories: 5,
        }
    }
}

/// Parse and validate a scoring reply.
pub fn parse_relevance(content: &str) -> Result<StoryRelevanceScore, DebateError> {
    let score: StoryRelevanceScore = serde_json::from_str(extract_json(content))?;
    score.validate()?;
    Ok(score)
}

fn story_prompt(story: &NewsStory) -> String {
    format!(
        "Title: {}\nSummary: {}\nSubreddit: {}\nScore: {}\nComments: {}\n",
        story.title, story.summary, story.subreddit, story.score, story.comment_count
    )
}

#[async_trait]
impl StoryScorer for OpenAiChat {
    async fn score(&self, story: &NewsStory) -> Result<StoryRelevanceScore, DebateError> {
        let messages = vec![
            system_message(RELEVANCE_SYSTEM_PROMPT),
            user_message(story_prompt(story)),
        ];
        let content = self
            .complete(messages, self.config().openai.scoring_temperature)
            .await?;
        parse_relevance(&content)
    }
}

/// Drop NSFW stories, score the rest concurrently and keep the best.
///
/// Stories whose scoring fails are logged and dropped.
pub async fn filter_stories(
    stories: Vec<NewsStory>,
    scorer: Arc<dyn StoryScorer>,
    options: FilterOptions,
) -> Vec<FilteredNewsStory> {
    let mut tasks = JoinSet::new();
    for story in stories.into_iter().filter(|s| !s.is_nsfw) {
        let scorer = scorer.clone();
        tasks.spawn(async move {
            let result = scorer.score(&story).await;
            (story, result)
        });
    }

    let mut kept = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (story, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(error = %e, "story scoring task failed");
                continue;
            }
        };
        match result {
            Ok(analysis) => {
                let is_relevant = analysis.score >= options.min_relevance_score;
                if is_relevant {
                    kept.push(FilteredNewsStory {
                        story,
                        relevance_score: analysis.score,
                        topics: analysis.topics,
                        is_relevant,
                    });
                }
            }
            Err(e) => tracing::error!(story = %story.id, error = %e, "failed to analyze story"),
        }
    }

    kept.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    kept.truncate(options.max_stories);
    kept
}

/// Write stories as the `"title","content"` CSV news database.
pub fn write_news_csv(path: &Path, stories: &[FilteredNewsStory]) -> Result<(), DebateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_path(path)?;
    writer.write_record(["title", "content"])?;
    for filtered in stories {
        let summary = if filtered.story.summary.trim().is_empty() {
            "No summary available"
        } else {
            filtered.story.summary.as_str()
        };
        writer.write_record([filtered.story.title.as_str(), summary])?;
    }
    writer.flush()?;
    Ok(())
}

const RELEVANCE_SYSTEM_PROMPT: &str = r#"You are a news curator responsible for analyzing and scoring news stories.
Your task is to:
1. Rate the story's relevance on a scale of 1-10
2. Identify the main topics it covers
3. Provide a brief explanation of your scoring

Consider these factors:
- General interest and importance
- Credibility and newsworthiness
- Impact and reach
- Timeliness
- Educational or informative value

Respond in JSON format with:
{
  "score": number (1-10),
  "topics": string[] (from: technology, politics, business, science, health, entertainment, sports, other),
  "explanation": string
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relevance_accepts_fenced_json() {
        let reply = "```json\n{\"score\": 8, \"topics\": [\"science\"], \"explanation\": \"big\"}\n```";
        let score = parse_relevance(reply).unwrap();
        assert_eq!(score.score, 8.0);
        assert_eq!(score.topics, vec!["science"]);
    }

    #[test]
    fn test_parse_relevance_rejects_bad_values() {
        assert!(parse_relevance(r#"{"score": 11, "topics": [], "explanation": ""}"#).is_err());
        assert!(parse_relevance(r#"{"score": 5, "topics": ["gossip"], "explanation": ""}"#).is_err());
        assert!(parse_relevance(r#"{"score": 5, "topics": []}"#).is_err());
    }
}
