//! Popular posts from Reddit, as candidate news stories.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::RedditConfig;
use crate::error::DebateError;

/// A Reddit post mapped into the shape the rest of the app uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsStory {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub author: String,
    pub score: i64,
    pub timestamp: DateTime<Utc>,
    pub comment_count: u64,
    pub subreddit: String,
    pub reddit_url: String,
    pub is_nsfw: bool,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: RedditPost,
}

#[derive(Debug, Deserialize)]
struct RedditPost {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    num_comments: u64,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    over_18: bool,
}

impl RedditPost {
    fn into_story(self, base_url: &str) -> NewsStory {
        let timestamp = Utc
            .timestamp_opt(self.created_utc as i64, 0)
            .single()
            .unwrap_or_default();

        NewsStory {
            reddit_url: format!("{}{}", base_url, self.permalink),
            id: self.id,
            title: self.title,
            summary: self.selftext,
            url: self.url,
            author: self.author,
            score: self.score,
            timestamp,
            comment_count: self.num_comments,
            subreddit: self.subreddit,
            is_nsfw: self.over_18,
        }
    }
}

pub struct RedditClient {
    http: reqwest::Client,
    config: RedditConfig,
}

impl RedditClient {
    pub fn new(config: RedditConfig) -> Result<Self, DebateError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Fetch the current top posts of r/popular.
    pub async fn fetch_top_posts(&self, limit: usize) -> Result<Vec<NewsStory>, DebateError> {
        let base_url = self.config.base_url.trim_end_matches('/');
        let url = format!("{}/r/popular.json", base_url);

        tracing::debug!(limit, "fetching popular posts");
        let response = self
            .http
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "Reddit API error");
            return Err(DebateError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let listing: Listing = response.json().await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.into_story(base_url))
            .collect())
    }
}
