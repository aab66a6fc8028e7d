//! News items used as debate topics.
//!
//! Items come from a JSON database, a CSV database or the bundled list, in
//! that order of preference. [`NewsQueue`] hands them out without
//! replacement and remembers which ids were used across runs.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::NewsConfig;
use crate::error::DebateError;
use crate::news_data::bundled_news;

pub const FALLBACK_TITLE: &str = "Breaking: Technical Difficulties at AI News Network";
pub const FALLBACK_DESCRIPTION: &str = "Our AI anchors are experiencing temporary issues.";

/// Separator between titles in the scrolling ticker.
pub const TICKER_SEPARATOR: &str = " • BREAKING NEWS • ";

const MAX_TOPIC_CHARS: usize = 128;

/// A headline that can seed a debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    /// 1-based position in the source it was loaded from.
    pub id: usize,
    pub title: String,
    pub description: String,
}

/// Which loader produced the items of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsSource {
    Json,
    Csv,
    Bundled,
}

pub fn fallback_item() -> NewsItem {
    NewsItem {
        id: 1,
        title: FALLBACK_TITLE.to_string(),
        description: FALLBACK_DESCRIPTION.to_string(),
    }
}

/// Shorten a topic for display: 128 characters followed by `...`.
pub fn display_topic(topic: &str) -> String {
    if topic.chars().count() > MAX_TOPIC_CHARS {
        let head: String = topic.chars().take(MAX_TOPIC_CHARS).collect();
        format!("{}...", head)
    } else {
        topic.to_string()
    }
}

/// Join headline titles for the ticker.
pub fn headline_ticker(items: &[NewsItem]) -> String {
    items
        .iter()
        .map(|item| item.title.as_str())
        .collect::<Vec<_>>()
        .join(TICKER_SEPARATOR)
}

/// Pick a uniformly random item.
pub fn random_item<'a, R: Rng + ?Sized>(items: &'a [NewsItem], rng: &mut R) -> Option<&'a NewsItem> {
    items.choose(rng)
}

fn looks_like_html(text: &str) -> bool {
    text.trim_start().starts_with('<') || text.contains("<!DOCTYPE")
}

fn strip_quotes(value: &str) -> String {
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value).to_string()
}

/// Parse a JSON array of `{title, description?}` objects.
///
/// Entries without a title are dropped. Ids follow array positions.
pub fn parse_json_news(text: &str) -> Result<Vec<NewsItem>, DebateError> {
    if looks_like_html(text) {
        return Err(DebateError::InvalidInput(
            "news database contains HTML instead of JSON".to_string(),
        ));
    }

    let value: serde_json::Value = serde_json::from_str(text)?;
    let entries = value
        .as_array()
        .ok_or_else(|| DebateError::InvalidInput("news JSON is not an array".to_string()))?;

    Ok(entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let title = entry.get("title").and_then(|t| t.as_str()).unwrap_or("");
            if title.is_empty() {
                return None;
            }
            let description = entry
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("");
            Some(NewsItem {
                id: i + 1,
                title: title.to_string(),
                description: description.to_string(),
            })
        })
        .collect())
}

/// Parse a headerless `title,description` CSV.
///
/// A leading `title,content` or `title,description` row is treated as a
/// header and skipped.
pub fn parse_csv_news(text: &str) -> Result<Vec<NewsItem>, DebateError> {
    if looks_like_html(text) {
        return Err(DebateError::InvalidInput(
            "news database contains HTML instead of CSV".to_string(),
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut items = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let title = strip_quotes(record.get(0).unwrap_or(""));
        let description = strip_quotes(record.get(1).unwrap_or(""));

        if row == 0
            && title.eq_ignore_ascii_case("title")
            && (description.eq_ignore_ascii_case("content")
                || description.eq_ignore_ascii_case("description"))
        {
            continue;
        }
        if title.trim().is_empty() {
            continue;
        }

        items.push(NewsItem {
            id: items.len() + 1,
            title,
            description,
        });
    }

    Ok(items)
}

pub fn load_json_news(path: &Path) -> Result<Vec<NewsItem>, DebateError> {
    parse_json_news(&fs::read_to_string(path)?)
}

pub fn load_csv_news(path: &Path) -> Result<Vec<NewsItem>, DebateError> {
    parse_csv_news(&fs::read_to_string(path)?)
}

/// Persisted set of news ids already used as topics.
#[derive(Debug, Clone)]
pub struct UsedIdStore {
    path: Option<PathBuf>,
}

impl UsedIdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A store that forgets everything when dropped.
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn load(&self) -> HashSet<usize> {
        let Some(path) = &self.path else {
            return HashSet::new();
        };
        let Ok(content) = fs::read_to_string(path) else {
            return HashSet::new();
        };
        match serde_json::from_str::<Vec<usize>>(&content) {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable used-id store");
                HashSet::new()
            }
        }
    }

    pub fn save(&self, ids: &HashSet<usize>) -> Result<(), DebateError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut sorted: Vec<usize> = ids.iter().copied().collect();
        sorted.sort_unstable();
        fs::write(path, serde_json::to_string(&sorted)?)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), DebateError> {
        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// Shuffled queue of news items, drawn without replacement.
pub struct NewsQueue {
    pool: Vec<NewsItem>,
    queue: VecDeque<NewsItem>,
    used: HashSet<usize>,
    store: UsedIdStore,
    source: NewsSource,
    rng: StdRng,
}

impl NewsQueue {
    pub fn new(items: Vec<NewsItem>, source: NewsSource, store: UsedIdStore) -> Self {
        Self::with_rng(items, source, store, StdRng::from_entropy())
    }

    /// Build a queue with a caller-provided generator, for reproducible order.
    pub fn with_rng(items: Vec<NewsItem>, source: NewsSource, store: UsedIdStore, rng: StdRng) -> Self {
        let used = store.load();
        let mut queue = Self {
            pool: items,
            queue: VecDeque::new(),
            used,
            store,
            source,
            rng,
        };
        queue.refill();
        queue
    }

    /// Load items from the configured JSON file, then the CSV file, then the
    /// bundled list.
    pub fn load(config: &NewsConfig, store: UsedIdStore) -> Self {
        match load_json_news(&config.json_path) {
            Ok(items) if !items.is_empty() => {
                tracing::info!(count = items.len(), path = %config.json_path.display(), "loaded news from JSON");
                return Self::new(items, NewsSource::Json, store);
            }
            Ok(_) => tracing::debug!("JSON news database is empty"),
            Err(e) => tracing::debug!(error = %e, "JSON news database unavailable"),
        }

        match load_csv_news(&config.csv_path) {
            Ok(items) if !items.is_empty() => {
                tracing::info!(count = items.len(), path = %config.csv_path.display(), "loaded news from CSV");
                return Self::new(items, NewsSource::Csv, store);
            }
            Ok(_) => tracing::debug!("CSV news database is empty"),
            Err(e) => tracing::debug!(error = %e, "CSV news database unavailable"),
        }

        tracing::info!("using bundled news");
        Self::new(bundled_news(), NewsSource::Bundled, store)
    }

    fn refill(&mut self) {
        let mut unused: Vec<NewsItem> = self
            .pool
            .iter()
            .filter(|item| !self.used.contains(&item.id))
            .cloned()
            .collect();

        if unused.is_empty() {
            tracing::debug!("every news item used, starting over");
            self.used.clear();
            if let Err(e) = self.store.clear() {
                tracing::warn!(error = %e, "failed to clear used-id store");
            }
            unused = self.pool.clone();
        }

        unused.shuffle(&mut self.rng);
        self.queue = unused.into();
    }

    /// Draw the next unused item and record it as used.
    pub fn next_item(&mut self) -> NewsItem {
        if self.queue.is_empty() {
            self.refill();
        }
        let Some(item) = self.queue.pop_front() else {
            return fallback_item();
        };

        self.used.insert(item.id);
        if let Err(e) = self.store.save(&self.used) {
            tracing::warn!(error = %e, "failed to persist used news ids");
        }
        item
    }

    /// A uniformly random item from the whole pool, without marking it used.
    pub fn random_item(&mut self) -> NewsItem {
        random_item(&self.pool, &mut self.rng)
            .cloned()
            .unwrap_or_else(fallback_item)
    }

    pub fn items(&self) -> &[NewsItem] {
        &self.pool
    }

    /// Items left before the queue is rebuilt.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn source(&self) -> NewsSource {
        self.source
    }

    pub fn ticker(&self) -> String {
        headline_ticker(&self.pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<NewsItem> {
        (1..=n)
            .map(|id| NewsItem {
                id,
                title: format!("Headline {}", id),
                description: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_display_topic_truncation() {
        let short = "Pineapple on pizza";
        assert_eq!(display_topic(short), short);

        let exact = "a".repeat(128);
        assert_eq!(display_topic(&exact), exact);

        let long = "b".repeat(200);
        let shown = display_topic(&long);
        assert_eq!(shown.chars().count(), 131);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn test_parse_json_news() {
        let text = r#"[
            {"title": "First", "description": "One"},
            {"description": "no title"},
            {"title": "Third"}
        ]"#;
        let items = parse_json_news(text).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, 1);
        assert_eq!(items[1].id, 3);
        assert_eq!(items[1].description, "");
    }

    #[test]
    fn test_parse_json_rejects_html() {
        let err = parse_json_news("<!DOCTYPE html><html></html>").unwrap_err();
        assert!(matches!(err, DebateError::InvalidInput(_)));
        assert!(parse_json_news(r#"{"title": "x"}"#).is_err());
    }

    #[test]
    fn test_parse_csv_news_skips_header_and_strips_quotes() {
        let text = "\"title\",\"content\"\n\"A, with comma\",\"Desc\"\nPlain title,\n";
        let items = parse_csv_news(text).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, 1);
        assert_eq!(items[0].title, "A, with comma");
        assert_eq!(items[0].description, "Desc");
        assert_eq!(items[1].title, "Plain title");
        assert_eq!(items[1].description, "");
    }

    #[test]
    fn test_parse_csv_news_double_quoted_values() {
        let items = parse_csv_news("\"\"\"Quoted\"\"\",x\n").unwrap();
        assert_eq!(items[0].title, "Quoted");
    }

    #[test]
    fn test_parse_csv_rejects_html() {
        assert!(parse_csv_news("  <html>oops</html>").is_err());
    }

    #[test]
    fn test_headline_ticker() {
        assert_eq!(
            headline_ticker(&items(2)),
            "Headline 1 • BREAKING NEWS • Headline 2"
        );
        assert_eq!(headline_ticker(&[]), "");
    }

    #[test]
    fn test_queue_draws_without_replacement() {
        let mut queue = NewsQueue::with_rng(
            items(5),
            NewsSource::Bundled,
            UsedIdStore::in_memory(),
            StdRng::seed_from_u64(7),
        );
        let mut seen = HashSet::new();
        for _ in 0..5 {
            assert!(seen.insert(queue.next_item().id));
        }
        assert_eq!(seen.len(), 5);

        // Exhausted pool starts over with every item available.
        let again = queue.next_item();
        assert!(seen.contains(&again.id));
        assert_eq!(queue.remaining(), 4);
    }

    #[test]
    fn test_empty_queue_yields_fallback() {
        let mut queue = NewsQueue::new(vec![], NewsSource::Bundled, UsedIdStore::in_memory());
        assert_eq!(queue.next_item(), fallback_item());
        assert_eq!(queue.random_item(), fallback_item());
    }
}
