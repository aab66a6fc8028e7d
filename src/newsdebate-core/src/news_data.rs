//! Headlines compiled into the binary, used when no news database is present.

use crate::news::NewsItem;

const BUNDLED: &[(&str, &str)] = &[
    (
        "Zelenskiy says he is willing to give up presidency if it means peace in Ukraine",
        "",
    ),
    (
        "Federal employees told to justify jobs in email or Musk says they face dismissal",
        "",
    ),
    (
        "Elon Musk Boosts Germany's Far-Right AfD Party Again Ahead Of Sunday's Election",
        "",
    ),
    (
        "Silicon Valley's Favorite Mattress, Eight Sleep, had a backdoor to enable company engineers to SSH into any bed",
        "",
    ),
    (
        "FBI, State, VA, Navy and others all tell employees to ignore Musk email demanding reports",
        "",
    ),
    (
        "Trump Envoy Can't Name a Single Concession Russia Will Make in Peace Deal",
        "",
    ),
    (
        "China unveils CR450, the world's fastest high-speed train reaching 450 km/h",
        "",
    ),
    (
        "Hegseth says firing of top military lawyers was about making sure \"they don't exist to be roadblocks to anything that happens.\"",
        "",
    ),
    (
        "Luka Doncic checks out of the game with 32 Points / 10 Rebounds / 7 Assists / 4 Steals, ending the Nuggets' 9-game winning streak",
        "What a great game from Luka Doncic against the red hot Denver Nuggets, filling up the stats sheet.",
    ),
    (
        "Breaking: AI Makes Breakthrough in Renewable Energy",
        "Scientists announce revolutionary advancement in solar power efficiency.",
    ),
    (
        "Global Leaders Reach Climate Agreement",
        "Nations commit to ambitious carbon reduction targets by 2030.",
    ),
    (
        "Tech Giants Unveil New Quantum Computing Platform",
        "Revolutionary system promises to solve problems previously thought impossible.",
    ),
    (
        "Medical Researchers Announce Cancer Treatment Breakthrough",
        "New therapy shows 90% effectiveness in clinical trials.",
    ),
];

/// The bundled headlines, with 1-based ids.
pub fn bundled_news() -> Vec<NewsItem> {
    BUNDLED
        .iter()
        .enumerate()
        .map(|(i, (title, description))| NewsItem {
            id: i + 1,
            title: title.to_string(),
            description: description.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_ids_are_sequential() {
        let items = bundled_news();
        assert!(!items.is_empty());
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.id, i + 1);
            assert!(!item.title.is_empty());
        }
    }
}
