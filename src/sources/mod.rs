pub mod base;
pub mod query;
pub mod raw;
pub mod scrape;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SourceKind;
use crate::markdown::DescriptionFormat;
use crate::models::{EventData, EventType};
use crate::session::Session;

pub use query::{QueryAdapter, QueryDialect};
pub use scrape::ScrapeAdapter;

/// Fetches the events of one category for a group and maps them onto
/// [`EventData`].
///
/// `limit == Some(0)` returns an empty list without touching the network.
/// Navigation and request failures are errors; a response that parses but
/// lacks the expected data is an empty list.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn source_id(&self) -> &'static str;
    fn description_format(&self) -> DescriptionFormat;
    async fn fetch(
        &self,
        event_type: EventType,
        group: &str,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<EventData>>;
}

/// Order applied before dropping items when a source cannot limit on the
/// server side. Only takes effect when truncation actually drops items.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TruncateOrder {
    /// Keep the first `limit` items in the order the source served them.
    #[default]
    AsServed,
    /// Reverse the served list, then keep the first `limit` items.
    Reversed,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TruncatePolicy {
    pub upcoming: TruncateOrder,
    pub past: TruncateOrder,
}

impl TruncatePolicy {
    pub fn order_for(&self, event_type: EventType) -> TruncateOrder {
        match event_type {
            EventType::Upcoming => self.upcoming,
            EventType::Past => self.past,
        }
    }
}

pub fn apply_limit<T>(mut items: Vec<T>, limit: Option<usize>, order: TruncateOrder) -> Vec<T> {
    match limit {
        Some(limit) if items.len() > limit => {
            if order == TruncateOrder::Reversed {
                items.reverse();
            }
            items.truncate(limit);
            items
        }
        _ => items,
    }
}

/// Upcoming first, then past. No deduplication.
pub fn combine(upcoming: Vec<EventData>, past: Vec<EventData>) -> Vec<EventData> {
    let mut events = upcoming;
    events.extend(past);
    events
}

pub fn source_for(
    kind: SourceKind,
    session: Arc<dyn Session>,
    truncate: TruncatePolicy,
) -> Box<dyn EventSource> {
    match kind {
        SourceKind::Api => Box::new(QueryAdapter::new(session, QueryDialect::MuApi, truncate)),
        SourceKind::Graphql => Box::new(QueryAdapter::new(session, QueryDialect::GraphQl, truncate)),
        SourceKind::Browser => Box::new(ScrapeAdapter::new(session, truncate)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(title: &str) -> EventData {
        EventData {
            id: None,
            date: "2024-01-01T18:00:00.000Z".to_string(),
            title: title.to_string(),
            description: String::new(),
            location: String::new(),
            link: "https://x/e/1".to_string(),
        }
    }

    #[test]
    fn limit_keeps_served_order_by_default() {
        let items = vec![5, 4, 3, 2, 1];
        assert_eq!(apply_limit(items, Some(2), TruncateOrder::default()), vec![5, 4]);
    }

    #[test]
    fn limit_can_reverse_before_truncating() {
        let items = vec![5, 4, 3, 2, 1];
        assert_eq!(apply_limit(items, Some(2), TruncateOrder::Reversed), vec![1, 2]);
    }

    #[test]
    fn limit_above_available_returns_everything_untouched() {
        let items = vec![3, 2, 1];
        assert_eq!(apply_limit(items.clone(), Some(10), TruncateOrder::Reversed), items);
        assert_eq!(apply_limit(items.clone(), None, TruncateOrder::Reversed), items);
    }

    #[test]
    fn limit_zero_empties() {
        assert!(apply_limit(vec![1, 2], Some(0), TruncateOrder::AsServed).is_empty());
    }

    #[test]
    fn combine_puts_upcoming_first_and_keeps_duplicates() {
        let combined = combine(vec![event("a"), event("b")], vec![event("b"), event("c")]);
        let titles: Vec<_> = combined.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "b", "c"]);
    }

    #[test]
    fn policy_picks_order_per_category() {
        let policy = TruncatePolicy {
            upcoming: TruncateOrder::AsServed,
            past: TruncateOrder::Reversed,
        };
        assert_eq!(policy.order_for(EventType::Upcoming), TruncateOrder::AsServed);
        assert_eq!(policy.order_for(EventType::Past), TruncateOrder::Reversed);
    }
}
