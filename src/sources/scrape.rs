use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};

use super::base::{self, RawFields};
use super::{apply_limit, EventSource, TruncatePolicy};
use crate::markdown::DescriptionFormat;
use crate::models::{EventData, EventType, Venue};
use crate::session::Session;

static ITEM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.eventList-list li.list-item").expect("listing item selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2 a.eventCardHead--title").expect("listing title selector"));
static TIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3 .eventTimeDisplay time").expect("listing time selector"));
static VENUE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".venueDisplay address p").expect("listing venue selector"));
static DETAIL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("main .break-words").expect("detail body selector"));

/// Reads the rendered listing page and opens every event's own page for the
/// full description. One extra page load per event; use when the query API
/// is unavailable.
pub struct ScrapeAdapter {
    session: Arc<dyn Session>,
    truncate: TruncatePolicy,
}

#[derive(Debug, Clone, PartialEq)]
struct ListingItem {
    title: Option<String>,
    link: Option<String>,
    timestamp: Option<String>,
    venue: Option<Venue>,
}

impl ListingItem {
    /// Has everything an event needs apart from the description.
    fn is_complete(&self) -> bool {
        self.title.as_deref().is_some_and(|title| !title.is_empty())
            && self.link.is_some()
            && self
                .timestamp
                .as_deref()
                .and_then(base::normalize_timestamp)
                .is_some()
    }
}

impl ScrapeAdapter {
    pub fn new(session: Arc<dyn Session>, truncate: TruncatePolicy) -> Self {
        Self { session, truncate }
    }

    async fn load_detail(&self, item: ListingItem) -> Result<RawFields> {
        let description = match item.link.as_deref() {
            Some(link) => {
                let url = Url::parse(link).with_context(|| format!("invalid event link {link}"))?;
                let page = self
                    .session
                    .navigate(&url)
                    .await
                    .with_context(|| format!("unable to open event page {link}"))?;
                parse_detail(&page.html)
            }
            None => None,
        };

        Ok(RawFields {
            id: None,
            date: item.timestamp,
            title: item.title,
            description,
            link: item.link,
            venue: item.venue,
        })
    }
}

#[async_trait]
impl EventSource for ScrapeAdapter {
    fn source_id(&self) -> &'static str {
        "browser"
    }

    fn description_format(&self) -> DescriptionFormat {
        DescriptionFormat::Html
    }

    async fn fetch(
        &self,
        event_type: EventType,
        group: &str,
        limit: Option<usize>,
    ) -> Result<Vec<EventData>> {
        if limit == Some(0) {
            return Ok(Vec::new());
        }

        let listing_url = self.session.resolve(&format!("{group}/events/{event_type}/"))?;
        let page = self
            .session
            .navigate(&listing_url)
            .await
            .with_context(|| format!("unable to open {event_type} events page for {group}"))?;

        let items: Vec<_> = parse_listing(&page.html, &page.url)
            .into_iter()
            .filter(|item| {
                let complete = item.is_complete();
                if !complete {
                    tracing::warn!(source = self.source_id(), "skipping incomplete listing item {item:?}");
                }
                complete
            })
            .collect();
        let items = apply_limit(items, limit, self.truncate.order_for(event_type));
        tracing::debug!(count = items.len(), "loading {event_type} event pages");

        let details = try_join_all(items.into_iter().map(|item| self.load_detail(item))).await?;

        let format = self.description_format();
        let mut events = Vec::with_capacity(details.len());
        for fields in details {
            match base::build_event(fields, format, &page.url) {
                Ok(event) => events.push(event),
                Err(err) => tracing::warn!(source = self.source_id(), "skipping event: {err}"),
            }
        }
        Ok(events)
    }
}

fn parse_listing(html: &str, page_url: &Url) -> Vec<ListingItem> {
    let document = Html::parse_document(html);
    document
        .select(&ITEM_SELECTOR)
        .map(|item| {
            let heading = item.select(&TITLE_SELECTOR).next();
            let venue_lines = base::all_text(&item, &VENUE_SELECTOR);
            let mut lines = venue_lines.into_iter();
            let venue = Venue {
                name: lines.next(),
                address: lines.next(),
                city: lines.next(),
            };

            ListingItem {
                title: heading.map(base::inner_text),
                link: base::absolute_url(page_url, heading.and_then(|h| h.value().attr("href"))),
                timestamp: base::first_attr(&item, &TIME_SELECTOR, "datetime"),
                venue: Some(venue),
            }
        })
        .collect()
}

fn parse_detail(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&DETAIL_SELECTOR)
        .next()
        .map(|body| body.inner_html())
}
