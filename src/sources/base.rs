use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Utc};
use reqwest::Url;
use scraper::{ElementRef, Selector};

use crate::location::{compose_location, DEFAULT_SEPARATOR};
use crate::markdown::DescriptionFormat;
use crate::models::{EventData, Venue};

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn all_text(element: &ElementRef<'_>, selector: &Selector) -> Vec<String> {
    element
        .select(selector)
        .map(inner_text)
        .filter(|text| !text.is_empty())
        .collect()
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

pub fn absolute_url(base: &Url, href: Option<&str>) -> Option<String> {
    let href = href?.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    base.join(href).ok().map(|u| u.to_string())
}

/// Epoch milliseconds or an ISO-8601 string (seconds optional), rendered as
/// UTC with millisecond precision: `2024-01-01T18:00:00.000Z`.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(millis) = raw.parse::<i64>() {
        return millis_to_iso(millis);
    }
    parse_iso(raw).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn millis_to_iso(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn parse_iso(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    // offset-less values are taken as UTC
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Extracted fields of one event, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawFields {
    pub id: Option<String>,
    pub date: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub venue: Option<Venue>,
}

/// Converges raw fields from any adapter onto the canonical record.
pub fn build_event(fields: RawFields, format: DescriptionFormat, base: &Url) -> Result<EventData> {
    let title = fields
        .title
        .as_deref()
        .map(clean_text)
        .filter(|title| !title.is_empty())
        .ok_or_else(|| anyhow!("event has no title"))?;
    let raw_date = fields
        .date
        .ok_or_else(|| anyhow!("event '{title}' has no date"))?;
    let date = normalize_timestamp(&raw_date)
        .ok_or_else(|| anyhow!("event '{title}' has unparseable date '{raw_date}'"))?;
    let link = absolute_url(base, fields.link.as_deref())
        .ok_or_else(|| anyhow!("event '{title}' has no link"))?;
    let description = fields
        .description
        .as_deref()
        .map(|raw| format.normalize(raw))
        .unwrap_or_default();
    let location = compose_location(fields.venue.as_ref(), DEFAULT_SEPARATOR);

    Ok(EventData {
        id: fields.id,
        date,
        title,
        description,
        location,
        link,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.meetup.com/").expect("base url")
    }

    #[test]
    fn normalizes_epoch_millis() {
        assert_eq!(
            normalize_timestamp("1704132000000").as_deref(),
            Some("2024-01-01T18:00:00.000Z")
        );
    }

    #[test]
    fn normalizes_iso_with_offset() {
        assert_eq!(
            normalize_timestamp("2024-01-01T19:00:00+01:00").as_deref(),
            Some("2024-01-01T18:00:00.000Z")
        );
        assert_eq!(
            normalize_timestamp("2024-01-01T19:00+01:00").as_deref(),
            Some("2024-01-01T18:00:00.000Z")
        );
        assert_eq!(
            normalize_timestamp("2024-01-01T18:00:00.000Z").as_deref(),
            Some("2024-01-01T18:00:00.000Z")
        );
    }

    #[test]
    fn rejects_garbage_dates() {
        assert_eq!(normalize_timestamp("next tuesday"), None);
        assert_eq!(normalize_timestamp(""), None);
    }

    #[test]
    fn resolves_relative_links() {
        assert_eq!(
            absolute_url(&base(), Some("/dresdenjs/events/1/")).as_deref(),
            Some("https://www.meetup.com/dresdenjs/events/1/")
        );
        assert_eq!(
            absolute_url(&base(), Some("https://x/e/1")).as_deref(),
            Some("https://x/e/1")
        );
        assert_eq!(absolute_url(&base(), Some("  ")), None);
    }

    #[test]
    fn builds_canonical_event() {
        let fields = RawFields {
            id: Some("1".to_string()),
            date: Some("1704132000000".to_string()),
            title: Some("  Monthly   Meetup ".to_string()),
            description: Some("<p>Talks and pizza.</p>".to_string()),
            link: Some("https://x/e/1".to_string()),
            venue: Some(Venue {
                name: Some("Cafe X".to_string()),
                address: Some("Main St 1".to_string()),
                city: Some("Dresden".to_string()),
            }),
        };
        let event = build_event(fields, DescriptionFormat::Html, &base()).expect("event");
        assert_eq!(event.title, "Monthly Meetup");
        assert_eq!(event.date, "2024-01-01T18:00:00.000Z");
        assert_eq!(event.description, "Talks and pizza.");
        assert_eq!(event.location, "Cafe X, Main St 1, Dresden");
        assert_eq!(event.link, "https://x/e/1");
    }

    #[test]
    fn missing_title_is_rejected() {
        let fields = RawFields {
            date: Some("1704132000000".to_string()),
            link: Some("https://x/e/1".to_string()),
            ..RawFields::default()
        };
        assert!(build_event(fields, DescriptionFormat::Html, &base()).is_err());
    }
}
