//! Raw response envelopes of the platform's query endpoints.
//!
//! Two generations of the API answer in different shapes. Both are decoded
//! here into [`RawResponse`], and every raw event converges on
//! [`RawFields`](super::base::RawFields) through [`RawEvent::into_fields`].

use serde::Deserialize;
use serde_json::Value;

use super::base::RawFields;
use crate::models::Venue;

#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    /// `{ responses: [ { value: [ <event>... ] } ] }`
    FlatArray(Vec<RawEvent>),
    /// `{ data: { <container>: { <events>: { edges: [ { node: <event> } ] } } } }`
    Connection(Vec<RawEvent>),
    /// Parsed, but the expected data path is absent.
    Missing,
}

impl RawResponse {
    pub fn decode(body: &Value) -> Self {
        if let Some(values) = body.pointer("/responses/0/value").and_then(Value::as_array) {
            return RawResponse::FlatArray(decode_events(values.iter()));
        }

        if let Some(containers) = body.get("data").and_then(Value::as_object) {
            for container in containers.values().filter_map(Value::as_object) {
                for field in container.values() {
                    if let Some(edges) = field.get("edges").and_then(Value::as_array) {
                        let nodes = edges.iter().filter_map(|edge| edge.get("node"));
                        return RawResponse::Connection(decode_events(nodes));
                    }
                }
            }
        }

        RawResponse::Missing
    }

    pub fn into_events(self) -> Vec<RawEvent> {
        match self {
            RawResponse::FlatArray(events) | RawResponse::Connection(events) => events,
            RawResponse::Missing => Vec::new(),
        }
    }
}

fn decode_events<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<RawEvent> {
    values
        .filter_map(|value| match RawEvent::deserialize(value) {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::warn!("skipping malformed raw event: {err}");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTime {
    Millis(i64),
    Text(String),
}

impl RawTime {
    fn into_string(self) -> String {
        match self {
            RawTime::Millis(millis) => millis.to_string(),
            RawTime::Text(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEvent {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(alias = "name")]
    pub title: Option<String>,
    #[serde(alias = "dateTime", alias = "time")]
    pub date: Option<RawTime>,
    pub description: Option<String>,
    #[serde(alias = "eventUrl")]
    pub link: Option<String>,
    pub venue: Option<Venue>,
}

impl RawEvent {
    pub fn into_fields(self) -> RawFields {
        RawFields {
            id: self.id,
            date: self.date.map(RawTime::into_string),
            title: self.title,
            description: self.description,
            link: self.link,
            venue: self.venue,
        }
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(id)) => Some(id),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}
