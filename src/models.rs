use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventData {
    pub id: Option<String>,
    pub date: String, // ISO-8601, UTC, millisecond precision
    pub title: String,
    pub description: String,
    pub location: String,
    pub link: String,
}

impl EventData {
    /// Day-granularity key (`YYYY-MM-DD`) used to name the persisted file.
    pub fn day(&self) -> &str {
        self.date.get(..10).unwrap_or(&self.date)
    }
}

/// Venue fields as the source reports them. Only used to derive `location`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Venue {
    pub name: Option<String>,
    #[serde(alias = "address_1")]
    pub address: Option<String>,
    pub city: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Upcoming,
    Past,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Upcoming => "upcoming",
            EventType::Past => "past",
        }
    }

    pub fn has_ended(&self) -> bool {
        matches!(self, EventType::Past)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_is_date_prefix() {
        let event = EventData {
            id: None,
            date: "2024-01-01T18:00:00.000Z".to_string(),
            title: "Monthly Meetup".to_string(),
            description: String::new(),
            location: String::new(),
            link: "https://x/e/1".to_string(),
        };
        assert_eq!(event.day(), "2024-01-01");
    }

    #[test]
    fn venue_accepts_legacy_address_field() {
        let venue: Venue =
            serde_json::from_str(r#"{"name":"Cafe X","address_1":"Main St 1","city":"Dresden"}"#)
                .expect("venue json");
        assert_eq!(venue.address.as_deref(), Some("Main St 1"));
    }
}
