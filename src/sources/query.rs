use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use super::base;
use super::raw::{RawEvent, RawResponse};
use super::{apply_limit, EventSource, TruncatePolicy};
use crate::markdown::DescriptionFormat;
use crate::models::{EventData, EventType};
use crate::session::Session;

const MU_API_FIELDS: &str = "plain_text_no_images_description,description,venue,venue_visibility";

const GRAPHQL_EVENT_FIELDS: &str =
    "edges { node { id title dateTime description eventUrl venue { name address city } } }";

/// Which generation of the platform's query API to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryDialect {
    /// Nested-object queries against `mu_api`; flat-array responses, HTML
    /// descriptions, no server-side limit.
    MuApi,
    /// GraphQL against `gql`; connection responses, escaped-markdown
    /// descriptions, limit sent as `first`.
    GraphQl,
}

impl QueryDialect {
    pub fn description_format(&self) -> DescriptionFormat {
        match self {
            QueryDialect::MuApi => DescriptionFormat::Html,
            QueryDialect::GraphQl => DescriptionFormat::EscapedMarkdown,
        }
    }
}

pub struct QueryAdapter {
    session: Arc<dyn Session>,
    dialect: QueryDialect,
    truncate: TruncatePolicy,
}

impl QueryAdapter {
    pub fn new(session: Arc<dyn Session>, dialect: QueryDialect, truncate: TruncatePolicy) -> Self {
        Self {
            session,
            dialect,
            truncate,
        }
    }

    async fn fetch_mu_api(&self, event_type: EventType, group: &str) -> Result<Vec<RawEvent>> {
        // the listing page sets up the cookies the api expects
        let page_url = self.session.resolve(&format!("{group}/events/{event_type}/"))?;
        self.session
            .navigate(&page_url)
            .await
            .with_context(|| format!("unable to open {event_type} events page for {group}"))?;

        let endpoint = self
            .session
            .resolve(&format!("mu_api/urlname/events/{event_type}"))?;

        // selects the group for the api session; the response is not used
        let mut context_url = endpoint.clone();
        context_url
            .query_pairs_mut()
            .append_pair("queries", &microtarget_query(group));
        if let Err(err) = self.session.request(Method::GET, &context_url, None).await {
            tracing::warn!(group, "group context query failed: {err}");
        }

        let mut url = endpoint;
        url.query_pairs_mut()
            .append_pair("queries", &mu_api_query(group, event_type));

        let body = self
            .session
            .request(Method::GET, &url, None)
            .await
            .with_context(|| format!("{event_type} events query failed for {group}"))?;

        Ok(RawResponse::decode(&body).into_events())
    }

    async fn fetch_graphql(
        &self,
        event_type: EventType,
        group: &str,
        limit: Option<usize>,
    ) -> Result<Vec<RawEvent>> {
        let url = self.session.resolve("gql")?;
        let body = json!({
            "query": graphql_query(event_type),
            "variables": { "urlname": group, "first": limit },
        });

        let response = self
            .session
            .request(Method::POST, &url, Some(body))
            .await
            .with_context(|| format!("{event_type} events query failed for {group}"))?;

        Ok(RawResponse::decode(&response).into_events())
    }
}

#[async_trait]
impl EventSource for QueryAdapter {
    fn source_id(&self) -> &'static str {
        match self.dialect {
            QueryDialect::MuApi => "api",
            QueryDialect::GraphQl => "graphql",
        }
    }

    fn description_format(&self) -> DescriptionFormat {
        self.dialect.description_format()
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

        let raw = match self.dialect {
            QueryDialect::MuApi => self.fetch_mu_api(event_type, group).await?,
            QueryDialect::GraphQl => self.fetch_graphql(event_type, group, limit).await?,
        };

        let format = self.description_format();
        let base_url = self.session.base_url();
        let mut events = Vec::with_capacity(raw.len());
        for item in raw {
            match base::build_event(item.into_fields(), format, base_url) {
                Ok(event) => events.push(event),
                Err(err) => tracing::warn!(source = self.source_id(), "skipping event: {err}"),
            }
        }
        // after dropping invalid items, so they do not use up the limit
        Ok(apply_limit(events, limit, self.truncate.order_for(event_type)))
    }
}

pub fn microtarget_query(group: &str) -> String {
    format!(
        "(endpoint:microtarget/nwp,meta:(method:get,noCache:!t),params:(group_urlname:{group}),ref:microtarget)"
    )
}

pub fn mu_api_query(group: &str, event_type: EventType) -> String {
    let kind = event_type.as_str();
    format!(
        "(endpoint:{group}/events,list:(dynamicRef:list_events_{group}_{kind}_cancelled,merge:()),\
         meta:(method:get),params:(desc:true,fields:'{MU_API_FIELDS}',has_ended:{ended},\
         status:'{kind},cancelled'),ref:events_{group}_{kind}_cancelled)",
        ended = event_type.has_ended(),
    )
}

pub fn graphql_query(event_type: EventType) -> String {
    let connection = match event_type {
        EventType::Upcoming => "upcomingEvents(input: { first: $first })",
        EventType::Past => "pastEvents(input: { first: $first }, sortOrder: DESC)",
    };
    format!(
        "query ($urlname: String!, $first: Int) {{ groupByUrlname(urlname: $urlname) {{ {connection} {{ {GRAPHQL_EVENT_FIELDS} }} }} }}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    use crate::session::fake::{Call, FakeSession};
    use crate::sources::TruncateOrder;

    fn mu_api_event(id: u32, title: &str, time: i64) -> Value {
        json!({
            "id": id.to_string(),
            "name": title,
            "time": time,
            "link": format!("https://www.meetup.com/dresdenjs/events/{id}/"),
            "description": format!("<p>About <b>{title}</b></p>"),
            "venue": {"name": "Cafe X", "address_1": "Main St 1", "city": "Dresden"}
        })
    }

    fn mu_api_session(events: Vec<Value>) -> Arc<FakeSession> {
        Arc::new(
            FakeSession::new()
                .with_page("/dresdenjs/events/past/", "<html></html>")
                .with_response(
                    "/mu_api/urlname/events/past",
                    json!({"responses": [{"value": events}]}),
                ),
        )
    }

    fn served_past() -> Vec<Value> {
        vec![
            mu_api_event(3, "Third", 1706810400000),
            mu_api_event(2, "Second", 1704132000000),
            mu_api_event(1, "First", 1701540000000),
        ]
    }

    fn titles(events: &[EventData]) -> Vec<&str> {
        events.iter().map(|e| e.title.as_str()).collect()
    }

    #[tokio::test]
    async fn mu_api_maps_flat_array_events() {
        let session = mu_api_session(served_past());
        let adapter = QueryAdapter::new(session.clone(), QueryDialect::MuApi, TruncatePolicy::default());

        let events = adapter
            .fetch(EventType::Past, "dresdenjs", None)
            .await
            .expect("fetch");

        assert_eq!(titles(&events), vec!["Third", "Second", "First"]);
        let second = &events[1];
        assert_eq!(second.id.as_deref(), Some("2"));
        assert_eq!(second.date, "2024-01-01T18:00:00.000Z");
        assert_eq!(second.description, "About **Second**");
        assert_eq!(second.location, "Cafe X, Main St 1, Dresden");
        assert_eq!(second.link, "https://www.meetup.com/dresdenjs/events/2/");

        let calls = session.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0],
            Call::Navigate("https://www.meetup.com/dresdenjs/events/past/".to_string())
        );
        match &calls[1] {
            Call::Request { method, url, body } => {
                assert_eq!(method, "GET");
                assert!(url.starts_with("https://www.meetup.com/mu_api/urlname/events/past?queries="));
                assert!(url.contains("microtarget%2Fnwp"), "{url}");
                assert!(url.contains("group_urlname%3Adresdenjs"), "{url}");
                assert!(body.is_none());
            }
            other => panic!("unexpected call {other:?}"),
        }
        match &calls[2] {
            Call::Request { method, url, body } => {
                assert_eq!(method, "GET");
                assert!(url.starts_with("https://www.meetup.com/mu_api/urlname/events/past?queries="));
                assert!(url.contains("has_ended%3Atrue"), "{url}");
                assert!(body.is_none());
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_limit_skips_the_network() {
        let session = mu_api_session(served_past());
        let adapter = QueryAdapter::new(session.clone(), QueryDialect::MuApi, TruncatePolicy::default());

        let events = adapter
            .fetch(EventType::Past, "dresdenjs", Some(0))
            .await
            .expect("fetch");

        assert!(events.is_empty());
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn client_side_limit_keeps_served_order_by_default() {
        let session = mu_api_session(served_past());
        let adapter = QueryAdapter::new(session, QueryDialect::MuApi, TruncatePolicy::default());

        let events = adapter
            .fetch(EventType::Past, "dresdenjs", Some(2))
            .await
            .expect("fetch");
        assert_eq!(titles(&events), vec!["Third", "Second"]);
    }

    #[tokio::test]
    async fn client_side_limit_can_reverse_first() {
        let session = mu_api_session(served_past());
        let truncate = TruncatePolicy {
            past: TruncateOrder::Reversed,
            ..TruncatePolicy::default()
        };
        let adapter = QueryAdapter::new(session, QueryDialect::MuApi, truncate);

        let events = adapter
            .fetch(EventType::Past, "dresdenjs", Some(2))
            .await
            .expect("fetch");
        assert_eq!(titles(&events), vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn limit_above_available_returns_all() {
        let session = mu_api_session(served_past());
        let adapter = QueryAdapter::new(session, QueryDialect::MuApi, TruncatePolicy::default());

        let events = adapter
            .fetch(EventType::Past, "dresdenjs", Some(50))
            .await
            .expect("fetch");
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn missing_data_path_is_empty_not_error() {
        let session = Arc::new(
            FakeSession::new()
                .with_page("/dresdenjs/events/upcoming/", "<html></html>")
                .with_response("/mu_api/urlname/events/upcoming", json!({"responses": [{}]})),
        );
        let adapter = QueryAdapter::new(session, QueryDialect::MuApi, TruncatePolicy::default());

        let events = adapter
            .fetch(EventType::Upcoming, "dresdenjs", None)
            .await
            .expect("fetch");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn failed_navigation_is_fatal() {
        let session = Arc::new(FakeSession::new());
        let adapter = QueryAdapter::new(session, QueryDialect::MuApi, TruncatePolicy::default());

        let err = adapter
            .fetch(EventType::Upcoming, "dresdenjs", None)
            .await
            .expect_err("navigation should fail");
        assert!(err.to_string().contains("upcoming events page"), "{err}");
    }

    #[tokio::test]
    async fn failed_request_is_fatal() {
        let session = Arc::new(FakeSession::new().with_page("/dresdenjs/events/past/", "<html></html>"));
        let adapter = QueryAdapter::new(session, QueryDialect::MuApi, TruncatePolicy::default());

        assert!(adapter.fetch(EventType::Past, "dresdenjs", None).await.is_err());
    }

    #[tokio::test]
    async fn events_without_title_are_skipped() {
        let session = mu_api_session(vec![
            mu_api_event(1, "Kept", 1704132000000),
            json!({"id": "2", "time": 1704132000000i64, "link": "https://x/e/2"}),
        ]);
        let adapter = QueryAdapter::new(session, QueryDialect::MuApi, TruncatePolicy::default());

        let events = adapter
            .fetch(EventType::Past, "dresdenjs", None)
            .await
            .expect("fetch");
        assert_eq!(titles(&events), vec!["Kept"]);
    }

    #[tokio::test]
    async fn invalid_events_do_not_count_against_the_limit() {
        let session = mu_api_session(vec![
            json!({"id": "9", "name": "No date", "link": "https://x/e/9"}),
            mu_api_event(3, "Third", 1706810400000),
            mu_api_event(2, "Second", 1704132000000),
            mu_api_event(1, "First", 1701540000000),
        ]);
        let adapter = QueryAdapter::new(session, QueryDialect::MuApi, TruncatePolicy::default());

        let events = adapter
            .fetch(EventType::Past, "dresdenjs", Some(2))
            .await
            .expect("fetch");
        assert_eq!(titles(&events), vec!["Third", "Second"]);
    }

    #[tokio::test]
    async fn graphql_sends_server_side_limit_and_reads_connection() {
        let session = Arc::new(FakeSession::new().with_response(
            "/gql",
            json!({
                "data": {"groupByUrlname": {"upcomingEvents": {"edges": [
                    {"node": {
                        "id": "301",
                        "title": "Monthly Meetup",
                        "dateTime": "2024-01-01T19:00+01:00",
                        "description": "\\*\\*Talks\\*\\* and pizza\n\n\\- lightning talks",
                        "eventUrl": "https://www.meetup.com/dresdenjs/events/301/",
                        "venue": {"name": "Cafe X", "address": "Cafe X", "city": "Dresden"}
                    }}
                ]}}}
            }),
        ));
        let adapter = QueryAdapter::new(session.clone(), QueryDialect::GraphQl, TruncatePolicy::default());

        let events = adapter
            .fetch(EventType::Upcoming, "dresdenjs", Some(2))
            .await
            .expect("fetch");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].date, "2024-01-01T18:00:00.000Z");
        assert_eq!(events[0].description, "**Talks** and pizza\n\n- lightning talks");
        assert_eq!(events[0].location, "Cafe X, Dresden");

        let calls = session.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Request { method, url, body } => {
                assert_eq!(method, "POST");
                assert_eq!(url, "https://www.meetup.com/gql");
                let body = body.as_ref().expect("graphql body");
                assert_eq!(body["variables"]["first"], json!(2));
                assert_eq!(body["variables"]["urlname"], json!("dresdenjs"));
                assert!(body["query"]
                    .as_str()
                    .is_some_and(|q| q.contains("upcomingEvents")));
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn microtarget_query_names_the_group() {
        assert_eq!(
            microtarget_query("dresdenjs"),
            "(endpoint:microtarget/nwp,meta:(method:get,noCache:!t),params:(group_urlname:dresdenjs),ref:microtarget)"
        );
    }

    #[test]
    fn mu_api_query_targets_group_and_category() {
        let query = mu_api_query("dresdenjs", EventType::Upcoming);
        assert!(query.starts_with("(endpoint:dresdenjs/events,"));
        assert!(query.contains("has_ended:false"));
        assert!(query.contains("status:'upcoming,cancelled'"));
        assert!(query.ends_with("ref:events_dresdenjs_upcoming_cancelled)"));
    }
}
