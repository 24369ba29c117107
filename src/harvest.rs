use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::HarvestConfig;
use crate::models::{EventData, EventType};
use crate::session::Session;
use crate::sources::{self, EventSource};
use crate::store::{self, StoreReport};
use crate::utils;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestSummary {
    pub upcoming: usize,
    pub past: usize,
    pub report: StoreReport,
}

/// Fetches upcoming then past events with the configured adapter and
/// persists the combined list into the target directory.
pub async fn harvest(config: &HarvestConfig, session: Arc<dyn Session>) -> Result<HarvestSummary> {
    let group = config.group()?;
    let source = sources::source_for(config.source, session, config.truncate);
    tracing::debug!(source = source.source_id(), group, "harvesting");

    let upcoming =
        fetch_category(source.as_ref(), EventType::Upcoming, group, config.limit_upcoming).await?;
    let past = fetch_category(source.as_ref(), EventType::Past, group, config.limit_past).await?;

    let (upcoming_count, past_count) = (upcoming.len(), past.len());
    let events = sources::combine(upcoming, past);

    let target = utils::resolve_target(&config.target);
    let report = store::store_events(&events, &target, &config.file_name)
        .await
        .context("unable to persist events")?;

    if report.failed > 0 {
        tracing::warn!(
            failed = report.failed,
            "some events could not be written to {}",
            target.display()
        );
    }
    tracing::info!(
        created = report.created,
        overwritten = report.overwritten,
        skipped = report.skipped,
        "stored events in {}",
        target.display()
    );

    Ok(HarvestSummary {
        upcoming: upcoming_count,
        past: past_count,
        report,
    })
}

async fn fetch_category(
    source: &dyn EventSource,
    event_type: EventType,
    group: &str,
    limit: Option<usize>,
) -> Result<Vec<EventData>> {
    let events = source
        .fetch(event_type, group, limit)
        .await
        .with_context(|| format!("unable to read {event_type} events of {group}"))?;
    tracing::info!("> found {} {event_type} events", events.len());
    Ok(events)
}
