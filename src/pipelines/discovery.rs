//! Discovery pipeline (spec.md section 4.4): advance from the last archived
//! id up to the live max, persisting every intermediate id exactly once.
//! The watermark invariant — never mark an id seen that wasn't actually
//! committed — is the thing this module exists to protect.

use crate::clock;
use crate::config::Config;
use crate::model::state;
use crate::pipelines::PipelineSummary;
use crate::store::Store;
use crate::upstream::UpstreamSource;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{error, warn};

const PIPELINE_NAME: &str = "discovery";
const COLD_START_LOOKBACK: i64 = 1000;

pub async fn run<U: UpstreamSource + Sync>(upstream: &U, store: &Store, config: &Config) -> PipelineSummary {
    let started = Instant::now();
    let mut summary = PipelineSummary { success: true, ..Default::default() };

    let live_max = match upstream.max_item_id().await {
        Ok(value) => value,
        Err(err) => {
            let message = format!("failed to read live max item id: {err}");
            store.log_error(PIPELINE_NAME, &message, None);
            summary.errors += 1;
            summary.error_messages.push(message);
            return finish(store, summary, started);
        }
    };

    let stored_max = store.max_item_id_seen().unwrap_or(0);
    let start = if stored_max == 0 { (live_max - COLD_START_LOOKBACK).max(0) } else { stored_max + 1 };

    if start > live_max {
        let _ = store.touch_run_marker(state::keys::LAST_DISCOVERY_RUN);
        return finish(store, summary, started);
    }

    // Non-fatal: the rest of the run proceeds with an empty front-page set.
    let front_page: HashSet<i64> = match upstream.top_stories().await {
        Ok(ids) => ids.into_iter().collect(),
        Err(err) => {
            warn!(%err, "top_stories fetch failed, continuing with an empty front-page set");
            HashSet::new()
        }
    };

    let batch_size = config.discovery_batch_size.max(1) as i64;
    let concurrency = config.rate_limit.upstream_concurrency;
    // On a warm start `start` is one past the last committed id, so if every
    // batch below fails the persisted watermark must fall back to
    // `stored_max` rather than the (uncommitted) `start` itself. On a cold
    // start nothing has ever been committed, so `start` (the lookback point)
    // is itself the safe fallback.
    let mut watermark = if stored_max == 0 { start } else { stored_max };
    let mut all_batches_succeeded = true;
    let mut batch_start = start;

    while batch_start <= live_max {
        let batch_end = (batch_start + batch_size - 1).min(live_max);
        let ids: Vec<i64> = (batch_start..=batch_end).collect();

        match upstream.items_batch_strict(&ids, concurrency).await {
            Ok(raw_items) => {
                let enriched = raw_items.into_iter().map(|raw| {
                    let is_front_page = front_page.contains(&raw.id);
                    raw.enrich(is_front_page)
                });
                let enriched: Vec<_> = enriched.collect();
                match store.upsert_items(&enriched) {
                    Ok((outcome, snapshots)) => {
                        summary.items_processed += outcome.processed as i64;
                        summary.items_changed += outcome.changed as i64;
                        if let Ok(count) = store.insert_snapshots(&snapshots) {
                            summary.snapshots_created += count as i64;
                        }
                        store.increment_items_archived_today(outcome.processed as i64);
                        watermark = batch_end;
                    }
                    Err(err) => {
                        all_batches_succeeded = false;
                        summary.errors += 1;
                        let message = format!("batch [{batch_start}, {batch_end}] upsert failed: {err}");
                        summary.error_messages.push(message.clone());
                        store.log_error(
                            PIPELINE_NAME,
                            &message,
                            Some(format!("{{\"min_id\":{batch_start},\"max_id\":{batch_end}}}")),
                        );
                    }
                }
            }
            Err(err) => {
                all_batches_succeeded = false;
                summary.errors += 1;
                let message = format!("batch [{batch_start}, {batch_end}] fetch failed: {err}");
                summary.error_messages.push(message.clone());
                store.log_error(
                    PIPELINE_NAME,
                    &message,
                    Some(format!("{{\"min_id\":{batch_start},\"max_id\":{batch_end}}}")),
                );
            }
        }

        batch_start = batch_end + 1;
    }

    if all_batches_succeeded {
        watermark = live_max;
    }
    if let Err(err) = store.set_max_item_id_seen(watermark) {
        error!(%err, "failed to persist max_item_id_seen");
    }
    let _ = store.touch_run_marker(state::keys::LAST_DISCOVERY_RUN);

    summary.success = summary.errors == 0;
    finish(store, summary, started)
}

fn finish(store: &Store, mut summary: PipelineSummary, started: Instant) -> PipelineSummary {
    summary.duration_ms = started.elapsed().as_millis() as i64;
    let _ = store.record_metrics(summary.to_metrics_row(PIPELINE_NAME, clock::now_ms()));
    summary
}
