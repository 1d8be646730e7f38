//! Update pipeline (spec.md section 4.5): pulls the upstream change feed,
//! de-duplicates against items discovery already touched seconds ago, and
//! refreshes whatever is left.

use crate::clock;
use crate::config::Config;
use crate::model::state;
use crate::pipelines::PipelineSummary;
use crate::store::Store;
use crate::upstream::UpstreamSource;
use std::collections::HashSet;
use std::time::Instant;
use tracing::warn;

const PIPELINE_NAME: &str = "update";

pub async fn run<U: UpstreamSource + Sync>(upstream: &U, store: &Store, config: &Config) -> PipelineSummary {
    let started = Instant::now();
    let mut summary = PipelineSummary { success: true, ..Default::default() };

    let changed_ids = match upstream.updates().await {
        Ok(updates) => updates.items,
        Err(err) => {
            let message = format!("failed to fetch update feed: {err}");
            store.log_error(PIPELINE_NAME, &message, None);
            summary.errors += 1;
            summary.error_messages.push(message);
            return finish(store, summary, started);
        }
    };

    if changed_ids.is_empty() {
        let _ = store.touch_run_marker(state::keys::LAST_UPDATES_CHECK);
        return finish(store, summary, started);
    }

    let recently_updated: HashSet<i64> =
        store.recently_updated(&changed_ids, config.recently_updated_window_secs).unwrap_or_default().into_iter().collect();
    let pending: Vec<i64> = changed_ids.into_iter().filter(|id| !recently_updated.contains(id)).collect();

    if pending.is_empty() {
        let _ = store.touch_run_marker(state::keys::LAST_UPDATES_CHECK);
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

    let batch_size = config.discovery_batch_size.max(1);
    let concurrency = config.rate_limit.upstream_concurrency;

    for chunk in pending.chunks(batch_size) {
        match upstream.items_batch_strict(chunk, concurrency).await {
            Ok(raw_items) => {
                let enriched: Vec<_> = raw_items
                    .into_iter()
                    .map(|raw| {
                        let is_front_page = front_page.contains(&raw.id);
                        raw.enrich(is_front_page)
                    })
                    .collect();
                match store.upsert_items(&enriched) {
                    Ok((outcome, snapshots)) => {
                        summary.items_processed += outcome.processed as i64;
                        summary.items_changed += outcome.changed as i64;
                        if let Ok(count) = store.insert_snapshots(&snapshots) {
                            summary.snapshots_created += count as i64;
                        }
                        store.increment_items_archived_today(outcome.processed as i64);
                    }
                    Err(err) => {
                        summary.errors += 1;
                        let message = format!("batch upsert failed for {} ids: {err}", chunk.len());
                        summary.error_messages.push(message.clone());
                        store.log_error(PIPELINE_NAME, &message, None);
                    }
                }
            }
            Err(err) => {
                summary.errors += 1;
                let message = format!("batch fetch failed for {} ids: {err}", chunk.len());
                summary.error_messages.push(message.clone());
                store.log_error(PIPELINE_NAME, &message, None);
            }
        }
    }

    let _ = store.touch_run_marker(state::keys::LAST_UPDATES_CHECK);
    summary.success = summary.errors == 0;
    finish(store, summary, started)
}

fn finish(store: &Store, mut summary: PipelineSummary, started: Instant) -> PipelineSummary {
    summary.duration_ms = started.elapsed().as_millis() as i64;
    let _ = store.record_metrics(summary.to_metrics_row(PIPELINE_NAME, clock::now_ms()));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{RawItem, UpstreamError, Updates};
    use std::sync::Mutex;

    struct FakeUpstream {
        updates: Updates,
        top_stories: Vec<i64>,
        items: Mutex<std::collections::HashMap<i64, RawItem>>,
    }

    impl UpstreamSource for FakeUpstream {
        async fn max_item_id(&self) -> Result<i64, UpstreamError> {
            Ok(0)
        }

        async fn item(&self, id: i64) -> Result<Option<RawItem>, UpstreamError> {
            Ok(self.items.lock().unwrap().get(&id).cloned())
        }

        async fn top_stories(&self) -> Result<Vec<i64>, UpstreamError> {
            Ok(self.top_stories.clone())
        }

        async fn updates(&self) -> Result<Updates, UpstreamError> {
            Ok(self.updates.clone())
        }
    }

    fn raw(id: i64) -> RawItem {
        RawItem {
            id,
            kind: "story".to_owned(),
            deleted: false,
            dead: false,
            title: Some(format!("item {id}")),
            url: None,
            text: None,
            by: Some("alice".to_owned()),
            time: Some(1_700_000_000),
            score: Some(1),
            descendants: Some(0),
            parent: None,
            kids: None,
        }
    }

    #[test]
    fn empty_change_feed_is_trivially_deduplicated() {
        let ids: Vec<i64> = Vec::new();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn dedup_removes_recently_updated_ids_before_fetching() {
        // This exercises the filtering logic directly, matching spec.md
        // section 8 scenario 2, without requiring a live database for the
        // `recently_updated` lookup itself (covered in store::tests).
        let changed_ids = vec![1, 2, 3, 4, 5];
        let recently_updated: HashSet<i64> = [1, 2, 3].into_iter().collect();
        let pending: Vec<i64> = changed_ids.into_iter().filter(|id| !recently_updated.contains(id)).collect();
        assert_eq!(pending, vec![4, 5]);
    }

    #[tokio::test]
    async fn front_page_set_is_built_from_top_stories() {
        let fake = FakeUpstream {
            updates: Updates { items: vec![1, 2], profiles: Vec::new() },
            top_stories: vec![1],
            items: Mutex::new([(1, raw(1)), (2, raw(2))].into_iter().collect()),
        };
        let ids = fake.top_stories().await.unwrap();
        let front_page: HashSet<i64> = ids.into_iter().collect();
        assert!(front_page.contains(&1));
        assert!(!front_page.contains(&2));
    }
}
