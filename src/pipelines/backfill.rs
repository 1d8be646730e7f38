//! Backfill pipeline (spec.md section 4.6): three independent phases — stale
//! refresh, AI enrichment, embedding generation — each of which must run even
//! if an earlier phase failed outright.

use crate::ai::AiClient;
use crate::clock;
use crate::config::Config;
use crate::model::state;
use crate::pipelines::PipelineSummary;
use crate::snapshot_policy;
use crate::store::{AiAnalysisUpdate, BudgetOp, Store};
use crate::upstream::UpstreamSource;
use crate::vector::{VectorMetadata, VectorRecord, VectorStore};
use futures::future::join_all;
use std::time::Instant;
use tracing::warn;

const PIPELINE_NAME: &str = "backfill";

pub async fn run<U: UpstreamSource + Sync>(
    upstream: &U,
    ai: &AiClient,
    vector_store: &VectorStore,
    store: &Store,
    config: &Config,
) -> PipelineSummary {
    let started = Instant::now();
    let mut summary = PipelineSummary { success: true, ..Default::default() };

    run_stale_refresh(upstream, store, config, &mut summary).await;
    run_ai_enrichment(ai, store, config, &mut summary).await;
    run_embedding_backfill(ai, vector_store, store, config, &mut summary).await;

    let _ = store.touch_run_marker(state::keys::LAST_BACKFILL_RUN);
    summary.success = summary.errors == 0;
    finish(store, summary, started)
}

/// AI enrichment and embedding generation only, without the stale-refresh
/// phase or the scheduled-run watermark — used by the on-demand trigger
/// route (spec.md section 4.7) so an operator can re-run AI catch-up
/// without waiting for the next scheduled backfill tick.
pub async fn run_ai_only(ai: &AiClient, vector_store: &VectorStore, store: &Store, config: &Config) -> PipelineSummary {
    let started = Instant::now();
    let mut summary = PipelineSummary { success: true, ..Default::default() };

    run_ai_enrichment(ai, store, config, &mut summary).await;
    run_embedding_backfill(ai, vector_store, store, config, &mut summary).await;

    summary.success = summary.errors == 0;
    finish(store, summary, started)
}

/// Phase A (spec.md section 4.6): refresh items that haven't been re-fetched
/// in a while, then insert only the `score_spike` snapshots the policy
/// decided on for them.
async fn run_stale_refresh<U: UpstreamSource + Sync>(upstream: &U, store: &Store, config: &Config, summary: &mut PipelineSummary) {
    let cfg = &config.backfill;
    let ids = match store.stale_scan(cfg.stale_threshold_secs, cfg.stale_min_score, cfg.stale_min_descendants, cfg.stale_limit) {
        Ok(ids) => ids,
        Err(err) => {
            let message = format!("stale scan failed: {err}");
            store.log_error(PIPELINE_NAME, &message, None);
            summary.errors += 1;
            summary.error_messages.push(message);
            return;
        }
    };
    if ids.is_empty() {
        return;
    }

    let raw_items = match upstream.items_batch_strict(&ids, config.rate_limit.upstream_concurrency).await {
        Ok(items) => items,
        Err(err) => {
            let message = format!("stale refresh fetch failed for {} ids: {err}", ids.len());
            store.log_error(PIPELINE_NAME, &message, None);
            summary.errors += 1;
            summary.error_messages.push(message);
            return;
        }
    };

    let enriched: Vec<_> = raw_items.into_iter().map(|raw| raw.enrich(false)).collect();
    match store.upsert_items(&enriched) {
        Ok((outcome, snapshots)) => {
            summary.items_processed += outcome.processed as i64;
            summary.items_changed += outcome.changed as i64;
            store.increment_items_archived_today(outcome.processed as i64);

            // Older items should not produce sample/front_page snapshots
            // (spec.md section 4.3 and 4.6): keep only score_spike, even
            // though the policy already decided on a broader set.
            let filtered: Vec<_> = snapshots.into_iter().filter(|snapshot| snapshot_policy::keep_for_backfill(snapshot.reason)).collect();
            if let Ok(count) = store.insert_snapshots(&filtered) {
                summary.snapshots_created += count as i64;
            }
        }
        Err(err) => {
            let message = format!("stale refresh upsert failed for {} ids: {err}", enriched.len());
            store.log_error(PIPELINE_NAME, &message, None);
            summary.errors += 1;
            summary.error_messages.push(message);
        }
    }
}

/// Phase B (spec.md section 4.6): classify topic, content type, and
/// sentiment for stories that haven't been analyzed yet.
async fn run_ai_enrichment(ai: &AiClient, store: &Store, config: &Config, summary: &mut PipelineSummary) {
    let candidates = match store.ai_enrichment_candidates(config.backfill.ai_batch_size) {
        Ok(items) => items,
        Err(err) => {
            let message = format!("AI enrichment candidate query failed: {err}");
            store.log_error(PIPELINE_NAME, &message, None);
            summary.errors += 1;
            summary.error_messages.push(message);
            return;
        }
    };
    if candidates.is_empty() {
        return;
    }

    let analyses = join_all(candidates.iter().map(|item| async move {
        let title = item.title.as_deref().unwrap_or_default();
        let (topic, content_type, sentiment) =
            tokio::join!(ai.classify_topic(title, item.url.as_deref()), ai.classify_content_type(title), ai.sentiment(title));
        AiAnalysisUpdate { id: item.id, topic: topic.to_string(), content_type: content_type.to_string(), sentiment }
    }))
    .await;

    summary.items_processed += analyses.len() as i64;
    match store.apply_ai_analysis_batch(&analyses) {
        Ok(count) => summary.items_changed += count as i64,
        Err(err) => {
            let message = format!("AI analysis batch write failed for {} ids: {err}", analyses.len());
            store.log_error(PIPELINE_NAME, &message, None);
            summary.errors += 1;
            summary.error_messages.push(message);
        }
    }
}

/// Phase C (spec.md section 4.6): generate embeddings for analyzed stories
/// within the hard storage budget.
async fn run_embedding_backfill(ai: &AiClient, vector_store: &VectorStore, store: &Store, config: &Config, summary: &mut PipelineSummary) {
    let decision = match store.check_budget(
        BudgetOp::EmbeddingBackfill,
        config.budget.vectorize_queries_daily_limit,
        config.budget.embeddings_stored_limit,
    ) {
        Ok(decision) => decision,
        Err(err) => {
            let message = format!("embedding budget check failed: {err}");
            store.log_error(PIPELINE_NAME, &message, None);
            summary.errors += 1;
            summary.error_messages.push(message);
            return;
        }
    };
    if !decision.allowed {
        if let Some(reason) = decision.reason {
            summary.error_messages.push(reason);
        }
        return;
    }

    let candidates = match store.embedding_backfill_candidates(config.backfill.embedding_batch_size) {
        Ok(items) => items,
        Err(err) => {
            let message = format!("embedding candidate query failed: {err}");
            store.log_error(PIPELINE_NAME, &message, None);
            summary.errors += 1;
            summary.error_messages.push(message);
            return;
        }
    };
    if candidates.is_empty() {
        return;
    }

    let embedded = join_all(candidates.iter().map(|item| async move {
        let title = item.title.as_deref().unwrap_or_default();
        ai.embed(title).await.map(|values| {
            let topic = item.ai_topic.clone().unwrap_or_else(|| "other".to_owned());
            let metadata = VectorMetadata::new(topic, item.score, title);
            (item.id, VectorRecord::new(item.id, values, metadata))
        })
    }))
    .await;

    let records: Vec<VectorRecord> = embedded.iter().filter_map(|result| result.as_ref().map(|(_, record)| record.clone())).collect();
    let succeeded_ids: Vec<i64> = embedded.iter().filter_map(|result| result.as_ref().map(|(id, _)| *id)).collect();

    if records.is_empty() {
        return;
    }

    if let Err(err) = vector_store.upsert(&records).await {
        let message = format!("vector upsert failed for {} items: {err}", records.len());
        store.log_error(PIPELINE_NAME, &message, None);
        summary.errors += 1;
        summary.error_messages.push(message);
        return;
    }

    match store.mark_embeddings_generated(&succeeded_ids) {
        Ok(count) => {
            summary.items_changed += count as i64;
            store.increment_usage(crate::model::usage_counter::keys::EMBEDDINGS_STORED, count as i64);
        }
        Err(err) => warn!(%err, "failed to mark embeddings generated after a successful vector upsert"),
    }
    summary.items_processed += succeeded_ids.len() as i64;
}

fn finish(store: &Store, mut summary: PipelineSummary, started: Instant) -> PipelineSummary {
    summary.duration_ms = started.elapsed().as_millis() as i64;
    let _ = store.record_metrics(summary.to_metrics_row(PIPELINE_NAME, clock::now_ms()));
    summary
}
