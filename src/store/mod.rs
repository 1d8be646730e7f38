//! Persistence layer (spec.md section 4.2): item upsert with change
//! detection, snapshot accumulation, stale-item scanning, usage-counter
//! budgeting, and the daily error counter. Every batch write is one
//! transaction, matching the teacher's `conn.transaction(|conn| {...})`
//! idiom for multi-statement writes.

use crate::clock;
use crate::db::{ConnectionPool, ConnectionResult};
use crate::model::enums::SnapshotReason;
use crate::model::analytics_cache::AnalyticsCacheRow;
use crate::model::error_log::NewErrorLog;
use crate::model::item::{EnrichedItem, Item, ItemRow};
use crate::model::snapshot::NewSnapshot;
use crate::model::state::{State, StateRow, keys as state_keys};
use crate::model::usage_counter::{UsageCounterRow, keys as usage_counter_keys};
use crate::model::worker_metrics::NewWorkerMetrics;
use crate::schema::{analytics_cache, error_log, item, snapshot, state, usage_counter, worker_metrics};
use crate::snapshot_policy::{self, Observation};
use diesel::prelude::*;
use diesel::upsert::excluded;
use std::collections::HashMap;
use tracing::warn;

/// Postgres caps bound statement parameters; IN-predicates over ids are
/// chunked at this size (spec.md section 4.2's "recently-updated filter").
const ID_CHUNK_SIZE: usize = 50;
const ERROR_LOG_RETENTION_MS: i64 = 7 * 24 * 60 * 60 * 1000;
const WORKER_METRICS_RETENTION_MS: i64 = 30 * 24 * 60 * 60 * 1000;

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchUpsertOutcome {
    pub processed: usize,
    pub changed: usize,
}

/// One item's AI classification result, ready to persist (spec.md section 4.6
/// Phase B).
#[derive(Debug, Clone)]
pub struct AiAnalysisUpdate {
    pub id: i64,
    pub topic: String,
    pub content_type: String,
    pub sentiment: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetOp {
    VectorizeQuery,
    EmbeddingBackfill,
}

#[derive(Debug, Clone)]
pub struct BudgetDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UsageStats {
    pub vectorize_queries_today: i64,
    pub vectorize_queries_this_month: i64,
    pub embeddings_stored_total: i64,
}

#[derive(Clone)]
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> ConnectionResult {
        self.pool.get()
    }

    // -- state ---------------------------------------------------------

    pub fn get_state(&self, key: &str) -> QueryResult<Option<i64>> {
        let mut conn = self.conn()?;
        state::table.find(key).select(state::value).first(&mut conn).optional()
    }

    pub fn set_state(&self, key: &str, value: i64) -> QueryResult<()> {
        let mut conn = self.conn()?;
        let row = StateRow { key: key.to_owned(), value, updated_at: clock::now_ms() };
        diesel::insert_into(state::table)
            .values(&row)
            .on_conflict(state::key)
            .do_update()
            .set(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn max_item_id_seen(&self) -> QueryResult<i64> {
        Ok(self.get_state(state_keys::MAX_ITEM_ID_SEEN)?.unwrap_or(0))
    }

    pub fn set_max_item_id_seen(&self, value: i64) -> QueryResult<()> {
        self.set_state(state_keys::MAX_ITEM_ID_SEEN, value)
    }

    pub fn touch_run_marker(&self, key: &str) -> QueryResult<()> {
        self.set_state(key, clock::now_ms())
    }

    // -- item upsert -----------------------------------------------------

    /// Upserts `items` as a single transaction, returning the count
    /// processed/changed and the snapshots the policy decided to emit.
    /// Callers persist those via [`Store::insert_snapshots`] themselves
    /// (spec.md section 4.2 treats upsert and snapshot-insert as separate
    /// operations so backfill can filter the list in between).
    pub fn upsert_items(&self, items: &[EnrichedItem]) -> QueryResult<(BatchUpsertOutcome, Vec<NewSnapshot>)> {
        if items.is_empty() {
            return Ok((BatchUpsertOutcome::default(), Vec::new()));
        }
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            let now = clock::now_ms();
            let ids: Vec<i64> = items.iter().map(|item| item.id).collect();
            let existing: HashMap<i64, Item> = item::table
                .filter(item::id.eq_any(&ids))
                .select(Item::as_select())
                .load(conn)?
                .into_iter()
                .map(|row| (row.id, row))
                .collect();

            let mut rows = Vec::with_capacity(items.len());
            let mut snapshots = Vec::new();
            let mut changed_count = 0usize;

            for incoming in items {
                let prior = existing.get(&incoming.id);
                let (row, reason) = build_row(incoming, prior, now);
                if prior.is_none() || row.last_changed_at == now {
                    changed_count += 1;
                }
                if let Some(reason) = reason {
                    snapshots.push(NewSnapshot {
                        item_id: incoming.id,
                        captured_at: now,
                        score: incoming.score,
                        descendants: incoming.descendants,
                        reason,
                    });
                }
                rows.push(row);
            }

            diesel::insert_into(item::table)
                .values(&rows)
                .on_conflict(item::id)
                .do_update()
                .set((
                    item::kind.eq(excluded(item::kind)),
                    item::deleted.eq(excluded(item::deleted)),
                    item::dead.eq(excluded(item::dead)),
                    item::title.eq(excluded(item::title)),
                    item::url.eq(excluded(item::url)),
                    item::text.eq(excluded(item::text)),
                    item::author.eq(excluded(item::author)),
                    item::external_time.eq(excluded(item::external_time)),
                    item::score.eq(excluded(item::score)),
                    item::descendants.eq(excluded(item::descendants)),
                    item::parent.eq(excluded(item::parent)),
                    item::kids.eq(excluded(item::kids)),
                    item::last_updated_at.eq(excluded(item::last_updated_at)),
                    item::last_changed_at.eq(excluded(item::last_changed_at)),
                    item::update_count.eq(excluded(item::update_count)),
                ))
                .execute(conn)?;

            Ok((
                BatchUpsertOutcome { processed: items.len(), changed: changed_count },
                snapshots,
            ))
        })
    }

    pub fn insert_snapshots(&self, snapshots: &[NewSnapshot]) -> QueryResult<usize> {
        if snapshots.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        diesel::insert_into(snapshot::table).values(snapshots).execute(&mut conn)
    }

    // -- scans -------------------------------------------------------------

    /// Ids eligible for backfill refresh (spec.md section 4.2's "stale scan").
    pub fn stale_scan(&self, threshold_secs: i64, min_score: i32, min_descendants: i32, limit: i64) -> QueryResult<Vec<i64>> {
        let mut conn = self.conn()?;
        let cutoff = clock::now_ms() - clock::seconds_to_ms(threshold_secs);
        item::table
            .filter(item::last_updated_at.lt(cutoff))
            .filter(item::deleted.eq(false))
            .filter(item::score.gt(min_score).or(item::descendants.gt(min_descendants)))
            .order((item::descendants.desc(), item::score.desc(), item::last_updated_at.asc()))
            .limit(limit)
            .select(item::id)
            .load(&mut conn)
    }

    /// Subset of `ids` updated within `window_secs` of now (spec.md section
    /// 4.2's "recently-updated filter"), chunked to respect the parameter cap.
    pub fn recently_updated(&self, ids: &[i64], window_secs: i64) -> QueryResult<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        let cutoff = clock::now_ms() - clock::seconds_to_ms(window_secs);
        let mut matched = Vec::new();
        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let mut found: Vec<i64> = item::table
                .filter(item::id.eq_any(chunk))
                .filter(item::last_updated_at.ge(cutoff))
                .select(item::id)
                .load(&mut conn)?;
            matched.append(&mut found);
        }
        Ok(matched)
    }

    pub fn ai_enrichment_candidates(&self, limit: i64) -> QueryResult<Vec<Item>> {
        use crate::model::enums::ItemKind;
        let mut conn = self.conn()?;
        item::table
            .filter(item::ai_analyzed_at.is_null())
            .filter(item::title.is_not_null())
            .filter(item::deleted.eq(false))
            .filter(item::kind.eq(ItemKind::Story))
            .order(item::first_seen_at.desc())
            .limit(limit)
            .select(Item::as_select())
            .load(&mut conn)
    }

    pub fn embedding_backfill_candidates(&self, limit: i64) -> QueryResult<Vec<Item>> {
        let mut conn = self.conn()?;
        item::table
            .filter(item::ai_analyzed_at.is_not_null())
            .filter(item::embedding_generated_at.is_null())
            .limit(limit)
            .select(Item::as_select())
            .load(&mut conn)
    }

    /// Writes every analyzed item's classification in one transaction
    /// (spec.md section 4.6 Phase B's "write via a batched update").
    pub fn apply_ai_analysis_batch(&self, updates: &[AiAnalysisUpdate]) -> QueryResult<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            let now = clock::now_ms();
            for update in updates {
                diesel::update(item::table.find(update.id))
                    .set((
                        item::ai_topic.eq(&update.topic),
                        item::ai_content_type.eq(&update.content_type),
                        item::ai_sentiment.eq(update.sentiment),
                        item::ai_analyzed_at.eq(now),
                    ))
                    .execute(conn)?;
            }
            Ok(updates.len())
        })
    }

    /// Marks every id in `ids` as embedded as of now, in one statement
    /// (spec.md section 4.6 Phase C).
    pub fn mark_embeddings_generated(&self, ids: &[i64]) -> QueryResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        diesel::update(item::table.filter(item::id.eq_any(ids)))
            .set(item::embedding_generated_at.eq(clock::now_ms()))
            .execute(&mut conn)
    }

    // -- usage counters / budget ------------------------------------------

    /// Upsert-add; callers treat failures as non-fatal (spec.md section
    /// 4.2: "errors are swallowed and logged").
    pub fn increment_usage(&self, key: &str, delta: i64) {
        if let Err(err) = self.try_increment_usage(key, delta) {
            warn!(key, %err, "failed to increment usage counter");
        }
    }

    fn try_increment_usage(&self, key: &str, delta: i64) -> QueryResult<()> {
        let mut conn = self.conn()?;
        let row = UsageCounterRow { key: key.to_owned(), value: delta };
        diesel::insert_into(usage_counter::table)
            .values(&row)
            .on_conflict(usage_counter::key)
            .do_update()
            .set(usage_counter::value.eq(usage_counter::value + delta))
            .execute(&mut conn)?;
        Ok(())
    }

    fn usage_value(&self, key: &str) -> QueryResult<i64> {
        let mut conn = self.conn()?;
        usage_counter::table
            .find(key)
            .select(usage_counter::value)
            .first(&mut conn)
            .optional()
            .map(Option::unwrap_or_default)
    }

    pub fn usage_stats(&self) -> QueryResult<UsageStats> {
        let now = clock::now_ms();
        Ok(UsageStats {
            vectorize_queries_today: self.usage_value(&format!(
                "{}_{}",
                usage_counter_keys::VECTORIZE_QUERIES_PREFIX,
                clock::date_suffix(now)
            ))?,
            vectorize_queries_this_month: self.usage_value(&format!(
                "{}_{}",
                usage_counter_keys::VECTORIZE_QUERIES_PREFIX,
                clock::month_suffix(now)
            ))?,
            embeddings_stored_total: self.usage_value(usage_counter_keys::EMBEDDINGS_STORED)?,
        })
    }

    pub fn check_budget(&self, op: BudgetOp, vectorize_daily_limit: i64, embeddings_limit: i64) -> QueryResult<BudgetDecision> {
        let stats = self.usage_stats()?;
        Ok(match op {
            BudgetOp::VectorizeQuery if stats.vectorize_queries_today >= vectorize_daily_limit => BudgetDecision {
                allowed: false,
                reason: Some(format!("vectorize_queries_today ({}) at or above limit", stats.vectorize_queries_today)),
            },
            BudgetOp::EmbeddingBackfill if stats.embeddings_stored_total >= embeddings_limit => BudgetDecision {
                allowed: false,
                reason: Some(format!(
                    "Embedding storage limit reached ({}/{})",
                    stats.embeddings_stored_total, embeddings_limit
                )),
            },
            _ => BudgetDecision { allowed: true, reason: None },
        })
    }

    // -- error log / metrics ------------------------------------------------

    /// Inserts an error row and bumps `errors_today`, resetting it to 1 if
    /// the stored counter wasn't touched since the start of the current
    /// calendar day (spec.md section 4.2's "daily error counter").
    pub fn log_error(&self, pipeline: &str, message: &str, context: Option<String>) {
        if let Err(err) = self.try_log_error(pipeline, message, context) {
            warn!(pipeline, %err, "failed to record pipeline error");
        }
    }

    fn try_log_error(&self, pipeline: &str, message: &str, context: Option<String>) -> QueryResult<()> {
        let mut conn = self.conn()?;
        let now = clock::now_ms();
        let entry = NewErrorLog::new(now, pipeline, message, context);
        diesel::insert_into(error_log::table).values(&entry).execute(&mut conn)?;
        self.bump_daily_counter(&mut conn, state_keys::ERRORS_TODAY, now)?;
        Ok(())
    }

    /// Increments `items_archived_today` by `count`, resetting it to `count`
    /// if it wasn't touched since the start of the current calendar day.
    pub fn increment_items_archived_today(&self, count: i64) {
        if count == 0 {
            return;
        }
        if let Err(err) = self.try_increment_items_archived_today(count) {
            warn!(%err, "failed to bump items_archived_today");
        }
    }

    fn try_increment_items_archived_today(&self, count: i64) -> QueryResult<()> {
        let mut conn = self.conn()?;
        let now = clock::now_ms();
        self.bump_daily_counter_by(&mut conn, state_keys::ITEMS_ARCHIVED_TODAY, now, count)
    }

    /// Resets `key` to `delta` if its `state.updated_at` predates the start
    /// of the current calendar day, otherwise adds `delta` to the stored
    /// value (spec.md section 4.2's "daily error counter" pattern, reused
    /// for any other day-scoped counter).
    fn bump_daily_counter_by(&self, conn: &mut diesel::pg::PgConnection, key: &str, now: i64, delta: i64) -> QueryResult<()> {
        let day_start = clock::day_start_ms(now);
        let current: Option<State> = state::table.find(key).select(State::as_select()).first(conn).optional()?;
        let next_value = match current {
            Some(row) if row.updated_at >= day_start => row.value + delta,
            _ => delta,
        };
        let row = StateRow { key: key.to_owned(), value: next_value, updated_at: now };
        diesel::insert_into(state::table)
            .values(&row)
            .on_conflict(state::key)
            .do_update()
            .set(&row)
            .execute(conn)?;
        Ok(())
    }

    fn bump_daily_counter(&self, conn: &mut diesel::pg::PgConnection, key: &str, now: i64) -> QueryResult<()> {
        self.bump_daily_counter_by(conn, key, now, 1)
    }

    pub fn record_metrics(&self, metrics: NewWorkerMetrics) -> QueryResult<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(worker_metrics::table).values(&metrics).execute(&mut conn)?;
        Ok(())
    }

    /// Purges rows past retention (spec.md section 3: 7 days for errors, 30
    /// for metrics), run on the long-period scheduler tick.
    pub fn cleanup_old_rows(&self) -> QueryResult<(usize, usize)> {
        let mut conn = self.conn()?;
        let now = clock::now_ms();
        let deleted_errors =
            diesel::delete(error_log::table.filter(error_log::occurred_at.lt(now - ERROR_LOG_RETENTION_MS))).execute(&mut conn)?;
        let deleted_metrics = diesel::delete(worker_metrics::table.filter(worker_metrics::occurred_at.lt(now - WORKER_METRICS_RETENTION_MS)))
            .execute(&mut conn)?;
        Ok((deleted_errors, deleted_metrics))
    }

    // -- analytics cache -----------------------------------------------------

    /// Upserts a precomputed analytics payload (spec.md section 4.8), e.g. the
    /// topic-similarity matrix the HTTP route recomputes on demand.
    pub fn upsert_analytics_cache(&self, key: &str, data: serde_json::Value) -> QueryResult<()> {
        let mut conn = self.conn()?;
        let row = AnalyticsCacheRow { key: key.to_owned(), data, computed_at: clock::now_ms() };
        diesel::insert_into(analytics_cache::table)
            .values(&row)
            .on_conflict(analytics_cache::key)
            .do_update()
            .set(&row)
            .execute(&mut conn)?;
        Ok(())
    }
}

/// Builds the row to persist for one incoming item plus the snapshot reason
/// the policy decided on, given the prior row (if any).
fn build_row(incoming: &EnrichedItem, prior: Option<&Item>, now: i64) -> (ItemRow, Option<SnapshotReason>) {
    match prior {
        None => {
            let external_time = incoming.external_time.filter(|t| *t > 0).map(clock::seconds_to_ms).unwrap_or(now);
            let row = ItemRow {
                id: incoming.id,
                kind: incoming.kind,
                deleted: incoming.deleted,
                dead: incoming.dead,
                title: incoming.title.clone(),
                url: incoming.url.clone(),
                text: incoming.text.clone(),
                author: incoming.author.clone(),
                external_time,
                score: incoming.score,
                descendants: incoming.descendants,
                parent: incoming.parent,
                kids: incoming.serialized_kids(),
                first_seen_at: now,
                last_updated_at: now,
                last_changed_at: now,
                update_count: 0,
            };
            let new_obs = Observation { score: incoming.score, is_front_page: incoming.is_front_page };
            let reason = snapshot_policy::decide(None, new_obs, 0, true);
            (row, reason)
        }
        Some(existing) => {
            let changed = incoming.content_changed_from(existing);
            let last_changed_at = if changed { now } else { existing.last_changed_at };
            let update_count = existing.update_count + 1;
            let row = ItemRow {
                id: incoming.id,
                kind: incoming.kind,
                deleted: incoming.deleted,
                dead: incoming.dead,
                title: incoming.title.clone(),
                url: incoming.url.clone(),
                text: incoming.text.clone(),
                author: incoming.author.clone(),
                external_time: existing.external_time,
                score: incoming.score,
                descendants: incoming.descendants,
                parent: incoming.parent,
                kids: incoming.serialized_kids(),
                first_seen_at: existing.first_seen_at,
                last_updated_at: now,
                last_changed_at,
                update_count,
            };
            let old_obs = Observation { score: existing.score, is_front_page: false };
            let new_obs = Observation { score: incoming.score, is_front_page: incoming.is_front_page };
            let reason = snapshot_policy::decide(Some(old_obs), new_obs, update_count, changed);
            (row, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::enums::ItemKind;

    fn enriched(id: i64, score: Option<i32>, is_front_page: bool) -> EnrichedItem {
        EnrichedItem {
            id,
            kind: ItemKind::Story,
            deleted: false,
            dead: false,
            title: Some("t".to_owned()),
            url: None,
            text: None,
            author: Some("a".to_owned()),
            external_time: Some(100),
            score,
            descendants: Some(1),
            parent: None,
            kids: None,
            is_front_page,
        }
    }

    #[test]
    fn new_item_gets_creation_timestamps_and_zero_update_count() {
        let now = 1_000_000;
        let incoming = enriched(1, Some(5), false);
        let (row, reason) = build_row(&incoming, None, now);
        assert_eq!(row.first_seen_at, now);
        assert_eq!(row.last_changed_at, now);
        assert_eq!(row.update_count, 0);
        assert_eq!(reason, None);
    }

    #[test]
    fn new_front_page_item_gets_new_item_reason() {
        let now = 1_000_000;
        let incoming = enriched(1, Some(5), true);
        let (_, reason) = build_row(&incoming, None, now);
        assert_eq!(reason, Some(SnapshotReason::NewItem));
    }

    #[test]
    fn missing_external_time_falls_back_to_now() {
        let now = 1_000_000;
        let mut incoming = enriched(1, Some(5), false);
        incoming.external_time = None;
        let (row, _) = build_row(&incoming, None, now);
        assert_eq!(row.external_time, now);
    }

    #[test]
    fn non_positive_external_time_falls_back_to_now() {
        let now = 1_000_000;
        let mut incoming = enriched(1, Some(5), false);
        incoming.external_time = Some(0);
        let (row, _) = build_row(&incoming, None, now);
        assert_eq!(row.external_time, now);
    }

    #[test]
    fn existing_item_increments_update_count_unconditionally() {
        let now = 2_000_000;
        let existing = Item {
            id: 1,
            kind: ItemKind::Story,
            deleted: false,
            dead: false,
            title: Some("t".to_owned()),
            url: None,
            text: None,
            author: Some("a".to_owned()),
            external_time: 100_000,
            score: Some(5),
            descendants: Some(1),
            parent: None,
            kids: None,
            first_seen_at: 1_000_000,
            last_updated_at: 1_000_000,
            last_changed_at: 1_000_000,
            update_count: 3,
            ai_topic: None,
            ai_content_type: None,
            ai_sentiment: None,
            ai_analyzed_at: None,
            embedding_generated_at: None,
        };
        let incoming = enriched(1, Some(5), false);
        let (row, _) = build_row(&incoming, Some(&existing), now);
        assert_eq!(row.update_count, 4);
        assert_eq!(row.last_updated_at, now);
        assert_eq!(row.last_changed_at, existing.last_changed_at, "unchanged content keeps last_changed_at");
    }

    #[test]
    fn unchanged_existing_item_preserves_external_time() {
        let now = 2_000_000;
        let existing = Item {
            id: 1,
            kind: ItemKind::Story,
            deleted: false,
            dead: false,
            title: Some("t".to_owned()),
            url: None,
            text: None,
            author: Some("a".to_owned()),
            external_time: 100_000,
            score: Some(5),
            descendants: Some(1),
            parent: None,
            kids: None,
            first_seen_at: 1_000_000,
            last_updated_at: 1_000_000,
            last_changed_at: 1_000_000,
            update_count: 0,
            ai_topic: None,
            ai_content_type: None,
            ai_sentiment: None,
            ai_analyzed_at: None,
            embedding_generated_at: None,
        };
        let incoming = enriched(1, Some(5), false);
        let (row, _) = build_row(&incoming, Some(&existing), now);
        assert_eq!(row.external_time, 100_000);
    }
}
